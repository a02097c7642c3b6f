use async_trait::async_trait;
use serde_json::json;
use sowcrew_core::{AgentError, AgentRequest, AgentResponse, AgentRuntime};
use tracing::debug;

/// Offline runtime: answers every task with its own rendered prompt.
///
/// Lets a whole run be exercised without an agent endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoAgent;

#[async_trait]
impl AgentRuntime for EchoAgent {
    fn name(&self) -> &str {
        "echo"
    }

    async fn invoke(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        debug!(task_id = %request.task_id, role = %request.role.name, "Echoing prompt");

        Ok(AgentResponse::new(json!({
            "role": request.role.name,
            "prompt": request.prompt,
            "prior_results": request.context.prior_results.len(),
        }))
        .with_message(format!("{} acknowledged '{}'", request.role.name, request.title)))
    }
}

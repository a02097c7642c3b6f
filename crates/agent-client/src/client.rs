use async_trait::async_trait;
use reqwest::Client;
use sowcrew_core::{AgentError, AgentRequest, AgentResponse, AgentRuntime};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};
use crate::types::WebhookReply;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Agent runtime reached over an HTTP webhook.
///
/// Each task is one `POST` of the JSON-encoded [`AgentRequest`] to the
/// endpoint. A 2xx reply carries either `{"output": .., "messages": [..]}`,
/// an agent-reported `{"error": {"kind": .., "message": ..}}`, or any other
/// JSON / text which is taken as the output verbatim.
#[derive(Clone)]
pub struct HttpAgentClient {
    endpoint: String,
    client: Client,
    token: Option<String>,
}

impl HttpAgentClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::with_timeout(endpoint, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.into();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ClientError::InvalidConfig(format!(
                "agent endpoint must be an http(s) URL, got '{}'",
                endpoint
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint,
            client,
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, request: &AgentRequest) -> Result<WebhookReply> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(ref token) = self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(WebhookReply::parse(&body))
    }
}

#[async_trait]
impl AgentRuntime for HttpAgentClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn invoke(&self, request: &AgentRequest) -> std::result::Result<AgentResponse, AgentError> {
        debug!(
            endpoint = %self.endpoint,
            task_id = %request.task_id,
            role = %request.role.name,
            "Posting task to agent endpoint"
        );

        match self.post(request).await {
            Ok(reply) => reply.into_result(),
            Err(e) => {
                warn!(
                    endpoint = %self.endpoint,
                    task_id = %request.task_id,
                    error = %e,
                    "Agent endpoint call failed"
                );
                Err(AgentError::from(e))
            }
        }
    }
}

impl std::fmt::Debug for HttpAgentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAgentClient")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sowcrew_core::{AgentContext, AgentErrorKind, AgentRole, RunId, TaskId};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> AgentRequest {
        AgentRequest {
            run_id: RunId::from("20260101-000000-000-abcd"),
            task_id: TaskId::from("T1"),
            title: "Design API schema".to_string(),
            description: String::new(),
            role: AgentRole::new("Architect").with_tags(["design"]),
            prompt: "Design the schema".to_string(),
            context: AgentContext::default(),
        }
    }

    async fn client_for(server: &MockServer) -> HttpAgentClient {
        HttpAgentClient::new(format!("{}/agent", server.uri())).unwrap()
    }

    #[test]
    fn test_rejects_non_http_endpoint() {
        assert!(matches!(
            HttpAgentClient::new("ftp://example.com"),
            Err(ClientError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_structured_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": {"schema": "users(id, name)"},
                "messages": ["drafted schema"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client_for(&server).await.invoke(&request()).await.unwrap();
        assert_eq!(response.output["schema"], "users(id, name)");
        assert_eq!(response.messages, vec!["drafted schema".to_string()]);
    }

    #[tokio::test]
    async fn test_plain_text_reply_becomes_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("done"))
            .mount(&server)
            .await;

        let response = client_for(&server).await.invoke(&request()).await.unwrap();
        assert_eq!(response.output, json!("done"));
    }

    #[tokio::test]
    async fn test_agent_reported_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": {"kind": "permanent", "message": "task out of scope"}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).await.invoke(&request()).await.unwrap_err();
        assert_eq!(err.kind, AgentErrorKind::Permanent);
        assert_eq!(err.message, "task out of scope");
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.invoke(&request()).await.unwrap_err();
        assert_eq!(err.kind, AgentErrorKind::Transient);
        assert!(err.message.contains("503"));
    }

    #[tokio::test]
    async fn test_client_error_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let err = client_for(&server).await.invoke(&request()).await.unwrap_err();
        assert_eq!(err.kind, AgentErrorKind::Permanent);
    }

    #[tokio::test]
    async fn test_bearer_token_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"output": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await.with_token("secret");
        let response = client.invoke(&request()).await.unwrap();
        assert_eq!(response.output, json!("ok"));
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"output": "late"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client =
            HttpAgentClient::with_timeout(server.uri(), Duration::from_millis(50)).unwrap();
        let err = client.invoke(&request()).await.unwrap_err();
        assert_eq!(err.kind, AgentErrorKind::Timeout);
    }
}

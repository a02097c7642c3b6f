use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use events::Event;
use futures::StreamExt;
use orchestrator::{
    read_events, read_report, CoordinatorConfig, FailurePolicy, OrchestratorError, Pipeline,
};
use serde_json::json;
use sowcrew_core::{
    AgentError, AgentRequest, AgentResponse, AgentRole, AgentRuntime, RoleSet, RunReport,
    TaskStatus,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const SOW: &str = "1. Design API schema\n2. Implement endpoint\n3. Review PR";

#[derive(Clone, Copy)]
enum Behavior {
    Succeed,
    Hang,
    Permanent,
    /// Transient failures before the call finally succeeds.
    FlakyThen(usize),
}

/// Stand-in agent backend scripted per role.
struct ScriptedAgent {
    behaviors: HashMap<String, Behavior>,
    delay: Duration,
    calls: Mutex<Vec<AgentRequest>>,
    per_role_calls: Mutex<HashMap<String, usize>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedAgent {
    fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
            delay: Duration::from_millis(5),
            calls: Mutex::new(Vec::new()),
            per_role_calls: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn with(mut self, role: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(role.to_string(), behavior);
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls_for(&self, role: &str) -> usize {
        self.per_role_calls.lock().unwrap().get(role).copied().unwrap_or(0)
    }

    fn requests(&self) -> Vec<AgentRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentRuntime for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        let role = request.role.name.clone();
        let call_no = {
            let mut per_role = self.per_role_calls.lock().unwrap();
            let count = per_role.entry(role.clone()).or_insert(0);
            *count += 1;
            *count
        };
        self.calls.lock().unwrap().push(request.clone());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let behavior = self.behaviors.get(&role).copied().unwrap_or(Behavior::Succeed);
        let result = match behavior {
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(AgentResponse::new(json!("too late")))
            }
            Behavior::Permanent => {
                tokio::time::sleep(self.delay).await;
                Err(AgentError::permanent("model rejected the request"))
            }
            Behavior::FlakyThen(failures) if call_no <= failures => {
                tokio::time::sleep(self.delay).await;
                Err(AgentError::transient("connection reset"))
            }
            Behavior::Succeed | Behavior::FlakyThen(_) => {
                tokio::time::sleep(self.delay).await;
                Ok(AgentResponse::new(json!({ "done": request.title }))
                    .with_message(format!("{} on it", role)))
            }
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn roles() -> RoleSet {
    RoleSet::new(vec![
        AgentRole::new("Architect").with_tags(["design"]),
        AgentRole::new("Developer").with_tags(["implement"]),
        AgentRole::new("PM").with_tags(["review"]),
    ])
    .unwrap()
}

fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig::new()
        .with_max_retries(2)
        .with_agent_timeout(Duration::from_millis(100))
        .with_retry_backoff(Duration::from_millis(5))
}

fn setup(agent: ScriptedAgent) -> (Pipeline, Arc<ScriptedAgent>, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let agent = Arc::new(agent);
    let pipeline = Pipeline::new(agent.clone(), roles(), temp_dir.path().join("runs"))
        .with_coordinator_config(fast_config());
    (pipeline, agent, temp_dir)
}

fn statuses(report: &RunReport) -> Vec<TaskStatus> {
    report.tasks.iter().map(|t| t.status).collect()
}

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn test_three_tasks_succeed() {
        let (pipeline, agent, _temp_dir) = setup(ScriptedAgent::new());

        let report = pipeline.run(SOW).await.unwrap();

        let titles: Vec<&str> = report.tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Design API schema", "Implement endpoint", "Review PR"]);

        let assigned: Vec<Option<&str>> = report
            .tasks
            .iter()
            .map(|t| t.assigned_role.as_deref())
            .collect();
        assert_eq!(assigned, vec![Some("Architect"), Some("Developer"), Some("PM")]);

        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.succeeded, 3);
        assert_eq!(report.summary.failed, 0);
        assert_eq!(report.summary.skipped, 0);
        assert!(report.summary.is_clean());
        assert_eq!(agent.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_timeouts_fail_only_that_task() {
        let (pipeline, agent, temp_dir) =
            setup(ScriptedAgent::new().with("Developer", Behavior::Hang));

        let report = pipeline.run(SOW).await.unwrap();

        assert_eq!(
            statuses(&report),
            vec![TaskStatus::Succeeded, TaskStatus::Failed, TaskStatus::Succeeded]
        );
        assert_eq!(agent.calls_for("Developer"), 3);

        let developer_task = &report.tasks[1];
        assert_eq!(developer_task.attempts, 3);
        let reason = developer_task.failure_reason.as_deref().unwrap();
        assert!(reason.contains("timeout"), "unexpected reason: {}", reason);

        let events = read_events(&temp_dir.path().join("runs"), &report.run_id)
            .await
            .unwrap();
        let retries: Vec<u32> = events
            .iter()
            .filter_map(|e| match &e.event {
                Event::TaskRetryScheduled { task_id, attempt, .. } => {
                    assert_eq!(task_id.as_str(), "T2");
                    Some(*attempt)
                }
                _ => None,
            })
            .collect();
        assert_eq!(retries, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_no_tasks_aborts_run() {
        let (pipeline, agent, temp_dir) = setup(ScriptedAgent::new());

        let err = pipeline
            .run("We will deliver a great product.\nThanks for reading.")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Parse(_)));
        assert!(agent.requests().is_empty());

        let runs = orchestrator::list_runs(&temp_dir.path().join("runs")).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].summary.is_none());

        let events = read_events(&temp_dir.path().join("runs"), &runs[0].run_id)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.kind(), "run.aborted");
    }

    #[tokio::test]
    async fn test_unknown_role_hint_fails_task() {
        let (pipeline, agent, _temp_dir) = setup(ScriptedAgent::new());

        let report = pipeline
            .run("1. Design API schema\n2. [Designer] Draw the logo\n3. Review PR")
            .await
            .unwrap();

        assert_eq!(
            statuses(&report),
            vec![TaskStatus::Succeeded, TaskStatus::Failed, TaskStatus::Succeeded]
        );
        assert!(report.tasks[1].assigned_role.is_none());
        assert!(report.tasks[1]
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("Designer"));
        assert_eq!(agent.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_document_runs_nothing() {
        let (pipeline, agent, _temp_dir) = setup(ScriptedAgent::new());

        let report = pipeline.run("  \n").await.unwrap();
        assert_eq!(report.summary.total, 0);
        assert!(agent.requests().is_empty());
    }
}

mod retries {
    use super::*;

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let (pipeline, agent, _temp_dir) =
            setup(ScriptedAgent::new().with("Developer", Behavior::Permanent));

        let report = pipeline.run(SOW).await.unwrap();

        assert_eq!(agent.calls_for("Developer"), 1);
        assert_eq!(report.tasks[1].status, TaskStatus::Failed);
        assert_eq!(report.tasks[1].attempts, 1);
        assert_eq!(report.summary.succeeded, 2);
    }

    #[tokio::test]
    async fn test_transient_error_recovers() {
        let (pipeline, agent, _temp_dir) =
            setup(ScriptedAgent::new().with("Architect", Behavior::FlakyThen(2)));

        let report = pipeline.run(SOW).await.unwrap();

        assert_eq!(agent.calls_for("Architect"), 3);
        assert_eq!(report.tasks[0].status, TaskStatus::Succeeded);
        assert_eq!(report.tasks[0].attempts, 3);
        assert!(report.summary.is_clean());
    }

    #[tokio::test]
    async fn test_retries_never_exceed_limit() {
        for max_retries in 0..4u32 {
            let temp_dir = TempDir::new().unwrap();
            let agent = Arc::new(ScriptedAgent::new().with("Architect", Behavior::FlakyThen(10)));
            let pipeline = Pipeline::new(agent.clone(), roles(), temp_dir.path())
                .with_coordinator_config(fast_config().with_max_retries(max_retries));

            let report = pipeline.run("1. Design API schema").await.unwrap();

            assert_eq!(agent.calls_for("Architect"), max_retries as usize + 1);
            assert_eq!(report.tasks[0].status, TaskStatus::Failed);
        }
    }

    #[tokio::test]
    async fn test_skip_remaining_after_failure() {
        let temp_dir = TempDir::new().unwrap();
        let agent = Arc::new(ScriptedAgent::new().with("Architect", Behavior::Permanent));
        let pipeline = Pipeline::new(agent.clone(), roles(), temp_dir.path())
            .with_coordinator_config(fast_config().with_failure_policy(FailurePolicy::SkipRemaining));

        let report = pipeline.run(SOW).await.unwrap();

        assert_eq!(
            statuses(&report),
            vec![TaskStatus::Failed, TaskStatus::Skipped, TaskStatus::Skipped]
        );
        assert_eq!(agent.requests().len(), 1);
    }
}

mod execution {
    use super::*;

    #[tokio::test]
    async fn test_later_tasks_see_prior_results() {
        let (pipeline, agent, _temp_dir) = setup(ScriptedAgent::new());

        pipeline
            .run("Client: Acme Corp\n\n1. Design API schema\n2. Implement endpoint\n3. Review PR")
            .await
            .unwrap();

        let requests = agent.requests();
        assert_eq!(requests[0].context.prior_results.len(), 0);
        assert_eq!(requests[2].context.prior_results.len(), 2);
        assert_eq!(requests[2].context.prior_results[1].role, "Developer");
        assert_eq!(requests[0].context.preamble.as_deref(), Some("Client: Acme Corp"));
        assert!(requests[2].prompt.contains("[T1] Design API schema"));
    }

    #[tokio::test]
    async fn test_sequential_by_default() {
        let (pipeline, agent, _temp_dir) = setup(ScriptedAgent::new());

        pipeline.run(SOW).await.unwrap();
        assert_eq!(agent.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let temp_dir = TempDir::new().unwrap();
        let agent = Arc::new(ScriptedAgent::new().with_delay(Duration::from_millis(40)));
        let pipeline = Pipeline::new(agent.clone(), roles(), temp_dir.path())
            .with_coordinator_config(fast_config().with_max_concurrency(2));

        let sow = "1. Design API schema\n2. Implement endpoint\n3. Review PR\n4. Design caching\n5. Implement cache";
        let report = pipeline.run(sow).await.unwrap();

        assert_eq!(report.summary.succeeded, 5);
        let peak = agent.peak.load(Ordering::SeqCst);
        assert!(peak <= 2, "peak concurrency {}", peak);
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_dispatches() {
        let (pipeline, agent, _temp_dir) = setup(ScriptedAgent::new());
        let pipeline = pipeline.with_coordinator_config(CoordinatorConfig {
            max_concurrency: 0,
            ..fast_config()
        });

        let report = tokio::time::timeout(Duration::from_secs(5), pipeline.run(SOW))
            .await
            .expect("run should not stall")
            .unwrap();

        assert_eq!(report.summary.succeeded, 3);
        assert_eq!(agent.peak.load(Ordering::SeqCst), 1);
    }

    /// Answers, but only after pulling the plug on the run.
    struct CancelsThenAnswers {
        token: CancellationToken,
    }

    #[async_trait]
    impl AgentRuntime for CancelsThenAnswers {
        fn name(&self) -> &str {
            "cancels-then-answers"
        }

        async fn invoke(&self, _request: &AgentRequest) -> Result<AgentResponse, AgentError> {
            self.token.cancel();
            Ok(AgentResponse::new(json!("finished anyway")))
        }
    }

    #[tokio::test]
    async fn test_result_after_cancel_is_logged_not_applied() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("runs");
        let token = CancellationToken::new();
        let agent = Arc::new(CancelsThenAnswers {
            token: token.clone(),
        });
        let pipeline = Pipeline::new(agent, roles(), &root)
            .with_coordinator_config(fast_config())
            .with_cancellation(token);

        let report = pipeline.run(SOW).await.unwrap();

        assert!(report.summary.cancelled);
        assert_eq!(
            statuses(&report),
            vec![TaskStatus::Failed, TaskStatus::Skipped, TaskStatus::Skipped]
        );
        assert_eq!(
            report.tasks[0].failure_reason.as_deref(),
            Some("cancelled while running")
        );
        assert!(report.tasks[0].result.is_none());

        let events = read_events(&root, &report.run_id).await.unwrap();
        let late: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.event {
                Event::LateResultDiscarded { task_id, detail } => Some((task_id.as_str(), detail.as_str())),
                _ => None,
            })
            .collect();
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].0, "T1");
        assert!(late[0].1.contains("after task was failed"), "{}", late[0].1);
    }

    #[tokio::test]
    async fn test_cancel_stops_run() {
        let (pipeline, _agent, _temp_dir) =
            setup(ScriptedAgent::new().with("Architect", Behavior::Hang));
        let pipeline = pipeline.with_coordinator_config(
            fast_config().with_agent_timeout(Duration::from_secs(60)),
        );

        let token = pipeline.cancellation_token();
        let mut stream = Box::pin(pipeline.event_bus().stream());
        let watcher = tokio::spawn(async move {
            while let Some(envelope) = stream.next().await {
                if let Event::TaskStatusChanged {
                    to_status: TaskStatus::Running,
                    ..
                } = envelope.event
                {
                    token.cancel();
                    break;
                }
            }
        });

        let report = pipeline.run(SOW).await.unwrap();
        watcher.await.unwrap();

        assert!(report.summary.cancelled);
        assert_eq!(
            statuses(&report),
            vec![TaskStatus::Failed, TaskStatus::Skipped, TaskStatus::Skipped]
        );
        assert_eq!(
            report.tasks[0].failure_reason.as_deref(),
            Some("cancelled while running")
        );
    }
}

mod run_log {
    use super::*;

    #[tokio::test]
    async fn test_events_and_summary_written() {
        let (pipeline, _agent, temp_dir) = setup(ScriptedAgent::new());
        let root = temp_dir.path().join("runs");

        let report = pipeline.run(SOW).await.unwrap();

        let events = read_events(&root, &report.run_id).await.unwrap();
        assert_eq!(events.first().unwrap().event.kind(), "run.started");
        assert_eq!(events.last().unwrap().event.kind(), "run.finished");

        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        let expected: Vec<u64> = (0..events.len() as u64).collect();
        assert_eq!(seqs, expected);

        let messages = events
            .iter()
            .filter(|e| e.event.kind() == "agent.message")
            .count();
        assert_eq!(messages, 3);

        let stored = read_report(&root, &report.run_id).await.unwrap().unwrap();
        assert_eq!(stored.summary, report.summary);
        assert_eq!(stored.tasks.len(), 3);
        assert!(pipeline.run_dir(&report.run_id).join("summary.json").exists());
    }

    #[tokio::test]
    async fn test_unwritable_log_does_not_affect_run() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        let agent = Arc::new(ScriptedAgent::new());
        let pipeline = Pipeline::new(agent, roles(), &blocker).with_coordinator_config(fast_config());

        let report = pipeline.run(SOW).await.unwrap();
        assert_eq!(report.summary.succeeded, 3);
    }
}

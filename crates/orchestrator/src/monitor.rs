//! Read-only live view of a run, fed from the event bus.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

use events::{Event, EventBus, EventEnvelope};
use futures::StreamExt;
use serde::Serialize;
use sowcrew_core::{RunId, RunSummary, TaskId, TaskStatus};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// Detail of the latest transition (role, failure reason, ...).
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorSnapshot {
    pub run_id: Option<RunId>,
    pub tasks: Vec<TaskView>,
    /// Most recent rendered event lines, oldest first.
    pub recent: Vec<String>,
    pub summary: Option<RunSummary>,
}

#[derive(Default)]
struct MonitorInner {
    run_id: Option<RunId>,
    tasks: Vec<TaskView>,
    recent: VecDeque<String>,
    summary: Option<RunSummary>,
}

impl MonitorInner {
    fn task_mut(&mut self, task_id: &TaskId) -> &mut TaskView {
        let idx = match self.tasks.iter().position(|t| &t.task_id == task_id) {
            Some(idx) => idx,
            None => {
                self.tasks.push(TaskView {
                    task_id: task_id.clone(),
                    status: TaskStatus::Pending,
                    detail: None,
                });
                self.tasks.len() - 1
            }
        };
        &mut self.tasks[idx]
    }
}

/// Keeps the current status of every task and the last N event lines.
#[derive(Clone)]
pub struct RunMonitor {
    inner: Arc<RwLock<MonitorInner>>,
    recent_lines: usize,
}

impl RunMonitor {
    pub fn new(recent_lines: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MonitorInner::default())),
            recent_lines: recent_lines.max(1),
        }
    }

    pub fn apply(&self, envelope: &EventEnvelope) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if inner.run_id.as_ref() != Some(&envelope.run_id) {
            *inner = MonitorInner {
                run_id: Some(envelope.run_id.clone()),
                ..Default::default()
            };
        }

        match &envelope.event {
            Event::RunStarted { task_ids, .. } => {
                for task_id in task_ids {
                    inner.task_mut(task_id);
                }
            }
            Event::TaskStatusChanged {
                task_id,
                to_status,
                detail,
                ..
            } => {
                let view = inner.task_mut(task_id);
                view.status = *to_status;
                view.detail = detail.clone();
            }
            Event::RunFinished { summary } => inner.summary = Some(summary.clone()),
            _ => {}
        }

        while inner.recent.len() >= self.recent_lines {
            inner.recent.pop_front();
        }
        inner.recent.push_back(envelope.to_string());
    }

    /// Follow the bus until it closes or the handle is aborted.
    pub fn attach(&self, bus: &EventBus) -> JoinHandle<()> {
        let monitor = self.clone();
        let mut stream = Box::pin(bus.stream());
        tokio::spawn(async move {
            while let Some(envelope) = stream.next().await {
                monitor.apply(&envelope);
            }
        })
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        MonitorSnapshot {
            run_id: inner.run_id.clone(),
            tasks: inner.tasks.clone(),
            recent: inner.recent.iter().cloned().collect(),
            summary: inner.summary.clone(),
        }
    }

    pub fn status_of(&self, task_id: &TaskId) -> Option<TaskStatus> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tasks
            .iter()
            .find(|t| &t.task_id == task_id)
            .map(|t| t.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_id() -> RunId {
        RunId::from("run-monitor")
    }

    fn changed(seq: u64, task: &str, from: TaskStatus, to: TaskStatus) -> EventEnvelope {
        EventEnvelope::new(
            run_id(),
            seq,
            Event::TaskStatusChanged {
                task_id: TaskId::from(task),
                from_status: from,
                to_status: to,
                detail: None,
            },
        )
    }

    #[test]
    fn test_tracks_task_status() {
        let monitor = RunMonitor::new(10);
        monitor.apply(&EventEnvelope::new(
            run_id(),
            0,
            Event::RunStarted {
                task_count: 2,
                roles: vec!["PM".to_string()],
                task_ids: vec![TaskId::from("T1"), TaskId::from("T2")],
            },
        ));
        monitor.apply(&changed(1, "T2", TaskStatus::Pending, TaskStatus::Assigned));

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.run_id, Some(run_id()));
        assert_eq!(snapshot.tasks.len(), 2);
        assert_eq!(snapshot.tasks[0].status, TaskStatus::Pending);
        assert_eq!(snapshot.tasks[1].status, TaskStatus::Assigned);
        assert_eq!(monitor.status_of(&TaskId::from("T2")), Some(TaskStatus::Assigned));
    }

    #[test]
    fn test_keeps_last_lines() {
        let monitor = RunMonitor::new(3);
        for seq in 0..5 {
            monitor.apply(&changed(seq, &format!("T{}", seq + 1), TaskStatus::Pending, TaskStatus::Skipped));
        }

        let recent = monitor.snapshot().recent;
        assert_eq!(recent.len(), 3);
        assert!(recent[0].ends_with("[T3] pending -> skipped"));
        assert!(recent[2].ends_with("[T5] pending -> skipped"));
    }

    #[tokio::test]
    async fn test_attach_follows_bus() {
        let bus = EventBus::new();
        let monitor = RunMonitor::new(10);
        let handle = monitor.attach(&bus);

        bus.publish(changed(0, "T1", TaskStatus::Pending, TaskStatus::Assigned));
        bus.publish(EventEnvelope::new(
            run_id(),
            1,
            Event::RunFinished {
                summary: RunSummary::default(),
            },
        ));

        drop(bus);
        handle.await.unwrap();

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.tasks[0].status, TaskStatus::Assigned);
        assert!(snapshot.summary.is_some());
    }
}

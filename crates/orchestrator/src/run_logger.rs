//! Durable, append-only log for one run.
//!
//! Layout under the logs root:
//!
//! ```text
//! <root>/<run_id>/events.jsonl   one EventEnvelope per line, in order received
//! <root>/<run_id>/summary.json   final RunReport
//! ```
//!
//! Writes happen on a background task fed by an unbounded channel, so
//! [`RunLogger::record`] never waits on disk. Failures are counted and
//! reported with `warn!`; they never reach the coordinator.

use events::EventEnvelope;
use serde::Serialize;
use sowcrew_core::{RunId, RunReport, RunSummary};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::LoggingError;

pub const EVENTS_FILE: &str = "events.jsonl";
pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoggerStats {
    pub written: u64,
    pub failed: u64,
}

enum LogCommand {
    Record(EventEnvelope),
    Summary(Box<RunReport>),
    Close(oneshot::Sender<LoggerStats>),
}

/// Cheap, cloneable handle to a run's log writer.
#[derive(Clone)]
pub struct RunLogger {
    run_id: RunId,
    dir: Option<PathBuf>,
    sender: Option<mpsc::UnboundedSender<LogCommand>>,
    dropped: Arc<AtomicU64>,
}

impl RunLogger {
    /// Create the run directory and start the writer. On failure the logger
    /// is returned disabled and every record is counted as failed.
    pub async fn create(root: &Path, run_id: &RunId) -> Self {
        match Self::try_create(root, run_id).await {
            Ok(logger) => logger,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Run log unavailable, continuing without it");
                Self::disabled(run_id.clone())
            }
        }
    }

    pub async fn try_create(root: &Path, run_id: &RunId) -> Result<Self, LoggingError> {
        let dir = root.join(run_id.as_str());
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| LoggingError::CreateDir {
                path: dir.display().to_string(),
                source,
            })?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(EVENTS_FILE))
            .await?;

        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(run_id.clone(), dir.clone(), file, receiver));

        debug!(run_id = %run_id, dir = %dir.display(), "Run log created");

        Ok(Self {
            run_id: run_id.clone(),
            dir: Some(dir),
            sender: Some(sender),
            dropped: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn disabled(run_id: RunId) -> Self {
        Self {
            run_id,
            dir: None,
            sender: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Run directory, `None` when disabled.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    pub fn record(&self, envelope: &EventEnvelope) {
        self.send(LogCommand::Record(envelope.clone()));
    }

    pub fn write_summary(&self, report: &RunReport) {
        self.send(LogCommand::Summary(Box::new(report.clone())));
    }

    fn send(&self, command: LogCommand) {
        let delivered = match self.sender {
            Some(ref sender) => sender.send(command).is_ok(),
            None => false,
        };
        if !delivered {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            if self.sender.is_some() {
                warn!(run_id = %self.run_id, error = %LoggingError::WriterClosed, "Run log record dropped");
            }
        }
    }

    /// Drain pending writes and stop the writer.
    pub async fn close(&self) -> LoggerStats {
        let dropped = self.dropped.load(Ordering::Relaxed);
        let Some(ref sender) = self.sender else {
            return LoggerStats {
                written: 0,
                failed: dropped,
            };
        };

        let (reply, response) = oneshot::channel();
        if sender.send(LogCommand::Close(reply)).is_err() {
            return LoggerStats {
                written: 0,
                failed: dropped,
            };
        }

        match response.await {
            Ok(mut stats) => {
                stats.failed += dropped;
                stats
            }
            Err(_) => LoggerStats {
                written: 0,
                failed: dropped,
            },
        }
    }
}

impl std::fmt::Debug for RunLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLogger")
            .field("run_id", &self.run_id)
            .field("dir", &self.dir)
            .finish()
    }
}

async fn write_loop(
    run_id: RunId,
    dir: PathBuf,
    file: File,
    mut receiver: mpsc::UnboundedReceiver<LogCommand>,
) {
    let mut writer = BufWriter::new(file);
    let mut stats = LoggerStats::default();

    while let Some(command) = receiver.recv().await {
        let result = match command {
            LogCommand::Record(envelope) => append(&mut writer, &envelope).await,
            LogCommand::Summary(report) => write_report(&dir, &report).await,
            LogCommand::Close(reply) => {
                receiver.close();
                let _ = reply.send(stats);
                debug!(run_id = %run_id, written = stats.written, failed = stats.failed, "Run log closed");
                return;
            }
        };

        match result {
            Ok(()) => stats.written += 1,
            Err(e) => {
                stats.failed += 1;
                warn!(run_id = %run_id, error = %e, "Failed to write run log");
            }
        }
    }
}

async fn append(writer: &mut BufWriter<File>, envelope: &EventEnvelope) -> Result<(), LoggingError> {
    let mut line = serde_json::to_vec(envelope)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

async fn write_report(dir: &Path, report: &RunReport) -> Result<(), LoggingError> {
    let content = serde_json::to_vec_pretty(report)?;
    fs::write(dir.join(SUMMARY_FILE), content).await?;
    Ok(())
}

/// One entry of [`list_runs`].
#[derive(Debug, Clone, Serialize)]
pub struct RunListing {
    pub run_id: RunId,
    pub dir: PathBuf,
    /// Present once the run finished and wrote its summary.
    pub summary: Option<RunSummary>,
}

/// Past runs under `root`, oldest first.
pub async fn list_runs(root: &Path) -> Result<Vec<RunListing>, LoggingError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut runs = Vec::new();
    let mut entries = fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let run_id = RunId::from(name.as_str());
        let summary = read_report(root, &run_id).await.ok().flatten().map(|r| r.summary);

        runs.push(RunListing {
            run_id,
            dir: entry.path(),
            summary,
        });
    }

    runs.sort_by(|a, b| a.run_id.cmp(&b.run_id));
    Ok(runs)
}

/// Events of a run in the order they were recorded. A torn trailing line is
/// skipped.
pub async fn read_events(root: &Path, run_id: &RunId) -> Result<Vec<EventEnvelope>, LoggingError> {
    let content = fs::read_to_string(root.join(run_id.as_str()).join(EVENTS_FILE)).await?;

    let mut events = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventEnvelope>(line) {
            Ok(envelope) => events.push(envelope),
            Err(e) => warn!(run_id = %run_id, line = line_no + 1, error = %e, "Skipping unreadable run log line"),
        }
    }
    Ok(events)
}

pub async fn read_report(root: &Path, run_id: &RunId) -> Result<Option<RunReport>, LoggingError> {
    let path = root.join(run_id.as_str()).join(SUMMARY_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read(&path).await?;
    Ok(Some(serde_json::from_slice(&content)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use events::Event;
    use sowcrew_core::{TaskId, TaskStatus};
    use tempfile::TempDir;

    fn envelope(run_id: &RunId, seq: u64) -> EventEnvelope {
        EventEnvelope::new(
            run_id.clone(),
            seq,
            Event::TaskStatusChanged {
                task_id: TaskId::from("T1"),
                from_status: TaskStatus::Pending,
                to_status: TaskStatus::Assigned,
                detail: Some(format!("event {}", seq)),
            },
        )
    }

    #[tokio::test]
    async fn test_records_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let run_id = RunId::generate();
        let logger = RunLogger::create(temp_dir.path(), &run_id).await;
        assert!(logger.is_enabled());

        for seq in 0..20 {
            logger.record(&envelope(&run_id, seq));
        }
        let stats = logger.close().await;
        assert_eq!(stats, LoggerStats { written: 20, failed: 0 });

        let events = read_events(temp_dir.path(), &run_id).await.unwrap();
        assert_eq!(events.len(), 20);
        assert!(events.iter().enumerate().all(|(i, e)| e.seq == i as u64));
    }

    #[tokio::test]
    async fn test_summary_and_listing() {
        let temp_dir = TempDir::new().unwrap();
        let first = RunId::from("20260101-090000-000-aaaa");
        let second = RunId::from("20260102-090000-000-bbbb");

        let logger = RunLogger::create(temp_dir.path(), &second).await;
        logger.record(&envelope(&second, 0));
        logger.write_summary(&RunReport {
            run_id: second.clone(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            roles: vec!["PM".to_string()],
            summary: RunSummary {
                total: 1,
                succeeded: 1,
                ..Default::default()
            },
            tasks: Vec::new(),
        });
        assert_eq!(logger.close().await.written, 2);

        let unfinished = RunLogger::create(temp_dir.path(), &first).await;
        unfinished.close().await;

        let runs = list_runs(temp_dir.path()).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, first);
        assert!(runs[0].summary.is_none());
        assert_eq!(runs[1].summary.as_ref().unwrap().succeeded, 1);
    }

    #[tokio::test]
    async fn test_unwritable_root_is_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        let run_id = RunId::generate();
        let logger = RunLogger::create(&blocker, &run_id).await;
        assert!(!logger.is_enabled());

        logger.record(&envelope(&run_id, 0));
        logger.record(&envelope(&run_id, 1));
        assert_eq!(logger.close().await, LoggerStats { written: 0, failed: 2 });
    }

    #[tokio::test]
    async fn test_records_after_close_are_counted() {
        let temp_dir = TempDir::new().unwrap();
        let run_id = RunId::generate();
        let logger = RunLogger::create(temp_dir.path(), &run_id).await;
        logger.close().await;

        logger.record(&envelope(&run_id, 0));
        assert_eq!(logger.close().await.failed, 1);
    }

    #[tokio::test]
    async fn test_read_events_skips_torn_line() {
        let temp_dir = TempDir::new().unwrap();
        let run_id = RunId::generate();
        let logger = RunLogger::create(temp_dir.path(), &run_id).await;
        logger.record(&envelope(&run_id, 0));
        logger.close().await;

        let path = temp_dir.path().join(run_id.as_str()).join(EVENTS_FILE);
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{\"id\":");
        std::fs::write(&path, content).unwrap();

        assert_eq!(read_events(temp_dir.path(), &run_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_runs_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        assert!(list_runs(&temp_dir.path().join("none")).await.unwrap().is_empty());
    }
}

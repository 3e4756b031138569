//! PT-010: Background commit - execute a plan off the async runtime.
//!
//! The plan and store move into a blocking task; progress, log lines and the
//! terminal outcome come back over a single channel, and the plan and store
//! are handed back through [`CommitHandle::join`].

use super::executor::{PlanExecutor, Progress};
use super::sink::{LogLevel, LogSink};
use super::types::{ExecutionReport, Plan};
use super::verify;
use crate::store::RemoteStore;
use crate::{Error, Result};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Message from a running commit.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Progress {
        index: usize,
        total: usize,
        message: String,
    },
    Log {
        level: LogLevel,
        message: String,
    },
    /// Execution completed; `success` is false when steps failed or were skipped.
    Finished {
        success: bool,
        report: ExecutionReport,
    },
    Failed(String),
}

impl WorkerEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct CommitOptions {
    /// State directory for the commit event log
    pub event_log: Option<PathBuf>,
    /// Re-read committed entities into `fetched_data` after a successful run
    pub refresh: bool,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            event_log: None,
            refresh: true,
        }
    }
}

/// Forwards log lines into the worker channel.
struct ChannelSink {
    tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl LogSink for ChannelSink {
    fn log(&self, level: LogLevel, message: &str) {
        let _ = self.tx.send(WorkerEvent::Log {
            level,
            message: message.to_string(),
        });
    }
}

/// A commit running in the background.
pub struct CommitHandle<S> {
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    task: JoinHandle<(Plan, S)>,
}

impl<S> CommitHandle<S> {
    /// Next event, or `None` once the worker is done and the channel drained.
    pub async fn next_event(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }

    /// Wait for the worker and take back the plan and store.
    pub async fn join(self) -> Result<(Plan, S)> {
        self.task
            .await
            .map_err(|e| Error::Worker(format!("commit task did not complete: {}", e)))
    }
}

/// Start committing `plan` to `store` on the blocking pool.
///
/// Must be called from within a tokio runtime.
pub fn spawn_commit<S>(mut plan: Plan, mut store: S, options: CommitOptions) -> CommitHandle<S>
where
    S: RemoteStore + Send + 'static,
{
    let (tx, events) = mpsc::unbounded_channel();
    let task = tokio::task::spawn_blocking(move || {
        let sink = ChannelSink { tx: tx.clone() };
        let progress = |p: &Progress| {
            let _ = tx.send(WorkerEvent::Progress {
                index: p.index,
                total: p.total,
                message: format!("{} '{}'", p.kind.label(), p.name),
            });
        };

        let outcome = {
            let mut executor = PlanExecutor::new(&mut store, &sink).with_progress(&progress);
            if let Some(dir) = &options.event_log {
                executor = executor.with_event_log(dir);
            }
            executor.execute(&mut plan)
        };
        let terminal = match outcome {
            Ok(report) => {
                if options.refresh {
                    verify::refresh_fetched(&mut plan, &store, &sink);
                }
                WorkerEvent::Finished {
                    success: report.is_success(),
                    report,
                }
            }
            Err(e) => WorkerEvent::Failed(e.to_string()),
        };
        let _ = tx.send(terminal);
        (plan, store)
    });
    CommitHandle { events, task }
}

//! Single-flight research job queue.
//!
//! Deep research runs take minutes and provider rate limits punish
//! concurrency, so jobs run strictly one at a time in arrival order. Enqueue
//! deduplicates by config id against both the running job and the waiting
//! line, so hammering "run now" never stacks duplicate work.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::LookoutError;

/// The unit of work the queue drives. The execution engine is the one real
/// implementation; the seam keeps the queue testable without a provider.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run_job(&self, config_id: &str) -> Result<(), LookoutError>;
}

/// Where a job landed when it was offered to the queue.
///
/// `position` is 0 when the config is the currently running job, otherwise
/// its 1-based place in the waiting line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueOutcome {
    pub position: usize,
    pub already_queued: bool,
}

/// Tally for a batch enqueue: `skipped` counts ids that were already
/// running or waiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub queued: usize,
    pub skipped: usize,
}

/// Point-in-time view of the queue for status endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub is_processing: bool,
    pub current_config_id: Option<String>,
    pub queue_length: usize,
    pub queue: Vec<QueueEntrySnapshot>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntrySnapshot {
    pub config_id: String,
    pub added_at: DateTime<Utc>,
}

struct QueueEntry {
    config_id: String,
    added_at: DateTime<Utc>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueueEntry>,
    current: Option<String>,
    processing: bool,
}

/// Instance-based job queue. No global statics; share via `Arc`.
///
/// All mutations and the processor-spawn decision happen under one lock, so
/// "at most one processor task" and the dedup rules hold without further
/// coordination. The lock is never held across an await.
pub struct JobQueue {
    runner: Arc<dyn JobRunner>,
    state: Arc<Mutex<QueueState>>,
}

impl JobQueue {
    pub fn new(runner: Arc<dyn JobRunner>) -> Self {
        Self {
            runner,
            state: Arc::new(Mutex::new(QueueState::default())),
        }
    }

    /// Offers a config to the queue. Duplicates of the running or waiting
    /// job report their existing position instead of queueing again. Starts
    /// the processor task if the queue was idle.
    pub fn enqueue(&self, config_id: &str) -> EnqueueOutcome {
        let mut state = lock_state(&self.state);

        if state.current.as_deref() == Some(config_id) {
            return EnqueueOutcome {
                position: 0,
                already_queued: true,
            };
        }

        if let Some(index) = state
            .pending
            .iter()
            .position(|entry| entry.config_id == config_id)
        {
            return EnqueueOutcome {
                position: index + 1,
                already_queued: true,
            };
        }

        state.pending.push_back(QueueEntry {
            config_id: config_id.to_string(),
            added_at: Utc::now(),
        });
        let position = state.pending.len();

        if !state.processing {
            state.processing = true;
            self.spawn_processor();
        }
        drop(state);

        tracing::debug!(config = config_id, position, "research job queued");
        EnqueueOutcome {
            position,
            already_queued: false,
        }
    }

    /// Enqueues every id in order, tallying fresh adds against dedup skips.
    pub fn enqueue_all(&self, config_ids: &[String]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for config_id in config_ids {
            if self.enqueue(config_id).already_queued {
                outcome.skipped += 1;
            } else {
                outcome.queued += 1;
            }
        }
        outcome
    }

    pub fn status(&self) -> QueueStatus {
        let state = lock_state(&self.state);
        QueueStatus {
            is_processing: state.processing,
            current_config_id: state.current.clone(),
            queue_length: state.pending.len(),
            queue: state
                .pending
                .iter()
                .map(|entry| QueueEntrySnapshot {
                    config_id: entry.config_id.clone(),
                    added_at: entry.added_at,
                })
                .collect(),
        }
    }

    /// Drains the queue one job at a time until it runs dry. A failed job is
    /// logged and the loop moves on; failures never take the worker down.
    fn spawn_processor(&self) {
        let state = Arc::clone(&self.state);
        let runner = Arc::clone(&self.runner);

        tokio::spawn(async move {
            loop {
                let next = {
                    let mut state = lock_state(&state);
                    match state.pending.pop_front() {
                        Some(entry) => {
                            state.current = Some(entry.config_id.clone());
                            Some(entry.config_id)
                        }
                        None => {
                            state.current = None;
                            state.processing = false;
                            None
                        }
                    }
                };

                let Some(config_id) = next else {
                    break;
                };

                tracing::info!(config = %config_id, "processing research job");
                if let Err(error) = runner.run_job(&config_id).await {
                    tracing::error!(config = %config_id, "research job failed: {error}");
                }

                lock_state(&state).current = None;
            }
        });
    }
}

fn lock_state(state: &Mutex<QueueState>) -> MutexGuard<'_, QueueState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

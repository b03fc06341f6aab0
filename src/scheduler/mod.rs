//! Per-config cron timers.
//!
//! Each enabled config gets one recurring timer task that enqueues the
//! config when its schedule fires. Registration is idempotent per config
//! id; the queue's dedup absorbs any overlap with manual runs.

mod expression;

pub use expression::{next_occurrence, parse_schedule};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use tokio::task::JoinHandle;

use crate::error::{ScheduleError, StoreError};
use crate::queue::JobQueue;
use crate::store::ConfigStore;

/// Instance-based timer registry. No global statics; share via `Arc`.
pub struct Scheduler {
    queue: Arc<JobQueue>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        Self {
            queue,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a timer for the config, replacing any existing one so a
    /// config never holds two live timers.
    pub fn register(&self, config_id: &str, expression: &str) -> Result<(), ScheduleError> {
        let schedule = parse_schedule(expression)?;
        if schedule.after(&Utc::now()).next().is_none() {
            return Err(ScheduleError::NoFutureOccurrence(expression.to_string()));
        }

        let handle = self.spawn_timer(config_id.to_string(), schedule);
        let mut timers = lock_timers(&self.timers);
        if let Some(previous) = timers.insert(config_id.to_string(), handle) {
            previous.abort();
        }
        drop(timers);

        tracing::info!(
            config = config_id,
            schedule = expression,
            "scheduled research config"
        );
        Ok(())
    }

    /// Stops the config's timer. Returns whether one was running.
    pub fn unregister(&self, config_id: &str) -> bool {
        let removed = lock_timers(&self.timers).remove(config_id);
        match removed {
            Some(handle) => {
                handle.abort();
                tracing::info!(config = config_id, "stopped scheduled research config");
                true
            }
            None => false,
        }
    }

    /// The one mutation path config edits go through: drop the old timer,
    /// then re-register when still enabled.
    pub fn set_enabled(
        &self,
        config_id: &str,
        expression: &str,
        enabled: bool,
    ) -> Result<(), ScheduleError> {
        self.unregister(config_id);
        if enabled {
            self.register(config_id, expression)?;
        }
        Ok(())
    }

    /// Config ids with a live timer, sorted for stable output.
    pub fn list_active(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock_timers(&self.timers).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Registers every enabled config. A config with a bad schedule is
    /// logged and skipped so one bad row cannot keep the rest from
    /// starting. Returns how many timers are running.
    pub async fn initialize(&self, configs: &ConfigStore) -> Result<usize, StoreError> {
        let enabled = configs.list_enabled().await?;
        let mut scheduled = 0;
        for config in enabled {
            match self.register(&config.id, &config.schedule) {
                Ok(()) => scheduled += 1,
                Err(error) => {
                    tracing::warn!(config = %config.id, "skipping schedule: {error}");
                }
            }
        }
        tracing::info!("scheduled {scheduled} research configs");
        Ok(scheduled)
    }

    /// Aborts every timer. Used at process shutdown.
    pub fn shutdown(&self) {
        let mut timers = lock_timers(&self.timers);
        for (config_id, handle) in timers.drain() {
            handle.abort();
            tracing::debug!(config = %config_id, "stopped timer");
        }
    }

    fn spawn_timer(&self, config_id: String, schedule: Schedule) -> JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let Some(next) = schedule.after(&now).next() else {
                    tracing::info!(
                        config = %config_id,
                        "schedule has no future occurrence, stopping timer"
                    );
                    break;
                };
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;

                tracing::info!(config = %config_id, "scheduled research triggered");
                queue.enqueue(&config_id);
            }
        })
    }
}

fn lock_timers(
    timers: &Mutex<HashMap<String, JoinHandle<()>>>,
) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
    timers.lock().unwrap_or_else(PoisonError::into_inner)
}

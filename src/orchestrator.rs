//! Composition root: opens the store, wires the engine, queue, and
//! scheduler together once at startup, and owns them for the life of the
//! process. Nothing in here holds module-level mutable state.

use std::sync::Arc;

use crate::audit::AuditLedger;
use crate::config::Config;
use crate::engine::ResearchEngine;
use crate::error::LookoutError;
use crate::provider::{OpenAiResponsesClient, ResearchProvider};
use crate::queue::{JobQueue, JobRunner};
use crate::scheduler::Scheduler;
use crate::store::Store;

/// Message stamped on audit rows left in `started` by a dead process.
const RESTART_REASON: &str = "interrupted by restart";

pub struct Orchestrator {
    store: Store,
    settings: Arc<Config>,
    engine: Arc<ResearchEngine>,
    queue: Arc<JobQueue>,
    scheduler: Arc<Scheduler>,
}

impl Orchestrator {
    /// Full startup against the real provider: open the store, seed the
    /// default configs, finalize runs orphaned by a previous process, and
    /// register every enabled schedule.
    pub async fn start(settings: Config) -> Result<Self, LookoutError> {
        let api_key = settings.resolve_api_key();
        let provider = Arc::new(OpenAiResponsesClient::with_base_url(
            api_key.as_deref(),
            Some(&settings.base_url),
        ));
        Self::start_with_provider(settings, provider).await
    }

    /// Same wiring with a caller-supplied provider, so the whole stack can
    /// run against a stub.
    pub async fn start_with_provider(
        settings: Config,
        provider: Arc<dyn ResearchProvider>,
    ) -> Result<Self, LookoutError> {
        let settings = Arc::new(settings);
        let store = Store::open(&settings.db_path()).await?;

        let seeded = store.seed_default_configs().await?;
        if seeded > 0 {
            tracing::info!("seeded {seeded} default research configs");
        }

        // A crash mid-run leaves `started` rows that would otherwise report
        // as running forever.
        let ledger = AuditLedger::new(&store);
        let orphaned = ledger.fail_orphaned_runs(RESTART_REASON).await?;
        if orphaned > 0 {
            tracing::warn!("finalized {orphaned} research runs interrupted by restart");
        }

        let engine = Arc::new(ResearchEngine::new(&store, provider, Arc::clone(&settings)));
        let queue = Arc::new(JobQueue::new(Arc::clone(&engine) as Arc<dyn JobRunner>));
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&queue)));
        scheduler.initialize(&store.configs()).await?;

        Ok(Self {
            store,
            settings,
            engine,
            queue,
            scheduler,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn settings(&self) -> &Arc<Config> {
        &self.settings
    }

    pub fn engine(&self) -> &Arc<ResearchEngine> {
        &self.engine
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Stops every timer. Queued jobs are abandoned; restart recovery
    /// finalizes whatever was mid-flight.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

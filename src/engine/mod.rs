//! Execution engine: drives one research job from config lookup through
//! provider submission, polling, payload parsing, and report persistence,
//! with every step mirrored into the audit ledger.

mod payload;
mod pricing;
mod prompt;

pub use payload::{PayloadItem, ResearchPayload, parse_payload, strip_code_fences};
pub use pricing::estimate_cost_cents;
pub use prompt::build_research_prompt;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::{Duration, sleep};

use crate::audit::{AuditLedger, AuditPatch, AuditStatus, NewAuditEntry};
use crate::config::Config;
use crate::error::{EngineError, LookoutError, ProviderError};
use crate::provider::{ResearchProvider, ResearchRequest, ResponseObject, RunStatus};
use crate::queue::JobRunner;
use crate::sources::SourceStore;
use crate::store::{
    ConfigStore, NewItem, NewReport, ReportStore, ResearchConfig, ResearchReport, Store,
};

/// Audit event type stamped on every engine run.
pub const RESEARCH_RUN_EVENT: &str = "research_run";

/// Runs deep-research jobs. One instance is shared by the queue worker and
/// any ad-hoc callers; it owns no mutable state beyond pooled handles.
pub struct ResearchEngine {
    configs: ConfigStore,
    reports: ReportStore,
    ledger: AuditLedger,
    sources: SourceStore,
    provider: Arc<dyn ResearchProvider>,
    settings: Arc<Config>,
}

impl ResearchEngine {
    pub fn new(store: &Store, provider: Arc<dyn ResearchProvider>, settings: Arc<Config>) -> Self {
        Self {
            configs: store.configs(),
            reports: store.reports(),
            ledger: AuditLedger::new(store),
            sources: SourceStore::new(store),
            provider,
            settings,
        }
    }

    pub fn ledger(&self) -> &AuditLedger {
        &self.ledger
    }

    /// Runs one research job end to end and persists the outcome.
    ///
    /// Provider failures and unparseable output degrade to an empty report
    /// rather than an error, so a report row and a finalized audit entry
    /// exist for every run that found its config. Only an unknown config id
    /// or a store failure surface as `Err`.
    pub async fn execute(&self, config_id: &str) -> Result<ResearchReport, EngineError> {
        let config = self
            .configs
            .get(config_id)
            .await?
            .ok_or_else(|| EngineError::ConfigNotFound(config_id.to_string()))?;

        tracing::info!(config = %config.name, "running deep research");

        let entry = self
            .ledger
            .create(NewAuditEntry {
                event_type: RESEARCH_RUN_EVENT.to_string(),
                config_id: Some(config.id.clone()),
                config_name: Some(config.name.clone()),
                model: Some(self.settings.model.clone()),
            })
            .await?;

        let research = self.run_deep_research(&config, &entry.id).await?;

        let items = research
            .items
            .into_iter()
            .map(|item| NewItem {
                title: item.title,
                source: item.source,
                url: item.url,
                summary: item.summary,
                relevance_score: item.relevance_score,
                published_at: item.published_at,
                tags: item.tags,
            })
            .collect();

        let report = self
            .reports
            .create(
                NewReport {
                    config_id: config.id.clone(),
                    config_name: config.name.clone(),
                    category: config.category,
                    summary: research.summary,
                },
                items,
            )
            .await?;

        self.ledger
            .update(
                &entry.id,
                AuditPatch {
                    report_id: Some(report.id.clone()),
                    ..AuditPatch::default()
                },
            )
            .await?;

        tracing::info!(
            report = %report.id,
            items = report.items.len(),
            "research report created"
        );

        Ok(report)
    }

    /// Drives the provider with rate-limit retries and finalizes the audit
    /// entry. Every failure path returns a degraded payload; `Err` here
    /// means the store itself is broken.
    async fn run_deep_research(
        &self,
        config: &ResearchConfig,
        audit_id: &str,
    ) -> Result<ResearchPayload, EngineError> {
        let reliability = &self.settings.reliability;
        let max_retries = reliability.max_retries;
        let request = ResearchRequest {
            model: self.settings.model.clone(),
            prompt: self.build_prompt(config).await,
        };
        let started = Instant::now();
        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let factor = 2u64.saturating_pow(attempt - 1);
                let delay_ms = reliability.initial_retry_delay_ms.saturating_mul(factor);
                tracing::info!(
                    "rate limit hit, waiting {}s before retry {attempt}/{max_retries}",
                    delay_ms / 1000
                );
                sleep(Duration::from_millis(delay_ms)).await;

                // The retry notice is stale once a new attempt is underway.
                self.ledger
                    .update(
                        audit_id,
                        AuditPatch {
                            error_message: Some(None),
                            ..AuditPatch::default()
                        },
                    )
                    .await?;
            }

            tracing::info!(
                model = %request.model,
                "starting deep research (attempt {}/{})",
                attempt + 1,
                max_retries + 1
            );

            match self.attempt_run(&request).await {
                Ok(response) => {
                    return self.finalize_run(audit_id, &response, started).await;
                }
                Err(error) => {
                    tracing::warn!("deep research attempt {} failed: {error}", attempt + 1);

                    if error.is_rate_limited() && attempt < max_retries {
                        self.ledger
                            .update(
                                audit_id,
                                AuditPatch {
                                    error_message: Some(Some(format!(
                                        "Rate limited - retrying ({}/{})...",
                                        attempt + 2,
                                        max_retries + 1
                                    ))),
                                    ..AuditPatch::default()
                                },
                            )
                            .await?;
                        last_error = Some(error);
                        continue;
                    }

                    last_error = Some(error);
                    break;
                }
            }
        }

        let message = last_error
            .map(|error| error.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());

        self.ledger
            .update(
                audit_id,
                AuditPatch {
                    runtime_ms: Some(elapsed_ms(started)),
                    status: Some(AuditStatus::Failed),
                    error_message: Some(Some(message.clone())),
                    ..AuditPatch::default()
                },
            )
            .await?;

        tracing::error!("deep research failed after retries: {message}");
        Ok(ResearchPayload::degraded(format!(
            "Research failed: {message}"
        )))
    }

    /// One submit-and-poll cycle with no retry logic of its own.
    async fn attempt_run(&self, request: &ResearchRequest) -> Result<ResponseObject, ProviderError> {
        let initial = self.provider.submit(request).await?;
        tracing::info!(
            response = %initial.id,
            status = initial.status.as_str(),
            "deep research started"
        );

        if initial.status == RunStatus::Completed {
            return Ok(initial);
        }
        self.poll_for_completion(&initial.id).await
    }

    async fn poll_for_completion(&self, response_id: &str) -> Result<ResponseObject, ProviderError> {
        let reliability = &self.settings.reliability;
        let budget = Duration::from_millis(reliability.max_poll_ms);
        let interval = Duration::from_millis(reliability.poll_interval_ms.max(1));
        let started = Instant::now();

        while started.elapsed() < budget {
            let response = self.provider.retrieve(response_id).await?;
            match response.status {
                RunStatus::Completed => return Ok(response),
                RunStatus::Failed | RunStatus::Cancelled => {
                    return Err(ProviderError::RunFailed {
                        status: response.status.as_str().to_string(),
                        message: response.error_message(),
                    });
                }
                _ => sleep(interval).await,
            }
        }

        Err(ProviderError::Timeout {
            budget_secs: reliability.max_poll_ms / 1000,
        })
    }

    /// Extracts usage and text from a completed response, records metrics,
    /// and parses the payload. Missing text fails the audit entry; a parse
    /// failure only degrades the payload.
    #[allow(clippy::cast_precision_loss)]
    async fn finalize_run(
        &self,
        audit_id: &str,
        response: &ResponseObject,
        started: Instant,
    ) -> Result<ResearchPayload, EngineError> {
        let runtime_ms = elapsed_ms(started);
        let (input_tokens, output_tokens) = response.usage_tokens();
        let web_search_calls = response.web_search_calls();
        let estimated_cost_cents = estimate_cost_cents(
            &self.settings.pricing,
            input_tokens,
            output_tokens,
            web_search_calls,
        );

        let metrics = AuditPatch {
            input_tokens: Some(input_tokens),
            output_tokens: Some(output_tokens),
            web_search_calls: Some(web_search_calls),
            estimated_cost_cents: Some(estimated_cost_cents),
            runtime_ms: Some(runtime_ms),
            ..AuditPatch::default()
        };

        let Some(text) = response.primary_text() else {
            tracing::error!(response = %response.id, "no output text in response");
            self.ledger
                .update(
                    audit_id,
                    AuditPatch {
                        status: Some(AuditStatus::Failed),
                        error_message: Some(Some("No output text in response".to_string())),
                        ..metrics
                    },
                )
                .await?;
            return Ok(ResearchPayload::degraded("No response from deep research"));
        };

        let payload = match parse_payload(text) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!("failed to parse research output: {error}");
                ResearchPayload::degraded("Failed to parse research output")
            }
        };

        self.ledger
            .update(
                audit_id,
                AuditPatch {
                    status: Some(AuditStatus::Completed),
                    ..metrics
                },
            )
            .await?;

        tracing::info!(
            "deep research completed in {:.1}s - {web_search_calls} web searches, \
             {input_tokens}/{output_tokens} tokens, ${:.4}",
            runtime_ms as f64 / 1000.0,
            estimated_cost_cents / 100.0
        );

        Ok(payload)
    }

    async fn build_prompt(&self, config: &ResearchConfig) -> String {
        let tuning = &self.settings.research;
        let trusted = match self
            .sources
            .high_trust_domains(
                tuning.min_trust_score,
                i64::from(tuning.trusted_hints_limit),
            )
            .await
        {
            Ok(domains) => domains,
            Err(error) => {
                tracing::warn!("failed to load trusted source hints: {error}");
                Vec::new()
            }
        };
        build_research_prompt(config, tuning, Utc::now().date_naive(), &trusted)
    }
}

#[async_trait]
impl JobRunner for ResearchEngine {
    async fn run_job(&self, config_id: &str) -> Result<(), LookoutError> {
        self.execute(config_id).await?;
        Ok(())
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}

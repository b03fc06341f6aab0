#![allow(dead_code, clippy::field_reassign_with_default)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use lookout::Config;
use lookout::audit::{AuditEntry, AuditLedger};
use lookout::error::ProviderError;
use lookout::provider::{ResearchProvider, ResearchRequest, ResponseObject};

/// A well-formed fenced payload, the shape a cooperative model returns.
pub const PAYLOAD_TEXT: &str = r#"```json
{
  "summary": "Two notable findings today.",
  "items": [
    {
      "title": "Attention Is Still All You Need",
      "source": "arxiv.org",
      "url": "https://arxiv.org/abs/2508.01234",
      "summary": "A survey of attention variants.",
      "relevanceScore": 9.1,
      "publishedAt": "2025-08-20",
      "tags": ["ml", "survey"]
    },
    {
      "title": "Benchmarks under scrutiny",
      "source": "example.com",
      "url": "https://example.com/benchmarks",
      "summary": "Benchmark contamination revisited.",
      "relevanceScore": 7.4,
      "publishedAt": "2025-08-21",
      "tags": ["evaluation"]
    }
  ]
}
```"#;

enum Behavior {
    Completed,
    RateLimited,
}

/// Stub research backend: either completes synchronously on submit or
/// reports a rate limit on every call. Counts submit attempts.
pub struct StubProvider {
    behavior: Behavior,
    submits: AtomicUsize,
}

impl StubProvider {
    pub fn completed() -> Arc<Self> {
        Arc::new(Self {
            behavior: Behavior::Completed,
            submits: AtomicUsize::new(0),
        })
    }

    pub fn always_rate_limited() -> Arc<Self> {
        Arc::new(Self {
            behavior: Behavior::RateLimited,
            submits: AtomicUsize::new(0),
        })
    }

    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResearchProvider for StubProvider {
    async fn submit(&self, _request: &ResearchRequest) -> Result<ResponseObject, ProviderError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Completed => Ok(completed_response()),
            Behavior::RateLimited => Err(ProviderError::RateLimited {
                message: "Rate limit reached for requests".to_string(),
            }),
        }
    }

    async fn retrieve(&self, _response_id: &str) -> Result<ResponseObject, ProviderError> {
        match self.behavior {
            Behavior::Completed => Ok(completed_response()),
            Behavior::RateLimited => Err(ProviderError::RateLimited {
                message: "Rate limit reached for requests".to_string(),
            }),
        }
    }
}

fn completed_response() -> ResponseObject {
    serde_json::from_value(serde_json::json!({
        "id": "resp_stub",
        "status": "completed",
        "output": [
            {"type": "web_search_call", "id": "ws_1"},
            {"type": "web_search_call", "id": "ws_2"},
            {"type": "message", "content": [{"type": "output_text", "text": PAYLOAD_TEXT}]}
        ],
        "usage": {"input_tokens": 1_000_000, "output_tokens": 500_000}
    }))
    .expect("stub response json should deserialize")
}

/// Throwaway-workspace settings with millisecond retry and poll timing.
pub fn test_settings(workspace: &TempDir) -> Config {
    let mut settings = Config::default();
    settings.workspace_dir = workspace.path().to_path_buf();
    settings.config_path = workspace.path().join("config.toml");
    settings.reliability.max_retries = 2;
    settings.reliability.initial_retry_delay_ms = 1;
    settings.reliability.poll_interval_ms = 1;
    settings.reliability.max_poll_ms = 500;
    settings
}

/// Poll the ledger until at least `count` terminal entries exist.
pub async fn wait_for_terminal_entries(ledger: &AuditLedger, count: usize) -> Vec<AuditEntry> {
    for _ in 0..400 {
        let entries = ledger
            .list_recent(50)
            .await
            .expect("audit listing should succeed");
        let terminal: Vec<AuditEntry> = entries
            .into_iter()
            .filter(|entry| entry.status.is_terminal())
            .collect();
        if terminal.len() >= count {
            return terminal;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {count} terminal audit entries");
}

/// Poll the ledger until the config's run is terminal and linked to its
/// report. The report link lands in a separate write just after the status
/// flip, so waiting on the status alone can observe a half-finalized entry.
pub async fn wait_for_linked_entry(ledger: &AuditLedger, config_id: &str) -> AuditEntry {
    for _ in 0..400 {
        let entries = ledger
            .list_recent(50)
            .await
            .expect("audit listing should succeed");
        let linked = entries.into_iter().find(|entry| {
            entry.config_id.as_deref() == Some(config_id)
                && entry.status.is_terminal()
                && entry.report_id.is_some()
        });
        if let Some(entry) = linked {
            return entry;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for a linked terminal entry for {config_id}");
}

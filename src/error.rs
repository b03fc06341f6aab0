use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `Lookout`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum LookoutError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Scheduler ───────────────────────────────────────────────────────
    #[error("schedule: {0}")]
    Schedule(#[from] ScheduleError),

    // ── Execution engine ────────────────────────────────────────────────
    #[error("engine: {0}")]
    Engine(#[from] EngineError),

    // ── Research provider ───────────────────────────────────────────────
    #[error("provider: {0}")]
    Provider(#[from] ProviderError),

    // ── Store / Ledger ──────────────────────────────────────────────────
    #[error("store: {0}")]
    Store(#[from] StoreError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Scheduler errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("expression '{0}' has no future occurrence")]
    NoFutureOccurrence(String),
}

// ─── Execution engine errors ────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("research config not found: {0}")]
    ConfigNotFound(String),

    #[error("failed to parse research payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

// ─── Research provider errors ───────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited (429): {message}")]
    RateLimited { message: String },

    #[error("provider API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("research run {status}: {message}")]
    RunFailed { status: String, message: String },

    #[error("research run timed out after {budget_secs}s of polling")]
    Timeout { budget_secs: u64 },

    #[error("OpenAI credentials not set. Set OPENAI_API_KEY or add api_key to the config file.")]
    MissingCredentials,

    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ProviderError {
    /// Whether this failure is worth retrying under the rate-limit policy.
    ///
    /// Matches the explicit 429 classification first, then falls back to a
    /// message-signature scan so wrapped transport errors that carry a 429 or
    /// "rate limit" body are not lost.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status == 429,
            other => {
                let message = other.to_string().to_ascii_lowercase();
                message.contains("429") || message.contains("rate limit")
            }
        }
    }
}

// ─── Store / Ledger errors ──────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("audit entry not found: {0}")]
    AuditNotFound(String),

    #[error("report not found: {0}")]
    ReportNotFound(String),

    #[error("invalid rating {0}: expected +1 or -1")]
    InvalidRating(i32),

    #[error("corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlx: {0}")]
    Sqlx(#[from] sqlx::Error),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, LookoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_error_displays_expression() {
        let err = LookoutError::Schedule(ScheduleError::InvalidExpression {
            expression: "not a cron".into(),
            reason: "expected 5, 6, or 7 fields".into(),
        });
        assert!(err.to_string().contains("not a cron"));
    }

    #[test]
    fn rate_limited_variant_is_retryable() {
        let err = ProviderError::RateLimited {
            message: "slow down".into(),
        };
        assert!(err.is_rate_limited());
    }

    #[test]
    fn api_429_is_retryable() {
        let err = ProviderError::Api {
            status: 429,
            message: "Too Many Requests".into(),
        };
        assert!(err.is_rate_limited());
    }

    #[test]
    fn rate_limit_signature_in_message_is_retryable() {
        let err = ProviderError::RunFailed {
            status: "failed".into(),
            message: "Rate limit reached for the account".into(),
        };
        assert!(err.is_rate_limited());
    }

    #[test]
    fn plain_timeout_is_not_retryable() {
        let err = ProviderError::Timeout { budget_secs: 600 };
        assert!(!err.is_rate_limited());
    }

    #[test]
    fn api_500_is_not_retryable() {
        let err = ProviderError::Api {
            status: 500,
            message: "internal error".into(),
        };
        assert!(!err.is_rate_limited());
    }

    #[test]
    fn anyhow_interop() {
        let anyhow_err = anyhow::anyhow!("something went wrong");
        let lookout_err: LookoutError = anyhow_err.into();
        assert!(lookout_err.to_string().contains("something went wrong"));
    }
}

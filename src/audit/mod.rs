//! Append-only ledger of research runs: what ran, what it cost, how it
//! ended.
//!
//! Entries are created when a run starts and merged into as the run
//! progresses. Nothing here deletes; the ledger doubles as the cost log.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{Store, parse_rfc3339};

/// Lifecycle state of an audit entry.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AuditStatus {
    Started,
    Completed,
    Failed,
}

impl AuditStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub(crate) fn as_db(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub(crate) fn from_db(raw: &str) -> Self {
        raw.parse().unwrap_or(Self::Started)
    }
}

/// One row in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub event_type: String,
    pub config_id: Option<String>,
    pub config_name: Option<String>,
    pub report_id: Option<String>,
    pub model: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub web_search_calls: i64,
    pub estimated_cost_cents: f64,
    pub runtime_ms: i64,
    pub status: AuditStatus,
    pub error_message: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
    pub completed_at: Option<chrono::DateTime<Utc>>,
}

/// Fields recorded when a run begins.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub event_type: String,
    pub config_id: Option<String>,
    pub config_name: Option<String>,
    pub model: Option<String>,
}

/// Partial update merged into an existing entry. `None` leaves a column
/// untouched; `error_message` distinguishes "leave alone" (`None`) from
/// "clear" (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct AuditPatch {
    pub report_id: Option<String>,
    pub model: Option<String>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub web_search_calls: Option<i64>,
    pub estimated_cost_cents: Option<f64>,
    pub runtime_ms: Option<i64>,
    pub status: Option<AuditStatus>,
    pub error_message: Option<Option<String>>,
}

/// Aggregate spend over a set of entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditTotals {
    pub total_cost_cents: f64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_web_searches: i64,
}

impl AuditTotals {
    pub fn for_entries(entries: &[AuditEntry]) -> Self {
        let mut totals = Self::default();
        for entry in entries {
            totals.total_cost_cents += entry.estimated_cost_cents;
            totals.total_input_tokens += entry.input_tokens;
            totals.total_output_tokens += entry.output_tokens;
            totals.total_web_searches += entry.web_search_calls;
        }
        totals
    }
}

const ENTRY_COLUMNS: &str = "id, event_type, config_id, config_name, report_id, model, \
                             input_tokens, output_tokens, web_search_calls, \
                             estimated_cost_cents, runtime_ms, status, error_message, \
                             created_at, completed_at";

/// Read/write access to the `audit_log` table.
#[derive(Clone)]
pub struct AuditLedger {
    pool: SqlitePool,
}

impl AuditLedger {
    pub fn new(store: &Store) -> Self {
        Self {
            pool: store.pool().clone(),
        }
    }

    /// Records the start of a run and returns the new entry.
    pub async fn create(&self, new: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        sqlx::query(
            "INSERT INTO audit_log (
                id, event_type, config_id, config_name, model,
                input_tokens, output_tokens, web_search_calls,
                estimated_cost_cents, runtime_ms, status, created_at
             ) VALUES (?, ?, ?, ?, ?, 0, 0, 0, 0, 0, 'started', ?)",
        )
        .bind(&id)
        .bind(&new.event_type)
        .bind(&new.config_id)
        .bind(&new.config_name)
        .bind(&new.model)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(AuditEntry {
            id,
            event_type: new.event_type,
            config_id: new.config_id,
            config_name: new.config_name,
            report_id: None,
            model: new.model,
            input_tokens: 0,
            output_tokens: 0,
            web_search_calls: 0,
            estimated_cost_cents: 0.0,
            runtime_ms: 0,
            status: AuditStatus::Started,
            error_message: None,
            created_at,
            completed_at: None,
        })
    }

    /// Merges `patch` into an entry. Columns absent from the patch keep
    /// their stored value. Moving to a terminal status stamps
    /// `completed_at` once; later patches never move it.
    pub async fn update(&self, id: &str, patch: AuditPatch) -> Result<AuditEntry, StoreError> {
        let completed_at = patch
            .status
            .filter(|status| status.is_terminal())
            .map(|_| Utc::now().to_rfc3339());
        let clear_or_set_error = patch.error_message.is_some();
        let error_message = patch.error_message.flatten();

        let result = sqlx::query(
            "UPDATE audit_log SET
                report_id            = COALESCE(?, report_id),
                model                = COALESCE(?, model),
                input_tokens         = COALESCE(?, input_tokens),
                output_tokens        = COALESCE(?, output_tokens),
                web_search_calls     = COALESCE(?, web_search_calls),
                estimated_cost_cents = COALESCE(?, estimated_cost_cents),
                runtime_ms           = COALESCE(?, runtime_ms),
                status               = COALESCE(?, status),
                error_message        = CASE WHEN ? THEN ? ELSE error_message END,
                completed_at         = COALESCE(completed_at, ?)
             WHERE id = ?",
        )
        .bind(&patch.report_id)
        .bind(&patch.model)
        .bind(patch.input_tokens)
        .bind(patch.output_tokens)
        .bind(patch.web_search_calls)
        .bind(patch.estimated_cost_cents)
        .bind(patch.runtime_ms)
        .bind(patch.status.map(AuditStatus::as_db))
        .bind(clear_or_set_error)
        .bind(&error_message)
        .bind(&completed_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AuditNotFound(id.to_string()));
        }

        self.get(id)
            .await?
            .ok_or_else(|| StoreError::AuditNotFound(id.to_string()))
    }

    pub async fn get(&self, id: &str) -> Result<Option<AuditEntry>, StoreError> {
        let query = format!("SELECT {ENTRY_COLUMNS} FROM audit_log WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_entry).transpose()
    }

    /// Entries still in flight, newest first.
    pub async fn list_running(&self) -> Result<Vec<AuditEntry>, StoreError> {
        let query = format!(
            "SELECT {ENTRY_COLUMNS} FROM audit_log
             WHERE status = 'started' ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_entry).collect()
    }

    /// The most recent `limit` entries regardless of status, newest first.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<AuditEntry>, StoreError> {
        let query = format!(
            "SELECT {ENTRY_COLUMNS} FROM audit_log
             ORDER BY created_at DESC LIMIT ?"
        );
        let rows = sqlx::query(&query)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_entry).collect()
    }

    /// Terminal entries whose completion falls within the last
    /// `within_minutes` minutes, newest completion first.
    pub async fn list_recent_terminal(
        &self,
        within_minutes: i64,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let cutoff = (Utc::now() - Duration::minutes(within_minutes)).to_rfc3339();
        let query = format!(
            "SELECT {ENTRY_COLUMNS} FROM audit_log
             WHERE status IN ('completed', 'failed')
               AND completed_at IS NOT NULL
               AND datetime(completed_at) >= datetime(?)
             ORDER BY completed_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(&cutoff)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_entry).collect()
    }

    /// Finalizes `started` entries left behind by a previous process, e.g.
    /// after a crash or restart mid-run.
    pub async fn fail_orphaned_runs(&self, reason: &str) -> Result<u64, StoreError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE audit_log
             SET status = 'failed', error_message = ?, completed_at = ?
             WHERE status = 'started'",
        )
        .bind(reason)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEntry, StoreError> {
    let status_raw: String = row.get("status");
    let created_at_raw: String = row.get("created_at");
    let completed_at_raw: Option<String> = row.get("completed_at");

    Ok(AuditEntry {
        id: row.get("id"),
        event_type: row.get("event_type"),
        config_id: row.get("config_id"),
        config_name: row.get("config_name"),
        report_id: row.get("report_id"),
        model: row.get("model"),
        input_tokens: row.get::<Option<i64>, _>("input_tokens").unwrap_or(0),
        output_tokens: row.get::<Option<i64>, _>("output_tokens").unwrap_or(0),
        web_search_calls: row.get::<Option<i64>, _>("web_search_calls").unwrap_or(0),
        estimated_cost_cents: row
            .get::<Option<f64>, _>("estimated_cost_cents")
            .unwrap_or(0.0),
        runtime_ms: row.get::<Option<i64>, _>("runtime_ms").unwrap_or(0),
        status: AuditStatus::from_db(&status_raw),
        error_message: row.get("error_message"),
        created_at: parse_rfc3339("audit_log", &created_at_raw)?,
        completed_at: match completed_at_raw {
            Some(raw) => Some(parse_rfc3339("audit_log", &raw)?),
            None => None,
        },
    })
}

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use super::AppState;
use crate::audit::{AuditLedger, AuditTotals};
use crate::error::StoreError;
use crate::sources::{NewFeedback, SourceStore};
use crate::store::{Category, ConfigPatch, NewConfig, ResearchConfig};

/// Window for the "recently finished" list on the status endpoint.
const RECENT_TERMINAL_MINUTES: i64 = 5;
const DEFAULT_AUDIT_LIMIT: i64 = 50;
const DEFAULT_PAGE_SIZE: i64 = 10;

const REQUIRED_CONFIG_FIELDS: &str = "name, prompt, and category are required";

/// GET /health
pub(super) async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "scheduledConfigs": state.scheduler.list_active(),
    }))
}

/// POST /api/jobs/run/{config_id}
pub(super) async fn run_config(
    State(state): State<AppState>,
    Path(config_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let config = match state.store.configs().get(&config_id).await {
        Ok(Some(config)) => config,
        Ok(None) => return not_found("Config not found"),
        Err(error) => return internal_error(error),
    };

    let outcome = state.queue.enqueue(&config.id);
    let message = if outcome.already_queued {
        "Already in queue".to_string()
    } else if outcome.position == 1 {
        "Research started".to_string()
    } else {
        format!("Queued at position {}", outcome.position)
    };

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "queued": true,
            "position": outcome.position,
            "alreadyQueued": outcome.already_queued,
            "configId": config.id,
            "configName": config.name,
            "message": message,
        })),
    )
}

/// POST /api/jobs/run-all
pub(super) async fn run_all(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let configs = match state.store.configs().list_enabled().await {
        Ok(configs) => configs,
        Err(error) => return internal_error(error),
    };
    if configs.is_empty() {
        return bad_request("No enabled configs");
    }

    let ids: Vec<String> = configs.iter().map(|config| config.id.clone()).collect();
    let outcome = state.queue.enqueue_all(&ids);

    let message = if outcome.skipped > 0 {
        format!(
            "Queued {} configs ({} already in queue)",
            outcome.queued, outcome.skipped
        )
    } else {
        format!("Queued {} configs", outcome.queued)
    };

    let listed: Vec<Value> = configs
        .iter()
        .map(|config| json!({"id": config.id, "name": config.name}))
        .collect();

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "queued": true,
            "count": outcome.queued,
            "skipped": outcome.skipped,
            "configs": listed,
            "message": message,
        })),
    )
}

/// GET /api/jobs/status
pub(super) async fn queue_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.queue.status()))
}

/// GET /api/audit/status
pub(super) async fn audit_status(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let ledger = AuditLedger::new(&state.store);
    let running = match ledger.list_running().await {
        Ok(entries) => entries,
        Err(error) => return internal_error(error),
    };
    let recent = match ledger.list_recent_terminal(RECENT_TERMINAL_MINUTES).await {
        Ok(entries) => entries,
        Err(error) => return internal_error(error),
    };

    (
        StatusCode::OK,
        Json(json!({"running": running, "recentCompleted": recent})),
    )
}

#[derive(Deserialize)]
pub(super) struct AuditQuery {
    limit: Option<i64>,
}

/// GET /api/audit
pub(super) async fn audit_log(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> (StatusCode, Json<Value>) {
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT);
    let entries = match AuditLedger::new(&state.store).list_recent(limit).await {
        Ok(entries) => entries,
        Err(error) => return internal_error(error),
    };
    let totals = AuditTotals::for_entries(&entries);

    (
        StatusCode::OK,
        Json(json!({"entries": entries, "totals": totals})),
    )
}

/// GET /api/audit/{id}
pub(super) async fn audit_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match AuditLedger::new(&state.store).get(&id).await {
        Ok(Some(entry)) => (StatusCode::OK, Json(json!(entry))),
        Ok(None) => not_found("Audit entry not found"),
        Err(error) => internal_error(error),
    }
}

#[derive(Deserialize)]
pub(super) struct SourceQuery {
    category: Option<String>,
}

/// GET /api/sources
pub(super) async fn list_sources(
    State(state): State<AppState>,
    Query(query): Query<SourceQuery>,
) -> (StatusCode, Json<Value>) {
    let sources = SourceStore::new(&state.store);
    match sources.top_sources(query.category.as_deref()).await {
        Ok(ranked) => (StatusCode::OK, Json(json!(ranked))),
        Err(error) => internal_error(error),
    }
}

/// POST /api/sources/feedback
pub(super) async fn submit_feedback(
    State(state): State<AppState>,
    body: Result<Json<NewFeedback>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Ok(Json(feedback)) = body else {
        return bad_request("Invalid feedback data");
    };

    match SourceStore::new(&state.store).submit_feedback(feedback).await {
        Ok(_) => (StatusCode::OK, Json(json!({"success": true}))),
        Err(StoreError::InvalidRating(_)) => bad_request("Invalid feedback data"),
        Err(error) => internal_error(error),
    }
}

/// POST /api/sources/recalculate
pub(super) async fn recalculate_sources(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match SourceStore::new(&state.store).recompute_all().await {
        Ok(count) => {
            tracing::info!("recomputed trust scores for {count} sources");
            (StatusCode::OK, Json(json!({"success": true})))
        }
        Err(error) => internal_error(error),
    }
}

/// GET /api/configs
pub(super) async fn list_configs(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.store.configs().list().await {
        Ok(configs) => (StatusCode::OK, Json(json!(configs))),
        Err(error) => internal_error(error),
    }
}

/// POST /api/configs
pub(super) async fn create_config(
    State(state): State<AppState>,
    body: Result<Json<NewConfig>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Ok(Json(new)) = body else {
        return bad_request(REQUIRED_CONFIG_FIELDS);
    };
    if new.name.trim().is_empty() || new.prompt.trim().is_empty() {
        return bad_request(REQUIRED_CONFIG_FIELDS);
    }

    match state.store.configs().create(new).await {
        Ok(config) => {
            sync_schedule(&state, &config);
            (StatusCode::CREATED, Json(json!(config)))
        }
        Err(error) => internal_error(error),
    }
}

/// GET /api/configs/{id}
pub(super) async fn get_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.store.configs().get(&id).await {
        Ok(Some(config)) => (StatusCode::OK, Json(json!(config))),
        Ok(None) => not_found("Config not found"),
        Err(error) => internal_error(error),
    }
}

/// PUT /api/configs/{id}
pub(super) async fn update_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ConfigPatch>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Ok(Json(patch)) = body else {
        return bad_request("Invalid config data");
    };

    match state.store.configs().update(&id, patch).await {
        Ok(Some(updated)) => {
            sync_schedule(&state, &updated);
            (StatusCode::OK, Json(json!(updated)))
        }
        Ok(None) => not_found("Config not found"),
        Err(error) => internal_error(error),
    }
}

/// DELETE /api/configs/{id}
pub(super) async fn delete_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.store.configs().delete(&id).await {
        Ok(true) => {
            state.scheduler.unregister(&id);
            (StatusCode::OK, Json(json!({"success": true})))
        }
        Ok(false) => not_found("Config not found"),
        Err(error) => internal_error(error),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ReportQuery {
    page: Option<i64>,
    page_size: Option<i64>,
    category: Option<String>,
}

/// GET /api/reports
pub(super) async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> (StatusCode, Json<Value>) {
    let category = match query.category.as_deref() {
        Some(raw) => match raw.parse::<Category>() {
            Ok(category) => Some(category),
            Err(_) => return bad_request("Invalid category"),
        },
        None => None,
    };

    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    match state.store.reports().history(page, page_size, category).await {
        Ok(reports) => (StatusCode::OK, Json(json!(reports))),
        Err(error) => internal_error(error),
    }
}

/// GET /api/reports/latest
pub(super) async fn latest_reports(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.store.reports().latest().await {
        Ok(reports) => (StatusCode::OK, Json(json!(reports))),
        Err(error) => internal_error(error),
    }
}

/// GET /api/reports/{id}
pub(super) async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.store.reports().get(&id).await {
        Ok(Some(report)) => (StatusCode::OK, Json(json!(report))),
        Ok(None) => not_found("Report not found"),
        Err(error) => internal_error(error),
    }
}

/// Keep the live timer in step with a config row after a write.
fn sync_schedule(state: &AppState, config: &ResearchConfig) {
    if let Err(error) = state
        .scheduler
        .set_enabled(&config.id, &config.schedule, config.enabled)
    {
        tracing::warn!(config = %config.id, "schedule not registered: {error}");
    }
}

/// Store failures surface as a generic 500; the detail goes to the log.
fn internal_error(error: impl std::fmt::Display) -> (StatusCode, Json<Value>) {
    tracing::error!("request failed: {error}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "Internal server error"})),
    )
}

fn not_found(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({"error": message})))
}

fn bad_request(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message})))
}

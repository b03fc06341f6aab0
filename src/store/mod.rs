//! SQLite-backed persistence for configs, reports, and everything the
//! orchestrator records about runs.
//!
//! One pool is opened at startup and shared by every collaborator. Schema
//! creation is idempotent and happens on open, so a fresh workspace is
//! usable without a separate migration step.

mod configs;
mod reports;
mod types;

pub use configs::ConfigStore;
pub use reports::ReportStore;
pub use types::{
    Category, ConfigPatch, NewConfig, NewItem, NewReport, Paginated, ResearchConfig, ResearchItem,
    ResearchReport,
};

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::error::StoreError;

/// Shared handle to the SQLite database.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens the database at `db_path`, creating the file and schema when
    /// missing.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn configs(&self) -> ConfigStore {
        ConfigStore::new(self.pool.clone())
    }

    pub fn reports(&self) -> ReportStore {
        ReportStore::new(self.pool.clone())
    }

    /// Inserts the stock research configs unless rows with the same ids
    /// already exist. Schedules are spaced five minutes apart so one run
    /// drains from the queue before the next fires.
    pub async fn seed_default_configs(&self) -> Result<usize, StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut inserted = 0;

        for seed in DEFAULT_CONFIGS {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO research_configs (
                    id, name, description, prompt, category, topics,
                    preferred_sources, blocked_sources, enabled, schedule,
                    created_at, updated_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?)",
            )
            .bind(seed.id)
            .bind(seed.name)
            .bind(seed.description)
            .bind(seed.prompt)
            .bind(seed.category.as_db())
            .bind(json_list(seed.topics))
            .bind(json_list(seed.preferred_sources))
            .bind("[]")
            .bind(seed.schedule)
            .bind(&now)
            .bind(&now)
            .execute(&self.pool)
            .await?;

            inserted += usize::try_from(result.rows_affected()).unwrap_or(0);
        }

        Ok(inserted)
    }
}

// ── Schema ──────────────────────────────────────────────────────────────────

async fn ensure_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS research_configs (
            id                TEXT PRIMARY KEY,
            name              TEXT NOT NULL,
            description       TEXT,
            prompt            TEXT NOT NULL,
            category          TEXT NOT NULL CHECK(category IN ('papers', 'news', 'markets', 'politics')),
            topics            TEXT NOT NULL,
            preferred_sources TEXT,
            blocked_sources   TEXT,
            enabled           INTEGER NOT NULL DEFAULT 1,
            schedule          TEXT NOT NULL DEFAULT '0 6 * * *',
            created_at        TEXT NOT NULL,
            updated_at        TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS research_reports (
            id           TEXT PRIMARY KEY,
            config_id    TEXT NOT NULL,
            config_name  TEXT NOT NULL,
            category     TEXT NOT NULL,
            generated_at TEXT NOT NULL,
            summary      TEXT,
            FOREIGN KEY (config_id) REFERENCES research_configs(id)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS research_items (
            id              TEXT PRIMARY KEY,
            report_id       TEXT NOT NULL,
            title           TEXT NOT NULL,
            source          TEXT,
            url             TEXT,
            summary         TEXT,
            relevance_score REAL DEFAULT 0,
            published_at    TEXT,
            category        TEXT,
            tags            TEXT,
            FOREIGN KEY (report_id) REFERENCES research_reports(id)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS audit_log (
            id                   TEXT PRIMARY KEY,
            event_type           TEXT NOT NULL,
            config_id            TEXT,
            config_name          TEXT,
            report_id            TEXT,
            model                TEXT,
            input_tokens         INTEGER DEFAULT 0,
            output_tokens        INTEGER DEFAULT 0,
            web_search_calls     INTEGER DEFAULT 0,
            estimated_cost_cents REAL DEFAULT 0,
            runtime_ms           INTEGER DEFAULT 0,
            status               TEXT NOT NULL DEFAULT 'started',
            error_message        TEXT,
            created_at           TEXT NOT NULL,
            completed_at         TEXT
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS sources (
            id          TEXT PRIMARY KEY,
            domain      TEXT UNIQUE NOT NULL,
            name        TEXT,
            category    TEXT,
            trust_score REAL DEFAULT 0.5,
            upvotes     INTEGER DEFAULT 0,
            downvotes   INTEGER DEFAULT 0,
            last_seen   TEXT,
            created_at  TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS source_feedback (
            id            TEXT PRIMARY KEY,
            source_domain TEXT NOT NULL,
            item_id       TEXT,
            rating        INTEGER NOT NULL,
            created_at    TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_reports_generated_at ON research_reports(generated_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_reports_config_id ON research_reports(config_id)",
        "CREATE INDEX IF NOT EXISTS idx_items_report_id ON research_items(report_id)",
        "CREATE INDEX IF NOT EXISTS idx_audit_created_at ON audit_log(created_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_sources_domain ON sources(domain)",
        "CREATE INDEX IF NOT EXISTS idx_sources_trust ON sources(trust_score DESC)",
        "CREATE INDEX IF NOT EXISTS idx_source_feedback_domain ON source_feedback(source_domain)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

// ── Row helpers shared across stores ────────────────────────────────────────

pub(crate) fn parse_rfc3339(
    table: &'static str,
    raw: &str,
) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| StoreError::Corrupt {
            table,
            detail: format!("bad timestamp {raw:?}: {err}"),
        })
}

pub(crate) fn parse_string_list(
    table: &'static str,
    raw: Option<String>,
) -> Result<Vec<String>, StoreError> {
    match raw {
        None => Ok(Vec::new()),
        Some(raw) if raw.trim().is_empty() => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(&raw).map_err(|err| StoreError::Corrupt {
            table,
            detail: format!("bad JSON list: {err}"),
        }),
    }
}

pub(crate) fn json_list<S: serde::Serialize>(list: &[S]) -> String {
    serde_json::to_string(list).unwrap_or_else(|_| "[]".to_string())
}

// ── Seed data ───────────────────────────────────────────────────────────────

struct SeedConfig {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    prompt: &'static str,
    category: Category,
    topics: &'static [&'static str],
    preferred_sources: &'static [&'static str],
    schedule: &'static str,
}

const DEFAULT_CONFIGS: &[SeedConfig] = &[
    SeedConfig {
        id: "papers-ai-computing",
        name: "AI/ML Research",
        description: "Substantive AI/ML research papers and technical whitepapers",
        prompt: "Prioritize papers introducing new architectures, training methods, \
                 or significant benchmark improvements.",
        category: Category::Papers,
        topics: &[
            "LLMs",
            "transformers",
            "reasoning",
            "agents",
            "multimodal",
            "RLHF",
            "inference optimization",
        ],
        preferred_sources: &[
            "arxiv.org",
            "openreview.net",
            "openai.com/research",
            "anthropic.com/research",
            "deepmind.google/research",
            "ai.meta.com/research",
            "research.google",
        ],
        schedule: "0 6 * * *",
    },
    SeedConfig {
        id: "news-tech",
        name: "Tech Industry",
        description: "AI labs, FAANG, and startup ecosystem news",
        prompt: "Focus on substantive developments, not rumors or speculation.",
        category: Category::News,
        topics: &[
            "OpenAI",
            "Anthropic",
            "Google",
            "Meta AI",
            "xAI",
            "startups",
            "developer tools",
        ],
        preferred_sources: &["techcrunch.com", "theverge.com", "arstechnica.com", "x.com"],
        schedule: "5 6 * * *",
    },
    SeedConfig {
        id: "markets-tech",
        name: "Markets & Finance",
        description: "Tech equities, Mag 7, and market movers",
        prompt: "Focus on price action, earnings, and analyst moves for tech/growth names.",
        category: Category::Markets,
        topics: &[
            "NVDA",
            "AAPL",
            "MSFT",
            "GOOGL",
            "AMZN",
            "META",
            "TSLA",
            "semiconductors",
            "S&P tech",
        ],
        preferred_sources: &[
            "bloomberg.com",
            "reuters.com",
            "wsj.com",
            "seekingalpha.com",
        ],
        schedule: "10 6 * * *",
    },
    SeedConfig {
        id: "politics-tech",
        name: "US Politics",
        description: "US presidency, Congress, and federal policy",
        prompt: "Cover major federal developments with awareness of tech implications.",
        category: Category::Politics,
        topics: &[
            "presidency",
            "Congress",
            "Supreme Court",
            "AI regulation",
            "antitrust",
            "trade policy",
        ],
        preferred_sources: &[
            "politico.com",
            "axios.com",
            "thehill.com",
            "reuters.com",
            "apnews.com",
        ],
        schedule: "15 6 * * *",
    },
];

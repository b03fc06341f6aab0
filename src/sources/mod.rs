//! Feedback-driven source reputation.
//!
//! Every thumbs up/down on a research item lands here as an immutable
//! feedback row plus a counter bump on the source. Trust is the lower
//! bound of the Wilson score interval, so a source needs a track record
//! before it outranks the neutral default.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use url::Url;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{Store, parse_rfc3339};

const Z_95: f64 = 1.96;
const TOP_SOURCES_CAP: i64 = 50;

/// A tracked source and its running reputation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: String,
    pub domain: String,
    pub name: Option<String>,
    pub category: Option<String>,
    pub trust_score: f64,
    pub upvotes: i64,
    pub downvotes: i64,
    pub last_seen: Option<chrono::DateTime<Utc>>,
    pub created_at: chrono::DateTime<Utc>,
}

/// Incoming feedback for one research item's source.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFeedback {
    pub source_domain: String,
    #[serde(default)]
    pub item_id: Option<String>,
    pub rating: i32,
}

/// Lower bound of the Wilson score interval at 95% confidence.
///
/// Returns `None` when there are no votes yet, so a fresh source keeps its
/// seeded neutral score instead of collapsing to zero.
#[allow(clippy::cast_precision_loss)]
pub fn wilson_lower_bound(upvotes: i64, downvotes: i64) -> Option<f64> {
    let total = upvotes + downvotes;
    if total <= 0 {
        return None;
    }

    let n = total as f64;
    let positive = upvotes.max(0) as f64;
    let phat = positive / n;
    let z2 = Z_95 * Z_95;

    let centre = phat + z2 / (2.0 * n);
    let margin = Z_95 * ((phat * (1.0 - phat) + z2 / (4.0 * n)) / n).sqrt();
    let denominator = 1.0 + z2 / n;

    Some(((centre - margin) / denominator).clamp(0.0, 1.0))
}

/// Reduces whatever the client sent (full URL, bare host, mixed case) to a
/// lowercase domain without a `www.` prefix.
pub(crate) fn normalize_domain(raw: &str) -> String {
    let trimmed = raw.trim();
    let host = Url::parse(trimmed)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| trimmed.to_string());

    let host = host.to_ascii_lowercase();
    host.strip_prefix("www.").unwrap_or(&host).to_string()
}

const SOURCE_COLUMNS: &str =
    "id, domain, name, category, trust_score, upvotes, downvotes, last_seen, created_at";

/// Read/write access to `sources` and `source_feedback`.
#[derive(Clone)]
pub struct SourceStore {
    pool: SqlitePool,
}

impl SourceStore {
    pub fn new(store: &Store) -> Self {
        Self {
            pool: store.pool().clone(),
        }
    }

    /// Appends a feedback row, bumps the source's counters (creating the
    /// source on first sight), and recomputes its trust score.
    pub async fn submit_feedback(&self, feedback: NewFeedback) -> Result<Source, StoreError> {
        if feedback.rating != 1 && feedback.rating != -1 {
            return Err(StoreError::InvalidRating(feedback.rating));
        }

        let domain = normalize_domain(&feedback.source_domain);
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO source_feedback (id, source_domain, item_id, rating, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&domain)
        .bind(&feedback.item_id)
        .bind(feedback.rating)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "INSERT OR IGNORE INTO sources (id, domain, trust_score, upvotes, downvotes, created_at)
             VALUES (?, ?, 0.5, 0, 0, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&domain)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let (up, down) = if feedback.rating == 1 { (1, 0) } else { (0, 1) };
        sqlx::query(
            "UPDATE sources
             SET upvotes = upvotes + ?, downvotes = downvotes + ?, last_seen = ?
             WHERE domain = ?",
        )
        .bind(up)
        .bind(down)
        .bind(&now)
        .bind(&domain)
        .execute(&self.pool)
        .await?;

        self.recompute_score(&domain).await?;

        self.get(&domain)
            .await?
            .ok_or_else(|| StoreError::Corrupt {
                table: "sources",
                detail: format!("source {domain} vanished after feedback"),
            })
    }

    /// Recomputes the trust score for every tracked source. Returns how
    /// many rows changed.
    pub async fn recompute_all(&self) -> Result<usize, StoreError> {
        let rows = sqlx::query("SELECT domain, upvotes, downvotes FROM sources")
            .fetch_all(&self.pool)
            .await?;

        let mut updated = 0;
        for row in rows {
            let domain: String = row.get("domain");
            let upvotes: i64 = row.get::<Option<i64>, _>("upvotes").unwrap_or(0);
            let downvotes: i64 = row.get::<Option<i64>, _>("downvotes").unwrap_or(0);

            if let Some(score) = wilson_lower_bound(upvotes, downvotes) {
                sqlx::query("UPDATE sources SET trust_score = ? WHERE domain = ?")
                    .bind(score)
                    .bind(&domain)
                    .execute(&self.pool)
                    .await?;
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Highest-trust sources first, optionally limited to one category.
    pub async fn top_sources(&self, category: Option<&str>) -> Result<Vec<Source>, StoreError> {
        let (sql, filter) = match category {
            Some(category) => (
                format!(
                    "SELECT {SOURCE_COLUMNS} FROM sources WHERE category = ?
                     ORDER BY trust_score DESC, domain ASC LIMIT ?"
                ),
                Some(category),
            ),
            None => (
                format!(
                    "SELECT {SOURCE_COLUMNS} FROM sources
                     ORDER BY trust_score DESC, domain ASC LIMIT ?"
                ),
                None,
            ),
        };

        let mut query = sqlx::query(&sql);
        if let Some(category) = filter {
            query = query.bind(category);
        }
        let rows = query.bind(TOP_SOURCES_CAP).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_source).collect()
    }

    /// Domains trusted enough to feed back into research prompts.
    pub async fn high_trust_domains(
        &self,
        min_score: f64,
        limit: i64,
    ) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT domain FROM sources
             WHERE trust_score >= ?
             ORDER BY trust_score DESC, domain ASC
             LIMIT ?",
        )
        .bind(min_score)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("domain")).collect())
    }

    pub async fn get(&self, domain: &str) -> Result<Option<Source>, StoreError> {
        let query = format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE domain = ?");
        let row = sqlx::query(&query)
            .bind(domain)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_source).transpose()
    }

    async fn recompute_score(&self, domain: &str) -> Result<(), StoreError> {
        let Some(row) = sqlx::query("SELECT upvotes, downvotes FROM sources WHERE domain = ?")
            .bind(domain)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(());
        };

        let upvotes: i64 = row.get::<Option<i64>, _>("upvotes").unwrap_or(0);
        let downvotes: i64 = row.get::<Option<i64>, _>("downvotes").unwrap_or(0);

        if let Some(score) = wilson_lower_bound(upvotes, downvotes) {
            sqlx::query("UPDATE sources SET trust_score = ? WHERE domain = ?")
                .bind(score)
                .bind(domain)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}

fn row_to_source(row: &sqlx::sqlite::SqliteRow) -> Result<Source, StoreError> {
    let created_at_raw: String = row.get("created_at");
    let last_seen_raw: Option<String> = row.get("last_seen");

    Ok(Source {
        id: row.get("id"),
        domain: row.get("domain"),
        name: row.get("name"),
        category: row.get("category"),
        trust_score: row.get::<Option<f64>, _>("trust_score").unwrap_or(0.5),
        upvotes: row.get::<Option<i64>, _>("upvotes").unwrap_or(0),
        downvotes: row.get::<Option<i64>, _>("downvotes").unwrap_or(0),
        last_seen: match last_seen_raw {
            Some(raw) => Some(parse_rfc3339("sources", &raw)?),
            None => None,
        },
        created_at: parse_rfc3339("sources", &created_at_raw)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_sources() -> (tempfile::TempDir, Store, SourceStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(&dir.path().join("lookout.db"))
            .await
            .expect("open store");
        let sources = SourceStore::new(&store);
        (dir, store, sources)
    }

    fn upvote(domain: &str) -> NewFeedback {
        NewFeedback {
            source_domain: domain.into(),
            item_id: None,
            rating: 1,
        }
    }

    fn downvote(domain: &str) -> NewFeedback {
        NewFeedback {
            source_domain: domain.into(),
            item_id: None,
            rating: -1,
        }
    }

    #[test]
    fn wilson_is_none_without_votes() {
        assert!(wilson_lower_bound(0, 0).is_none());
    }

    #[test]
    fn wilson_matches_known_values() {
        let ten_up = wilson_lower_bound(10, 0).unwrap();
        assert!((ten_up - 0.7225).abs() < 1e-3, "got {ten_up}");

        let three_one = wilson_lower_bound(3, 1).unwrap();
        assert!((three_one - 0.3007).abs() < 1e-3, "got {three_one}");

        let split = wilson_lower_bound(1, 1).unwrap();
        assert!((split - 0.0945).abs() < 1e-3, "got {split}");
    }

    #[test]
    fn wilson_single_upvote_stays_below_neutral() {
        // One data point is weak evidence; the bound sits under 0.5 until a
        // source earns more votes.
        let one_up = wilson_lower_bound(1, 0).unwrap();
        assert!(one_up < 0.5, "got {one_up}");
        assert!(one_up > 0.2, "got {one_up}");
    }

    #[test]
    fn wilson_grows_with_evidence() {
        let few = wilson_lower_bound(5, 0).unwrap();
        let many = wilson_lower_bound(50, 0).unwrap();
        assert!(many > few);
        assert!(many < 1.0);
    }

    #[test]
    fn wilson_is_monotone_in_sample_size_at_fixed_ratio() {
        // 3:1 ratio at growing sample sizes climbs toward p-hat = 0.75.
        let mut previous = 0.0;
        for scale in [1, 10, 100, 1000] {
            let score = wilson_lower_bound(3 * scale, scale).unwrap();
            assert!(score >= previous, "score regressed at scale {scale}");
            assert!(score < 0.75);
            previous = score;
        }
        assert!(previous > 0.7);
    }

    #[test]
    fn wilson_stays_in_unit_interval() {
        for upvotes in 0..20 {
            for downvotes in 0..20 {
                if upvotes + downvotes == 0 {
                    continue;
                }
                let score = wilson_lower_bound(upvotes, downvotes).unwrap();
                assert!((0.0..=1.0).contains(&score), "{upvotes}/{downvotes} -> {score}");
            }
        }
    }

    #[test]
    fn normalize_handles_urls_hosts_and_case() {
        assert_eq!(normalize_domain("https://www.Example.com/a/b"), "example.com");
        assert_eq!(normalize_domain("arxiv.org"), "arxiv.org");
        assert_eq!(normalize_domain("WWW.Reuters.COM"), "reuters.com");
        assert_eq!(normalize_domain("  techcrunch.com  "), "techcrunch.com");
    }

    #[tokio::test]
    async fn feedback_rejects_out_of_range_ratings() {
        let (_dir, _store, sources) = open_sources().await;
        let err = sources
            .submit_feedback(NewFeedback {
                source_domain: "arxiv.org".into(),
                item_id: None,
                rating: 5,
            })
            .await
            .expect_err("bad rating");
        assert!(matches!(err, StoreError::InvalidRating(5)));
    }

    #[tokio::test]
    async fn first_feedback_creates_source_and_scores_it() {
        let (_dir, _store, sources) = open_sources().await;

        let source = sources
            .submit_feedback(upvote("https://www.arxiv.org/abs/1234"))
            .await
            .expect("feedback");

        assert_eq!(source.domain, "arxiv.org");
        assert_eq!(source.upvotes, 1);
        assert_eq!(source.downvotes, 0);
        assert!((source.trust_score - 0.2065).abs() < 1e-3);
        assert!(source.last_seen.is_some());
    }

    #[tokio::test]
    async fn feedback_accumulates_on_one_row_per_domain() {
        let (_dir, _store, sources) = open_sources().await;

        sources.submit_feedback(upvote("arxiv.org")).await.expect("up");
        sources
            .submit_feedback(upvote("https://arxiv.org/abs/999"))
            .await
            .expect("up again");
        let source = sources
            .submit_feedback(downvote("www.arxiv.org"))
            .await
            .expect("down");

        assert_eq!(source.upvotes, 2);
        assert_eq!(source.downvotes, 1);
        let expected = wilson_lower_bound(2, 1).unwrap();
        assert!((source.trust_score - expected).abs() < 1e-9);

        let all = sources.top_sources(None).await.expect("top");
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn recompute_all_rescues_stale_scores() {
        let (_dir, store, sources) = open_sources().await;

        sources.submit_feedback(upvote("arxiv.org")).await.expect("up");
        sqlx::query("UPDATE sources SET trust_score = 0.99 WHERE domain = 'arxiv.org'")
            .execute(store.pool())
            .await
            .expect("stale score");

        let updated = sources.recompute_all().await.expect("recompute");
        assert_eq!(updated, 1);

        let source = sources.get("arxiv.org").await.expect("get").expect("exists");
        let expected = wilson_lower_bound(1, 0).unwrap();
        assert!((source.trust_score - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn recompute_all_skips_unvoted_sources() {
        let (_dir, store, sources) = open_sources().await;

        sqlx::query(
            "INSERT INTO sources (id, domain, trust_score, upvotes, downvotes, created_at)
             VALUES ('s1', 'fresh.example', 0.5, 0, 0, ?)",
        )
        .bind(Utc::now().to_rfc3339())
        .execute(store.pool())
        .await
        .expect("insert");

        let updated = sources.recompute_all().await.expect("recompute");
        assert_eq!(updated, 0);

        let source = sources
            .get("fresh.example")
            .await
            .expect("get")
            .expect("exists");
        assert!((source.trust_score - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn top_sources_orders_by_trust() {
        let (_dir, _store, sources) = open_sources().await;

        for _ in 0..5 {
            sources.submit_feedback(upvote("strong.example")).await.expect("up");
        }
        sources.submit_feedback(upvote("weak.example")).await.expect("up");
        sources.submit_feedback(downvote("weak.example")).await.expect("down");

        let top = sources.top_sources(None).await.expect("top");
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].domain, "strong.example");
        assert_eq!(top[1].domain, "weak.example");
    }

    #[tokio::test]
    async fn high_trust_domains_applies_threshold_and_limit() {
        let (_dir, _store, sources) = open_sources().await;

        for _ in 0..20 {
            sources.submit_feedback(upvote("great.example")).await.expect("up");
            sources.submit_feedback(upvote("also-great.example")).await.expect("up");
        }
        sources.submit_feedback(downvote("poor.example")).await.expect("down");

        let trusted = sources.high_trust_domains(0.7, 5).await.expect("trusted");
        assert_eq!(trusted.len(), 2);
        assert!(trusted.contains(&"great.example".to_string()));

        let capped = sources.high_trust_domains(0.7, 1).await.expect("capped");
        assert_eq!(capped.len(), 1);
    }
}

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::types::{Category, NewItem, NewReport, Paginated, ResearchItem, ResearchReport};
use super::{json_list, parse_rfc3339, parse_string_list};
use crate::error::StoreError;

const REPORT_COLUMNS: &str = "id, config_id, config_name, category, generated_at, summary";

/// Queries over `research_reports` and `research_items`.
#[derive(Clone)]
pub struct ReportStore {
    pool: SqlitePool,
}

impl ReportStore {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persists a report and its items in one transaction. Item ids are
    /// assigned here and every item row is stamped with the report category.
    pub async fn create(
        &self,
        report: NewReport,
        items: Vec<NewItem>,
    ) -> Result<ResearchReport, StoreError> {
        let report_id = Uuid::new_v4().to_string();
        let generated_at = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO research_reports (
                id, config_id, config_name, category, generated_at, summary
             ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&report_id)
        .bind(&report.config_id)
        .bind(&report.config_name)
        .bind(report.category.as_db())
        .bind(generated_at.to_rfc3339())
        .bind(&report.summary)
        .execute(&mut *tx)
        .await?;

        let mut saved_items = Vec::with_capacity(items.len());
        for item in items {
            let item_id = Uuid::new_v4().to_string();
            sqlx::query(
                "INSERT INTO research_items (
                    id, report_id, title, source, url, summary,
                    relevance_score, published_at, category, tags
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&item_id)
            .bind(&report_id)
            .bind(&item.title)
            .bind(&item.source)
            .bind(&item.url)
            .bind(&item.summary)
            .bind(item.relevance_score)
            .bind(&item.published_at)
            .bind(report.category.as_db())
            .bind(json_list(&item.tags))
            .execute(&mut *tx)
            .await?;

            saved_items.push(ResearchItem {
                id: item_id,
                report_id: report_id.clone(),
                title: item.title,
                source: item.source,
                url: item.url,
                summary: item.summary,
                relevance_score: item.relevance_score,
                published_at: item.published_at,
                category: report.category,
                tags: item.tags,
            });
        }

        tx.commit().await?;

        Ok(ResearchReport {
            id: report_id,
            config_id: report.config_id,
            config_name: report.config_name,
            category: report.category,
            generated_at,
            summary: report.summary,
            items: saved_items,
        })
    }

    pub async fn get(&self, id: &str) -> Result<Option<ResearchReport>, StoreError> {
        let query = format!("SELECT {REPORT_COLUMNS} FROM research_reports WHERE id = ?");
        let Some(row) = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let mut report = row_to_report(&row)?;
        report.items = self.items_for(&report.id).await?;
        Ok(Some(report))
    }

    /// Newest report per config, most recent first.
    pub async fn latest(&self) -> Result<Vec<ResearchReport>, StoreError> {
        let rows = sqlx::query(
            "SELECT r.id, r.config_id, r.config_name, r.category, r.generated_at, r.summary
             FROM research_reports r
             INNER JOIN (
                 SELECT config_id, MAX(generated_at) AS max_generated
                 FROM research_reports
                 GROUP BY config_id
             ) newest ON r.config_id = newest.config_id
                     AND r.generated_at = newest.max_generated
             ORDER BY r.generated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut reports = Vec::with_capacity(rows.len());
        for row in rows {
            let mut report = row_to_report(&row)?;
            report.items = self.items_for(&report.id).await?;
            reports.push(report);
        }
        Ok(reports)
    }

    /// Full report history, newest first, optionally restricted to one
    /// category.
    pub async fn history(
        &self,
        page: i64,
        page_size: i64,
        category: Option<Category>,
    ) -> Result<Paginated<ResearchReport>, StoreError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let offset = (page - 1) * page_size;

        let (count_sql, data_sql) = if category.is_some() {
            (
                "SELECT COUNT(*) FROM research_reports WHERE category = ?".to_string(),
                format!(
                    "SELECT {REPORT_COLUMNS} FROM research_reports WHERE category = ?
                     ORDER BY generated_at DESC LIMIT ? OFFSET ?"
                ),
            )
        } else {
            (
                "SELECT COUNT(*) FROM research_reports".to_string(),
                format!(
                    "SELECT {REPORT_COLUMNS} FROM research_reports
                     ORDER BY generated_at DESC LIMIT ? OFFSET ?"
                ),
            )
        };

        let mut count_query = sqlx::query(&count_sql);
        let mut data_query = sqlx::query(&data_sql);
        if let Some(category) = category {
            count_query = count_query.bind(category.as_db());
            data_query = data_query.bind(category.as_db());
        }

        let total: i64 = count_query.fetch_one(&self.pool).await?.get(0);
        let rows = data_query
            .bind(page_size)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let mut reports = Vec::with_capacity(rows.len());
        for row in rows {
            let mut report = row_to_report(&row)?;
            report.items = self.items_for(&report.id).await?;
            reports.push(report);
        }

        Ok(Paginated {
            data: reports,
            total,
            page,
            page_size,
            total_pages: (total + page_size - 1) / page_size,
        })
    }

    async fn items_for(&self, report_id: &str) -> Result<Vec<ResearchItem>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, report_id, title, source, url, summary,
                    relevance_score, published_at, category, tags
             FROM research_items
             WHERE report_id = ?
             ORDER BY relevance_score DESC",
        )
        .bind(report_id)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(row_to_item(&row)?);
        }
        Ok(items)
    }
}

fn row_to_report(row: &sqlx::sqlite::SqliteRow) -> Result<ResearchReport, StoreError> {
    let generated_at_raw: String = row.get("generated_at");
    let category_raw: String = row.get("category");
    let summary: Option<String> = row.get("summary");

    Ok(ResearchReport {
        id: row.get("id"),
        config_id: row.get("config_id"),
        config_name: row.get("config_name"),
        category: Category::from_db(&category_raw),
        generated_at: parse_rfc3339("research_reports", &generated_at_raw)?,
        summary: summary.unwrap_or_default(),
        items: Vec::new(),
    })
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<ResearchItem, StoreError> {
    let source: Option<String> = row.get("source");
    let url: Option<String> = row.get("url");
    let summary: Option<String> = row.get("summary");
    let relevance_score: Option<f64> = row.get("relevance_score");
    let category_raw: Option<String> = row.get("category");

    Ok(ResearchItem {
        id: row.get("id"),
        report_id: row.get("report_id"),
        title: row.get("title"),
        source: source.unwrap_or_default(),
        url: url.unwrap_or_default(),
        summary: summary.unwrap_or_default(),
        relevance_score: relevance_score.unwrap_or(0.0),
        published_at: row.get("published_at"),
        category: category_raw
            .map(|raw| Category::from_db(&raw))
            .unwrap_or(Category::Papers),
        tags: parse_string_list("research_items", row.get("tags"))?,
    })
}

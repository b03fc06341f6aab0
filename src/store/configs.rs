use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::types::{Category, ConfigPatch, NewConfig, ResearchConfig};
use super::{json_list, parse_rfc3339, parse_string_list};
use crate::error::StoreError;

const CONFIG_COLUMNS: &str = "id, name, description, prompt, category, topics, \
                              preferred_sources, blocked_sources, enabled, schedule, \
                              created_at, updated_at";

/// Queries over the `research_configs` table.
#[derive(Clone)]
pub struct ConfigStore {
    pool: SqlitePool,
}

impl ConfigStore {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<ResearchConfig>, StoreError> {
        let query = format!(
            "SELECT {CONFIG_COLUMNS} FROM research_configs ORDER BY category, name"
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut configs = Vec::with_capacity(rows.len());
        for row in rows {
            configs.push(row_to_config(&row)?);
        }
        Ok(configs)
    }

    pub async fn list_enabled(&self) -> Result<Vec<ResearchConfig>, StoreError> {
        let query = format!(
            "SELECT {CONFIG_COLUMNS} FROM research_configs
             WHERE enabled = 1 ORDER BY category, name"
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut configs = Vec::with_capacity(rows.len());
        for row in rows {
            configs.push(row_to_config(&row)?);
        }
        Ok(configs)
    }

    pub async fn get(&self, id: &str) -> Result<Option<ResearchConfig>, StoreError> {
        let query = format!("SELECT {CONFIG_COLUMNS} FROM research_configs WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_config).transpose()
    }

    pub async fn create(&self, new: NewConfig) -> Result<ResearchConfig, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO research_configs (
                id, name, description, prompt, category, topics,
                preferred_sources, blocked_sources, enabled, schedule,
                created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.prompt)
        .bind(new.category.as_db())
        .bind(json_list(&new.topics))
        .bind(json_list(&new.preferred_sources))
        .bind(json_list(&new.blocked_sources))
        .bind(new.enabled)
        .bind(&new.schedule)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(ResearchConfig {
            id,
            name: new.name,
            description: new.description,
            prompt: new.prompt,
            category: new.category,
            topics: new.topics,
            preferred_sources: new.preferred_sources,
            blocked_sources: new.blocked_sources,
            enabled: new.enabled,
            schedule: new.schedule,
            created_at: now,
            updated_at: now,
        })
    }

    /// Applies `patch` on top of the stored row. Returns `None` when the
    /// config does not exist.
    pub async fn update(
        &self,
        id: &str,
        patch: ConfigPatch,
    ) -> Result<Option<ResearchConfig>, StoreError> {
        let Some(mut config) = self.get(id).await? else {
            return Ok(None);
        };

        if let Some(name) = patch.name {
            config.name = name;
        }
        if let Some(description) = patch.description {
            config.description = description;
        }
        if let Some(prompt) = patch.prompt {
            config.prompt = prompt;
        }
        if let Some(category) = patch.category {
            config.category = category;
        }
        if let Some(topics) = patch.topics {
            config.topics = topics;
        }
        if let Some(preferred) = patch.preferred_sources {
            config.preferred_sources = preferred;
        }
        if let Some(blocked) = patch.blocked_sources {
            config.blocked_sources = blocked;
        }
        if let Some(enabled) = patch.enabled {
            config.enabled = enabled;
        }
        if let Some(schedule) = patch.schedule {
            config.schedule = schedule;
        }
        config.updated_at = Utc::now();

        sqlx::query(
            "UPDATE research_configs
             SET name = ?, description = ?, prompt = ?, category = ?, topics = ?,
                 preferred_sources = ?, blocked_sources = ?, enabled = ?,
                 schedule = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&config.name)
        .bind(&config.description)
        .bind(&config.prompt)
        .bind(config.category.as_db())
        .bind(json_list(&config.topics))
        .bind(json_list(&config.preferred_sources))
        .bind(json_list(&config.blocked_sources))
        .bind(config.enabled)
        .bind(&config.schedule)
        .bind(config.updated_at.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(Some(config))
    }

    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM research_configs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_config(row: &sqlx::sqlite::SqliteRow) -> Result<ResearchConfig, StoreError> {
    let created_at_raw: String = row.get("created_at");
    let updated_at_raw: String = row.get("updated_at");
    let category_raw: String = row.get("category");
    let description: Option<String> = row.get("description");

    Ok(ResearchConfig {
        id: row.get("id"),
        name: row.get("name"),
        description: description.unwrap_or_default(),
        prompt: row.get("prompt"),
        category: Category::from_db(&category_raw),
        topics: parse_string_list("research_configs", row.get("topics"))?,
        preferred_sources: parse_string_list("research_configs", row.get("preferred_sources"))?,
        blocked_sources: parse_string_list("research_configs", row.get("blocked_sources"))?,
        enabled: row.get("enabled"),
        schedule: row.get("schedule"),
        created_at: parse_rfc3339("research_configs", &created_at_raw)?,
        updated_at: parse_rfc3339("research_configs", &updated_at_raw)?,
    })
}

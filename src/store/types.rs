use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Research vertical a config belongs to. Drives prompt framing and report
/// grouping.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Category {
    Papers,
    News,
    Markets,
    Politics,
}

impl Category {
    pub(crate) fn as_db(self) -> &'static str {
        match self {
            Self::Papers => "papers",
            Self::News => "news",
            Self::Markets => "markets",
            Self::Politics => "politics",
        }
    }

    pub(crate) fn from_db(raw: &str) -> Self {
        raw.parse().unwrap_or(Self::Papers)
    }
}

/// A saved research job definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub prompt: String,
    pub category: Category,
    pub topics: Vec<String>,
    pub preferred_sources: Vec<String>,
    pub blocked_sources: Vec<String>,
    pub enabled: bool,
    pub schedule: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a config. Optional fields fall back to the same
/// defaults the seed data uses.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub prompt: String,
    pub category: Category,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub preferred_sources: Vec<String>,
    #[serde(default)]
    pub blocked_sources: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_schedule")]
    pub schedule: String,
}

fn default_enabled() -> bool {
    true
}

fn default_schedule() -> String {
    "0 6 * * *".to_string()
}

/// Partial update for an existing config. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub prompt: Option<String>,
    pub category: Option<Category>,
    pub topics: Option<Vec<String>>,
    pub preferred_sources: Option<Vec<String>>,
    pub blocked_sources: Option<Vec<String>>,
    pub enabled: Option<bool>,
    pub schedule: Option<String>,
}

/// One generated research digest, with its items attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchReport {
    pub id: String,
    pub config_id: String,
    pub config_name: String,
    pub category: Category,
    pub generated_at: DateTime<Utc>,
    pub summary: String,
    pub items: Vec<ResearchItem>,
}

/// A single finding inside a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchItem {
    pub id: String,
    pub report_id: String,
    pub title: String,
    pub source: String,
    pub url: String,
    pub summary: String,
    pub relevance_score: f64,
    pub published_at: Option<String>,
    pub category: Category,
    pub tags: Vec<String>,
}

/// Report fields supplied by the engine when persisting a run.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub config_id: String,
    pub config_name: String,
    pub category: Category,
    pub summary: String,
}

/// Item fields supplied by the engine. The store assigns ids and stamps the
/// report's category onto each row.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub title: String,
    pub source: String,
    pub url: String,
    pub summary: String,
    pub relevance_score: f64,
    pub published_at: Option<String>,
    pub tags: Vec<String>,
}

/// Standard page envelope for list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_db_text() {
        for category in [
            Category::Papers,
            Category::News,
            Category::Markets,
            Category::Politics,
        ] {
            assert_eq!(Category::from_db(category.as_db()), category);
        }
    }

    #[test]
    fn category_from_db_tolerates_unknown_text() {
        assert_eq!(Category::from_db("blogs"), Category::Papers);
        assert_eq!(Category::from_db("NEWS"), Category::News);
    }

    #[test]
    fn category_serializes_lowercase() {
        let json = serde_json::to_string(&Category::Markets).unwrap();
        assert_eq!(json, "\"markets\"");
    }

    #[test]
    fn new_config_defaults_apply() {
        let raw = r#"{"name":"Quantum","prompt":"Track quantum computing","category":"papers"}"#;
        let config: NewConfig = serde_json::from_str(raw).unwrap();
        assert!(config.enabled);
        assert_eq!(config.schedule, "0 6 * * *");
        assert!(config.topics.is_empty());
        assert!(config.preferred_sources.is_empty());
    }

    #[test]
    fn report_serializes_camel_case() {
        let report = ResearchReport {
            id: "r1".into(),
            config_id: "c1".into(),
            config_name: "AI/ML Research".into(),
            category: Category::Papers,
            generated_at: Utc::now(),
            summary: "Two new papers".into(),
            items: vec![],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("configId").is_some());
        assert!(json.get("generatedAt").is_some());
        assert!(json.get("config_id").is_none());
    }
}

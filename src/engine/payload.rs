use serde::Deserialize;

use crate::error::EngineError;

/// The document a research run is instructed to return. Degraded payloads
/// (empty items, diagnostic summary) stand in when a run produces nothing
/// usable, so callers always get a value to persist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResearchPayload {
    pub summary: String,
    pub items: Vec<PayloadItem>,
}

impl ResearchPayload {
    pub fn degraded(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            items: Vec::new(),
        }
    }
}

/// One candidate finding. Only the title is required; models are reliably
/// sloppy about the rest, so every other field tolerates absence.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadItem {
    pub title: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub relevance_score: f64,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Deserialize)]
struct RawPayload {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    items: Option<Vec<PayloadItem>>,
}

/// Cuts a fenced code block (``` or ```json) down to its body. Models often
/// wrap the JSON document even when told not to. Text without a closed fence
/// comes back trimmed but otherwise untouched.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let body = &trimmed[start + 3..];
    let body = body.strip_prefix("json").unwrap_or(body);
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => trimmed,
    }
}

/// Parses a run's text output into a typed payload, unwrapping a markdown
/// fence first if one is present.
pub fn parse_payload(text: &str) -> Result<ResearchPayload, EngineError> {
    let raw: RawPayload = serde_json::from_str(strip_code_fences(text))?;
    if raw.items.is_none() {
        tracing::warn!("research payload has no items array");
    }
    Ok(ResearchPayload {
        summary: raw.summary.unwrap_or_default(),
        items: raw.items.unwrap_or_default(),
    })
}

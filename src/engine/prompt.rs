use chrono::NaiveDate;

use crate::config::ResearchTuning;
use crate::store::{Category, ResearchConfig};

/// The output contract appended to every research instruction. The payload
/// parser in this module's sibling expects exactly this shape back.
const JSON_CONTRACT: &str = r#"Return your findings as JSON in this exact format:
{
  "summary": "A brief 2-3 sentence overview of the key findings",
  "items": [
    {
      "title": "Article/Paper Title",
      "source": "Source name (publication, website, author)",
      "url": "Full URL to the content",
      "summary": "2-3 sentence summary of this item",
      "relevanceScore": 8.5,
      "publishedAt": "YYYY-MM-DD",
      "tags": ["tag1", "tag2"]
    }
  ]
}

Rules:
- relevanceScore must be between 1-10
- publishedAt must be in YYYY-MM-DD format
- tags should be lowercase
- Only return valid JSON"#;

fn category_framing(category: Category) -> &'static str {
    match category {
        Category::Papers => "research papers and technical articles",
        Category::News => "tech news stories and announcements",
        Category::Markets => "market news and financial updates",
        Category::Politics => "political and federal policy developments",
    }
}

/// Assembles the dated natural-language instruction for one research run:
/// category framing, the config's steering prompt and topics, the recency
/// and item-count bounds, source hints, and the JSON output contract.
pub fn build_research_prompt(
    config: &ResearchConfig,
    tuning: &ResearchTuning,
    today: NaiveDate,
    trusted_domains: &[String],
) -> String {
    let topics = config.topics.join(", ");
    let window = tuning.recency_window_days;

    let mut prompt = format!(
        "TODAY'S DATE: {today}\n\
         \n\
         You are a research analyst. Find the TOP {framing} published in the last {window} days.\n\
         \n\
         {steering}\n\
         \n\
         Topics to focus on: {topics}\n\
         \n\
         IMPORTANT REQUIREMENTS:\n\
         - Only include content published within the last {window} days (since {today})\n\
         - Return up to {max_items} items maximum (focus on quality over quantity)\n\
         - Provide real, verifiable URLs\n\
         - Sort by relevance and recency (most relevant/recent first)\n\
         - Include notable social media discourse from key figures if relevant\n",
        framing = category_framing(config.category),
        steering = config.prompt.trim(),
        max_items = tuning.max_items,
    );

    let preferred = preferred_domains(config, trusted_domains);
    if !preferred.is_empty() {
        prompt.push_str(&format!(
            "- Prefer these sources when relevant: {}\n",
            preferred.join(", ")
        ));
    }
    if !config.blocked_sources.is_empty() {
        prompt.push_str(&format!(
            "- Never cite these sources: {}\n",
            config.blocked_sources.join(", ")
        ));
    }

    prompt.push('\n');
    prompt.push_str(JSON_CONTRACT);
    prompt
}

/// Config-preferred domains first, then trust-scorer hints, deduplicated
/// case-insensitively so a hint never repeats an explicit preference.
fn preferred_domains(config: &ResearchConfig, trusted_domains: &[String]) -> Vec<String> {
    let mut domains = config.preferred_sources.clone();
    for domain in trusted_domains {
        if !domains
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(domain))
        {
            domains.push(domain.clone());
        }
    }
    domains
}

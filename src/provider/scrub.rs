use std::borrow::Cow;

const MAX_API_ERROR_CHARS: usize = 200;

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '+' | '/' | '=')
}

fn redact_after(text: &mut String, marker: &str) {
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find(marker) {
        let start = search_from + rel;
        let token_start = start + marker.len();
        let token_end = text[token_start..]
            .char_indices()
            .take_while(|(_, c)| is_token_char(*c))
            .last()
            .map_or(token_start, |(i, c)| token_start + i + c.len_utf8());

        if token_end == token_start {
            search_from = token_start;
            continue;
        }

        text.replace_range(start..token_end, "[REDACTED]");
        search_from = start + "[REDACTED]".len();
    }
}

/// Redacts key-like tokens from provider error bodies before they reach
/// logs or the audit ledger.
pub fn scrub_secrets(input: &str) -> Cow<'_, str> {
    const MARKERS: [&str; 4] = ["sk-", "Bearer ", "api_key=", "\"api_key\":\""];

    if !MARKERS.iter().any(|marker| input.contains(marker)) {
        return Cow::Borrowed(input);
    }

    let mut scrubbed = input.to_string();
    for marker in MARKERS {
        redact_after(&mut scrubbed, marker);
    }
    Cow::Owned(scrubbed)
}

/// Scrubs secrets and truncates long provider error bodies.
pub fn sanitize_api_error(body: &str) -> String {
    let scrubbed = scrub_secrets(body);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed.into_owned();
    }

    let scrubbed = scrubbed.as_ref();
    let mut end = MAX_API_ERROR_CHARS;
    while end > 0 && !scrubbed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &scrubbed[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrubs_openai_keys() {
        let scrubbed = scrub_secrets("invalid key sk-proj-abc123DEF provided");
        assert_eq!(scrubbed, "invalid key [REDACTED] provided");
    }

    #[test]
    fn scrubs_bearer_tokens() {
        let scrubbed = scrub_secrets("header was Bearer sk-live-xyz, rejecting");
        assert!(!scrubbed.contains("xyz"));
        assert!(scrubbed.contains("[REDACTED]"));
    }

    #[test]
    fn leaves_clean_text_alone() {
        let input = "model overloaded, try again later";
        assert!(matches!(scrub_secrets(input), Cow::Borrowed(_)));
    }

    #[test]
    fn bare_marker_without_token_is_kept() {
        let scrubbed = scrub_secrets("ends with sk-");
        assert_eq!(scrubbed, "ends with sk-");
    }

    #[test]
    fn sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_api_error(&body);
        assert_eq!(sanitized.chars().count(), MAX_API_ERROR_CHARS + 3);
        assert!(sanitized.ends_with("..."));
    }

    #[test]
    fn sanitize_respects_char_boundaries() {
        let body = "é".repeat(300);
        let sanitized = sanitize_api_error(&body);
        assert!(sanitized.ends_with("..."));
    }
}

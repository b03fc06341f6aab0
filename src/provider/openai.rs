use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::response::ResponseObject;
use super::scrub::sanitize_api_error;
use super::{ResearchProvider, ResearchRequest};
use crate::error::ProviderError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for the OpenAI Responses API, used in background mode so deep
/// research runs survive connection timeouts.
pub struct OpenAiResponsesClient {
    /// Pre-computed `Bearer <key>` header value.
    cached_auth: Option<String>,
    responses_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct CreateResponseRequest<'a> {
    model: &'a str,
    input: Vec<InputMessage<'a>>,
    tools: Vec<ToolRequest>,
    background: bool,
}

#[derive(Debug, Serialize)]
struct InputMessage<'a> {
    role: &'static str,
    content: Vec<InputContent<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputContent<'a> {
    InputText { text: &'a str },
}

#[derive(Debug, Serialize)]
struct ToolRequest {
    #[serde(rename = "type")]
    kind: &'static str,
}

impl OpenAiResponsesClient {
    pub fn new(api_key: Option<&str>) -> Self {
        Self::with_base_url(api_key, None)
    }

    pub fn with_base_url(api_key: Option<&str>, base_url: Option<&str>) -> Self {
        let base = base_url
            .map_or(DEFAULT_BASE_URL, |url| url.trim_end_matches('/'))
            .to_string();
        let cached_auth = api_key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(|key| format!("Bearer {key}"));

        Self {
            cached_auth,
            responses_url: format!("{base}/responses"),
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .connect_timeout(std::time::Duration::from_secs(10))
                .pool_max_idle_per_host(10)
                .pool_idle_timeout(std::time::Duration::from_secs(90))
                .tcp_keepalive(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn auth(&self) -> Result<&str, ProviderError> {
        self.cached_auth
            .as_deref()
            .ok_or(ProviderError::MissingCredentials)
    }

    fn build_request<'a>(request: &'a ResearchRequest) -> CreateResponseRequest<'a> {
        CreateResponseRequest {
            model: &request.model,
            input: vec![InputMessage {
                role: "user",
                content: vec![InputContent::InputText {
                    text: &request.prompt,
                }],
            }],
            tools: vec![ToolRequest {
                kind: "web_search_preview",
            }],
            background: true,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
        let message = sanitize_api_error(&body);

        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited { message });
        }
        Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ResearchProvider for OpenAiResponsesClient {
    async fn submit(&self, request: &ResearchRequest) -> Result<ResponseObject, ProviderError> {
        let auth = self.auth()?;
        let body = Self::build_request(request);

        let response = self
            .client
            .post(&self.responses_url)
            .header("Authorization", auth)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn retrieve(&self, response_id: &str) -> Result<ResponseObject, ProviderError> {
        let auth = self.auth()?;
        let url = format!("{}/{response_id}", self.responses_url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", auth)
            .send()
            .await?;

        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_with_key() {
        let client = OpenAiResponsesClient::new(Some("sk-test123"));
        assert_eq!(client.cached_auth.as_deref(), Some("Bearer sk-test123"));
        assert_eq!(client.responses_url, "https://api.openai.com/v1/responses");
    }

    #[test]
    fn creates_without_key() {
        let client = OpenAiResponsesClient::new(None);
        assert!(client.cached_auth.is_none());
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let client = OpenAiResponsesClient::new(Some("   "));
        assert!(client.cached_auth.is_none());
    }

    #[test]
    fn key_is_trimmed() {
        let client = OpenAiResponsesClient::new(Some("  sk-test  "));
        assert_eq!(client.cached_auth.as_deref(), Some("Bearer sk-test"));
    }

    #[test]
    fn custom_base_url_trims_trailing_slash() {
        let client =
            OpenAiResponsesClient::with_base_url(Some("sk-test"), Some("http://127.0.0.1:9999/"));
        assert_eq!(client.responses_url, "http://127.0.0.1:9999/responses");
    }

    #[tokio::test]
    async fn submit_fails_without_credentials() {
        let client = OpenAiResponsesClient::new(None);
        let request = ResearchRequest {
            model: "o4-mini-deep-research-2025-06-26".into(),
            prompt: "find things".into(),
        };
        let err = client.submit(&request).await.expect_err("no key");
        assert!(matches!(err, ProviderError::MissingCredentials));
    }

    #[test]
    fn request_body_matches_responses_wire_shape() {
        let request = ResearchRequest {
            model: "o4-mini-deep-research-2025-06-26".into(),
            prompt: "find things".into(),
        };
        let body = OpenAiResponsesClient::build_request(&request);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "o4-mini-deep-research-2025-06-26");
        assert_eq!(json["background"], true);
        assert_eq!(json["tools"][0]["type"], "web_search_preview");
        assert_eq!(json["input"][0]["role"], "user");
        assert_eq!(json["input"][0]["content"][0]["type"], "input_text");
        assert_eq!(json["input"][0]["content"][0]["text"], "find things");
    }
}

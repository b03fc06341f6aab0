//! Research provider abstraction and the OpenAI Responses implementation.

mod openai;
mod response;
mod scrub;

pub use openai::OpenAiResponsesClient;
pub use response::{ContentPart, OutputItem, ResponseError, ResponseObject, RunStatus, Usage};
pub use scrub::{sanitize_api_error, scrub_secrets};

use async_trait::async_trait;

use crate::error::ProviderError;

/// What the engine hands to a provider to start a run.
#[derive(Debug, Clone)]
pub struct ResearchRequest {
    pub model: String,
    pub prompt: String,
}

/// A backend capable of running long research jobs in the background.
///
/// `submit` starts a run and returns immediately; the engine then calls
/// `retrieve` until the run reaches a terminal status.
#[async_trait]
pub trait ResearchProvider: Send + Sync {
    async fn submit(&self, request: &ResearchRequest) -> Result<ResponseObject, ProviderError>;

    async fn retrieve(&self, response_id: &str) -> Result<ResponseObject, ProviderError>;
}

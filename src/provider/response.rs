use serde::{Deserialize, Serialize};

/// Run states reported by the Responses API. Anything unrecognized keeps
/// the poller waiting rather than aborting the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Incomplete,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// The run is finished and polling again will not change it.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Incomplete => "incomplete",
            Self::Unknown => "unknown",
        }
    }
}

/// A response object as returned by both the create and retrieve calls.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseObject {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub error: Option<ResponseError>,
    /// Convenience field some responses carry alongside the output list.
    #[serde(default)]
    pub output_text: Option<String>,
}

/// One entry in the response output list.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    WebSearchCall,
    Message {
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    #[serde(other)]
    Other,
}

/// Content inside a message output item.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    OutputText { text: String },
    #[serde(other)]
    Other,
}

/// Token counts attached to a completed run.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ResponseObject {
    /// Number of web searches the run performed.
    pub fn web_search_calls(&self) -> i64 {
        let count = self
            .output
            .iter()
            .filter(|item| matches!(item, OutputItem::WebSearchCall))
            .count();
        i64::try_from(count).unwrap_or(i64::MAX)
    }

    /// The text payload of the run: the first `output_text` part of the
    /// last message item, falling back to the top-level `output_text`
    /// field. Empty strings count as absent.
    pub fn primary_text(&self) -> Option<&str> {
        let mut found = None;
        for item in &self.output {
            if let OutputItem::Message { content } = item {
                let text = content.iter().find_map(|part| match part {
                    ContentPart::OutputText { text } => Some(text.as_str()),
                    ContentPart::Other => None,
                });
                if let Some(text) = text {
                    found = Some(text);
                }
            }
        }

        found
            .filter(|text| !text.is_empty())
            .or_else(|| self.output_text.as_deref().filter(|text| !text.is_empty()))
    }

    pub fn usage_tokens(&self) -> (i64, i64) {
        self.usage
            .map_or((0, 0), |usage| (usage.input_tokens, usage.output_tokens))
    }

    /// Best-effort failure description for failed or cancelled runs.
    pub fn error_message(&self) -> String {
        self.error
            .as_ref()
            .and_then(|error| error.message.clone())
            .unwrap_or_else(|| "Unknown error".to_string())
    }
}

pub mod gemini;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::models::Role;

/// Incremental text fragments in the order the model produced them.
pub type TokenStream = BoxStream<'static, Result<String, ModelError>>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("GEMINI_API_KEY is not configured")]
    MissingApiKey,

    #[error("upstream rate limit exceeded")]
    RateLimited,

    #[error("upstream quota exhausted")]
    QuotaExhausted,

    #[error("upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed upstream payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("model returned no content")]
    Empty,
}

impl ModelError {
    /// Classifies a non-success upstream status.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => ModelError::RateLimited,
            402 => ModelError::QuotaExhausted,
            _ => ModelError::Upstream { status, body },
        }
    }
}

/// One prior turn of the conversation, in our own role vocabulary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Raw bytes sent inline with the user turn (an image or an audio clip).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineData {
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    pub system_prompt: Option<String>,
    pub history: Vec<Turn>,
    pub message: String,
    pub attachment: Option<InlineData>,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Opens a streaming generation. Errors before the first fragment are
    /// returned here; errors after that arrive as items of the stream.
    async fn stream(&self, request: &GenerationRequest) -> Result<TokenStream, ModelError>;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ModelError>;
}

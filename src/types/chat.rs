use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::llm::Turn;
use crate::models::Role;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatAiRequest {
    pub message: Option<String>,
    /// Unknown or missing subjects get the general tutor prompt.
    pub subject: Option<String>,
    /// When no history is sent, prior turns are loaded from this conversation.
    pub conversation_id: Option<Uuid>,
    /// `data:<mime>;base64,<payload>`
    pub image_data: Option<String>,
    pub conversation_history: Option<Vec<HistoryEntry>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl From<HistoryEntry> for Turn {
    fn from(entry: HistoryEntry) -> Self {
        Turn {
            role: entry.role,
            content: entry.content,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TranscriptionResponse {
    pub text: String,
}

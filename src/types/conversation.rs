use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Conversation, InputType};

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreateConversationRequest {
    pub subject: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateConversationRequest {
    pub title: Option<String>,
    pub subject: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Case-insensitive match against title and preview.
    pub q: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LatestConversationResponse {
    pub conversation: Option<Conversation>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRequest {
    pub message: Option<String>,
    pub image_data: Option<String>,
    pub input_type: Option<InputType>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(type_name = "role_enum", rename_all = "lowercase")] // SQL value name
#[serde(rename_all = "lowercase")] // JSON value name
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(type_name = "input_type_enum", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Text,
    Voice,
    Image,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: Role,
    pub content: String,
    pub input_type: Option<InputType>,
    pub created_at: DateTime<Utc>,
}

impl Default for Message {
    fn default() -> Self {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::nil(),
            role: Role::User,
            content: String::new(),
            input_type: None,
            created_at: Utc::now(),
        }
    }
}

/// A message that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub input_type: Option<InputType>,
}

impl NewMessage {
    pub fn user(content: impl Into<String>, input_type: InputType) -> Self {
        NewMessage {
            role: Role::User,
            content: content.into(),
            input_type: Some(input_type),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        NewMessage {
            role: Role::Assistant,
            content: content.into(),
            input_type: None,
        }
    }

    pub fn into_message(self, conversation_id: Uuid) -> Message {
        Message {
            conversation_id,
            role: self.role,
            content: self.content,
            input_type: self.input_type,
            ..Default::default()
        }
    }
}

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    Conversation, ConversationSummary, EducationLevel, Message, NewMessage, Subject, UserProfile,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence for conversations, messages and profiles.
///
/// Every call is scoped by the authenticated user: rows owned by someone
/// else behave as if they did not exist.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(
        &self,
        user_id: &str,
        subject: Subject,
        title: Option<&str>,
    ) -> Result<Conversation>;

    async fn get_conversation(&self, user_id: &str, id: Uuid) -> Result<Option<Conversation>>;

    /// The most recently updated conversation.
    async fn latest_conversation(&self, user_id: &str) -> Result<Option<Conversation>>;

    /// Newest first, each with a preview of its first user message.
    async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>>;

    async fn update_conversation(
        &self,
        user_id: &str,
        id: Uuid,
        title: Option<&str>,
        subject: Option<Subject>,
    ) -> Result<Option<Conversation>>;

    /// Removes the conversation and all of its messages. Returns `false` when nothing matched.
    async fn delete_conversation(&self, user_id: &str, id: Uuid) -> Result<bool>;

    /// Stores a message and refreshes the conversation's `updated_at`; the
    /// first user message also replaces a default title.
    async fn append_message(
        &self,
        user_id: &str,
        conversation_id: Uuid,
        message: NewMessage,
    ) -> Result<Option<Message>>;

    /// In creation order. `None` when the conversation is not the user's.
    async fn list_messages(&self, user_id: &str, conversation_id: Uuid)
        -> Result<Option<Vec<Message>>>;

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;

    async fn upsert_profile(
        &self,
        user_id: &str,
        age: i32,
        education_level: EducationLevel,
    ) -> Result<UserProfile>;
}

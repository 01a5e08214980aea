use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::ConversationStore;
use crate::models::conversation::derive_title;
use crate::models::{
    Conversation, ConversationSummary, EducationLevel, Message, NewMessage, Role, Subject,
    UserProfile,
};

#[derive(Default)]
struct Tables {
    /// Creation order.
    conversations: Vec<Conversation>,
    /// Creation order across all conversations.
    messages: Vec<Message>,
    profiles: HashMap<String, UserProfile>,
}

/// Process-local store for running without a database.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn owned_mut(&mut self, user_id: &str, id: Uuid) -> Option<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|c| c.id == id && c.user_id == user_id)
    }

    fn owned(&self, user_id: &str, id: Uuid) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|c| c.id == id && c.user_id == user_id)
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(
        &self,
        user_id: &str,
        subject: Subject,
        title: Option<&str>,
    ) -> Result<Conversation> {
        let conversation = Conversation::new(user_id, subject, title);
        self.tables.write().await.conversations.push(conversation.clone());
        debug!("Conversation created: {:?}", conversation);
        Ok(conversation)
    }

    async fn get_conversation(&self, user_id: &str, id: Uuid) -> Result<Option<Conversation>> {
        Ok(self.tables.read().await.owned(user_id, id).cloned())
    }

    async fn latest_conversation(&self, user_id: &str) -> Result<Option<Conversation>> {
        let tables = self.tables.read().await;
        // max_by_key keeps the last maximum, i.e. the newest of equally fresh conversations.
        Ok(tables
            .conversations
            .iter()
            .filter(|c| c.user_id == user_id)
            .max_by_key(|c| c.updated_at)
            .cloned())
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        let tables = self.tables.read().await;
        let mut summaries: Vec<ConversationSummary> = tables
            .conversations
            .iter()
            .rev()
            .filter(|c| c.user_id == user_id)
            .map(|c| {
                let first_user_message = tables
                    .messages
                    .iter()
                    .find(|m| m.conversation_id == c.id && m.role == Role::User)
                    .map(|m| m.content.as_str());
                ConversationSummary::new(c.clone(), first_user_message)
            })
            .collect();
        summaries.sort_by(|a, b| b.conversation.updated_at.cmp(&a.conversation.updated_at));
        Ok(summaries)
    }

    async fn update_conversation(
        &self,
        user_id: &str,
        id: Uuid,
        title: Option<&str>,
        subject: Option<Subject>,
    ) -> Result<Option<Conversation>> {
        let mut tables = self.tables.write().await;
        let Some(conversation) = tables.owned_mut(user_id, id) else {
            return Ok(None);
        };
        if let Some(title) = title {
            conversation.title = title.to_string();
        }
        if let Some(subject) = subject {
            conversation.subject = subject;
        }
        conversation.updated_at = Utc::now();
        Ok(Some(conversation.clone()))
    }

    async fn delete_conversation(&self, user_id: &str, id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.owned(user_id, id).is_none() {
            return Ok(false);
        }
        tables.conversations.retain(|c| c.id != id);
        tables.messages.retain(|m| m.conversation_id != id);
        debug!("Conversation deleted with id: {:?}", id);
        Ok(true)
    }

    async fn append_message(
        &self,
        user_id: &str,
        conversation_id: Uuid,
        message: NewMessage,
    ) -> Result<Option<Message>> {
        let mut tables = self.tables.write().await;
        let Some(conversation) = tables.owned_mut(user_id, conversation_id) else {
            return Ok(None);
        };

        if message.role == Role::User && conversation.has_default_title() {
            if let Some(title) = derive_title(&message.content) {
                conversation.title = title;
            }
        }
        let message = message.into_message(conversation_id);
        conversation.updated_at = message.created_at;

        tables.messages.push(message.clone());
        Ok(Some(message))
    }

    async fn list_messages(
        &self,
        user_id: &str,
        conversation_id: Uuid,
    ) -> Result<Option<Vec<Message>>> {
        let tables = self.tables.read().await;
        if tables.owned(user_id, conversation_id).is_none() {
            return Ok(None);
        }
        Ok(Some(
            tables
                .messages
                .iter()
                .filter(|m| m.conversation_id == conversation_id)
                .cloned()
                .collect(),
        ))
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.tables.read().await.profiles.get(user_id).cloned())
    }

    async fn upsert_profile(
        &self,
        user_id: &str,
        age: i32,
        education_level: EducationLevel,
    ) -> Result<UserProfile> {
        let mut tables = self.tables.write().await;
        let profile = tables
            .profiles
            .entry(user_id.to_string())
            .and_modify(|p| {
                p.age = age;
                p.education_level = education_level;
                p.updated_at = Utc::now();
            })
            .or_insert_with(|| UserProfile::new(user_id, age, education_level));
        Ok(profile.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InputType;

    #[tokio::test]
    async fn deleting_a_conversation_removes_its_messages() {
        let store = MemoryStore::new();
        let keep = store.create_conversation("u1", Subject::Math, None).await.unwrap();
        let doomed = store.create_conversation("u1", Subject::Math, None).await.unwrap();
        for conversation in [&keep, &doomed] {
            store
                .append_message("u1", conversation.id, NewMessage::user("hi", InputType::Text))
                .await
                .unwrap()
                .unwrap();
        }

        assert!(store.delete_conversation("u1", doomed.id).await.unwrap());
        assert!(store.list_messages("u1", doomed.id).await.unwrap().is_none());
        assert!(!store.tables.read().await.messages.iter().any(|m| m.conversation_id == doomed.id));
        assert_eq!(store.list_messages("u1", keep.id).await.unwrap().unwrap().len(), 1);
        assert!(!store.delete_conversation("u1", doomed.id).await.unwrap());
    }

    #[tokio::test]
    async fn other_users_cannot_see_or_touch_a_conversation() {
        let store = MemoryStore::new();
        let conversation = store.create_conversation("owner", Subject::General, None).await.unwrap();

        assert!(store.get_conversation("intruder", conversation.id).await.unwrap().is_none());
        assert!(store
            .append_message("intruder", conversation.id, NewMessage::assistant("x"))
            .await
            .unwrap()
            .is_none());
        assert!(!store.delete_conversation("intruder", conversation.id).await.unwrap());
        assert!(store.list_conversations("intruder").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn first_user_message_titles_the_conversation_and_bumps_it() {
        let store = MemoryStore::new();
        let older = store.create_conversation("u", Subject::Math, None).await.unwrap();
        let newer = store.create_conversation("u", Subject::Science, None).await.unwrap();
        assert_eq!(store.latest_conversation("u").await.unwrap().unwrap().id, newer.id);

        store
            .append_message("u", older.id, NewMessage::user("What is 2+2?", InputType::Text))
            .await
            .unwrap();
        store
            .append_message("u", older.id, NewMessage::user("And 3+3?", InputType::Text))
            .await
            .unwrap();

        let latest = store.latest_conversation("u").await.unwrap().unwrap();
        assert_eq!(latest.id, older.id);
        assert_eq!(latest.title, "What is 2+2?");

        let listed = store.list_conversations("u").await.unwrap();
        assert_eq!(listed[0].conversation.id, older.id);
        assert_eq!(listed[0].preview, "What is 2+2?");
        assert_eq!(listed[1].preview, "No messages yet");
    }

    #[tokio::test]
    async fn profile_upsert_replaces_fields() {
        let store = MemoryStore::new();
        assert!(store.get_profile("u").await.unwrap().is_none());

        let created = store.upsert_profile("u", 10, EducationLevel::Fifth).await.unwrap();
        let updated = store.upsert_profile("u", 11, EducationLevel::Sixth).await.unwrap();
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.age, 11);
        assert_eq!(
            store.get_profile("u").await.unwrap().unwrap().education_level,
            EducationLevel::Sixth
        );
    }
}

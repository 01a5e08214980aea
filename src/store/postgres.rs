use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{query, query_as, FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::ConversationStore;
use crate::models::conversation::{derive_title, DEFAULT_TITLE};
use crate::models::{
    Conversation, ConversationSummary, EducationLevel, Message, NewMessage, Role, Subject,
    UserProfile,
};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

#[derive(FromRow)]
struct SummaryRow {
    #[sqlx(flatten)]
    conversation: Conversation,
    first_user_message: Option<String>,
}

#[async_trait]
impl ConversationStore for PgStore {
    async fn create_conversation(
        &self,
        user_id: &str,
        subject: Subject,
        title: Option<&str>,
    ) -> Result<Conversation> {
        let conversation = Conversation::new(user_id, subject, title);
        let conversation = query_as::<_, Conversation>(
            r#"
            INSERT INTO chat_conversations (id, user_id, title, subject, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(conversation.id)
        .bind(&conversation.user_id)
        .bind(&conversation.title)
        .bind(conversation.subject)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .fetch_one(&self.pool)
        .await?;

        debug!("Conversation created: {:?}", conversation);
        Ok(conversation)
    }

    async fn get_conversation(&self, user_id: &str, id: Uuid) -> Result<Option<Conversation>> {
        let conversation = query_as::<_, Conversation>(
            r#"
            SELECT * FROM chat_conversations
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(conversation)
    }

    async fn latest_conversation(&self, user_id: &str) -> Result<Option<Conversation>> {
        let conversation = query_as::<_, Conversation>(
            r#"
            SELECT * FROM chat_conversations
            WHERE user_id = $1
            ORDER BY updated_at DESC, created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(conversation)
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        let rows = query_as::<_, SummaryRow>(
            r#"
            SELECT c.*, (
                SELECT m.content FROM chat_messages m
                WHERE m.conversation_id = c.id AND m.role = 'user'
                ORDER BY m.created_at ASC
                LIMIT 1
            ) AS first_user_message
            FROM chat_conversations c
            WHERE c.user_id = $1
            ORDER BY c.updated_at DESC, c.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ConversationSummary::new(row.conversation, row.first_user_message.as_deref()))
            .collect())
    }

    async fn update_conversation(
        &self,
        user_id: &str,
        id: Uuid,
        title: Option<&str>,
        subject: Option<Subject>,
    ) -> Result<Option<Conversation>> {
        let conversation = query_as::<_, Conversation>(
            r#"
            UPDATE chat_conversations
            SET title = COALESCE($1, title),
                subject = COALESCE($2, subject),
                updated_at = $3
            WHERE id = $4 AND user_id = $5
            RETURNING *
            "#,
        )
        .bind(title)
        .bind(subject)
        .bind(Utc::now())
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        debug!("Conversation updated: {:?}", conversation);
        Ok(conversation)
    }

    async fn delete_conversation(&self, user_id: &str, id: Uuid) -> Result<bool> {
        // Messages go with the conversation through ON DELETE CASCADE.
        let result = query(
            r#"
            DELETE FROM chat_conversations
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        debug!("Conversation deleted with id: {:?}", id);
        Ok(result.rows_affected() > 0)
    }

    async fn append_message(
        &self,
        user_id: &str,
        conversation_id: Uuid,
        message: NewMessage,
    ) -> Result<Option<Message>> {
        let mut tx = self.pool.begin().await?;

        let Some(conversation) = query_as::<_, Conversation>(
            r#"
            SELECT * FROM chat_conversations
            WHERE id = $1 AND user_id = $2
            FOR UPDATE
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        let title = match message.role {
            Role::User if conversation.title == DEFAULT_TITLE => derive_title(&message.content),
            _ => None,
        };

        let message = message.into_message(conversation_id);
        let message = query_as::<_, Message>(
            r#"
            INSERT INTO chat_messages (id, conversation_id, role, content, input_type, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.role)
        .bind(&message.content)
        .bind(message.input_type)
        .bind(message.created_at)
        .fetch_one(&mut *tx)
        .await?;

        query(
            r#"
            UPDATE chat_conversations
            SET title = COALESCE($1, title), updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(title)
        .bind(message.created_at)
        .bind(conversation_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(message))
    }

    async fn list_messages(
        &self,
        user_id: &str,
        conversation_id: Uuid,
    ) -> Result<Option<Vec<Message>>> {
        if self.get_conversation(user_id, conversation_id).await?.is_none() {
            return Ok(None);
        }
        let messages = query_as::<_, Message>(
            r#"
            SELECT * FROM chat_messages
            WHERE conversation_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(Some(messages))
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let profile = query_as::<_, UserProfile>(
            r#"
            SELECT * FROM user_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn upsert_profile(
        &self,
        user_id: &str,
        age: i32,
        education_level: EducationLevel,
    ) -> Result<UserProfile> {
        let profile = UserProfile::new(user_id, age, education_level);
        let profile = query_as::<_, UserProfile>(
            r#"
            INSERT INTO user_profiles (user_id, age, education_level, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE
            SET age = EXCLUDED.age,
                education_level = EXCLUDED.education_level,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(&profile.user_id)
        .bind(profile.age)
        .bind(profile.education_level)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .fetch_one(&self.pool)
        .await?;

        debug!("Profile upserted: {:?}", profile);
        Ok(profile)
    }
}

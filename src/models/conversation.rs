use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use utoipa::ToSchema;
use uuid::Uuid;

pub const DEFAULT_TITLE: &str = "New Conversation";
const TITLE_CHARS: usize = 60;
const PREVIEW_CHARS: usize = 60;
const EMPTY_PREVIEW: &str = "No messages yet";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(type_name = "subject_enum", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    #[default]
    General,
    Math,
    Science,
    Coding,
    History,
    Language,
}

impl Subject {
    pub const ALL: [Subject; 6] = [
        Subject::General,
        Subject::Math,
        Subject::Science,
        Subject::Coding,
        Subject::History,
        Subject::Language,
    ];

    /// Unknown or missing tags fall back to `General`.
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag.map(|t| t.trim().to_ascii_lowercase()).as_deref() {
            Some("math") => Subject::Math,
            Some("science") => Subject::Science,
            Some("coding") => Subject::Coding,
            Some("history") => Subject::History,
            Some("language") => Subject::Language,
            _ => Subject::General,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::General => "general",
            Subject::Math => "math",
            Subject::Science => "science",
            Subject::Coding => "coding",
            Subject::History => "history",
            Subject::Language => "language",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub subject: Subject,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Conversation {
    fn default() -> Self {
        Conversation {
            id: Uuid::new_v4(),
            user_id: String::new(),
            title: DEFAULT_TITLE.to_string(),
            subject: Subject::General,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

impl Conversation {
    pub fn new(user_id: &str, subject: Subject, title: Option<&str>) -> Self {
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE);
        Conversation {
            user_id: user_id.to_string(),
            subject,
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_TITLE
    }
}

/// A conversation as listed in the sidebar, with a snippet of its first user message.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub preview: String,
}

impl ConversationSummary {
    pub fn new(conversation: Conversation, first_user_message: Option<&str>) -> Self {
        let preview = match first_user_message.filter(|m| !m.is_empty()) {
            Some(content) => truncate_chars(content, PREVIEW_CHARS),
            None => EMPTY_PREVIEW.to_string(),
        };
        ConversationSummary {
            conversation,
            preview,
        }
    }

    /// Case-insensitive match against title and preview.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        query.is_empty()
            || self.conversation.title.to_lowercase().contains(&query)
            || (self.preview != EMPTY_PREVIEW && self.preview.to_lowercase().contains(&query))
    }
}

/// Title for a conversation started by `content`, or `None` when there is no text to use.
pub fn derive_title(content: &str) -> Option<String> {
    let line = content.lines().map(str::trim).find(|l| !l.is_empty())?;
    Some(truncate_chars(line, TITLE_CHARS))
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

use tracing::warn;

use crate::error::ApiError;
use crate::llm::{GenerationRequest, Turn};
use crate::models::{Message, Subject};
use crate::prompts::{system_prompt, Prompts};
use crate::AppState;

/// What a student sent for one turn, before it is turned into a model request.
#[derive(Debug, Default)]
pub struct StudentInput<'a> {
    pub message: Option<&'a str>,
    pub image_data: Option<&'a str>,
}

impl<'a> StudentInput<'a> {
    pub fn message(&self) -> Option<&'a str> {
        self.message.map(str::trim).filter(|m| !m.is_empty())
    }

    pub fn image_data(&self) -> Option<&'a str> {
        self.image_data.map(str::trim).filter(|i| !i.is_empty())
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.message().is_none() && self.image_data().is_none() {
            return Err(ApiError::BadRequest("Message or image is required".to_string()));
        }
        Ok(())
    }
}

/// Assembles the model request for one turn: subject prompt, the student's
/// profile, bounded history and the decoded image.
pub async fn build_request(
    state: &AppState,
    user_id: &str,
    subject: Subject,
    input: &StudentInput<'_>,
    history: Vec<Turn>,
) -> Result<GenerationRequest, ApiError> {
    input.validate()?;

    let attachment = input
        .image_data()
        .map(|data| state.images.decode(data.as_bytes()))
        .transpose()?;

    let message = match input.message() {
        Some(message) => message.to_string(),
        None => Prompts::DESCRIBE_IMAGE.to_string(),
    };

    let user_context = match state.store.get_profile(user_id).await {
        Ok(profile) => profile.map(|p| p.prompt_context()),
        Err(e) => {
            warn!("Failed to load profile for {}: {:?}", user_id, e);
            None
        }
    };

    Ok(GenerationRequest {
        system_prompt: Some(system_prompt(subject, user_context.as_deref())),
        history: bounded_history(history, state.config.max_history_turns),
        message,
        attachment,
    })
}

/// Stored messages as model history, oldest first.
pub fn history_from(messages: Vec<Message>) -> Vec<Turn> {
    messages
        .into_iter()
        .map(|m| Turn {
            role: m.role,
            content: m.content,
        })
        .collect()
}

/// Drops blank turns and keeps the most recent `limit`.
pub fn bounded_history(history: Vec<Turn>, limit: usize) -> Vec<Turn> {
    let mut turns: Vec<Turn> = history
        .into_iter()
        .filter(|t| !t.content.trim().is_empty())
        .collect();
    if turns.len() > limit {
        turns.drain(..turns.len() - limit);
    }
    turns
}

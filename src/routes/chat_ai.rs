use std::sync::Arc;

use actix_web::{post, web, HttpResponse};
use tracing::info;
use utoipa::OpenApi;

use crate::completion::{build_request, history_from, StudentInput};
use crate::error::ApiError;
use crate::llm::Turn;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::Subject;
use crate::relay::{sse_frames, sse_response};
use crate::types::{ChatAiRequest, HistoryEntry};
use crate::AppState;

#[derive(OpenApi)]
#[openapi(paths(chat_ai), components(schemas(ChatAiRequest, HistoryEntry)))]
pub struct ChatAiApi;

/// Streams a tutoring reply as server-sent events.
#[utoipa::path(
    post,
    path = "/chat-ai",
    tag = "chat",
    request_body = ChatAiRequest,
    responses(
        (status = 200, description = "`data: {\"text\"}` frames ending with `data: [DONE]`", content_type = "text/event-stream"),
        (status = 400, description = "Neither message nor image"),
        (status = 401, description = "Missing or invalid token"),
        (status = 402, description = "AI credits depleted"),
        (status = 429, description = "Rate limited"),
        (status = 500, description = "Configuration or upstream failure"),
    )
)]
#[post("/chat-ai")]
pub async fn chat_ai(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    web::Json(request): web::Json<ChatAiRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = authenticated_user.user_id;
    let subject = Subject::from_tag(request.subject.as_deref());
    let input = StudentInput {
        message: request.message.as_deref(),
        image_data: request.image_data.as_deref(),
    };
    input.validate()?;

    let history: Vec<Turn> = match (request.conversation_history, request.conversation_id) {
        (Some(entries), _) => entries.into_iter().map(Turn::from).collect(),
        (None, Some(conversation_id)) => app_state
            .store
            .list_messages(&user_id, conversation_id)
            .await?
            .map(history_from)
            .unwrap_or_default(),
        (None, None) => vec![],
    };

    let generation = build_request(&app_state, &user_id, subject, &input, history).await?;
    info!(
        user_id = %user_id,
        subject = subject.as_str(),
        conversation_id = ?request.conversation_id,
        history = generation.history.len(),
        has_image = generation.attachment.is_some(),
        "chat-ai request"
    );

    let tokens = app_state.model.stream(&generation).await?;
    Ok(sse_response(sse_frames(tokens, None)))
}

use std::sync::Arc;

use actix_web::{delete, get, post, put, web, HttpResponse};
use tracing::{error, info, warn};
use utoipa::OpenApi;
use uuid::Uuid;

use crate::completion::{build_request, history_from, StudentInput};
use crate::error::ApiError;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{Conversation, ConversationSummary, InputType, Message, NewMessage, Subject};
use crate::relay::{sse_frames, sse_response, CompletionHook};
use crate::types::{
    CreateConversationRequest, ExchangeRequest, LatestConversationResponse, SearchQuery,
    UpdateConversationRequest,
};
use crate::AppState;

const IMAGE_PLACEHOLDER: &str = "[Image]";

#[derive(OpenApi)]
#[openapi(
    paths(
        list_conversations,
        create_conversation,
        latest_conversation,
        get_conversation,
        update_conversation,
        delete_conversation,
        list_messages,
        append_message,
        exchange
    ),
    components(schemas(
        Conversation,
        ConversationSummary,
        Message,
        NewMessage,
        Subject,
        InputType,
        CreateConversationRequest,
        UpdateConversationRequest,
        LatestConversationResponse,
        ExchangeRequest
    ))
)]
pub struct ConversationsApi;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/conversations")
            .service(list_conversations)
            .service(create_conversation)
            // Before `/{id}`, which would otherwise claim the path.
            .service(latest_conversation)
            .service(get_conversation)
            .service(update_conversation)
            .service(delete_conversation)
            .service(list_messages)
            .service(append_message)
            .service(exchange),
    );
}

fn not_found() -> ApiError {
    ApiError::NotFound("Conversation not found".to_string())
}

#[utoipa::path(
    get,
    path = "/conversations",
    tag = "conversations",
    params(("q" = Option<String>, Query, description = "Search over title and preview")),
    responses((status = 200, description = "Newest first", body = Vec<ConversationSummary>))
)]
#[get("")]
async fn list_conversations(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    query: web::Query<SearchQuery>,
) -> Result<web::Json<Vec<ConversationSummary>>, ApiError> {
    let mut summaries = app_state
        .store
        .list_conversations(&authenticated_user.user_id)
        .await?;
    if let Some(q) = query.q.as_deref() {
        summaries.retain(|s| s.matches(q));
    }
    Ok(web::Json(summaries))
}

#[utoipa::path(
    post,
    path = "/conversations",
    tag = "conversations",
    request_body = CreateConversationRequest,
    responses((status = 201, description = "Created", body = Conversation))
)]
#[post("")]
async fn create_conversation(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    request: Option<web::Json<CreateConversationRequest>>,
) -> Result<HttpResponse, ApiError> {
    let request = request.map(web::Json::into_inner).unwrap_or_default();
    let conversation = app_state
        .store
        .create_conversation(
            &authenticated_user.user_id,
            Subject::from_tag(request.subject.as_deref()),
            request.title.as_deref(),
        )
        .await?;
    Ok(HttpResponse::Created().json(conversation))
}

#[utoipa::path(
    get,
    path = "/conversations/latest",
    tag = "conversations",
    responses((status = 200, description = "Most recently updated, or null", body = LatestConversationResponse))
)]
#[get("/latest")]
async fn latest_conversation(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
) -> Result<web::Json<LatestConversationResponse>, ApiError> {
    let conversation = app_state
        .store
        .latest_conversation(&authenticated_user.user_id)
        .await?;
    Ok(web::Json(LatestConversationResponse { conversation }))
}

#[utoipa::path(
    get,
    path = "/conversations/{id}",
    tag = "conversations",
    params(("id" = Uuid, Path)),
    responses(
        (status = 200, description = "The conversation", body = Conversation),
        (status = 404, description = "Absent or not owned"),
    )
)]
#[get("/{id}")]
async fn get_conversation(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    id: web::Path<Uuid>,
) -> Result<web::Json<Conversation>, ApiError> {
    app_state
        .store
        .get_conversation(&authenticated_user.user_id, id.into_inner())
        .await?
        .map(web::Json)
        .ok_or_else(not_found)
}

#[utoipa::path(
    put,
    path = "/conversations/{id}",
    tag = "conversations",
    params(("id" = Uuid, Path)),
    request_body = UpdateConversationRequest,
    responses(
        (status = 200, description = "The conversation", body = Conversation),
        (status = 400, description = "Blank title"),
        (status = 404, description = "Absent or not owned"),
    )
)]
#[put("/{id}")]
async fn update_conversation(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    id: web::Path<Uuid>,
    web::Json(request): web::Json<UpdateConversationRequest>,
) -> Result<web::Json<Conversation>, ApiError> {
    let title = request.title.as_deref().map(str::trim);
    if title == Some("") {
        return Err(ApiError::BadRequest("Title cannot be empty".to_string()));
    }
    let subject = request.subject.as_deref().map(|s| Subject::from_tag(Some(s)));

    app_state
        .store
        .update_conversation(&authenticated_user.user_id, id.into_inner(), title, subject)
        .await?
        .map(web::Json)
        .ok_or_else(not_found)
}

#[utoipa::path(
    delete,
    path = "/conversations/{id}",
    tag = "conversations",
    params(("id" = Uuid, Path)),
    responses(
        (status = 204, description = "Deleted along with its messages"),
        (status = 404, description = "Absent or not owned"),
    )
)]
#[delete("/{id}")]
async fn delete_conversation(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    id: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    if !app_state
        .store
        .delete_conversation(&authenticated_user.user_id, id)
        .await?
    {
        return Err(not_found());
    }
    info!("Conversation {} deleted", id);
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/conversations/{id}/messages",
    tag = "conversations",
    params(("id" = Uuid, Path)),
    responses(
        (status = 200, description = "In creation order", body = Vec<Message>),
        (status = 404, description = "Absent or not owned"),
    )
)]
#[get("/{id}/messages")]
async fn list_messages(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    id: web::Path<Uuid>,
) -> Result<web::Json<Vec<Message>>, ApiError> {
    app_state
        .store
        .list_messages(&authenticated_user.user_id, id.into_inner())
        .await?
        .map(web::Json)
        .ok_or_else(not_found)
}

#[utoipa::path(
    post,
    path = "/conversations/{id}/messages",
    tag = "conversations",
    params(("id" = Uuid, Path)),
    request_body = NewMessage,
    responses(
        (status = 201, description = "Stored", body = Message),
        (status = 400, description = "Blank content"),
        (status = 404, description = "Absent or not owned"),
    )
)]
#[post("/{id}/messages")]
async fn append_message(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    id: web::Path<Uuid>,
    web::Json(message): web::Json<NewMessage>,
) -> Result<HttpResponse, ApiError> {
    if message.content.trim().is_empty() {
        return Err(ApiError::BadRequest("Message content is required".to_string()));
    }
    let message = app_state
        .store
        .append_message(&authenticated_user.user_id, id.into_inner(), message)
        .await?
        .ok_or_else(not_found)?;
    Ok(HttpResponse::Created().json(message))
}

/// Stores the student's turn, streams the reply and stores it once complete.
#[utoipa::path(
    post,
    path = "/conversations/{id}/exchange",
    tag = "conversations",
    params(("id" = Uuid, Path)),
    request_body = ExchangeRequest,
    responses(
        (status = 200, description = "Same frames as /chat-ai", content_type = "text/event-stream"),
        (status = 400, description = "Neither message nor image"),
        (status = 404, description = "Absent or not owned"),
        (status = 402, description = "AI credits depleted"),
        (status = 429, description = "Rate limited"),
        (status = 500, description = "Configuration or upstream failure"),
    )
)]
#[post("/{id}/exchange")]
async fn exchange(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    id: web::Path<Uuid>,
    web::Json(request): web::Json<ExchangeRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = authenticated_user.user_id;
    let conversation = app_state
        .store
        .get_conversation(&user_id, id.into_inner())
        .await?
        .ok_or_else(not_found)?;

    let input = StudentInput {
        message: request.message.as_deref(),
        image_data: request.image_data.as_deref(),
    };
    input.validate()?;

    let history = app_state
        .store
        .list_messages(&user_id, conversation.id)
        .await?
        .map(history_from)
        .unwrap_or_default();
    let generation =
        build_request(&app_state, &user_id, conversation.subject, &input, history).await?;

    let input_type = request.input_type.unwrap_or(match input.image_data() {
        Some(_) => InputType::Image,
        None => InputType::Text,
    });
    let content = input.message().unwrap_or(IMAGE_PLACEHOLDER);
    app_state
        .store
        .append_message(&user_id, conversation.id, NewMessage::user(content, input_type))
        .await?
        .ok_or_else(not_found)?;

    let tokens = app_state.model.stream(&generation).await?;

    let store = app_state.store.clone();
    let conversation_id = conversation.id;
    let on_complete: CompletionHook = Box::new(move |transcript: String| {
        Box::pin(async move {
            if transcript.trim().is_empty() {
                warn!("Empty reply for conversation {}, nothing stored", conversation_id);
                return;
            }
            // The reply has already been streamed; a failed write is only logged.
            if let Err(e) = store
                .append_message(&user_id, conversation_id, NewMessage::assistant(transcript))
                .await
            {
                error!("Failed to store reply for conversation {}: {:?}", conversation_id, e);
            }
        })
    });

    Ok(sse_response(sse_frames(tokens, Some(on_complete))))
}

#[cfg(test)]
mod tests {
    use actix_web::{test, App};
    use serde_json::{json, Value};

    use super::*;
    use crate::models::Role;
    use crate::service_config;
    use crate::test_support::{make_token, test_state, ScriptedModel};

    fn bearer(state: &AppState, user: &str) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", make_token(&state.config, user)))
    }

    #[actix_web::test]
    async fn math_exchange_stores_both_turns_in_order() {
        let state = Arc::new(test_state(Arc::new(ScriptedModel::streaming(&["2+2 ", "= 4"]))));
        let app = test::init_service(App::new().configure(service_config(web::Data::new(state.clone())))).await;

        let req = test::TestRequest::post()
            .uri("/conversations")
            .insert_header(bearer(&state, "student"))
            .set_json(json!({ "subject": "math" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
        let conversation: Value = test::read_body_json(resp).await;
        assert_eq!(conversation["subject"], "math");
        assert_eq!(conversation["title"], "New Conversation");
        let id = conversation["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri(&format!("/conversations/{}/exchange", id))
            .insert_header(bearer(&state, "student"))
            .set_json(json!({ "message": "What is 2+2?" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body = test::read_body(resp).await;
        assert!(std::str::from_utf8(&body).unwrap().ends_with("data: [DONE]\n\n"));

        let req = test::TestRequest::get()
            .uri(&format!("/conversations/{}/messages", id))
            .insert_header(bearer(&state, "student"))
            .to_request();
        let messages: Vec<Message> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "What is 2+2?");
        assert_eq!(messages[0].input_type, Some(InputType::Text));
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "2+2 = 4");

        let req = test::TestRequest::get()
            .uri("/conversations/latest")
            .insert_header(bearer(&state, "student"))
            .to_request();
        let latest: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(latest["conversation"]["title"], "What is 2+2?");
    }

    #[actix_web::test]
    async fn broken_stream_stores_only_the_question() {
        let state = Arc::new(test_state(Arc::new(ScriptedModel::failing_midway(&["partial"], 500))));
        let conversation = state
            .store
            .create_conversation("student", Subject::Science, None)
            .await
            .unwrap();
        let app = test::init_service(App::new().configure(service_config(web::Data::new(state.clone())))).await;

        let req = test::TestRequest::post()
            .uri(&format!("/conversations/{}/exchange", conversation.id))
            .insert_header(bearer(&state, "student"))
            .set_json(json!({ "message": "Why is the sky blue?" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        assert!(actix_web::body::to_bytes(resp.into_body()).await.is_err());

        let messages = state
            .store
            .list_messages("student", conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[actix_web::test]
    async fn delete_removes_the_conversation_and_its_messages() {
        let state = Arc::new(test_state(Arc::new(ScriptedModel::replying("x"))));
        let conversation = state
            .store
            .create_conversation("student", Subject::Coding, None)
            .await
            .unwrap();
        state
            .store
            .append_message("student", conversation.id, NewMessage::user("hi", InputType::Text))
            .await
            .unwrap();
        let app = test::init_service(App::new().configure(service_config(web::Data::new(state.clone())))).await;

        let uri = format!("/conversations/{}", conversation.id);
        let req = test::TestRequest::delete()
            .uri(&uri)
            .insert_header(bearer(&state, "student"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 204);

        let req = test::TestRequest::get()
            .uri(&format!("{}/messages", uri))
            .insert_header(bearer(&state, "student"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);
        assert!(state
            .store
            .list_messages("student", conversation.id)
            .await
            .unwrap()
            .is_none());
    }

    #[actix_web::test]
    async fn conversations_are_private_and_searchable() {
        let state = Arc::new(test_state(Arc::new(ScriptedModel::replying("x"))));
        let rome = state
            .store
            .create_conversation("student", Subject::History, Some("Rome"))
            .await
            .unwrap();
        state
            .store
            .create_conversation("student", Subject::Math, Some("Fractions"))
            .await
            .unwrap();
        let app = test::init_service(App::new().configure(service_config(web::Data::new(state.clone())))).await;

        let req = test::TestRequest::get()
            .uri("/conversations?q=rom")
            .insert_header(bearer(&state, "student"))
            .to_request();
        let found: Vec<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["title"], "Rome");
        assert_eq!(found[0]["preview"], "No messages yet");

        let req = test::TestRequest::get()
            .uri(&format!("/conversations/{}", rome.id))
            .insert_header(bearer(&state, "someone-else"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);

        let req = test::TestRequest::get()
            .uri("/conversations/latest")
            .insert_header(bearer(&state, "someone-else"))
            .to_request();
        let latest: Value = test::call_and_read_body_json(&app, req).await;
        assert!(latest["conversation"].is_null());
    }

    #[actix_web::test]
    async fn malformed_ids_and_queries_are_json_400s() {
        let state = Arc::new(test_state(Arc::new(ScriptedModel::replying("x"))));
        let app = test::init_service(App::new().configure(service_config(web::Data::new(state.clone())))).await;

        for uri in ["/conversations/not-a-uuid", "/conversations/not-a-uuid/messages"] {
            let req = test::TestRequest::get()
                .uri(uri)
                .insert_header(bearer(&state, "student"))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), 400);
            let body: Value = test::read_body_json(resp).await;
            assert!(body["error"].as_str().unwrap().starts_with("Invalid path"));
        }

        let req = test::TestRequest::get()
            .uri("/conversations?q=a&q=b")
            .insert_header(bearer(&state, "student"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().starts_with("Invalid query"));
    }

    #[actix_web::test]
    async fn rename_and_manual_messages() {
        let state = Arc::new(test_state(Arc::new(ScriptedModel::replying("x"))));
        let conversation = state
            .store
            .create_conversation("student", Subject::General, None)
            .await
            .unwrap();
        let app = test::init_service(App::new().configure(service_config(web::Data::new(state.clone())))).await;
        let uri = format!("/conversations/{}", conversation.id);

        let req = test::TestRequest::put()
            .uri(&uri)
            .insert_header(bearer(&state, "student"))
            .set_json(json!({ "title": "  ", "subject": "science" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);

        let req = test::TestRequest::put()
            .uri(&uri)
            .insert_header(bearer(&state, "student"))
            .set_json(json!({ "title": "Photosynthesis", "subject": "science" }))
            .to_request();
        let updated: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(updated["title"], "Photosynthesis");
        assert_eq!(updated["subject"], "science");

        let req = test::TestRequest::post()
            .uri(&format!("{}/messages", uri))
            .insert_header(bearer(&state, "student"))
            .set_json(json!({ "role": "user", "content": "How do plants eat?", "input_type": "voice" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
        let message: Value = test::read_body_json(resp).await;
        assert_eq!(message["input_type"], "voice");

        // An explicit title is not replaced by the first message.
        let stored = state
            .store
            .get_conversation("student", conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.title, "Photosynthesis");
    }
}

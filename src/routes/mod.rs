pub mod chat_ai;
pub mod conversations;
pub mod profile;
pub mod transcribe;

use actix_web::{get, web};
use utoipa::OpenApi;

#[get("/")]
pub async fn health() -> &'static str {
    "BrainyBot is running"
}

/// Routes that identify the caller through [`crate::middleware::auth::AuthenticatedUser`].
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(chat_ai::chat_ai)
        .service(profile::get_profile)
        .service(profile::upsert_profile)
        .service(transcribe::transcribe)
        .configure(conversations::configure);
}

#[derive(OpenApi)]
#[openapi(info(title = "BrainyBot API", description = "AI study companion backend"))]
pub struct ApiDoc;

pub fn api_docs() -> utoipa::openapi::OpenApi {
    let mut spec = ApiDoc::openapi();
    spec.merge(chat_ai::ChatAiApi::openapi());
    spec.merge(conversations::ConversationsApi::openapi());
    spec.merge(profile::ProfileApi::openapi());
    spec.merge(transcribe::TranscribeApi::openapi());
    spec
}

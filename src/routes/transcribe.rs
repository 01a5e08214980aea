use std::sync::Arc;

use actix_web::{http::header::CONTENT_TYPE, post, web, HttpRequest};
use futures::StreamExt;
use tracing::{info, warn};
use utoipa::OpenApi;

use crate::error::ApiError;
use crate::middleware::auth::AuthenticatedUser;
use crate::types::TranscriptionResponse;
use crate::AppState;

#[derive(OpenApi)]
#[openapi(paths(transcribe), components(schemas(TranscriptionResponse)))]
pub struct TranscribeApi;

/// Raw audio in, transcript out. The body's content type must be `audio/*`.
#[utoipa::path(
    post,
    path = "/transcribe",
    tag = "chat",
    request_body(content = Vec<u8>, content_type = "audio/webm"),
    responses(
        (status = 200, description = "Transcript", body = TranscriptionResponse),
        (status = 400, description = "Empty, silent or non-audio body"),
        (status = 413, description = "Recording over the upload limit"),
    )
)]
#[post("/transcribe")]
async fn transcribe(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    req: HttpRequest,
    payload: web::Payload,
) -> Result<web::Json<TranscriptionResponse>, ApiError> {
    let body = read_limited(payload, app_state.config.max_upload_bytes).await?;
    if body.is_empty() {
        return Err(ApiError::BadRequest("Audio is required".to_string()));
    }
    // Parameters such as `;codecs=opus` are not forwarded.
    let mime_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .unwrap_or_default();

    let text = app_state.transcriber.transcribe(&body, mime_type).await?;
    info!(
        "Transcribed {} bytes of {} for {}",
        body.len(),
        mime_type,
        authenticated_user.user_id
    );
    Ok(web::Json(TranscriptionResponse { text }))
}

/// Collects the request body, failing as soon as it grows past `limit`.
async fn read_limited(mut payload: web::Payload, limit: usize) -> Result<web::BytesMut, ApiError> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?;
        if body.len() + chunk.len() > limit {
            warn!("Rejected recording over {} bytes", limit);
            return Err(ApiError::PayloadTooLarge(format!(
                "Recording too large. Please keep it under {}MB.",
                (limit / (1024 * 1024)).max(1)
            )));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use actix_web::{test, App};
    use serde_json::Value;

    use super::*;
    use crate::service_config;
    use crate::test_support::{make_token, test_state, ScriptedModel};

    #[actix_web::test]
    async fn audio_is_transcribed() {
        let model = Arc::new(ScriptedModel::replying("what is a noun"));
        let state = Arc::new(test_state(model.clone()));
        let app = test::init_service(App::new().configure(service_config(web::Data::new(state.clone())))).await;

        let req = test::TestRequest::post()
            .uri("/transcribe")
            .insert_header(("Authorization", format!("Bearer {}", make_token(&state.config, "student"))))
            .insert_header((CONTENT_TYPE, "audio/webm;codecs=opus"))
            .set_payload(&b"\x1aE\xdf\xa3webm"[..])
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["text"], "what is a noun");
        assert_eq!(model.last_request().unwrap().attachment.unwrap().mime_type, "audio/webm");
    }

    #[actix_web::test]
    async fn non_audio_and_silence_are_client_errors() {
        let state = Arc::new(test_state(Arc::new(ScriptedModel::replying(""))));
        let app = test::init_service(App::new().configure(service_config(web::Data::new(state.clone())))).await;
        let auth = ("Authorization", format!("Bearer {}", make_token(&state.config, "student")));

        let req = test::TestRequest::post()
            .uri("/transcribe")
            .insert_header(auth.clone())
            .insert_header((CONTENT_TYPE, "text/plain"))
            .set_payload("hello")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);

        let req = test::TestRequest::post()
            .uri("/transcribe")
            .insert_header(auth)
            .insert_header((CONTENT_TYPE, "audio/wav"))
            .set_payload(&b"RIFF"[..])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "No speech detected. Please try again and speak clearly.");
    }

    #[actix_web::test]
    async fn oversized_recording_is_a_json_413() {
        let model = Arc::new(ScriptedModel::replying("never"));
        let state = Arc::new(test_state(model.clone()));
        let app = test::init_service(App::new().configure(service_config(web::Data::new(state.clone())))).await;

        let req = test::TestRequest::post()
            .uri("/transcribe")
            .insert_header(("Authorization", format!("Bearer {}", make_token(&state.config, "student"))))
            .insert_header((CONTENT_TYPE, "audio/webm"))
            .set_payload(vec![0u8; 4096])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 413);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Recording too large. Please keep it under 1MB.");
        assert_eq!(model.calls(), 0);
    }
}

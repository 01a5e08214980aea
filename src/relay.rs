//! Re-frames model fragments as server-sent events.

use actix_web::http::header::{CacheControl, CacheDirective};
use actix_web::HttpResponse;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use futures_util::future::LocalBoxFuture;
use serde_json::json;
use tracing::{debug, error};

use crate::error::ApiError;
use crate::llm::TokenStream;

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Runs once with the full reply after the upstream stream ends cleanly, before `[DONE]`.
pub type CompletionHook = Box<dyn FnOnce(String) -> LocalBoxFuture<'static, ()>>;

struct Relay {
    tokens: TokenStream,
    transcript: String,
    on_complete: Option<CompletionHook>,
    finished: bool,
}

pub fn text_frame(text: &str) -> Bytes {
    Bytes::from(format!("data: {}\n\n", json!({ "text": text })))
}

/// One `data: {"text": ...}` frame per fragment, in arrival order, then `data: [DONE]`.
/// An upstream failure ends the body with an error and no `[DONE]`.
pub fn sse_frames(
    tokens: TokenStream,
    on_complete: Option<CompletionHook>,
) -> impl Stream<Item = Result<Bytes, ApiError>> + 'static {
    let relay = Relay {
        tokens,
        transcript: String::new(),
        on_complete,
        finished: false,
    };

    stream::unfold(relay, |mut relay| async move {
        if relay.finished {
            return None;
        }
        match relay.tokens.next().await {
            Some(Ok(text)) => {
                relay.transcript.push_str(&text);
                Some((Ok(text_frame(&text)), relay))
            }
            Some(Err(e)) => {
                error!(error = %e, "upstream stream broke");
                relay.finished = true;
                Some((Err(ApiError::from(e)), relay))
            }
            None => {
                debug!(chars = relay.transcript.len(), "upstream stream complete");
                if let Some(hook) = relay.on_complete.take() {
                    hook(std::mem::take(&mut relay.transcript)).await;
                }
                relay.finished = true;
                Some((Ok(Bytes::from_static(DONE_FRAME.as_bytes())), relay))
            }
        }
    })
}

pub fn sse_response<S>(frames: S) -> HttpResponse
where
    S: Stream<Item = Result<Bytes, ApiError>> + 'static,
{
    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(CacheControl(vec![CacheDirective::NoCache]))
        .streaming(frames)
}

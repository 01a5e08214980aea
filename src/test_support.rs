//! Fakes shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};

use crate::capture::{DataUrlDecoder, ModelTranscriber};
use crate::config::AppConfig;
use crate::llm::{ChatModel, GenerationRequest, ModelError, TokenStream};
use crate::middleware::auth::Claims;
use crate::store::MemoryStore;
use crate::AppState;

pub fn test_config() -> AppConfig {
    AppConfig::from_lookup(|key| match key {
        "SUPABASE_JWT_SECRET" => Some("test-secret".to_string()),
        "GEMINI_API_KEY" => Some("test-key".to_string()),
        "MAX_UPLOAD_BYTES" => Some("1024".to_string()),
        _ => None,
    })
    .unwrap()
}

/// Signs a token the way Supabase does for a logged-in user.
pub fn make_token(config: &AppConfig, user_id: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (Utc::now().timestamp() + 3600) as usize,
        aud: Some(config.jwt_audience.clone()),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .unwrap()
}

enum Script {
    Tokens(Vec<String>),
    FailAtOpen(u16),
    FailMidway(Vec<String>, u16),
}

/// A `ChatModel` that replays a fixed script and records what it was asked.
pub struct ScriptedModel {
    script: Script,
    calls: AtomicUsize,
    last: Mutex<Option<GenerationRequest>>,
}

impl ScriptedModel {
    fn new(script: Script) -> Self {
        ScriptedModel {
            script,
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(Script::Tokens(vec![text.to_string()]))
    }

    pub fn streaming(tokens: &[&str]) -> Self {
        Self::new(Script::Tokens(tokens.iter().map(|t| t.to_string()).collect()))
    }

    pub fn failing_with_status(status: u16) -> Self {
        Self::new(Script::FailAtOpen(status))
    }

    /// Emits `tokens`, then breaks the stream with `status`.
    pub fn failing_midway(tokens: &[&str], status: u16) -> Self {
        Self::new(Script::FailMidway(
            tokens.iter().map(|t| t.to_string()).collect(),
            status,
        ))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.last.lock().unwrap().clone()
    }

    fn record(&self, request: &GenerationRequest) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(request.clone());
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn stream(&self, request: &GenerationRequest) -> Result<TokenStream, ModelError> {
        self.record(request);
        match &self.script {
            Script::Tokens(tokens) => Ok(stream::iter(tokens.clone().into_iter().map(Ok)).boxed()),
            Script::FailAtOpen(status) => Err(ModelError::from_status(*status, String::new())),
            Script::FailMidway(tokens, status) => {
                let items = tokens
                    .clone()
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(ModelError::from_status(
                        *status,
                        String::new(),
                    ))));
                Ok(stream::iter(items).boxed())
            }
        }
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ModelError> {
        self.record(request);
        match &self.script {
            Script::Tokens(tokens) => Ok(tokens.concat()),
            Script::FailAtOpen(status) | Script::FailMidway(_, status) => {
                Err(ModelError::from_status(*status, String::new()))
            }
        }
    }
}

/// Application state over an in-memory store and the given model.
pub fn test_state(model: Arc<dyn ChatModel>) -> AppState {
    test_state_with(test_config(), model)
}

pub fn test_state_with(config: AppConfig, model: Arc<dyn ChatModel>) -> AppState {
    AppState {
        images: Arc::new(DataUrlDecoder::new(config.max_upload_bytes)),
        transcriber: Arc::new(ModelTranscriber::new(model.clone())),
        config: Arc::new(config),
        store: Arc::new(MemoryStore::new()),
        model,
    }
}

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::error::JsonPayloadError;
use actix_web::web;
use anyhow::Context;
use shuttle_actix_web::ShuttleActixWeb;
use shuttle_runtime::SecretStore;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use utoipa_scalar::{Scalar, Servable};

mod capture;
mod completion;
mod config;
mod error;
mod llm;
mod middleware;
mod models;
mod prompts;
mod relay;
mod routes;
mod store;
mod types;

#[cfg(test)]
mod test_support;

use crate::capture::{AudioTranscriber, DataUrlDecoder, ImageDecoder, ModelTranscriber};
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::llm::gemini::GeminiModel;
use crate::llm::ChatModel;
use crate::middleware::auth::Authentication;
use crate::store::{ConversationStore, MemoryStore, PgStore};

/// Shared by every handler. Built once at startup.
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ConversationStore>,
    pub model: Arc<dyn ChatModel>,
    pub images: Arc<dyn ImageDecoder>,
    pub transcriber: Arc<dyn AudioTranscriber>,
}

fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec!["authorization", "x-client-info", "apikey", "content-type"])
        .max_age(3600)
}

/// Mounts every route on `cfg`. Used by the runtime and by the tests.
pub fn service_config(
    app_state: web::Data<Arc<AppState>>,
) -> impl FnOnce(&mut web::ServiceConfig) + Send + Clone + 'static {
    move |cfg: &mut web::ServiceConfig| {
        let upload_limit = app_state.config.max_upload_bytes;
        // Images arrive base64-encoded inside the JSON body, alongside the history.
        let json_config = web::JsonConfig::default()
            .limit(upload_limit * 2 + 64 * 1024)
            .error_handler(|err, _req| {
                let api_error = match err {
                    JsonPayloadError::OverflowKnownLength { .. } | JsonPayloadError::Overflow { .. } => {
                        ApiError::PayloadTooLarge("Request body is too large".to_string())
                    }
                    other => ApiError::BadRequest(format!("Invalid request body: {}", other)),
                };
                actix_web::Error::from(api_error)
            });
        let path_config = web::PathConfig::default().error_handler(|err, _req| {
            actix_web::Error::from(ApiError::BadRequest(format!("Invalid path: {}", err)))
        });
        let query_config = web::QueryConfig::default().error_handler(|err, _req| {
            actix_web::Error::from(ApiError::BadRequest(format!("Invalid query: {}", err)))
        });
        let authentication = Authentication {
            app_config: app_state.config.clone(),
        };

        cfg.app_data(app_state)
            .app_data(json_config)
            .app_data(path_config)
            .app_data(query_config)
            .service(routes::health)
            .service(Scalar::with_url("/scalar", routes::api_docs()))
            .service(
                web::scope("")
                    .wrap(authentication)
                    .wrap(cors())
                    .configure(routes::configure),
            );
    }
}

#[shuttle_runtime::main]
async fn main(
    #[shuttle_runtime::Secrets] secret_store: SecretStore,
) -> ShuttleActixWeb<impl FnOnce(&mut web::ServiceConfig) + Send + Clone + 'static> {
    let app_config = Arc::new(AppConfig::new(&secret_store)?);

    let store: Arc<dyn ConversationStore> = match app_config.database_url.as_deref() {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await
                .context("failed to connect to Postgres")?;
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("failed to run migrations")?;
            info!("Connected to Postgres and applied migrations");
            Arc::new(PgStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, conversations are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    if app_config.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY not set, chat requests will fail until it is configured");
    }

    let model: Arc<dyn ChatModel> =
        Arc::new(GeminiModel::new(reqwest::Client::new(), &app_config));

    let app_state = Arc::new(AppState {
        images: Arc::new(DataUrlDecoder::new(app_config.max_upload_bytes)),
        transcriber: Arc::new(ModelTranscriber::new(model.clone())),
        config: app_config.clone(),
        store,
        model,
    });
    info!(model = %app_config.gemini_model, "BrainyBot starting");

    Ok(service_config(web::Data::new(app_state)).into())
}

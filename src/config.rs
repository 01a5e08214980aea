use anyhow::anyhow;
use shuttle_runtime::SecretStore;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Optional at startup; the chat endpoints report a configuration error when it is missing.
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub gemini_model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub jwt_secret: String,
    pub jwt_audience: String,
    /// Postgres connection string. The in-memory store is used when absent.
    pub database_url: Option<String>,
    pub max_upload_bytes: usize,
    pub max_history_turns: usize,
}

impl AppConfig {
    pub fn new(secret_store: &SecretStore) -> Result<Self, anyhow::Error> {
        Self::from_lookup(|key| secret_store.get(key))
    }

    /// Builds the config from any key lookup, so tests don't need a `SecretStore`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let jwt_secret =
            non_empty("SUPABASE_JWT_SECRET").ok_or_else(|| anyhow!("SUPABASE_JWT_SECRET not found"))?;

        let temperature = match non_empty("GEMINI_TEMPERATURE") {
            Some(raw) => raw
                .parse::<f32>()
                .map_err(|e| anyhow!("GEMINI_TEMPERATURE is invalid: {}", e))?,
            None => 0.7,
        };

        let max_output_tokens = match non_empty("GEMINI_MAX_OUTPUT_TOKENS") {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|e| anyhow!("GEMINI_MAX_OUTPUT_TOKENS is invalid: {}", e))?,
            None => 1000,
        };

        let max_upload_bytes = match non_empty("MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|e| anyhow!("MAX_UPLOAD_BYTES is invalid: {}", e))?,
            None => 10 * 1024 * 1024,
        };

        let max_history_turns = match non_empty("MAX_HISTORY_TURNS") {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|e| anyhow!("MAX_HISTORY_TURNS is invalid: {}", e))?,
            None => 20,
        };

        Ok(AppConfig {
            gemini_api_key: non_empty("GEMINI_API_KEY"),
            gemini_api_base: non_empty("GEMINI_API_BASE")
                .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
            gemini_model: non_empty("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            temperature,
            max_output_tokens,
            jwt_secret,
            jwt_audience: non_empty("SUPABASE_JWT_AUDIENCE")
                .unwrap_or_else(|| "authenticated".to_string()),
            database_url: non_empty("DATABASE_URL"),
            max_upload_bytes,
            max_history_turns,
        })
    }
}

// src/config/mod.rs
// All tunables come from the environment; logic never hardcodes modes or endpoints.

use std::str::FromStr;
use url::Url;

/// How the login gate is wired at startup. The credential check itself is
/// outside this crate; the workflow only carries the selected mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// No gate; every visitor reaches the dashboard.
    Open,
    /// A single static credential pair from the environment.
    Static,
}

impl FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(AuthMode::Open),
            "static" => Ok(AuthMode::Static),
            other => Err(format!("unknown auth mode: {other}")),
        }
    }
}

/// Which `PredictionBackend` implementation the application is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// Real HTTP collaborators.
    Live,
    /// In-process simulation for demos.
    Mock,
}

impl FromStr for BackendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Ok(BackendMode::Live),
            "mock" => Ok(BackendMode::Mock),
            other => Err(format!("unknown backend mode: {other}")),
        }
    }
}

/// Request shape the predict endpoint expects. Deployments differ: some
/// take a stored-file reference as JSON, some take the raw image as a
/// multipart field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictShape {
    StoredReference,
    Multipart,
}

impl FromStr for PredictShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stored" | "stored-reference" => Ok(PredictShape::StoredReference),
            "multipart" => Ok(PredictShape::Multipart),
            other => Err(format!("unknown predict shape: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FesatConfig {
    // ── Application wiring
    pub auth_mode: AuthMode,
    pub auth_username: String,
    pub auth_password: String,
    pub backend_mode: BackendMode,

    // ── Classifier backend endpoints
    pub upload_url: String,
    pub predict_url: String,
    pub predict_shape: PredictShape,
    pub explain_url: String,
    pub relocate_url: String,
    pub comment_url: String,
    /// Public origin used to build absolute image URLs for explanation
    /// requests; empty disables the field.
    pub public_base_url: String,

    // ── Explanation (chat completion) settings
    pub openai_base_url: String,
    pub explain_model: String,
    pub explain_max_tokens: u32,
    pub explain_temperature: f32,
    pub explain_timeout: u64,

    // ── Mock backend
    pub mock_latency_ms: u64,

    // ── Server Configuration
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
    pub log_level: String,
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            // Trim whitespace and strip trailing comments before parsing
            let clean_val = val.split('#').next().unwrap_or("").trim();
            match clean_val.parse::<T>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    eprintln!("Config: {} = '{}' (parse failed, using default)", key, val);
                    default
                }
            }
        }
        Err(_) => default,
    }
}

impl FesatConfig {
    pub fn from_env() -> Self {
        if dotenvy::dotenv().is_err() {
            eprintln!("Warning: .env file not found. Using environment variables and defaults.");
        }

        Self {
            auth_mode: env_var_or("FESAT_AUTH_MODE", AuthMode::Static),
            auth_username: env_var_or("FESAT_AUTH_USERNAME", "profdux".to_string()),
            auth_password: env_var_or("FESAT_AUTH_PASSWORD", "dux123".to_string()),
            backend_mode: env_var_or("FESAT_BACKEND_MODE", BackendMode::Live),
            upload_url: env_var_or("FESAT_UPLOAD_URL", "http://localhost:8000/upload".to_string()),
            predict_url: env_var_or("FESAT_PREDICT_URL", "http://localhost:8000/predict".to_string()),
            predict_shape: env_var_or("FESAT_PREDICT_SHAPE", PredictShape::StoredReference),
            explain_url: env_var_or("FESAT_EXPLAIN_URL", "http://localhost:3001/api/explain".to_string()),
            relocate_url: env_var_or("FESAT_RELOCATE_URL", "http://localhost:8000/relocate".to_string()),
            comment_url: env_var_or("FESAT_COMMENT_URL", "http://localhost:8000/comment".to_string()),
            public_base_url: env_var_or("FESAT_PUBLIC_BASE_URL", String::new()),
            openai_base_url: env_var_or("OPENAI_BASE_URL", "https://api.openai.com/v1".to_string()),
            explain_model: env_var_or("FESAT_EXPLAIN_MODEL", "gpt-4o-mini".to_string()),
            explain_max_tokens: env_var_or("FESAT_EXPLAIN_MAX_TOKENS", 200),
            explain_temperature: env_var_or("FESAT_EXPLAIN_TEMPERATURE", 0.7),
            explain_timeout: env_var_or("FESAT_EXPLAIN_TIMEOUT", 60),
            mock_latency_ms: env_var_or("FESAT_MOCK_LATENCY_MS", 150),
            host: env_var_or("FESAT_HOST", "0.0.0.0".to_string()),
            port: env_var_or("FESAT_PORT", 3001),
            cors_origin: env_var_or("FESAT_CORS_ORIGIN", "http://localhost:3000".to_string()),
            log_level: env_var_or("FESAT_LOG_LEVEL", "info".to_string()),
        }
    }

    // --- Convenience Methods ---

    /// Get server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Public base URL parsed for joining, if one is configured.
    pub fn public_base(&self) -> Option<Url> {
        if self.public_base_url.is_empty() {
            return None;
        }
        Url::parse(&self.public_base_url).ok()
    }

    /// Static-mode credential check. Always true in open mode.
    pub fn credentials_valid(&self, username: &str, password: &str) -> bool {
        match self.auth_mode {
            AuthMode::Open => true,
            AuthMode::Static => username == self.auth_username && password == self.auth_password,
        }
    }

    /// Get timeout for explanation requests
    pub fn explain_request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.explain_timeout)
    }
}

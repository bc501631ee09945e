use std::env;
use url::Url;

const DEFAULT_PORT: u16 = 4080;
const DEFAULT_DB_PATH: &str = "./lovepage.db";
const DEFAULT_MEDIA_ROOT: &str = "./media";
const DEFAULT_MEDIA_BASE_URL: &str = "http://localhost:4080/media";
const DEFAULT_RETURN_ORIGIN: &str = "http://localhost:3000";
const DEFAULT_RATE_LIMIT_RPM: u64 = 120;
const DEFAULT_DRAFT_RETENTION_DAYS: u64 = 30;

#[derive(Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// SQLite database path (drafts, pages, profiles).
    pub db_path: String,
    /// Root directory of the object store.
    pub media_root: String,
    /// Public base URL the media root is served at.
    pub media_base_url: String,
    /// Secret for the QR provider's webhook signatures.
    pub pix_webhook_secret: Vec<u8>,
    /// Secret for the hosted-checkout provider's webhook signatures.
    pub stripe_webhook_secret: Vec<u8>,
    pub stripe_secret_key: String,
    pub paypal_client_id: String,
    pub paypal_client_secret: String,
    pub pix_access_token: String,
    /// Default origin for checkout success/cancel URLs.
    pub return_origin: String,
    /// CORS allowed origins (empty = localhost only).
    pub allowed_origins: Vec<String>,
    pub rate_limit_rpm: u64,
    /// Bearer token required for /metrics (None = protected by default).
    pub metrics_token: Option<Vec<u8>>,
    /// Temporary media of pending drafts older than this is swept.
    pub draft_retention_days: u64,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("port", &self.port)
            .field("db_path", &self.db_path)
            .field("media_root", &self.media_root)
            .field("media_base_url", &self.media_base_url)
            .field("pix_webhook_secret", &"[REDACTED]")
            .field("stripe_webhook_secret", &"[REDACTED]")
            .field("stripe_secret_key", &"[REDACTED]")
            .field("paypal_client_id", &self.paypal_client_id)
            .field("paypal_client_secret", &"[REDACTED]")
            .field("pix_access_token", &"[REDACTED]")
            .field("return_origin", &self.return_origin)
            .field("allowed_origins", &self.allowed_origins)
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .field(
                "metrics_token",
                &self.metrics_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("draft_retention_days", &self.draft_retention_days)
            .finish()
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or(ConfigError::MissingRequired(name))
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Required: webhook secrets and provider credentials. The service
        // refuses to start without them — a missing secret at request time
        // would turn every webhook into a 500.
        let pix_webhook_secret = required("PIX_WEBHOOK_SECRET")?.into_bytes();
        let stripe_webhook_secret = required("STRIPE_WEBHOOK_SECRET")?.into_bytes();
        let stripe_secret_key = required("STRIPE_SECRET_KEY")?;
        let paypal_client_id = required("PAYPAL_CLIENT_ID")?;
        let paypal_client_secret = required("PAYPAL_CLIENT_SECRET")?;
        let pix_access_token = required("PIX_ACCESS_TOKEN")?;

        if pix_webhook_secret.len() < 32 {
            tracing::warn!(
                "PIX_WEBHOOK_SECRET is only {} bytes (minimum 32 recommended) — \
                 use `openssl rand -hex 32` to generate a secure secret",
                pix_webhook_secret.len()
            );
        }

        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let db_path = env::var("DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
        let media_root = env::var("MEDIA_ROOT").unwrap_or_else(|_| DEFAULT_MEDIA_ROOT.to_string());

        let media_base_url =
            env::var("MEDIA_BASE_URL").unwrap_or_else(|_| DEFAULT_MEDIA_BASE_URL.to_string());
        Url::parse(&media_base_url).map_err(|_| ConfigError::InvalidUrl(media_base_url.clone()))?;

        let return_origin =
            env::var("RETURN_ORIGIN").unwrap_or_else(|_| DEFAULT_RETURN_ORIGIN.to_string());
        Url::parse(&return_origin).map_err(|_| ConfigError::InvalidUrl(return_origin.clone()))?;

        let allowed_origins: Vec<String> = env::var("ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        // Payment endpoints never run behind wildcard CORS.
        if allowed_origins.iter().any(|o| o == "*") {
            return Err(ConfigError::InvalidUrl(
                "wildcard CORS origin '*' is not allowed".to_string(),
            ));
        }

        let rate_limit_rpm = env::var("RATE_LIMIT_RPM")
            .ok()
            .and_then(|r| r.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT_RPM);

        let metrics_token = env::var("METRICS_TOKEN")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| s.into_bytes());
        if metrics_token.is_none() {
            tracing::warn!("METRICS_TOKEN not set — /metrics will refuse requests");
        }

        let draft_retention_days = env::var("DRAFT_RETENTION_DAYS")
            .ok()
            .and_then(|d| d.parse().ok())
            .unwrap_or(DEFAULT_DRAFT_RETENTION_DAYS);

        Ok(Self {
            port,
            db_path,
            media_root,
            media_base_url,
            pix_webhook_secret,
            stripe_webhook_secret,
            stripe_secret_key,
            paypal_client_id,
            paypal_client_secret,
            pix_access_token,
            return_origin,
            allowed_origins,
            rate_limit_rpm,
            metrics_token,
            draft_retention_days,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

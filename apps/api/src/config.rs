use anyhow::{Context, Result};

const DEFAULT_BACKGROUND_CHECK_RECIPIENT: &str = "registerutdrag@ivo.se";
const DEFAULT_BACKGROUND_CHECK_SENDER: &str = "Luna <no-reply@luna.se>";

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    /// Base URL under which stored recordings are publicly resolvable.
    pub s3_public_url: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    pub openai_api_key: String,
    pub resend_api_key: String,
    pub microsoft: MicrosoftConfig,
    pub background_check_recipient: String,
    pub background_check_sender: String,
    pub port: u16,
    pub rust_log: String,
}

/// OAuth application registration for the linked Microsoft mailbox.
#[derive(Debug, Clone)]
pub struct MicrosoftConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub tenant: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            s3_public_url: require_env("S3_PUBLIC_URL")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            openai_api_key: require_env("OPENAI_API_KEY")?,
            resend_api_key: require_env("RESEND_API_KEY")?,
            microsoft: MicrosoftConfig {
                client_id: require_env("MS_CLIENT_ID")?,
                client_secret: require_env("MS_CLIENT_SECRET")?,
                redirect_uri: require_env("MS_REDIRECT_URI")?,
                tenant: optional_env("MS_TENANT", "common"),
            },
            background_check_recipient: optional_env(
                "BACKGROUND_CHECK_RECIPIENT",
                DEFAULT_BACKGROUND_CHECK_RECIPIENT,
            ),
            background_check_sender: optional_env(
                "BACKGROUND_CHECK_SENDER",
                DEFAULT_BACKGROUND_CHECK_SENDER,
            ),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: optional_env("RUST_LOG", "info"),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

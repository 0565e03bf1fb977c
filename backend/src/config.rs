use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::env;
use thiserror::Error;

pub const DEFAULT_SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid SHEETSYNC_PORT: {0}")]
    InvalidPort(String),
    #[error("SHEETSYNC_SECRET_KEY is required")]
    MissingSecretKey,
    #[error("invalid SHEETSYNC_SECRET_KEY: {0}")]
    InvalidSecretKey(String),
    #[error("invalid {name}: expected a boolean, got '{value}'")]
    InvalidFlag { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Path of the sqlite database holding accounts, bindings, tasks and logs.
    pub database_path: String,
    pub secret_key: [u8; 32],
    pub google_client_id: String,
    pub google_client_secret: String,
    /// Lock freshly written tabs against direct edits.
    pub protect_tabs: bool,
    /// Fail a bulk sync when a document carries fields its collection header lacks.
    pub strict_shapes: bool,
    pub sheets_api: String,
    pub token_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("SHEETSYNC_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("SHEETSYNC_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .map_err(|error| ConfigError::InvalidPort(error.to_string()))?;
        let database_path =
            env::var("SHEETSYNC_DATABASE").unwrap_or_else(|_| "sheetsync.sqlite".to_string());
        let secret_key = env::var("SHEETSYNC_SECRET_KEY")
            .map_err(|_| ConfigError::MissingSecretKey)
            .and_then(|raw| parse_secret_key(&raw))?;
        let protect_tabs = flag("SHEETSYNC_PROTECT_TABS", true)?;
        let strict_shapes = flag("SHEETSYNC_STRICT_SHAPES", false)?;

        Ok(Self {
            host,
            port,
            database_path,
            secret_key,
            google_client_id: env::var("GOOGLE_CLIENT_ID").unwrap_or_default(),
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET").unwrap_or_default(),
            protect_tabs,
            strict_shapes,
            sheets_api: env::var("SHEETSYNC_SHEETS_API")
                .unwrap_or_else(|_| DEFAULT_SHEETS_API.to_string()),
            token_url: env::var("SHEETSYNC_TOKEN_URL")
                .unwrap_or_else(|_| DEFAULT_TOKEN_URL.to_string()),
        })
    }
}

fn parse_secret_key(raw: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = STANDARD
        .decode(raw.trim().as_bytes())
        .map_err(|error| ConfigError::InvalidSecretKey(error.to_string()))?;
    if bytes.len() != 32 {
        return Err(ConfigError::InvalidSecretKey(format!(
            "expected 32 bytes, got {}",
            bytes.len()
        )));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

fn flag(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(value) => parse_bool(&value).ok_or(ConfigError::InvalidFlag { name, value }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_key_must_be_32_bytes() {
        let valid = STANDARD.encode([7u8; 32]);
        assert_eq!(parse_secret_key(&valid).unwrap(), [7u8; 32]);

        let short = STANDARD.encode([7u8; 16]);
        assert!(matches!(
            parse_secret_key(&short),
            Err(ConfigError::InvalidSecretKey(_))
        ));
        assert!(parse_secret_key("not base64!").is_err());
    }

    #[test]
    fn booleans_accept_common_spellings() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub model: ModelConfig,
    pub ranking: RankingConfig,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: String,
    pub version_override: Option<String>,
    pub catalog_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    pub default_result_limit: usize,
    pub max_result_limit: usize,
    pub max_batch_size: usize,
    pub inference_timeout_ms: u64,
    pub catalog_timeout_ms: u64,
}

impl RankingConfig {
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_millis(self.catalog_timeout_ms)
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret expected in `X-API-Key`; `None` disables the check
    pub api_key: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Config {
            app: AppConfig {
                env: var("APP_ENV").unwrap_or_else(|| "development".to_string()),
                host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&var, "PORT", 8000)?,
                log_format: match var("LOG_FORMAT").as_deref() {
                    Some("pretty") => LogFormat::Pretty,
                    _ => LogFormat::Json,
                },
            },
            model: ModelConfig {
                path: var("MODEL_PATH")
                    .unwrap_or_else(|| "./models/saved_models/two_tower".to_string()),
                version_override: var("MODEL_VERSION"),
                catalog_path: var("CATALOG_PATH"),
            },
            ranking: RankingConfig {
                default_result_limit: parse_or(&var, "DEFAULT_RESULT_LIMIT", 10)?,
                max_result_limit: parse_or(&var, "MAX_RESULT_LIMIT", 100)?,
                max_batch_size: parse_or(&var, "MAX_BATCH_SIZE", 100)?,
                inference_timeout_ms: parse_or(&var, "INFERENCE_TIMEOUT_MS", 2000)?,
                catalog_timeout_ms: parse_or(&var, "CATALOG_TIMEOUT_MS", 500)?,
            },
            auth: AuthConfig {
                api_key: var("API_KEY"),
            },
            cors: CorsConfig {
                allowed_origins: var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|| "*".to_string()),
            },
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.app.host, self.app.port)
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number, got {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.app.port, 8000);
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
        assert_eq!(config.app.log_format, LogFormat::Json);
        assert_eq!(config.model.path, "./models/saved_models/two_tower");
        assert_eq!(config.ranking.default_result_limit, 10);
        assert_eq!(config.ranking.max_result_limit, 100);
        assert_eq!(config.ranking.inference_timeout(), Duration::from_secs(2));
        assert!(config.auth.api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "9090"),
            ("API_KEY", "secret123"),
            ("MAX_RESULT_LIMIT", "50"),
            ("LOG_FORMAT", "pretty"),
            ("CATALOG_PATH", "/data/catalog.json"),
        ])
        .unwrap();

        assert_eq!(config.app.port, 9090);
        assert_eq!(config.auth.api_key.as_deref(), Some("secret123"));
        assert_eq!(config.ranking.max_result_limit, 50);
        assert_eq!(config.app.log_format, LogFormat::Pretty);
        assert_eq!(config.model.catalog_path.as_deref(), Some("/data/catalog.json"));
    }

    #[test]
    fn test_blank_api_key_disables_auth() {
        let config = config_from(&[("API_KEY", "  ")]).unwrap();
        assert!(config.auth.api_key.is_none());
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let err = config_from(&[("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_api_key_redacted_in_debug() {
        let config = config_from(&[("API_KEY", "secret123")]).unwrap();
        assert!(!format!("{:?}", config).contains("secret123"));
    }
}

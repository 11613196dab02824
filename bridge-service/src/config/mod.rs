use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    /// Public origin the bridge is reachable at; advertised in the OAuth
    /// server metadata.
    pub base_url: String,
    pub database: DatabaseConfig,
    pub oauth: OAuthClientConfig,
    pub notion: NotionConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// The single registered OAuth client (the MCP connector).
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotionConfig {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Per-identity budget for the MCP endpoint.
    pub mcp_requests_per_minute: u32,
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = BridgeConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("bridge-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            base_url: get_env("BASE_URL", Some("http://localhost:3847"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", Some("sqlite://bridge.db"), is_prod)?,
            },
            oauth: OAuthClientConfig {
                client_id: get_env("OAUTH_CLIENT_ID", Some("notion-bridge"), is_prod)?,
                client_secret: get_env("OAUTH_CLIENT_SECRET", None, is_prod)?,
            },
            notion: NotionConfig {
                token: get_env("NOTION_TOKEN", None, is_prod)?,
            },
            rate_limit: RateLimitConfig {
                mcp_requests_per_minute: get_env("RATE_LIMIT_MCP_PER_MINUTE", Some("30"), is_prod)?
                    .parse()
                    .unwrap_or(30),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.rate_limit.mcp_requests_per_minute == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "RATE_LIMIT_MCP_PER_MINUTE must be greater than 0"
            )));
        }

        if self.base_url.ends_with('/') {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "BASE_URL must not end with a trailing slash"
            )));
        }

        if self.environment == Environment::Prod && !self.base_url.starts_with("https://") {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "BASE_URL must use https in production"
            )));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

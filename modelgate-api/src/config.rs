/// Configuration management for the API server
///
/// Configuration comes from environment variables (a `.env` file is loaded
/// first when present) and is parsed into a typed [`Config`].
///
/// # Environment Variables
///
/// - `API_HOST` / `API_PORT`: bind address (default: 0.0.0.0:8080)
/// - `CORS_ORIGINS`: comma-separated origins, `*` for permissive (default: *)
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
/// - `DATABASE_CONNECT_TIMEOUT_SECONDS`: acquire timeout (default: 30)
/// - `JWT_SECRET`: signing secret, at least 32 characters; a random key is
///   generated when unset
/// - `ACCESS_TOKEN_EXPIRE_MINUTES`: token lifetime (default: 30)
/// - `ACCESS_DEFAULT_ALLOW`: decision when no access rule exists (default: true)
/// - `STORE_TIMEOUT_MS` / `STORE_MAX_ATTEMPTS`: per-attempt deadline and retry
///   budget for store calls (default: 5000 / 3)
/// - `OLLAMA_API_URL`: model provider base URL (default: http://localhost:11434)
///
/// # Example
///
/// ```no_run
/// use modelgate_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};
use modelgate_shared::auth::jwt::{DEFAULT_TOKEN_TTL_MINUTES, MIN_SECRET_LEN};
use modelgate_shared::db::pool::DatabaseConfig;
use modelgate_shared::db::RetryPolicy;
use modelgate_shared::policy::PolicyConfig;
use serde::{Deserialize, Serialize};

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,

    pub database: DatabaseSettings,

    pub jwt: JwtConfig,

    pub access: AccessConfig,

    pub store: StoreConfig,

    pub ollama: OllamaConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,

    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// PostgreSQL connection URL
    pub url: String,

    pub max_connections: u32,

    pub connect_timeout_seconds: u64,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Signing secret. `None` means an ephemeral key is generated at startup.
    #[serde(skip_serializing)]
    pub secret: Option<String>,

    pub access_token_expire_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    pub default_allow: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub timeout_ms: u64,

    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub api_url: String,
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is missing, a variable cannot be
    /// parsed, or `JWT_SECRET` is set but too short.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let database_url =
            var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let jwt_secret = var("JWT_SECRET");
        if let Some(secret) = &jwt_secret {
            if secret.len() < MIN_SECRET_LEN {
                bail!("JWT_SECRET must be at least {} characters long", MIN_SECRET_LEN);
            }
        }

        let access_token_expire_minutes: i64 =
            parse_or(&var, "ACCESS_TOKEN_EXPIRE_MINUTES", DEFAULT_TOKEN_TTL_MINUTES)?;
        if access_token_expire_minutes <= 0 {
            bail!("ACCESS_TOKEN_EXPIRE_MINUTES must be positive");
        }

        let cors_origins = var("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let default_allow = match var("ACCESS_DEFAULT_ALLOW") {
            Some(value) => parse_bool(&value).context("ACCESS_DEFAULT_ALLOW must be a boolean")?,
            None => true,
        };

        Ok(Self {
            api: ApiConfig {
                host: var("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&var, "API_PORT", 8080)?,
                cors_origins,
            },
            database: DatabaseSettings {
                url: database_url,
                max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 10)?,
                connect_timeout_seconds: parse_or(&var, "DATABASE_CONNECT_TIMEOUT_SECONDS", 30)?,
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                access_token_expire_minutes,
            },
            access: AccessConfig { default_allow },
            store: StoreConfig {
                timeout_ms: parse_or(&var, "STORE_TIMEOUT_MS", 5000)?,
                max_attempts: parse_or(&var, "STORE_MAX_ATTEMPTS", 3)?,
            },
            ollama: OllamaConfig {
                api_url: var("OLLAMA_API_URL")
                    .unwrap_or_else(|| "http://localhost:11434".to_string())
                    .trim_end_matches('/')
                    .to_string(),
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    pub fn allows_any_origin(&self) -> bool {
        self.api.cors_origins.iter().any(|origin| origin == "*")
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            max_connections: self.database.max_connections,
            connect_timeout_seconds: self.database.connect_timeout_seconds,
            ..DatabaseConfig::new(self.database.url.clone())
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.store.max_attempts,
            Duration::from_millis(self.store.timeout_ms),
        )
    }

    pub fn policy_config(&self) -> PolicyConfig {
        PolicyConfig {
            default_allow: self.access.default_allow,
        }
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.jwt.access_token_expire_minutes)
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, value)),
        None => Ok(default),
    }
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("not a boolean: {:?}", other),
    }
}

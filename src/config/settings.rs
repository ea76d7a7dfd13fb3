//! Application settings.
//!
//! Layered loading: baked-in defaults, then `config/default.toml`, then
//! `config/{RUN_ENV}.toml`, then environment variables. A handful of plain
//! variables (`DATABASE_URL`, `JWT_SECRET`, ...) override everything for
//! container deployments.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Secrets shorter than 256 bits are rejected at startup.
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    /// Verification only; tokens are issued by the identity service.
    pub jwt: JwtSettings,
    pub snowflake: SnowflakeSettings,
    pub cors: CorsSettings,
    pub websocket: WebSocketSettings,
    /// "development", "staging", or "production"
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Pool acquire timeout, seconds
    pub acquire_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnowflakeSettings {
    /// Worker identity within the 5-bit machine field
    pub machine_id: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketSettings {
    /// Interval the client is told to heartbeat at
    pub heartbeat_interval_ms: u64,
    /// How long a fresh connection may sit unidentified
    pub identify_timeout_secs: u64,
}

impl Settings {
    /// Load and validate the configuration.
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env file is fine; real deployments use the environment.
        let _ = dotenvy::dotenv();

        let run_env = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        let settings: Self = Config::builder()
            .set_default("environment", run_env.as_str())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout", 30)?
            .set_default("snowflake.machine_id", 1)?
            .set_default("cors.allowed_origins", vec!["http://localhost:3000"])?
            .set_default("websocket.heartbeat_interval_ms", 45_000_i64)?
            .set_default("websocket.identify_timeout_secs", 30_i64)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_env)).required(false))
            // APP__SERVER__PORT=3000 style
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            // Direct overrides for the usual deployment variables
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("jwt.secret", std::env::var("JWT_SECRET").ok())?
            .set_override_option(
                "snowflake.machine_id",
                std::env::var("SNOWFLAKE_MACHINE_ID").ok(),
            )?
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ConfigError::Message(format!(
                "JWT secret must be at least {} bytes, got {}",
                MIN_JWT_SECRET_LENGTH,
                self.jwt.secret.len()
            )));
        }
        Ok(())
    }

    /// Bind address as "host:port".
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

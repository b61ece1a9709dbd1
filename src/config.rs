//! Application-level configuration loaded from the environment.

use std::{env, time::Duration};

use tracing::warn;

/// Fallback signing secret; fine for local development, never for production.
const DEV_JWT_SECRET: &str = "pollroom-dev-secret";

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// TCP port the HTTP server binds to.
    pub port: u16,
    /// MongoDB connection string.
    pub mongo_uri: String,
    /// MongoDB database name override.
    pub mongo_db: Option<String>,
    /// Shared secret used to sign session credentials.
    pub jwt_secret: String,
    /// Lifetime of issued credentials.
    pub credential_ttl: Duration,
    /// Cadence of the expiry sweeper; must not exceed the minimum poll duration.
    pub sweep_interval: Duration,
    /// Cadence of the gateway liveness probe; a connection that misses one
    /// probe window is treated as gone.
    pub ping_interval: Duration,
}

impl AppConfig {
    /// Load the configuration from environment variables, falling back to
    /// development defaults for everything but production secrets.
    pub fn load() -> Self {
        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                warn!("JWT_SECRET not set; using the built-in development secret");
                DEV_JWT_SECRET.to_owned()
            }
        };

        Self {
            port: env_parse("PORT", 8080),
            mongo_uri: env::var("MONGO_URI")
                .unwrap_or_else(|_| "mongodb://localhost:27017".into()),
            mongo_db: env::var("MONGO_DB").ok(),
            jwt_secret,
            credential_ttl: Duration::from_secs(env_parse("CREDENTIAL_TTL_SECS", 24 * 60 * 60)),
            sweep_interval: Duration::from_secs(env_parse("SWEEP_INTERVAL_SECS", 15)),
            ping_interval: Duration::from_secs(env_parse("PING_INTERVAL_SECS", 25)),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            mongo_uri: "mongodb://localhost:27017".into(),
            mongo_db: None,
            jwt_secret: DEV_JWT_SECRET.to_owned(),
            credential_ttl: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(15),
            ping_interval: Duration::from_secs(25),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(value) => value.parse::<T>().unwrap_or_else(|_| {
            warn!(variable = name, value = %value, "unparseable value; using default");
            default
        }),
        Err(_) => default,
    }
}

use common::postgres::PostgresConfig;
use common::telemetry::{LogFormat, TelemetryConfig};
use config::{Config, ConfigError, Environment};
use location_relay::{CorsConfig, HttpServerConfig, LocationRelayConfig, RadarConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Console log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub log_format: String,

    // HTTP configuration
    /// HTTP listener host
    #[serde(default = "default_http_host")]
    pub http_host: String,

    /// HTTP listener port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// CORS allowed origins (comma-separated list, "*" for all origins)
    #[serde(default = "default_cors_allowed_origins")]
    pub cors_allowed_origins: String,

    // PostgreSQL configuration
    /// PostgreSQL host
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    /// PostgreSQL port
    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    /// PostgreSQL database name
    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    /// PostgreSQL username
    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    /// PostgreSQL password
    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    /// Maximum pooled PostgreSQL connections
    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    // Radar configuration
    /// Radar API base URL
    #[serde(default = "default_radar_api_url")]
    pub radar_api_url: String,

    /// Radar secret key sent as the Authorization header
    #[serde(default)]
    pub radar_secret_key: String,

    /// Shared secret used to verify webhook signatures
    #[serde(default)]
    pub radar_webhook_secret: String,

    /// Header carrying the webhook signature
    #[serde(default = "default_radar_signature_header")]
    pub radar_signature_header: String,

    /// Per-request timeout for Radar calls in seconds
    #[serde(default = "default_radar_request_timeout_secs")]
    pub radar_request_timeout_secs: u64,

    // Relay configuration
    /// Seconds between polling ticks
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Role reported for operators without one
    #[serde(default = "default_role")]
    pub default_role: String,

    /// Buffered updates per subscriber before it starts skipping
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // OpenTelemetry configuration
    /// Enable OTLP trace and log export
    #[serde(default)]
    pub otel_enabled: bool,

    /// OTLP gRPC endpoint
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    /// Service name reported to the collector
    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    3001
}

fn default_cors_allowed_origins() -> String {
    "*".to_string()
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "fieldtrack".to_string()
}

fn default_postgres_username() -> String {
    "fieldtrack".to_string()
}

fn default_postgres_password() -> String {
    "fieldtrack".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    5
}

fn default_radar_api_url() -> String {
    "https://api.radar.io/v1".to_string()
}

fn default_radar_signature_header() -> String {
    "x-radar-signature".to_string()
}

fn default_radar_request_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_role() -> String {
    "operator".to_string()
}

fn default_broadcast_capacity() -> usize {
    256
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "fieldtrack-relay".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("FIELDTRACK"))
            .build()?
            .try_deserialize()
    }

    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
            log_format: LogFormat::parse(&self.log_format),
        }
    }

    pub fn postgres(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
        }
    }

    pub fn location_relay(&self) -> LocationRelayConfig {
        LocationRelayConfig {
            radar: RadarConfig {
                api_url: self.radar_api_url.clone(),
                secret_key: self.radar_secret_key.clone(),
                request_timeout: Duration::from_secs(self.radar_request_timeout_secs),
            },
            webhook_secret: self.radar_webhook_secret.clone(),
            http: HttpServerConfig {
                host: self.http_host.clone(),
                port: self.http_port,
                cors: CorsConfig::from_comma_separated(&self.cors_allowed_origins),
                signature_header: self.radar_signature_header.clone(),
            },
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            default_role: self.default_role.clone(),
            broadcast_capacity: self.broadcast_capacity,
        }
    }
}

// Secrets stay out of logs
impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("http_host", &self.http_host)
            .field("http_port", &self.http_port)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("postgres_host", &self.postgres_host)
            .field("postgres_port", &self.postgres_port)
            .field("postgres_database", &self.postgres_database)
            .field("postgres_username", &self.postgres_username)
            .field("postgres_max_pool_size", &self.postgres_max_pool_size)
            .field("radar_api_url", &self.radar_api_url)
            .field("radar_secret_key_set", &!self.radar_secret_key.is_empty())
            .field("radar_webhook_secret_set", &!self.radar_webhook_secret.is_empty())
            .field("radar_signature_header", &self.radar_signature_header)
            .field("radar_request_timeout_secs", &self.radar_request_timeout_secs)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("default_role", &self.default_role)
            .field("broadcast_capacity", &self.broadcast_capacity)
            .field("startup_timeout_secs", &self.startup_timeout_secs)
            .field("otel_enabled", &self.otel_enabled)
            .field("otel_endpoint", &self.otel_endpoint)
            .field("otel_service_name", &self.otel_service_name)
            .finish()
    }
}

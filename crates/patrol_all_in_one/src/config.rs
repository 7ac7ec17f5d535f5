use common::http::{parse_origin_list, HttpServerConfig};
use common::postgres::PostgresConfig;
use common::telemetry::TelemetryConfig;
use config::{Config, ConfigError, Environment};
use decision_worker::domain::DecisionServiceConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use telemetry_gateway::hub::HubConfig;
use telemetry_gateway::mqtt::MqttSubscriberConfig;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // OpenTelemetry configuration
    /// OpenTelemetry OTLP endpoint (gRPC)
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    /// Enable OpenTelemetry export
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    /// Service name for OpenTelemetry resource
    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,

    // HTTP configuration
    #[serde(default = "default_http_host")]
    pub http_host: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Origins allowed to open an observer websocket (comma-separated, `*` = any)
    #[serde(default = "default_ws_allowed_origins")]
    pub ws_allowed_origins: String,

    // MQTT configuration
    #[serde(default = "default_mqtt_broker_url")]
    pub mqtt_broker_url: String,

    #[serde(default = "default_mqtt_client_id")]
    pub mqtt_client_id: String,

    /// First topic segment of `<prefix>/<vehicle_id>/status`
    #[serde(default = "default_mqtt_topic_prefix")]
    pub mqtt_topic_prefix: String,

    #[serde(default = "default_mqtt_keep_alive_secs")]
    pub mqtt_keep_alive_secs: u64,

    #[serde(default = "default_mqtt_retry_delay_secs")]
    pub mqtt_retry_delay_secs: u64,

    /// Consecutive failed connections before ingestion gives up (0 = never)
    #[serde(default = "default_mqtt_max_retry_attempts")]
    pub mqtt_max_retry_attempts: u32,

    // Broadcast hub configuration
    /// Per-observer mailbox size; an observer that falls further behind is evicted
    #[serde(default = "default_hub_mailbox_capacity")]
    pub hub_mailbox_capacity: usize,

    /// Pending hub membership requests before callers wait
    #[serde(default = "default_hub_control_buffer")]
    pub hub_control_buffer: usize,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// NATS Object Store bucket for decision images
    #[serde(default = "default_artifact_bucket")]
    pub artifact_bucket: String,

    // Inference configuration
    /// Base URL of the recognition service; unset uses the stub recognizer
    #[serde(default)]
    pub inference_url: Option<String>,

    #[serde(default = "default_inference_timeout_secs")]
    pub inference_timeout_secs: u64,

    /// File that receives decisions which could not be persisted
    #[serde(default = "default_dead_letter_path")]
    pub dead_letter_path: String,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    /// Upper bound on cleanup after shutdown in seconds
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

// OpenTelemetry defaults
fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_service_name() -> String {
    "patrol-all-in-one".to_string()
}

// HTTP defaults
fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8888
}

fn default_ws_allowed_origins() -> String {
    "*".to_string()
}

// MQTT defaults
fn default_mqtt_broker_url() -> String {
    "mqtt://localhost:1883".to_string()
}

fn default_mqtt_client_id() -> String {
    "patrol-telemetry-gateway".to_string()
}

fn default_mqtt_topic_prefix() -> String {
    "vehicles".to_string()
}

fn default_mqtt_keep_alive_secs() -> u64 {
    30
}

fn default_mqtt_retry_delay_secs() -> u64 {
    5
}

fn default_mqtt_max_retry_attempts() -> u32 {
    0
}

// Hub defaults
fn default_hub_mailbox_capacity() -> usize {
    256
}

fn default_hub_control_buffer() -> usize {
    64
}

// PostgreSQL defaults
fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "patrol".to_string()
}

fn default_postgres_username() -> String {
    "patrol".to_string()
}

fn default_postgres_password() -> String {
    "patrol".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

// NATS defaults
fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_artifact_bucket() -> String {
    "decisions".to_string()
}

// Inference defaults
fn default_inference_timeout_secs() -> u64 {
    30
}

fn default_dead_letter_path() -> String {
    "failed_tasks.log".to_string()
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("PATROL"))
            .build()?
            .try_deserialize()
    }

    /// Reject settings the service cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt_broker_url.trim().is_empty() {
            return Err(ConfigError::Message(
                "mqtt_broker_url must not be empty".to_string(),
            ));
        }
        if self.hub_mailbox_capacity == 0 {
            return Err(ConfigError::Message(
                "hub_mailbox_capacity must be greater than zero".to_string(),
            ));
        }
        if self.hub_control_buffer == 0 {
            return Err(ConfigError::Message(
                "hub_control_buffer must be greater than zero".to_string(),
            ));
        }
        if self.dead_letter_path.trim().is_empty() {
            return Err(ConfigError::Message(
                "dead_letter_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Inference service URL, treating a blank value as unset
    pub fn inference_url(&self) -> Option<&str> {
        self.inference_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
        }
    }

    pub fn http_server_config(&self) -> HttpServerConfig {
        HttpServerConfig {
            host: self.http_host.clone(),
            port: self.http_port,
            cors_allowed_origins: None,
        }
    }

    pub fn ws_allowed_origins(&self) -> Vec<String> {
        parse_origin_list(&self.ws_allowed_origins)
    }

    pub fn mqtt_config(&self) -> MqttSubscriberConfig {
        MqttSubscriberConfig {
            broker_url: self.mqtt_broker_url.clone(),
            client_id: self.mqtt_client_id.clone(),
            topic_prefix: self.mqtt_topic_prefix.clone(),
            keep_alive_secs: self.mqtt_keep_alive_secs,
            retry_delay_secs: self.mqtt_retry_delay_secs,
            max_retry_attempts: self.mqtt_max_retry_attempts,
        }
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            mailbox_capacity: self.hub_mailbox_capacity,
            control_buffer: self.hub_control_buffer,
        }
    }

    pub fn postgres_config(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
        }
    }

    pub fn decision_config(&self) -> DecisionServiceConfig {
        DecisionServiceConfig {
            artifact_bucket: self.artifact_bucket.clone(),
            inference_timeout: self.inference_timeout(),
        }
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

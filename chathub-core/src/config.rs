use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub kafka: KafkaConfig,
    pub jwt: JwtConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8082,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Comma-separated broker list (`bootstrap.servers`)
    pub brokers: String,
    /// Topic carrying chat message records, partitioned by room id
    pub topic: String,
    /// Consumer group prefix; each process derives a unique group from it so
    /// every instance reads the full stream
    pub group_id: String,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            topic: "messages".to_string(),
            group_id: "chathub".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// HS256 secret shared with the identity service. Required.
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from an optional file plus `CHATHUB__`-prefixed
    /// environment variables (e.g. `CHATHUB__KAFKA__BROKERS`).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        builder
            .add_source(Environment::with_prefix("CHATHUB").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Fail fast on misconfigurations that would only surface at runtime.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.jwt.secret.is_empty() {
            errors.push("jwt.secret is required (CHATHUB__JWT__SECRET)".to_string());
        }
        if self.kafka.brokers.is_empty() {
            errors.push("kafka.brokers must not be empty".to_string());
        }
        if self.kafka.topic.is_empty() {
            errors.push("kafka.topic must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8082);
        assert_eq!(config.kafka.brokers, "localhost:9092");
        assert_eq!(config.kafka.topic, "messages");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_requires_jwt_secret() {
        let config = Config::default();
        let errors = config.validate().expect_err("empty secret must fail");
        assert!(errors.iter().any(|e| e.contains("jwt.secret")));

        let mut config = Config::default();
        config.jwt.secret = "test-secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_http_address() {
        let config = Config::default();
        assert_eq!(config.http_address(), "0.0.0.0:8082");
    }
}

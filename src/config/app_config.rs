use serde::Deserialize;

use crate::infrastructure::api_key::DEFAULT_MAX_IDENTIFIER_ATTEMPTS;
use crate::infrastructure::storage::PostgresConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    pub encryption: EncryptionConfig,
    pub api_keys: ApiKeysConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Key material for sealing API key tokens
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Base64 of a 32-byte key
    pub key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiKeysConfig {
    pub max_identifier_attempts: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let defaults = PostgresConfig::default();

        Self {
            url: defaults.url,
            max_connections: defaults.max_connections,
            min_connections: defaults.min_connections,
            connect_timeout_secs: defaults.connect_timeout_secs,
            idle_timeout_secs: defaults.idle_timeout_secs,
        }
    }
}

impl DatabaseConfig {
    pub fn to_postgres_config(&self) -> PostgresConfig {
        PostgresConfig::new(&self.url)
            .with_max_connections(self.max_connections)
            .with_min_connections(self.min_connections)
            .with_connect_timeout(self.connect_timeout_secs)
            .with_idle_timeout(self.idle_timeout_secs)
    }
}

impl std::fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for ApiKeysConfig {
    fn default() -> Self {
        Self {
            max_identifier_attempts: DEFAULT_MAX_IDENTIFIER_ATTEMPTS,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.logging.level, "info");
        assert!(matches!(config.logging.format, LogFormat::Pretty));
        assert_eq!(config.database.max_connections, 10);
        assert!(config.encryption.key.is_none());
        assert_eq!(
            config.api_keys.max_identifier_attempts,
            DEFAULT_MAX_IDENTIFIER_ATTEMPTS
        );
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "logging": { "format": "json" },
            "database": { "url": "postgres://db/panel" },
            "api_keys": { "max_identifier_attempts": 9 }
        }))
        .unwrap();

        assert!(matches!(config.logging.format, LogFormat::Json));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.database.url, "postgres://db/panel");
        assert_eq!(config.database.idle_timeout_secs, 600);
        assert_eq!(config.api_keys.max_identifier_attempts, 9);
    }

    #[test]
    fn test_postgres_config_conversion() {
        let database = DatabaseConfig {
            url: "postgres://db/panel".to_string(),
            max_connections: 4,
            ..Default::default()
        };

        let pg = database.to_postgres_config();
        assert_eq!(pg.url, "postgres://db/panel");
        assert_eq!(pg.max_connections, 4);
        assert_eq!(pg.min_connections, 1);
    }

    #[test]
    fn test_encryption_key_is_redacted() {
        let config = EncryptionConfig {
            key: Some("c2VjcmV0".to_string()),
        };

        let debug = format!("{:?}", config);
        assert!(!debug.contains("c2VjcmV0"));
        assert!(debug.contains("REDACTED"));
    }
}

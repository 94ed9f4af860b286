use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct MessagingConfig {
    /// Without a token, messages are only written to the log.
    pub telegram_bot_token: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_api_base() -> String { "https://api.telegram.org".to_string() }
fn default_request_timeout_ms() -> u64 { 3000 }

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            api_base: default_api_base(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl MessagingConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    /// Upper bound for one fire-and-forget customer notification.
    #[serde(default = "default_notification_timeout_ms")]
    pub notification_timeout_ms: u64,
}

fn default_notification_timeout_ms() -> u64 { 5000 }

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { notification_timeout_ms: default_notification_timeout_ms() }
    }
}

impl DispatchConfig {
    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(self.notification_timeout_ms)
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `TRANZIT__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("TRANZIT").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_fill_optional_sections() {
        let config = parse(
            r#"
            [server]
            port = 8080
            [database]
            url = "postgres://localhost/tranzit"
            "#,
        );
        assert_eq!(config.database.max_connections, 5);
        assert!(config.messaging.telegram_bot_token.is_none());
        assert_eq!(config.messaging.api_base, "https://api.telegram.org");
        assert_eq!(config.dispatch.notification_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_explicit_messaging_settings() {
        let config = parse(
            r#"
            [server]
            port = 8080
            [database]
            url = "postgres://localhost/tranzit"
            max_connections = 20
            [messaging]
            telegram_bot_token = "123:abc"
            request_timeout_ms = 750
            [dispatch]
            notification_timeout_ms = 1500
            "#,
        );
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.messaging.telegram_bot_token.as_deref(), Some("123:abc"));
        assert_eq!(config.messaging.request_timeout(), Duration::from_millis(750));
        assert_eq!(config.dispatch.notification_timeout_ms, 1500);
    }
}

use serde::Deserialize;

use crate::error::Error;

/// Runtime configuration.
///
/// Loaded from `/etc/sdnscope/sdnscope.{json,toml}` or a `sdnscope.{json,toml}`
/// file in the working directory, with `SDNSCOPE__*` environment overrides.
/// The aliases accept the historical camelCase key spelling alongside the
/// config crate's lowercased form.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(alias = "connectionString", alias = "connectionstring")]
    pub connection_string: String,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(
        default = "default_poll_interval",
        alias = "pollInterval",
        alias = "pollinterval"
    )]
    pub poll_interval: u64,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_controller_host")]
    pub host: String,
    #[serde(default = "default_controller_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default = "default_api_username")]
    pub username: String,
    #[serde(default = "default_api_password")]
    pub password: String,
}

fn default_poll_interval() -> u64 {
    30
}

fn default_controller_host() -> String {
    "127.0.0.1".to_string()
}

fn default_controller_port() -> u16 {
    8080
}

fn default_api_port() -> u16 {
    5000
}

fn default_api_username() -> String {
    "root".to_string()
}

fn default_api_password() -> String {
    "password".to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: default_controller_host(),
            port: default_controller_port(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            username: default_api_username(),
            password: default_api_password(),
        }
    }
}

impl Config {
    /// A missing connection string is fatal: without a store there is
    /// nothing to observe into or analyze out of.
    pub fn load() -> Result<Self, Error> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("/etc/sdnscope/sdnscope").required(false))
            .add_source(config::File::with_name("sdnscope").required(false))
            .add_source(config::Environment::with_prefix("SDNSCOPE").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_keys_deserialize() {
        let raw = r#"{
            "connectionString": "/tmp/sdnscope.db",
            "controller": {"host": "10.0.0.1", "port": 8081},
            "pollInterval": 10,
            "api": {"port": 6000, "username": "admin", "password": "secret"}
        }"#;
        let config = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Json))
            .build()
            .unwrap();
        let parsed: Config = config.try_deserialize().unwrap();

        assert_eq!(parsed.connection_string, "/tmp/sdnscope.db");
        assert_eq!(parsed.controller.host, "10.0.0.1");
        assert_eq!(parsed.controller.port, 8081);
        assert_eq!(parsed.poll_interval, 10);
        assert_eq!(parsed.api.port, 6000);
        assert_eq!(parsed.api.username, "admin");
    }

    #[test]
    fn defaults_apply_when_sections_absent() {
        let raw = r#"{"connectionString": "/tmp/sdnscope.db"}"#;
        let config = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Json))
            .build()
            .unwrap();
        let parsed: Config = config.try_deserialize().unwrap();

        assert_eq!(parsed.poll_interval, 30);
        assert_eq!(parsed.controller.port, 8080);
        assert_eq!(parsed.api.username, "root");
    }

    #[test]
    fn missing_connection_string_is_an_error() {
        let config = config::Config::builder()
            .add_source(config::File::from_str("{}", config::FileFormat::Json))
            .build()
            .unwrap();
        assert!(config.try_deserialize::<Config>().is_err());
    }
}

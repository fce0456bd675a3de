use crate::error::ConfigError;
use crate::smartthings::DEFAULT_API_URL;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DEVICE_NAME: &str = "smartthings-energy-control-bulb";
const DEFAULT_MQTT_HOST: &str = "10.0.0.12";
const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_CLIENT_ID: &str = "smartthings-energy-bridge";
const STATE_FILE_NAME: &str = ".energy.yaml";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_token: String,
    pub api_url: String,
    pub device_name: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_client_id: String,
    pub state_file: PathBuf,
    pub fetch_timeout: Duration,
    pub publish_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable lookup, treating empty values as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_token = get("SMARTTHINGS_API_TOKEN").ok_or(ConfigError::MissingToken)?;
        let state_file = match get("ENERGY_STATE_FILE") {
            Some(path) => PathBuf::from(path),
            // Without a home directory keep the file next to the process
            None => get("HOME")
                .map(|home| PathBuf::from(home).join(STATE_FILE_NAME))
                .unwrap_or_else(|| PathBuf::from(STATE_FILE_NAME)),
        };

        Ok(Self {
            api_token,
            api_url: get("SMARTTHINGS_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            device_name: get("SMARTTHINGS_DEVICE")
                .unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string()),
            mqtt_host: get("MQTT_HOST").unwrap_or_else(|| DEFAULT_MQTT_HOST.to_string()),
            mqtt_port: parse_or("MQTT_PORT", get("MQTT_PORT"), DEFAULT_MQTT_PORT)?,
            mqtt_client_id: get("MQTT_CLIENT_ID").unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
            state_file,
            fetch_timeout: Duration::from_secs(parse_or(
                "FETCH_TIMEOUT_SECS",
                get("FETCH_TIMEOUT_SECS"),
                30,
            )?),
            publish_timeout: Duration::from_secs(parse_or(
                "PUBLISH_TIMEOUT_SECS",
                get("PUBLISH_TIMEOUT_SECS"),
                10,
            )?),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(parsed),
            Err(_) => Err(ConfigError::Invalid { name, value }),
        },
    }
}

use thiserror::Error;

/// Startup configuration problems. All of these are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "SmartThings API Token should be provided in the SMARTTHINGS_API_TOKEN environment variable."
    )]
    MissingToken,
    #[error("Invalid value '{value}' for {name}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("SmartThings returned status {status} for {path}")]
    Status { status: u16, path: String },
    #[error("Device '{0}' not found")]
    DeviceNotFound(String),
    #[error("Meter fetch timed out after {0}s")]
    Timeout(u64),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),
    #[error("Publish to {topic} timed out after {secs}s")]
    Timeout { topic: String, secs: u64 },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("State file IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("State file YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

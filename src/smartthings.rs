use crate::error::SourceError;
use crate::meter_source::{ChannelValues, MeterDataSource};
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://api.smartthings.com/v1";

pub struct SmartThingsAPI {
    endpoint_url: String,
    auth_token: String,
    client: reqwest::Client,
}

impl SmartThingsAPI {
    pub fn new(endpoint_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into().trim_end_matches('/').to_string(),
            auth_token: auth_token.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        let response = self
            .client
            .get(format!("{}{}", self.endpoint_url, path))
            .bearer_auth(&self.auth_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SourceError::Status {
                status: response.status().as_u16(),
                path: path.to_string(),
            });
        }
        Ok(response.json().await?)
    }

    pub async fn devices(&self) -> Result<Vec<SmartThingsDevice>, SourceError> {
        let list: DeviceList = self.get_json("/devices").await?;
        Ok(list.items)
    }

    /// Finds the first device whose name matches exactly.
    pub async fn find_device(&self, name: &str) -> Result<SmartThingsDevice, SourceError> {
        self.devices()
            .await?
            .into_iter()
            .inspect(|device| debug!(name = %device.name, id = %device.device_id, "found device"))
            .find(|device| device.name == name)
            .ok_or_else(|| SourceError::DeviceNotFound(name.to_string()))
    }

    /// Reads the device status and flattens the attributes of its `main`
    /// component into attribute name -> numeric value.
    pub async fn device_values(&self, device_id: &str) -> Result<ChannelValues, SourceError> {
        let status: Value = self
            .get_json(&format!("/devices/{}/status", device_id))
            .await?;
        Ok(flatten_main_component(&status))
    }
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartThingsDevice {
    pub device_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    #[serde(default)]
    items: Vec<SmartThingsDevice>,
}

fn flatten_main_component(status: &Value) -> ChannelValues {
    let Some(capabilities) = status
        .pointer("/components/main")
        .and_then(Value::as_object)
    else {
        return ChannelValues::default();
    };
    capabilities
        .values()
        .filter_map(Value::as_object)
        .flat_map(|attributes| attributes.iter())
        .filter_map(|(name, attribute)| {
            attribute
                .get("value")
                .and_then(Value::as_f64)
                .map(|value| (name.clone(), value))
        })
        .collect()
}

/// The discovered energy monitor device, ready to be polled.
pub struct SmartThingsMeter {
    api: SmartThingsAPI,
    device: SmartThingsDevice,
}

impl SmartThingsMeter {
    pub async fn connect(api: SmartThingsAPI, device_name: &str) -> Result<Self, SourceError> {
        let device = api.find_device(device_name).await?;
        Ok(Self { api, device })
    }

    pub fn device(&self) -> &SmartThingsDevice {
        &self.device
    }
}

impl MeterDataSource for SmartThingsMeter {
    async fn channel_values(&mut self) -> Result<ChannelValues, SourceError> {
        self.api.device_values(&self.device.device_id).await
    }
}

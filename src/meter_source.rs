use crate::channel::Channel;
use crate::error::SourceError;
use std::collections::HashMap;

/// Latest values reported by the device, keyed by attribute name.
/// Attributes without a numeric value are simply absent.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChannelValues(pub HashMap<String, f64>);

impl ChannelValues {
    pub fn get(&self, channel: Channel) -> Option<f64> {
        self.0.get(channel.source_key()).copied()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for ChannelValues {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Something that can report the current cumulative meter values.
#[allow(async_fn_in_trait)]
pub trait MeterDataSource {
    async fn channel_values(&mut self) -> Result<ChannelValues, SourceError>;
}

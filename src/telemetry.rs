use crate::error::SinkError;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A value published to the message bus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TelemetryValue {
    /// Daily total, already rounded to 2 decimals.
    Total(f64),
    /// Scaled interval rate.
    Rate(i64),
}

impl fmt::Display for TelemetryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Whole numbers keep one decimal so totals always read as reals
            TelemetryValue::Total(v) if v.fract() == 0.0 => write!(f, "{:.1}", v),
            TelemetryValue::Total(v) => write!(f, "{}", v),
            TelemetryValue::Rate(v) => write!(f, "{}", v),
        }
    }
}

/// Destination for computed usage values.
#[allow(async_fn_in_trait)]
pub trait TelemetrySink {
    async fn publish(&mut self, topic: &str, value: TelemetryValue) -> Result<(), SinkError>;
}

pub struct MqttSink {
    client: AsyncClient,
}

impl MqttSink {
    /// Creates the client and spawns the task that drives its event loop.
    pub fn connect(host: &str, port: u16, client_id: &str) -> Self {
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(60));
        let (client, event_loop) = AsyncClient::new(options, 16);
        info!(host, port, "connecting to MQTT broker");
        tokio::spawn(drive_event_loop(event_loop));
        Self { client }
    }
}

async fn drive_event_loop(mut event_loop: EventLoop) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => info!("MQTT connected"),
            Ok(event) => debug!(?event, "MQTT event"),
            Err(e) => {
                warn!("MQTT connection error: {e}; retrying after short delay");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

impl TelemetrySink for MqttSink {
    async fn publish(&mut self, topic: &str, value: TelemetryValue) -> Result<(), SinkError> {
        debug!(topic, %value, "publishing");
        self.client
            .publish(topic, QoS::AtLeastOnce, false, value.to_string())
            .await?;
        Ok(())
    }
}

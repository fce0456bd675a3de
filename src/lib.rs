//! SmartThings Energy Bridge Library
//!
//! This library polls cumulative electricity and gas readings from a SmartThings
//! energy monitor, turns them into daily totals and interval rates, publishes
//! those over MQTT and keeps enough state on disk to resume after a restart.

pub mod channel;
pub mod config;
pub mod consumption;
pub mod day_tracker;
pub mod energy_monitor;
pub mod error;
pub mod meter_source;
pub mod reading_validator;
pub mod schedule;
pub mod smartthings;
pub mod state_store;
pub mod telemetry;

// Re-export commonly used types for easier access
pub use channel::{Channel, ChannelState};
pub use config::Config;
pub use energy_monitor::{EnergyMonitor, Timeouts};
pub use meter_source::{ChannelValues, MeterDataSource};
pub use smartthings::{SmartThingsAPI, SmartThingsMeter};
pub use state_store::{PersistedSnapshot, StateStore};
pub use telemetry::{MqttSink, TelemetrySink, TelemetryValue};

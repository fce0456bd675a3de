use std::fmt;

/// One of the two utility counters reported by the energy monitor device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Electricity,
    Gas,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Electricity, Channel::Gas];

    /// Attribute name the device reports this channel under.
    pub fn source_key(self) -> &'static str {
        match self {
            Channel::Electricity => "energy",
            Channel::Gas => "gasMeter",
        }
    }

    pub fn rate_topic(self) -> &'static str {
        match self {
            Channel::Electricity => "energy/electricity",
            Channel::Gas => "energy/gas",
        }
    }

    pub fn daily_topic(self) -> &'static str {
        match self {
            Channel::Electricity => "energy/electricity_daily",
            Channel::Gas => "energy/gas_daily",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Electricity => write!(f, "electricity"),
            Channel::Gas => write!(f, "gas"),
        }
    }
}

/// Accounting state for a single channel.
///
/// `last_accepted_reading` never decreases, including across restarts since
/// it is persisted. `day_baseline` is only valid for `current_day`.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ChannelState {
    pub last_accepted_reading: Option<f64>,
    pub day_baseline: Option<f64>,
    /// Day of month (1-31).
    pub current_day: Option<u32>,
}

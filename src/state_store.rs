use crate::channel::{Channel, ChannelState};
use crate::error::StoreError;
use serde_derive::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_MEASUREMENT_PERIOD: u64 = 1;

fn default_measurement_period() -> u64 {
    DEFAULT_MEASUREMENT_PERIOD
}

/// Everything that has to survive a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    #[serde(rename = "lastReadingElec", default)]
    pub last_reading_elec: Option<f64>,
    #[serde(rename = "lastReadingGas", default)]
    pub last_reading_gas: Option<f64>,
    /// Polling interval in minutes.
    #[serde(rename = "measurementPeriod", default = "default_measurement_period")]
    pub measurement_period: u64,
    #[serde(rename = "startOfDayElect", default)]
    pub start_of_day_elect: Option<f64>,
    #[serde(rename = "currentDayElect", default)]
    pub current_day_elect: Option<u32>,
    #[serde(rename = "startOfDayGas", default)]
    pub start_of_day_gas: Option<f64>,
    #[serde(rename = "currentDayGas", default)]
    pub current_day_gas: Option<u32>,
}

impl Default for PersistedSnapshot {
    fn default() -> Self {
        Self {
            last_reading_elec: None,
            last_reading_gas: None,
            measurement_period: DEFAULT_MEASUREMENT_PERIOD,
            start_of_day_elect: None,
            current_day_elect: None,
            start_of_day_gas: None,
            current_day_gas: None,
        }
    }
}

impl PersistedSnapshot {
    pub fn channel(&self, channel: Channel) -> ChannelState {
        match channel {
            Channel::Electricity => ChannelState {
                last_accepted_reading: self.last_reading_elec,
                day_baseline: self.start_of_day_elect,
                current_day: self.current_day_elect,
            },
            Channel::Gas => ChannelState {
                last_accepted_reading: self.last_reading_gas,
                day_baseline: self.start_of_day_gas,
                current_day: self.current_day_gas,
            },
        }
    }

    pub fn from_channels(
        electricity: &ChannelState,
        gas: &ChannelState,
        measurement_period: u64,
    ) -> Self {
        Self {
            last_reading_elec: electricity.last_accepted_reading,
            last_reading_gas: gas.last_accepted_reading,
            measurement_period,
            start_of_day_elect: electricity.day_baseline,
            current_day_elect: electricity.current_day,
            start_of_day_gas: gas.day_baseline,
            current_day_gas: gas.current_day,
        }
    }
}

/// YAML file holding the [`PersistedSnapshot`].
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot, falling back to defaults when no file exists yet.
    pub fn load(&self) -> Result<PersistedSnapshot, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no saved state, starting fresh");
                return Ok(PersistedSnapshot::default());
            }
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(PersistedSnapshot::default());
        }
        let mut snapshot: PersistedSnapshot = serde_yaml::from_str(&raw)?;
        if snapshot.measurement_period == 0 {
            snapshot.measurement_period = DEFAULT_MEASUREMENT_PERIOD;
        }
        debug!(path = %self.path.display(), ?snapshot, "loaded saved state");
        Ok(snapshot)
    }

    /// Moves an unreadable state file to `<path>.corrupt` so the next save
    /// does not destroy it. Returns the new location.
    pub fn set_aside(&self) -> Result<PathBuf, StoreError> {
        let mut aside = self.path.as_os_str().to_owned();
        aside.push(".corrupt");
        let aside = PathBuf::from(aside);
        fs::rename(&self.path, &aside)?;
        Ok(aside)
    }

    /// Overwrites the file with `snapshot`.
    ///
    /// Written to a sibling temp file first and renamed into place, so a crash
    /// mid-write leaves the previous snapshot intact.
    pub fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), StoreError> {
        let yaml = serde_yaml::to_string(snapshot)?;
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        fs::write(&tmp_path, yaml)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

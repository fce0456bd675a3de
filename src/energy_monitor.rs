use crate::channel::{Channel, ChannelState};
use crate::consumption::{accept_reading, ChannelUpdate};
use crate::error::{SinkError, SourceError};
use crate::meter_source::{ChannelValues, MeterDataSource};
use crate::reading_validator::validate;
use crate::schedule::{measurement_interval, Clock, Sleeper};
use crate::state_store::{PersistedSnapshot, StateStore};
use crate::telemetry::{TelemetrySink, TelemetryValue};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub fetch: Duration,
    pub publish: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            fetch: Duration::from_secs(30),
            publish: Duration::from_secs(10),
        }
    }
}

/// What a single poll cycle did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleReport {
    /// False when the meter could not be read and the cycle was skipped.
    pub fetched: bool,
    pub updates: Vec<(Channel, ChannelUpdate)>,
}

/// Validates one candidate and, if accepted, folds it into `state`.
///
/// A rejected candidate is logged and leaves `state` untouched, so the last
/// accepted reading stays authoritative for the next cycle.
pub fn process_candidate(
    channel: Channel,
    candidate: Option<f64>,
    today: u32,
    state: &mut ChannelState,
) -> Option<ChannelUpdate> {
    let previous = state.last_accepted_reading;
    match candidate {
        Some(reading) if validate(candidate, previous) => {
            Some(accept_reading(reading, today, state))
        }
        _ => {
            warn!(
                %channel,
                ?candidate,
                ?previous,
                "Invalid {} reading: {:?} (previous: {:?})",
                channel,
                candidate,
                previous
            );
            None
        }
    }
}

/// Polls the meter, tracks daily usage per channel and publishes the results.
///
/// Owns the per-channel state for the lifetime of the process. Every cycle
/// ends with a full save of the state file, whatever happened before.
pub struct EnergyMonitor<S, T, C> {
    source: S,
    sink: T,
    clock: C,
    store: StateStore,
    electricity: ChannelState,
    gas: ChannelState,
    measurement_period: u64,
    timeouts: Timeouts,
    consecutive_fetch_errors: u32,
}

impl<S, T, C> EnergyMonitor<S, T, C>
where
    S: MeterDataSource,
    T: TelemetrySink,
    C: Clock,
{
    /// Restores state from `store`. An unreadable state file is moved aside
    /// to `<path>.corrupt` and the monitor starts from a fresh snapshot.
    pub fn new(source: S, sink: T, clock: C, store: StateStore, timeouts: Timeouts) -> Self {
        let snapshot = store.load().unwrap_or_else(|e| {
            error!(
                path = %store.path().display(),
                "Failed to load saved state, starting fresh: {e}"
            );
            match store.set_aside() {
                Ok(aside) => warn!(path = %aside.display(), "Unreadable state file kept"),
                Err(e) => error!("Failed to move unreadable state file aside: {e}"),
            }
            PersistedSnapshot::default()
        });
        Self::with_snapshot(source, sink, clock, store, timeouts, snapshot)
    }

    pub fn with_snapshot(
        source: S,
        sink: T,
        clock: C,
        store: StateStore,
        timeouts: Timeouts,
        snapshot: PersistedSnapshot,
    ) -> Self {
        Self {
            source,
            sink,
            clock,
            store,
            electricity: snapshot.channel(Channel::Electricity),
            gas: snapshot.channel(Channel::Gas),
            measurement_period: snapshot.measurement_period.max(1),
            timeouts,
            consecutive_fetch_errors: 0,
        }
    }

    pub fn channel_state(&self, channel: Channel) -> &ChannelState {
        match channel {
            Channel::Electricity => &self.electricity,
            Channel::Gas => &self.gas,
        }
    }

    fn channel_state_mut(&mut self, channel: Channel) -> &mut ChannelState {
        match channel {
            Channel::Electricity => &mut self.electricity,
            Channel::Gas => &mut self.gas,
        }
    }

    /// Polling interval in minutes.
    pub fn measurement_period(&self) -> u64 {
        self.measurement_period
    }

    pub fn snapshot(&self) -> PersistedSnapshot {
        PersistedSnapshot::from_channels(&self.electricity, &self.gas, self.measurement_period)
    }

    /// Runs one fetch, validate, publish, persist cycle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        if let Some(values) = self.fetch().await {
            report.fetched = true;
            let today = self.clock.today();
            for channel in Channel::ALL {
                let candidate = values.get(channel);
                let state = self.channel_state_mut(channel);
                if let Some(update) = process_candidate(channel, candidate, today, state) {
                    self.publish_update(channel, &update).await;
                    report.updates.push((channel, update));
                }
            }
        }

        self.persist();
        report
    }

    async fn fetch(&mut self) -> Option<ChannelValues> {
        let result = match timeout(self.timeouts.fetch, self.source.channel_values()).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(self.timeouts.fetch.as_secs())),
        };
        match result {
            Ok(values) => {
                self.consecutive_fetch_errors = 0;
                debug!(?values, "meter values");
                Some(values)
            }
            Err(e) => {
                self.consecutive_fetch_errors += 1;
                warn!(
                    consecutive = self.consecutive_fetch_errors,
                    "Meter read failed, skipping cycle: {e}"
                );
                None
            }
        }
    }

    async fn publish_update(&mut self, channel: Channel, update: &ChannelUpdate) {
        self.publish(channel.daily_topic(), TelemetryValue::Total(update.daily_total))
            .await;
        if let Some(rate) = update.interval_rate {
            self.publish(channel.rate_topic(), TelemetryValue::Rate(rate))
                .await;
        }
    }

    /// A failed or timed out publish is logged and dropped. The reading that
    /// produced it stays accepted and is persisted, rather than skipping the
    /// cycle, so the next rate is not computed over two intervals.
    async fn publish(&mut self, topic: &str, value: TelemetryValue) {
        let result = match timeout(self.timeouts.publish, self.sink.publish(topic, value)).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout {
                topic: topic.to_string(),
                secs: self.timeouts.publish.as_secs(),
            }),
        };
        if let Err(e) = result {
            warn!(topic, %value, "Publish failed: {e}");
        }
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.snapshot()) {
            error!(path = %self.store.path().display(), "Failed to save state: {e}");
        }
    }

    /// Runs `cycles` cycles, sleeping the measurement period after each one.
    pub async fn run_cycles<Z: Sleeper>(&mut self, cycles: usize, sleeper: &mut Z) {
        for _ in 0..cycles {
            self.run_cycle().await;
            sleeper
                .sleep(measurement_interval(self.measurement_period))
                .await;
        }
    }

    /// Polls forever.
    pub async fn run<Z: Sleeper>(&mut self, sleeper: &mut Z) {
        info!(
            period_minutes = self.measurement_period,
            "Connected, running..."
        );
        loop {
            self.run_cycle().await;
            sleeper
                .sleep(measurement_interval(self.measurement_period))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// Replays queued meter responses; an empty queue reports nothing.
    #[derive(Clone, Default)]
    struct FakeSource {
        responses: Arc<Mutex<VecDeque<Result<ChannelValues, SourceError>>>>,
        hang: bool,
    }

    impl FakeSource {
        fn push(&self, electricity: Option<f64>, gas: Option<f64>) {
            let mut values = ChannelValues::default();
            if let Some(v) = electricity {
                values.0.insert("energy".to_string(), v);
            }
            if let Some(v) = gas {
                values.0.insert("gasMeter".to_string(), v);
            }
            self.responses.lock().unwrap().push_back(Ok(values));
        }

        fn push_error(&self) {
            self.responses
                .lock()
                .unwrap()
                .push_back(Err(SourceError::DeviceNotFound("gone".to_string())));
        }
    }

    impl MeterDataSource for FakeSource {
        async fn channel_values(&mut self) -> Result<ChannelValues, SourceError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ChannelValues::default()))
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        published: Arc<Mutex<Vec<(String, TelemetryValue)>>>,
        hang: bool,
    }

    impl RecordingSink {
        fn take(&self) -> Vec<(String, TelemetryValue)> {
            std::mem::take(&mut *self.published.lock().unwrap())
        }
    }

    impl TelemetrySink for RecordingSink {
        async fn publish(&mut self, topic: &str, value: TelemetryValue) -> Result<(), SinkError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), value));
            Ok(())
        }
    }

    #[derive(Clone)]
    struct FakeClock(Arc<AtomicU32>);

    impl FakeClock {
        fn new(day: u32) -> Self {
            Self(Arc::new(AtomicU32::new(day)))
        }

        fn set(&self, day: u32) {
            self.0.store(day, Ordering::Relaxed);
        }
    }

    impl Clock for FakeClock {
        fn today(&self) -> u32 {
            self.0.load(Ordering::Relaxed)
        }
    }

    #[derive(Default)]
    struct CountingSleeper {
        slept: Vec<Duration>,
    }

    impl Sleeper for CountingSleeper {
        async fn sleep(&mut self, duration: Duration) {
            self.slept.push(duration);
        }
    }

    struct Harness {
        source: FakeSource,
        sink: RecordingSink,
        clock: FakeClock,
        dir: tempfile::TempDir,
    }

    impl Harness {
        fn new(day: u32) -> Self {
            Self {
                source: FakeSource::default(),
                sink: RecordingSink::default(),
                clock: FakeClock::new(day),
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn store(&self) -> StateStore {
            StateStore::new(self.dir.path().join("energy.yaml"))
        }

        fn monitor(&self) -> EnergyMonitor<FakeSource, RecordingSink, FakeClock> {
            EnergyMonitor::new(
                self.source.clone(),
                self.sink.clone(),
                self.clock.clone(),
                self.store(),
                Timeouts::default(),
            )
        }
    }

    fn total(topic: &str, v: f64) -> (String, TelemetryValue) {
        (topic.to_string(), TelemetryValue::Total(v))
    }

    fn rate(topic: &str, v: i64) -> (String, TelemetryValue) {
        (topic.to_string(), TelemetryValue::Rate(v))
    }

    #[tokio::test]
    async fn test_electricity_scenario() {
        let h = Harness::new(14);
        let mut monitor = h.monitor();

        // First ever reading: baseline set, total only
        h.source.push(Some(100.0), None);
        monitor.run_cycle().await;
        assert_eq!(h.sink.take(), vec![total("energy/electricity_daily", 0.0)]);
        let elec = monitor.channel_state(Channel::Electricity);
        assert_eq!(elec.day_baseline, Some(100.0));
        assert_eq!(elec.current_day, Some(14));

        h.source.push(Some(100.01), None);
        monitor.run_cycle().await;
        assert_eq!(
            h.sink.take(),
            vec![
                total("energy/electricity_daily", 0.01),
                rate("energy/electricity", 600),
            ]
        );

        // Backwards reading is ignored
        h.source.push(Some(99.5), None);
        let report = monitor.run_cycle().await;
        assert!(report.fetched);
        assert!(report.updates.is_empty());
        assert!(h.sink.take().is_empty());
        assert_eq!(
            monitor
                .channel_state(Channel::Electricity)
                .last_accepted_reading,
            Some(100.01)
        );

        // New day resets the baseline
        h.clock.set(15);
        h.source.push(Some(150.0), None);
        monitor.run_cycle().await;
        let published = h.sink.take();
        assert_eq!(published[0], total("energy/electricity_daily", 0.0));
        let elec = monitor.channel_state(Channel::Electricity);
        assert_eq!(elec.day_baseline, Some(150.0));
        assert_eq!(elec.current_day, Some(15));
    }

    #[tokio::test]
    async fn test_channels_are_independent() {
        let h = Harness::new(3);
        let mut monitor = h.monitor();

        h.source.push(Some(10.0), Some(500.0));
        monitor.run_cycle().await;
        h.source.push(Some(0.0), Some(500.25));
        let report = monitor.run_cycle().await;

        assert_eq!(report.updates.len(), 1);
        assert_eq!(report.updates[0].0, Channel::Gas);
        assert_eq!(
            monitor.channel_state(Channel::Electricity).last_accepted_reading,
            Some(10.0)
        );
        let published = h.sink.take();
        assert!(published.contains(&total("energy/gas_daily", 0.25)));
        assert!(published.contains(&rate("energy/gas", 15000)));
    }

    #[tokio::test]
    async fn test_state_saved_every_cycle_and_restored() {
        let h = Harness::new(14);
        {
            let mut monitor = h.monitor();
            h.source.push(Some(100.0), Some(40.0));
            monitor.run_cycle().await;
            h.source.push(Some(100.5), None);
            monitor.run_cycle().await;
        }

        let saved = h.store().load().unwrap();
        assert_eq!(saved.last_reading_elec, Some(100.5));
        assert_eq!(saved.last_reading_gas, Some(40.0));
        assert_eq!(saved.start_of_day_elect, Some(100.0));
        assert_eq!(saved.current_day_gas, Some(14));
        assert_eq!(saved.measurement_period, 1);

        // Restart: no spurious spike, rate is against the persisted reading
        h.sink.take();
        let mut monitor = h.monitor();
        h.source.push(Some(100.51), None);
        monitor.run_cycle().await;
        let published = h.sink.take();
        assert_eq!(published[0], total("energy/electricity_daily", 0.51));
        assert_eq!(published[1].0, "energy/electricity");

        // Backwards relative to the persisted value is still rejected
        h.source.push(Some(90.0), None);
        monitor.run_cycle().await;
        assert!(h.sink.take().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_cycle_still_persists() {
        let h = Harness::new(14);
        let mut monitor = h.monitor();
        h.source.push(None, None);
        monitor.run_cycle().await;

        assert!(h.store().path().exists());
        assert_eq!(h.store().load().unwrap(), PersistedSnapshot::default());
    }

    #[tokio::test]
    async fn test_fetch_error_skips_cycle() {
        let h = Harness::new(14);
        let mut monitor = h.monitor();
        h.source.push(Some(100.0), None);
        monitor.run_cycle().await;
        h.sink.take();

        h.source.push_error();
        let report = monitor.run_cycle().await;
        assert!(!report.fetched);
        assert!(h.sink.take().is_empty());
        assert_eq!(
            monitor.channel_state(Channel::Electricity).last_accepted_reading,
            Some(100.0)
        );

        h.source.push(Some(100.5), None);
        let report = monitor.run_cycle().await;
        assert_eq!(report.updates[0].1.interval_rate, Some(30000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_timeout_skips_cycle() {
        let mut h = Harness::new(14);
        h.source.hang = true;
        let mut monitor = h.monitor();
        let report = monitor.run_cycle().await;
        assert!(!report.fetched);
        assert!(h.store().path().exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_timeout_keeps_accepted_reading() {
        let mut h = Harness::new(14);
        h.sink.hang = true;
        let mut monitor = h.monitor();
        h.source.push(Some(100.0), None);
        let report = monitor.run_cycle().await;
        assert_eq!(report.updates.len(), 1);
        assert_eq!(h.store().load().unwrap().last_reading_elec, Some(100.0));
    }

    #[tokio::test]
    async fn test_corrupt_state_file_starts_fresh() {
        let h = Harness::new(14);
        std::fs::write(h.store().path(), "lastReadingElec: [oops\n").unwrap();
        let mut monitor = h.monitor();
        assert_eq!(monitor.snapshot(), PersistedSnapshot::default());

        monitor.run_cycle().await;
        let aside = h.dir.path().join("energy.yaml.corrupt");
        assert_eq!(
            std::fs::read_to_string(aside).unwrap(),
            "lastReadingElec: [oops\n"
        );
        assert_eq!(h.store().load().unwrap(), PersistedSnapshot::default());
    }

    #[test]
    fn test_run_cycles_sleeps_measurement_period() {
        let h = Harness::new(14);
        let snapshot = PersistedSnapshot {
            measurement_period: 5,
            ..PersistedSnapshot::default()
        };
        let mut monitor = EnergyMonitor::with_snapshot(
            h.source.clone(),
            h.sink.clone(),
            h.clock.clone(),
            h.store(),
            Timeouts::default(),
            snapshot,
        );
        let mut sleeper = CountingSleeper::default();
        tokio_test::block_on(monitor.run_cycles(3, &mut sleeper));

        assert_eq!(sleeper.slept, vec![Duration::from_secs(300); 3]);
        assert_eq!(h.store().load().unwrap().measurement_period, 5);
    }

    #[test]
    fn test_huge_measurement_period_does_not_overflow() {
        let h = Harness::new(14);
        std::fs::write(
            h.store().path(),
            format!("measurementPeriod: {}\n", u64::MAX / 2),
        )
        .unwrap();
        let mut monitor = h.monitor();
        let mut sleeper = CountingSleeper::default();
        tokio_test::block_on(monitor.run_cycles(1, &mut sleeper));

        assert_eq!(sleeper.slept, vec![Duration::from_secs(u64::MAX)]);
    }

    #[test]
    fn test_rejection_does_not_touch_state() {
        let mut state = ChannelState {
            last_accepted_reading: Some(100.01),
            day_baseline: Some(90.0),
            current_day: Some(14),
        };
        let before = state;
        for candidate in [None, Some(0.0), Some(-3.0), Some(99.5)] {
            assert_eq!(process_candidate(Channel::Gas, candidate, 15, &mut state), None);
            assert_eq!(state, before);
        }
    }

    #[derive(Debug, Clone)]
    enum Sample {
        Missing,
        Value(f64),
    }

    fn sample() -> impl Strategy<Value = Sample> {
        prop_oneof![
            Just(Sample::Missing),
            Just(Sample::Value(0.0)),
            (-1000.0f64..0.0).prop_map(Sample::Value),
            (0.0f64..10_000.0).prop_map(Sample::Value),
        ]
    }

    proptest! {
        #[test]
        fn accepted_readings_never_decrease(
            samples in prop::collection::vec((sample(), 1u32..=31), 0..100)
        ) {
            let mut state = ChannelState::default();
            let mut seen_days = Vec::new();

            for (sample, day) in samples {
                let before = state;
                let candidate = match sample {
                    Sample::Missing => None,
                    Sample::Value(v) => Some(v),
                };
                match process_candidate(Channel::Electricity, candidate, day, &mut state) {
                    Some(update) => {
                        let reading = state.last_accepted_reading.unwrap();
                        if let Some(previous) = before.last_accepted_reading {
                            prop_assert!(reading >= previous);
                        }
                        if before.current_day != Some(day) {
                            prop_assert_eq!(update.daily_total, 0.0);
                            prop_assert_eq!(state.current_day, Some(day));
                            seen_days.push(day);
                        } else {
                            prop_assert_eq!(state.day_baseline, before.day_baseline);
                        }
                    }
                    None => prop_assert_eq!(state, before),
                }
            }

            // One rollover per run of a newly observed day
            for pair in seen_days.windows(2) {
                prop_assert_ne!(pair[0], pair[1]);
            }
        }
    }
}

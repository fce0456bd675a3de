use crate::channel::ChannelState;
use crate::day_tracker;

/// Values produced for a channel after accepting a reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelUpdate {
    /// Usage since the first valid reading of the day, rounded to 2 decimals.
    pub daily_total: f64,
    /// Scaled delta against the previous accepted reading, if there was one.
    pub interval_rate: Option<i64>,
}

/// Rounds to 2 decimals, sending exact ties to the even neighbour so totals
/// match what existing consumers have always received.
pub fn round_2dp(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

pub fn daily_total(reading: f64, baseline: f64) -> f64 {
    round_2dp(reading - baseline)
}

/// Scales the raw delta between two consecutive readings and truncates
/// toward zero.
///
/// This is not a true per-hour extrapolation. Consumers of the rate topics
/// expect exactly this scaling, and the multiplications must stay in this
/// order: folding them into one factor changes the truncated result.
pub fn interval_rate(reading: f64, previous: f64) -> i64 {
    ((reading - previous) * 1000.0 * 60.0).trunc() as i64
}

/// Folds an already validated reading into `state`.
///
/// Rolls the day over if needed, computes the daily total and (when a previous
/// reading exists) the interval rate, then records the reading as the new
/// last accepted value.
pub fn accept_reading(accepted_reading: f64, today: u32, state: &mut ChannelState) -> ChannelUpdate {
    let baseline = day_tracker::rollover(accepted_reading, today, state);
    let update = ChannelUpdate {
        daily_total: daily_total(accepted_reading, baseline),
        interval_rate: state
            .last_accepted_reading
            .map(|previous| interval_rate(accepted_reading, previous)),
    };
    state.last_accepted_reading = Some(accepted_reading);
    update
}

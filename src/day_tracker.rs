use crate::channel::ChannelState;

/// Applies a lazy day rollover for an accepted reading and returns the
/// baseline for `today`.
///
/// Rollover only happens when a valid reading shows up on a new day, there is
/// no timer. Days are identified by day-of-month alone, so the same day number
/// in two different months looks like the same day. After a long outage that
/// happens to end on the same day-of-month the baseline is kept.
pub fn rollover(accepted_reading: f64, today: u32, state: &mut ChannelState) -> f64 {
    match (state.current_day, state.day_baseline) {
        (Some(day), Some(baseline)) if day == today => baseline,
        _ => {
            state.day_baseline = Some(accepted_reading);
            state.current_day = Some(today);
            accepted_reading
        }
    }
}

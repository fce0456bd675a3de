/// Checks whether a newly observed cumulative counter value can be trusted.
///
/// The device reports 0 (or nothing) when it has no data, and the counter
/// occasionally appears to step backwards. Neither is a usable reading.
pub fn validate(candidate: Option<f64>, previous: Option<f64>) -> bool {
    match candidate {
        Some(value) if value > 0.0 => previous.map_or(true, |prev| value >= prev),
        _ => false,
    }
}

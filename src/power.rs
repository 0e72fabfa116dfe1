use crate::model::{MetricSeries, UnitRating};

/// `(rpm / max_rpm) * capacity`, clamped to `[0, capacity]`.
///
/// Non-finite input or a non-positive rated RPM yields 0.
pub fn estimate(latest_rpm: f64, rated_max_rpm: f64, rated_capacity: f64) -> f64 {
    if !latest_rpm.is_finite() || !rated_max_rpm.is_finite() || rated_max_rpm <= 0.0 {
        return 0.0;
    }
    let capacity = rated_capacity.max(0.0);
    ((latest_rpm / rated_max_rpm) * capacity).clamp(0.0, capacity)
}

/// Power from the newest RPM sample; an empty series means the unit is offline.
pub fn estimate_from_series(rpm: &MetricSeries, rating: UnitRating) -> f64 {
    match rpm.latest() {
        Some(sample) => estimate(sample.value, rating.max_rpm, rating.capacity_w),
        None => 0.0,
    }
}

//! Quick statistics over a set of activities.

use serde::Serialize;

use crate::activity::Activity;

/// Aggregate figures printed after a fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_activities: usize,
    pub total_distance_km: f64,
    pub total_moving_hours: f64,
    pub avg_pace_min_per_km: String,
    pub longest_run_km: f64,
    pub latest_activity_datetime: Option<String>,
}

impl Summary {
    /// Computes the summary of the given activities.
    pub fn from_activities<'a>(activities: impl IntoIterator<Item = &'a Activity>) -> Self {
        let mut total = 0;
        let mut distance_m = 0.0;
        let mut moving_s = 0.0;
        let mut longest_m: f64 = 0.0;
        let mut latest: Option<&str> = None;

        for activity in activities {
            total += 1;
            let d = activity.distance_m();
            distance_m += d;
            moving_s += activity.moving_time_s();
            longest_m = longest_m.max(d);

            let start = activity.effective_start_date();
            if !start.is_empty() && latest.is_none_or(|l| start > l) {
                latest = Some(start);
            }
        }

        let distance_km = distance_m / 1000.0;
        let pace = if distance_km > 0.0 {
            moving_s / distance_km
        } else {
            f64::NAN
        };

        Self {
            total_activities: total,
            total_distance_km: round2(distance_km),
            total_moving_hours: round2(moving_s / 3600.0),
            avg_pace_min_per_km: format_pace(pace),
            longest_run_km: round2(longest_m / 1000.0),
            latest_activity_datetime: latest.map(str::to_string),
        }
    }
}

/// Formats seconds per kilometer as `M:SS min/km`, or `-` when undefined.
pub fn format_pace(seconds_per_km: f64) -> String {
    if !seconds_per_km.is_finite() || seconds_per_km <= 0.0 {
        return "-".to_string();
    }
    let total = seconds_per_km.round() as u64;
    format!("{}:{:02} min/km", total / 60, total % 60)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

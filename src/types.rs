//! Domain types shared across the ingestion pipeline and analytics passes.
//!
//! These are plain data containers; the behavior lives in the component
//! modules (`parser`, `labels`, `reconcile`, `verify`, `analytics`).

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Maximum data lines per trajectory file. Files above the cap are discarded
/// whole as a corpus-quality filter, not treated as an error.
pub const MAX_TRACKPOINTS: usize = 2500;

/// Raw altitude value meaning "altitude unavailable". Mapped to `None`
/// at the parse boundary; never stored or compared downstream.
pub const ALTITUDE_SENTINEL: i32 = -777;

/// Altitudes are recorded in feet; analytics report meters.
pub const FEET_TO_METERS: f64 = 0.3048;

/// Timestamp format used in trajectory files (`2008-10-23 02:53:04`).
pub const TRAJECTORY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timestamp format used in label files (`2008/10/23 02:53:04`).
pub const LABEL_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// A tracked user, created once per dataset directory discovered at ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// Whether the user appears in the labeled-ids list.
    pub has_labels: bool,
}

/// One GPS sample within an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    /// Altitude in feet; `None` when the source carried the sentinel value.
    pub altitude: Option<i32>,
    /// Days elapsed since the epoch used by the recorder.
    pub elapsed_days: f64,
    pub time: NaiveDateTime,
}

/// One recorded trip: a time window plus its ordered point sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Derived from the user id concatenated with the source file's numeric
    /// stem. Globally unique; a duplicate derivation is a data error.
    pub id: i64,
    pub user_id: String,
    /// Transportation mode, populated once by the reconciler.
    pub mode: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    /// Ordered by timestamp ascending; order is significant for analytics.
    pub points: Vec<TrackPoint>,
}

/// Ground-truth assertion that a time window corresponds to a mode.
/// Loaded per user from the label source; never persisted with activities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelInterval {
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub mode: String,
}

impl LabelInterval {
    /// Exact-equality interval match: both bounds must be identical.
    /// No containment, no tolerance window.
    pub fn matches(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start_time == start && self.end_time == end
    }
}

/// A fixed reference coordinate used for exact (rounded) membership testing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub name: String,
    /// Reference latitude, already rounded to 3 decimal places.
    pub lat: f64,
    /// Reference longitude, already rounded to 3 decimal places.
    pub lon: f64,
}

impl Geofence {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            name: name.into(),
            lat,
            lon,
        }
    }

    /// The Forbidden City of Beijing, the reference fence of the battery.
    pub fn forbidden_city() -> Self {
        Self::new("Forbidden City", 39.916, 116.397)
    }

    /// A point is inside iff its coordinates rounded to 3 decimal places
    /// equal the reference coordinate. Not a radius check.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        crate::geo_utils::round3_eq(lat, self.lat) && crate::geo_utils::round3_eq(lon, self.lon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TRAJECTORY_TIME_FORMAT).unwrap()
    }

    #[test]
    fn label_interval_matches_exact_bounds_only() {
        let interval = LabelInterval {
            start_time: ts("2008-10-23 02:53:04"),
            end_time: ts("2008-10-23 11:11:12"),
            mode: "bus".to_string(),
        };

        assert!(interval.matches(ts("2008-10-23 02:53:04"), ts("2008-10-23 11:11:12")));
        // One second off on either bound is not a match.
        assert!(!interval.matches(ts("2008-10-23 02:53:05"), ts("2008-10-23 11:11:12")));
        assert!(!interval.matches(ts("2008-10-23 02:53:04"), ts("2008-10-23 11:11:13")));
    }

    #[test]
    fn geofence_membership_is_exact_after_rounding() {
        let fence = Geofence::forbidden_city();
        assert!(fence.contains(39.9160, 116.3970));
        assert!(fence.contains(39.9164, 116.39703));
        // Rounds to 39.917, outside.
        assert!(!fence.contains(39.9166, 116.3970));
        assert!(!fence.contains(39.9160, 116.3990));
    }

}

//! Analytics battery: independent read-only aggregation passes.
//!
//! Every pass is a stateless query over the persisted dataset. Grouping,
//! sorting and averaging run in SQL where natural; point-level passes
//! (distance, altitude gain, gap detection, geofence membership) iterate one
//! activity's points at a time in Rust. Passes never depend on one another.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::Result;
use crate::geo_utils;
use crate::store::ActivityStore;
use crate::types::{Geofence, FEET_TO_METERS};

/// A consecutive-pair time gap at or above this many seconds flags the whole
/// activity invalid.
pub const INVALID_GAP_SECONDS: i64 = 300;

/// How many users the ranking passes return.
pub const RANKING_LIMIT: usize = 20;

/// Top-level dataset counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetCounts {
    pub users: i64,
    pub activities: i64,
    pub trackpoints: i64,
}

/// `(user, value)` ranking entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRanking<T> {
    pub user_id: String,
    pub value: T,
}

/// Result of the year-with-most-activities vs year-with-most-hours pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearComparison {
    pub most_activities: (i32, i64),
    pub most_hours: (i32, f64),
    pub same_year: bool,
}

/// Predicate for the total-distance pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceFilter {
    pub user_id: String,
    pub mode: String,
    pub year: i32,
}

impl DistanceFilter {
    /// The reference scenario: walking distance of user 112 in 2008.
    pub fn walking_2008_user112() -> Self {
        Self {
            user_id: "112".to_string(),
            mode: "walk".to_string(),
            year: 2008,
        }
    }
}

/// Per-user most-used transportation mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MostUsedMode {
    pub user_id: String,
    pub mode: String,
    pub count: i64,
}

/// Read-only analytics over an [`ActivityStore`].
pub struct AnalyticsEngine<'a> {
    store: &'a ActivityStore,
}

impl<'a> AnalyticsEngine<'a> {
    pub fn new(store: &'a ActivityStore) -> Self {
        Self { store }
    }

    /// Users, activities and trackpoints in the dataset.
    pub fn dataset_counts(&self) -> Result<DatasetCounts> {
        Ok(DatasetCounts {
            users: self.store.count_users()?,
            activities: self.store.count_activities()?,
            trackpoints: self.store.count_trackpoints()?,
        })
    }

    /// Mean activity count over users that have activities.
    pub fn average_activities_per_user(&self) -> Result<f64> {
        self.store.average_activities_per_user()
    }

    /// Top users by activity count, descending.
    pub fn top_users_by_activity_count(&self) -> Result<Vec<UserRanking<i64>>> {
        Ok(self
            .store
            .top_users_by_activity_count(RANKING_LIMIT)?
            .into_iter()
            .map(|(user_id, value)| UserRanking { user_id, value })
            .collect())
    }

    /// Distinct users with at least one activity of `mode`, ascending by id.
    pub fn users_with_mode(&self, mode: &str) -> Result<Vec<String>> {
        self.store.users_with_mode(mode)
    }

    /// Activity count per non-null mode, descending.
    pub fn mode_counts(&self) -> Result<Vec<(String, i64)>> {
        self.store.mode_counts()
    }

    /// Year with the most activities vs year with the most recorded hours.
    /// `None` on an empty dataset.
    pub fn year_comparison(&self) -> Result<Option<YearComparison>> {
        let (Some(most_activities), Some(most_hours)) = (
            self.store.year_with_most_activities()?,
            self.store.year_with_most_hours()?,
        ) else {
            return Ok(None);
        };

        Ok(Some(YearComparison {
            same_year: most_activities.0 == most_hours.0,
            most_activities,
            most_hours,
        }))
    }

    /// Total haversine distance in kilometers over activities matching the
    /// filter. Consecutive in-activity pairs only; no correction for
    /// cross-activity gaps.
    pub fn total_distance_km(&self, filter: &DistanceFilter) -> Result<f64> {
        let ids =
            self.store
                .activity_ids_filtered(&filter.user_id, &filter.mode, filter.year)?;

        let mut total = 0.0;
        for id in ids {
            let coords: Vec<(f64, f64)> = self
                .store
                .trackpoints(id)?
                .iter()
                .map(|p| (p.lat, p.lon))
                .collect();
            total += geo_utils::path_length_km(&coords);
        }
        Ok(total)
    }

    /// Top users by total altitude gained, in meters, descending.
    ///
    /// Within each activity only consecutive pairs where both altitudes are
    /// present contribute, and only positive deltas count (net climbed, not
    /// net change). The unit of record is feet; results are converted.
    pub fn top_users_by_altitude_gain(&self) -> Result<Vec<UserRanking<f64>>> {
        let mut gain_feet: BTreeMap<String, f64> = BTreeMap::new();

        for (activity_id, user_id) in self.store.activity_refs()? {
            let points = self.store.trackpoints(activity_id)?;
            let activity_gain: i64 = points
                .windows(2)
                .filter_map(|pair| match (pair[0].altitude, pair[1].altitude) {
                    (Some(prev), Some(next)) => Some((next - prev) as i64),
                    _ => None,
                })
                .filter(|delta| *delta > 0)
                .sum();
            *gain_feet.entry(user_id).or_default() += activity_gain as f64;
        }

        let mut ranking: Vec<UserRanking<f64>> = gain_feet
            .into_iter()
            .map(|(user_id, feet)| UserRanking {
                user_id,
                value: feet * FEET_TO_METERS,
            })
            .collect();
        // BTreeMap iteration gives ascending user ids, so the sort is a
        // stable descending-by-gain with id-ascending ties.
        ranking.sort_by(|a, b| b.value.total_cmp(&a.value));
        ranking.truncate(RANKING_LIMIT);
        Ok(ranking)
    }

    /// Invalid-activity count per user, descending.
    ///
    /// An activity is invalid iff any consecutive pair of points is
    /// [`INVALID_GAP_SECONDS`] or more apart — one flag per activity no
    /// matter how many gaps it has.
    pub fn invalid_activity_counts(&self) -> Result<Vec<UserRanking<i64>>> {
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();

        for (activity_id, user_id) in self.store.activity_refs()? {
            let points = self.store.trackpoints(activity_id)?;
            let invalid = points.windows(2).any(|pair| {
                pair[1]
                    .time
                    .signed_duration_since(pair[0].time)
                    .num_seconds()
                    >= INVALID_GAP_SECONDS
            });
            if invalid {
                *counts.entry(user_id).or_default() += 1;
            }
        }

        let mut ranking: Vec<UserRanking<i64>> = counts
            .into_iter()
            .map(|(user_id, value)| UserRanking { user_id, value })
            .collect();
        ranking.sort_by(|a, b| b.value.cmp(&a.value));
        Ok(ranking)
    }

    /// Distinct users with at least one point inside the fence, ascending.
    pub fn users_in_geofence(&self, fence: &Geofence) -> Result<Vec<String>> {
        let mut users = std::collections::BTreeSet::new();

        for (activity_id, user_id) in self.store.activity_refs()? {
            if users.contains(&user_id) {
                continue;
            }
            let points = self.store.trackpoints(activity_id)?;
            if points.iter().any(|p| fence.contains(p.lat, p.lon)) {
                users.insert(user_id);
            }
        }

        Ok(users.into_iter().collect())
    }

    /// Each user's most used non-null mode. Highest count wins; equal counts
    /// resolve to the lexicographically smallest mode string.
    pub fn most_used_modes(&self) -> Result<Vec<MostUsedMode>> {
        let mut best: BTreeMap<String, (String, i64)> = BTreeMap::new();

        for (user_id, mode, count) in self.store.mode_counts_per_user()? {
            match best.get(&user_id) {
                Some((_, current)) if *current >= count => {}
                _ => {
                    best.insert(user_id, (mode, count));
                }
            }
        }

        Ok(best
            .into_iter()
            .map(|(user_id, (mode, count))| MostUsedMode {
                user_id,
                mode,
                count,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TrackPoint, User, TRAJECTORY_TIME_FORMAT};
    use chrono::NaiveDateTime;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TRAJECTORY_TIME_FORMAT).unwrap()
    }

    fn point(lat: f64, lon: f64, altitude: Option<i32>, time: &str) -> TrackPoint {
        TrackPoint {
            lat,
            lon,
            altitude,
            elapsed_days: 39744.0,
            time: ts(time),
        }
    }

    fn store_with_users(users: &[&str]) -> ActivityStore {
        let store = ActivityStore::in_memory().unwrap();
        store.init_schema().unwrap();
        for user in users {
            store
                .insert_user(&User {
                    id: user.to_string(),
                    has_labels: false,
                })
                .unwrap();
        }
        store
    }

    fn add_activity(
        store: &mut ActivityStore,
        id: i64,
        user: &str,
        points: Vec<TrackPoint>,
    ) {
        let start = points.first().map(|p| p.time).unwrap();
        let end = points.last().map(|p| p.time).unwrap();
        store.insert_activity(id, user, start, end).unwrap();
        store.append_trackpoints(id, &points).unwrap();
    }

    #[test]
    fn altitude_gain_excludes_sentinel_pairs_from_both_sides() {
        let mut store = store_with_users(&["010"]);
        // [100, -777, 150] feet: both consecutive pairs touch the absent
        // altitude, so the activity contributes zero gain.
        add_activity(
            &mut store,
            1,
            "010",
            vec![
                point(39.98, 116.31, Some(100), "2008-10-23 02:53:04"),
                point(39.98, 116.31, None, "2008-10-23 02:53:06"),
                point(39.98, 116.31, Some(150), "2008-10-23 02:53:08"),
            ],
        );

        let ranking = AnalyticsEngine::new(&store)
            .top_users_by_altitude_gain()
            .unwrap();
        assert_eq!(ranking.len(), 1);
        assert_eq!(ranking[0].value, 0.0);
    }

    #[test]
    fn altitude_gain_sums_positive_deltas_and_converts_to_meters() {
        let mut store = store_with_users(&["010", "011"]);
        // 010: +100 ft then -50 ft then +25 ft -> 125 ft climbed.
        add_activity(
            &mut store,
            1,
            "010",
            vec![
                point(39.98, 116.31, Some(0), "2008-10-23 02:00:00"),
                point(39.98, 116.31, Some(100), "2008-10-23 02:00:10"),
                point(39.98, 116.31, Some(50), "2008-10-23 02:00:20"),
                point(39.98, 116.31, Some(75), "2008-10-23 02:00:30"),
            ],
        );
        // 011: flat.
        add_activity(
            &mut store,
            2,
            "011",
            vec![
                point(39.98, 116.31, Some(10), "2008-10-23 03:00:00"),
                point(39.98, 116.31, Some(10), "2008-10-23 03:00:10"),
            ],
        );

        let ranking = AnalyticsEngine::new(&store)
            .top_users_by_altitude_gain()
            .unwrap();
        assert_eq!(ranking[0].user_id, "010");
        assert!((ranking[0].value - 125.0 * FEET_TO_METERS).abs() < 1e-9);
        assert_eq!(ranking[1].value, 0.0);
    }

    #[test]
    fn gap_of_exactly_300_seconds_is_invalid() {
        let mut store = store_with_users(&["010"]);
        add_activity(
            &mut store,
            1,
            "010",
            vec![
                point(39.98, 116.31, Some(0), "2008-10-23 02:00:00"),
                point(39.98, 116.31, Some(0), "2008-10-23 02:05:00"),
            ],
        );
        // 299 seconds: valid.
        add_activity(
            &mut store,
            2,
            "010",
            vec![
                point(39.98, 116.31, Some(0), "2008-10-23 03:00:00"),
                point(39.98, 116.31, Some(0), "2008-10-23 03:04:59"),
            ],
        );
        // Two gaps in one activity still count once.
        add_activity(
            &mut store,
            3,
            "010",
            vec![
                point(39.98, 116.31, Some(0), "2008-10-23 04:00:00"),
                point(39.98, 116.31, Some(0), "2008-10-23 04:10:00"),
                point(39.98, 116.31, Some(0), "2008-10-23 04:20:00"),
            ],
        );

        let ranking = AnalyticsEngine::new(&store)
            .invalid_activity_counts()
            .unwrap();
        assert_eq!(ranking.len(), 1);
        assert_eq!(ranking[0].value, 2);
    }

    #[test]
    fn distance_pass_respects_the_filter() {
        let mut store = store_with_users(&["112"]);
        // ~1 km walk in 2008.
        add_activity(
            &mut store,
            1,
            "112",
            vec![
                point(0.0, 0.0, Some(0), "2008-05-01 08:00:00"),
                point(0.0089932, 0.0, Some(0), "2008-05-01 08:10:00"),
            ],
        );
        // Same shape in 2009, must not count.
        add_activity(
            &mut store,
            2,
            "112",
            vec![
                point(0.0, 0.0, Some(0), "2009-05-01 08:00:00"),
                point(0.0089932, 0.0, Some(0), "2009-05-01 08:10:00"),
            ],
        );
        store.set_mode(1, "walk").unwrap();
        store.set_mode(2, "walk").unwrap();

        let engine = AnalyticsEngine::new(&store);
        let total = engine
            .total_distance_km(&DistanceFilter::walking_2008_user112())
            .unwrap();
        assert!((total - 1.0).abs() < 0.01, "expected ~1.00 km, got {total}");

        let none = engine
            .total_distance_km(&DistanceFilter {
                mode: "bus".to_string(),
                ..DistanceFilter::walking_2008_user112()
            })
            .unwrap();
        assert_eq!(none, 0.0);
    }

    #[test]
    fn geofence_pass_returns_distinct_users_ascending() {
        let mut store = store_with_users(&["020", "005"]);
        let fence = Geofence::forbidden_city();
        // 005 inside twice (two activities), 020 never inside.
        add_activity(
            &mut store,
            1,
            "005",
            vec![point(39.9161, 116.3968, Some(0), "2008-10-23 02:00:00")],
        );
        add_activity(
            &mut store,
            2,
            "005",
            vec![point(39.916, 116.397, Some(0), "2008-10-24 02:00:00")],
        );
        add_activity(
            &mut store,
            3,
            "020",
            vec![point(39.920, 116.397, Some(0), "2008-10-23 02:00:00")],
        );

        let users = AnalyticsEngine::new(&store)
            .users_in_geofence(&fence)
            .unwrap();
        assert_eq!(users, vec!["005".to_string()]);
    }

    #[test]
    fn most_used_mode_breaks_ties_lexicographically() {
        let mut store = store_with_users(&["010"]);
        for (id, mode, start) in [
            (1, "walk", "2008-10-23 02:00:00"),
            (2, "bus", "2008-10-24 02:00:00"),
            (3, "walk", "2008-10-25 02:00:00"),
            (4, "bus", "2008-10-26 02:00:00"),
        ] {
            add_activity(
                &mut store,
                id,
                "010",
                vec![point(39.98, 116.31, Some(0), start)],
            );
            store.set_mode(id, mode).unwrap();
        }

        let modes = AnalyticsEngine::new(&store).most_used_modes().unwrap();
        assert_eq!(
            modes,
            vec![MostUsedMode {
                user_id: "010".to_string(),
                mode: "bus".to_string(),
                count: 2,
            }]
        );
    }

    #[test]
    fn summary_passes_over_a_small_dataset() {
        let mut store = store_with_users(&["010", "011"]);
        add_activity(
            &mut store,
            1,
            "010",
            vec![
                point(39.98, 116.31, Some(0), "2008-10-23 02:00:00"),
                point(39.98, 116.31, Some(0), "2008-10-23 02:00:05"),
            ],
        );
        add_activity(
            &mut store,
            2,
            "011",
            vec![point(39.98, 116.31, Some(0), "2009-10-23 02:00:00")],
        );
        store.set_mode(1, "taxi").unwrap();

        let engine = AnalyticsEngine::new(&store);
        assert_eq!(
            engine.dataset_counts().unwrap(),
            DatasetCounts {
                users: 2,
                activities: 2,
                trackpoints: 3,
            }
        );
        assert_eq!(engine.average_activities_per_user().unwrap(), 1.0);
        assert_eq!(engine.users_with_mode("taxi").unwrap(), vec!["010".to_string()]);
        assert_eq!(engine.mode_counts().unwrap(), vec![("taxi".to_string(), 1)]);

        // Activity counts tie (one per year) and resolve to the earlier
        // year; 2008 also holds the only nonzero duration.
        let years = engine.year_comparison().unwrap().unwrap();
        assert_eq!(years.most_activities.0, 2008);
        assert_eq!(years.most_hours.0, 2008);
        assert!(years.same_year);
    }
}

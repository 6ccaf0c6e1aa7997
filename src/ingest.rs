//! Dataset ingestion: user discovery, activity-id derivation, persistence.
//!
//! Layout on disk: `<root>/labeled_ids.txt` plus `<root>/Data/<user>/` user
//! directories, each with a `Trajectory/` folder of `.plt` logs. The user id
//! is the directory name; the activity id is the user id concatenated with
//! the file's numeric stem, parsed as an integer.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{Result, TrackError};
use crate::parser::{parse_trajectory_file, ParseOutcome};
use crate::store::ActivityStore;
use crate::types::User;

/// Counters accumulated over one ingestion run. Every skip the pipeline
/// tolerates is visible here rather than silently dropped.
#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestReport {
    pub users_inserted: usize,
    pub activities_inserted: usize,
    pub trackpoints_inserted: usize,
    /// Files excluded whole for exceeding the point cap.
    pub files_too_long: usize,
    /// Files with no parsable data line.
    pub files_empty: usize,
    /// Files whose stem did not yield a numeric activity id.
    pub files_bad_stem: usize,
    /// Files that could not be read or decoded at all.
    pub files_unreadable: usize,
    /// Malformed data lines skipped across all parsed files.
    pub lines_skipped: usize,
    /// Duplicate-key inserts reported and skipped.
    pub duplicate_users: usize,
    pub duplicate_activities: usize,
}

/// Ingest the whole dataset tree into the store.
///
/// `labeled_ids` marks which discovered users carry ground-truth labels.
/// All expected data problems are tolerated and counted; only store or I/O
/// failure aborts the run.
pub fn ingest_dataset(
    store: &mut ActivityStore,
    dataset_root: &Path,
    labeled_ids: &BTreeSet<String>,
) -> Result<IngestReport> {
    let data_dir = dataset_root.join("Data");
    if !data_dir.is_dir() {
        return Err(TrackError::DatasetLayout {
            message: format!("missing Data directory under {}", dataset_root.display()),
        });
    }

    let mut report = IngestReport::default();

    for entry in WalkDir::new(&data_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| TrackError::DatasetLayout {
            message: e.to_string(),
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let user_id = entry.file_name().to_string_lossy().to_string();

        let user = User {
            has_labels: labeled_ids.contains(&user_id),
            id: user_id.clone(),
        };
        match store.insert_user(&user) {
            Ok(()) => report.users_inserted += 1,
            Err(TrackError::DuplicateUser { .. }) => {
                log::warn!("user {user_id} already present, skipping insert");
                report.duplicate_users += 1;
            }
            Err(err) => return Err(err),
        }

        ingest_user_trajectories(store, entry.path(), &user_id, &mut report)?;
    }

    log::info!(
        "ingested {} users, {} activities, {} trackpoints \
         ({} too long, {} empty, {} bad stems, {} unreadable, {} duplicate activities)",
        report.users_inserted,
        report.activities_inserted,
        report.trackpoints_inserted,
        report.files_too_long,
        report.files_empty,
        report.files_bad_stem,
        report.files_unreadable,
        report.duplicate_activities
    );

    Ok(report)
}

fn ingest_user_trajectories(
    store: &mut ActivityStore,
    user_dir: &Path,
    user_id: &str,
    report: &mut IngestReport,
) -> Result<()> {
    let trajectory_dir = user_dir.join("Trajectory");
    if !trajectory_dir.is_dir() {
        log::warn!("user {user_id} has no Trajectory directory");
        return Ok(());
    }

    for entry in WalkDir::new(&trajectory_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| TrackError::DatasetLayout {
            message: e.to_string(),
        })?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().map_or(true, |ext| ext != "plt")
        {
            continue;
        }

        let activity_id = match derive_activity_id(user_id, path) {
            Ok(id) => id,
            Err(TrackError::InvalidActivityId { raw }) => {
                log::warn!("invalid activity id derived from '{raw}', skipping file");
                report.files_bad_stem += 1;
                continue;
            }
            Err(err) => return Err(err),
        };

        let outcome = match parse_trajectory_file(path) {
            Ok(outcome) => outcome,
            Err(TrackError::Io(err)) => {
                log::warn!("cannot read {}: {err}, skipping file", path.display());
                report.files_unreadable += 1;
                continue;
            }
            Err(err) => return Err(err),
        };
        match outcome {
            ParseOutcome::TooLong { .. } => report.files_too_long += 1,
            ParseOutcome::Empty => {
                log::warn!("no parsable data lines in {}", path.display());
                report.files_empty += 1;
            }
            ParseOutcome::Parsed(parsed) => {
                report.lines_skipped += parsed.skipped_lines;
                match store.insert_activity(
                    activity_id,
                    user_id,
                    parsed.start_time,
                    parsed.end_time,
                ) {
                    Ok(()) => {
                        store.append_trackpoints(activity_id, &parsed.points)?;
                        report.activities_inserted += 1;
                        report.trackpoints_inserted += parsed.points.len();
                    }
                    Err(TrackError::DuplicateActivity { .. }) => {
                        log::warn!("activity {activity_id} already present, skipping insert");
                        report.duplicate_activities += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
        }
    }

    Ok(())
}

/// Derive the globally unique activity id from the user id and the file's
/// numeric stem, e.g. user `010` + `20081023025304.plt` →
/// `1020081023025304`.
pub fn derive_activity_id(user_id: &str, path: &Path) -> Result<i64> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let raw = format!("{user_id}{stem}");
    raw.parse::<i64>()
        .map_err(|_| TrackError::InvalidActivityId { raw })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn activity_id_concatenates_user_and_stem() {
        let path = PathBuf::from("Data/010/Trajectory/20081023025304.plt");
        assert_eq!(
            derive_activity_id("010", &path).unwrap(),
            1020081023025304_i64
        );
    }

    #[test]
    fn non_numeric_stem_is_rejected() {
        let path = PathBuf::from("Data/010/Trajectory/notes.plt");
        let err = derive_activity_id("010", &path).unwrap_err();
        assert!(matches!(err, TrackError::InvalidActivityId { .. }));
    }
}

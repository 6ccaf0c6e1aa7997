//! Ground-truth label loading.
//!
//! The label source is a flat `labeled_ids.txt` (one user id per line) plus a
//! per-user `labels.txt`: one header line, then tab-separated rows
//! `start\tend\tmode` with timestamps in `YYYY/MM/DD HH:MM:SS` — a different
//! format from the trajectory files. Malformed rows are skipped with a
//! diagnostic; a labeled user without a label file is a data-quality warning,
//! not a failure.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::Result;
use crate::types::{LabelInterval, LABEL_TIME_FORMAT};

/// Exact field count per label row.
const LABEL_FIELDS: usize = 3;

/// In-memory mapping from user id to that user's ordered label intervals.
#[derive(Debug, Default)]
pub struct LabelStore {
    intervals: HashMap<String, Vec<LabelInterval>>,
}

/// Counters and warnings accumulated while loading the label source.
#[derive(Debug, Default, Clone, Serialize)]
pub struct LabelLoadReport {
    pub users_loaded: usize,
    pub intervals_loaded: usize,
    pub lines_skipped: usize,
    /// Users listed as labeled whose label file does not exist.
    pub missing_sources: Vec<String>,
}

/// Read the labeled-user-id list from `<root>/labeled_ids.txt`.
/// Blank lines are ignored; ordering is normalized for deterministic walks.
pub fn load_labeled_ids(dataset_root: &Path) -> Result<BTreeSet<String>> {
    let path = dataset_root.join("labeled_ids.txt");
    let content = fs::read_to_string(&path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

impl LabelStore {
    /// Load every labeled user's `labels.txt` from `<root>/Data/<user>/`.
    pub fn load(dataset_root: &Path) -> Result<(Self, LabelLoadReport)> {
        let labeled_ids = load_labeled_ids(dataset_root)?;
        Self::load_for_users(dataset_root, &labeled_ids)
    }

    /// Load label files for a known set of labeled users.
    pub fn load_for_users(
        dataset_root: &Path,
        labeled_ids: &BTreeSet<String>,
    ) -> Result<(Self, LabelLoadReport)> {
        let mut store = Self::default();
        let mut report = LabelLoadReport::default();

        for user_id in labeled_ids {
            let path = dataset_root.join("Data").join(user_id).join("labels.txt");
            if !path.is_file() {
                log::warn!("user {user_id} is listed as labeled but has no label file");
                report.missing_sources.push(user_id.clone());
                continue;
            }

            let content = fs::read_to_string(&path)?;
            let mut intervals = Vec::new();

            // First line is a column header.
            for (idx, line) in content.lines().enumerate().skip(1) {
                match parse_label_line(line) {
                    Some(interval) => intervals.push(interval),
                    None => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        log::warn!(
                            "skipping malformed label line {} for user {user_id}: {line:?}",
                            idx + 1
                        );
                        report.lines_skipped += 1;
                    }
                }
            }

            report.users_loaded += 1;
            report.intervals_loaded += intervals.len();
            store.intervals.insert(user_id.clone(), intervals);
        }

        log::info!(
            "loaded {} label intervals for {} users ({} missing sources, {} lines skipped)",
            report.intervals_loaded,
            report.users_loaded,
            report.missing_sources.len(),
            report.lines_skipped
        );

        Ok((store, report))
    }

    /// Intervals for one user, in file order. `None` when the user has no
    /// label source at all (as opposed to an empty one).
    pub fn intervals_for(&self, user_id: &str) -> Option<&[LabelInterval]> {
        self.intervals.get(user_id).map(Vec::as_slice)
    }

    /// First interval whose bounds exactly equal the activity window.
    /// The source data is assumed label-disjoint, so first match wins.
    pub fn find_match(
        &self,
        user_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Option<&str> {
        self.intervals_for(user_id)?
            .iter()
            .find(|interval| interval.matches(start, end))
            .map(|interval| interval.mode.as_str())
    }

    /// Insert intervals directly. Test seam; production loading goes through
    /// [`LabelStore::load`].
    pub fn insert(&mut self, user_id: impl Into<String>, intervals: Vec<LabelInterval>) {
        self.intervals.insert(user_id.into(), intervals);
    }
}

fn parse_label_line(line: &str) -> Option<LabelInterval> {
    let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
    if fields.len() != LABEL_FIELDS {
        return None;
    }

    let start_time = NaiveDateTime::parse_from_str(fields[0].trim(), LABEL_TIME_FORMAT).ok()?;
    let end_time = NaiveDateTime::parse_from_str(fields[1].trim(), LABEL_TIME_FORMAT).ok()?;
    let mode = fields[2].trim();
    if mode.is_empty() {
        return None;
    }

    Some(LabelInterval {
        start_time,
        end_time,
        mode: mode.to_string(),
    })
}

//! Label reconciliation: assign transportation modes to persisted activities.
//!
//! For every user flagged `has_labels`, each of their activities is matched
//! against the user's label intervals by exact `(start, end)` equality and
//! the first match wins. This pass mutates `Activity.mode` in the store; it
//! is meant to run once against a freshly ingested dataset (re-running after
//! the label source changed requires a fresh reconcile over all users).

use serde::Serialize;

use crate::error::Result;
use crate::labels::LabelStore;
use crate::store::ActivityStore;

/// Summary of one reconciliation pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReconcileReport {
    /// Labeled users processed (including those with warnings).
    pub users_processed: usize,
    /// Activities that received a mode.
    pub activities_labeled: usize,
    /// Users declared labeled whose label source is missing entirely.
    pub users_missing_labels: Vec<String>,
    /// Users with a label source where no activity matched any interval —
    /// a signal of upstream data inconsistency.
    pub users_without_matches: Vec<String>,
}

/// Assign modes for every labeled user's activities.
pub fn assign_modes(store: &ActivityStore, labels: &LabelStore) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    for user_id in store.users_with_labels()? {
        report.users_processed += 1;

        if labels.intervals_for(&user_id).is_none() {
            log::warn!(
                "user {user_id} has has_labels set but no label source was found"
            );
            report.users_missing_labels.push(user_id);
            continue;
        }

        let mut any_matched = false;
        for window in store.activity_windows(&user_id)? {
            if let Some(mode) = labels.find_match(&user_id, window.start_time, window.end_time) {
                store.set_mode(window.id, mode)?;
                report.activities_labeled += 1;
                any_matched = true;
            }
        }

        if !any_matched {
            log::warn!(
                "user {user_id} has has_labels set but no activity matched any label interval"
            );
            report.users_without_matches.push(user_id);
        }
    }

    log::info!(
        "reconciliation labeled {} activities across {} users \
         ({} missing sources, {} without matches)",
        report.activities_labeled,
        report.users_processed,
        report.users_missing_labels.len(),
        report.users_without_matches.len()
    );

    Ok(report)
}

//! Consistency verification: audit stored modes against the label source.
//!
//! Recomputes the exact-interval match for every labeled user's activities
//! and compares with what the reconciler persisted. Strictly read-only.
//! Run immediately after reconciliation on the same label source it must
//! report zero mismatches.

use serde::Serialize;

use crate::error::Result;
use crate::labels::LabelStore;
use crate::store::ActivityStore;

/// One stored-vs-truth disagreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub user_id: String,
    pub activity_id: i64,
    pub stored_mode: Option<String>,
    pub truth_mode: String,
}

/// Outcome of one verification pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct VerificationReport {
    /// Activities for which the recomputation found a label interval.
    pub total_with_label: usize,
    /// Of those, how many stored modes agree with the recomputed one.
    pub correct: usize,
    pub mismatches: Vec<Mismatch>,
    /// Labeled users whose label source is missing (skipped, reported).
    pub users_missing_labels: Vec<String>,
}

impl VerificationReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Recompute matches from the label source and compare with stored modes.
pub fn verify_modes(store: &ActivityStore, labels: &LabelStore) -> Result<VerificationReport> {
    let mut report = VerificationReport::default();

    for user_id in store.users_with_labels()? {
        if labels.intervals_for(&user_id).is_none() {
            log::warn!("user {user_id} has has_labels set but no label source was found");
            report.users_missing_labels.push(user_id);
            continue;
        }

        for window in store.activity_windows(&user_id)? {
            let Some(truth_mode) = labels.find_match(&user_id, window.start_time, window.end_time)
            else {
                continue;
            };

            report.total_with_label += 1;
            if window.mode.as_deref() == Some(truth_mode) {
                report.correct += 1;
            } else {
                report.mismatches.push(Mismatch {
                    user_id: user_id.clone(),
                    activity_id: window.id,
                    stored_mode: window.mode.clone(),
                    truth_mode: truth_mode.to_string(),
                });
            }
        }
    }

    log::info!(
        "verification: {}/{} labeled activities consistent, {} mismatches",
        report.correct,
        report.total_with_label,
        report.mismatches.len()
    );

    Ok(report)
}

//! Pipeline binary: drop → recreate schema → ingest → reconcile → verify →
//! analytics report.
//!
//! Usage: `trackstore <dataset-root> [db-path] [--json]`
//! where `<dataset-root>` contains `labeled_ids.txt` and `Data/`. With
//! `--json` the pipeline reports are emitted as JSON instead of prose.
//! Set `RUST_LOG=warn` (or `info`) to see per-line and per-file diagnostics.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use serde::Serialize;
use trackstore::report::print_table;
use trackstore::{
    assign_modes, ingest_dataset, load_labeled_ids, verify_modes, ActivityStore, AnalyticsEngine,
    DistanceFilter, Geofence, IngestReport, LabelLoadReport, LabelStore, ReconcileReport, Result,
    VerificationReport,
};

/// Machine-readable roll-up of one pipeline run.
#[derive(Serialize)]
struct PipelineSummary<'a> {
    ingest: &'a IngestReport,
    labels: &'a LabelLoadReport,
    reconcile: &'a ReconcileReport,
    verification: &'a VerificationReport,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("pipeline failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let (mut positional, mut json) = (Vec::new(), false);
    for arg in env::args().skip(1) {
        if arg == "--json" {
            json = true;
        } else {
            positional.push(arg);
        }
    }
    let mut positional = positional.into_iter();
    let dataset_root = PathBuf::from(positional.next().unwrap_or_else(|| "dataset".to_string()));
    let db_path = PathBuf::from(positional.next().unwrap_or_else(|| "trackstore.db".to_string()));

    let mut store = ActivityStore::open(&db_path)?;
    store.drop_schema()?;
    store.init_schema()?;

    let labeled_ids = load_labeled_ids(&dataset_root)?;
    let ingest = ingest_dataset(&mut store, &dataset_root, &labeled_ids)?;
    let (labels, label_report) = LabelStore::load(&dataset_root)?;
    let reconcile = assign_modes(&store, &labels)?;
    let verification = verify_modes(&store, &labels)?;

    if json {
        let summary = PipelineSummary {
            ingest: &ingest,
            labels: &label_report,
            reconcile: &reconcile,
            verification: &verification,
        };
        match serde_json::to_string_pretty(&summary) {
            Ok(body) => println!("{body}"),
            Err(err) => log::error!("failed to serialize pipeline summary: {err}"),
        }
        return Ok(());
    }

    println!(
        "Ingested {} activities / {} trackpoints for {} users \
         ({} files over the cap, {} empty, {} duplicates)\n",
        ingest.activities_inserted,
        ingest.trackpoints_inserted,
        ingest.users_inserted,
        ingest.files_too_long,
        ingest.files_empty,
        ingest.duplicate_activities
    );

    if !label_report.missing_sources.is_empty() {
        println!(
            "Warning: {} labeled users have no label file: {:?}\n",
            label_report.missing_sources.len(),
            label_report.missing_sources
        );
    }

    println!(
        "Reconciliation labeled {} activities across {} users\n",
        reconcile.activities_labeled, reconcile.users_processed
    );

    println!(
        "Verification: {} out of {} labeled activities are correct.",
        verification.correct, verification.total_with_label
    );
    if verification.is_consistent() {
        println!("No inconsistencies found.\n");
    } else {
        let rows: Vec<Vec<String>> = verification
            .mismatches
            .iter()
            .map(|m| {
                vec![
                    m.user_id.clone(),
                    m.activity_id.to_string(),
                    m.stored_mode.clone().unwrap_or_else(|| "-".to_string()),
                    m.truth_mode.clone(),
                ]
            })
            .collect();
        print_table(
            "Inconsistent activities:",
            &["User ID", "Activity ID", "Stored Mode", "Truth Mode"],
            &rows,
        );
    }

    print_analytics(&store)
}

fn print_analytics(store: &ActivityStore) -> Result<()> {
    let engine = AnalyticsEngine::new(store);

    let counts = engine.dataset_counts()?;
    print_table(
        "1. Dataset counts:",
        &["Users", "Activities", "Trackpoints"],
        &[vec![
            counts.users.to_string(),
            counts.activities.to_string(),
            counts.trackpoints.to_string(),
        ]],
    );

    print_table(
        "2. Average number of activities per user:",
        &["Average Activities per User"],
        &[vec![format!("{:.2}", engine.average_activities_per_user()?)]],
    );

    let top = engine.top_users_by_activity_count()?;
    print_table(
        "3. Top 20 users with the highest number of activities:",
        &["User ID", "Activity Count"],
        &rows2(top.iter().map(|r| (r.user_id.clone(), r.value.to_string()))),
    );

    let taxi_users = engine.users_with_mode("taxi")?;
    print_table(
        "4. Users who have taken a taxi:",
        &["User ID"],
        &taxi_users.iter().map(|u| vec![u.clone()]).collect::<Vec<_>>(),
    );

    let mode_counts = engine.mode_counts()?;
    print_table(
        "5. Count of activities for each transportation mode (excluding null):",
        &["Transportation Mode", "Activity Count"],
        &rows2(mode_counts.iter().map(|(m, c)| (m.clone(), c.to_string()))),
    );

    if let Some(years) = engine.year_comparison()? {
        print_table(
            "6a. Year with the most activities:",
            &["Year", "Activity Count"],
            &[vec![
                years.most_activities.0.to_string(),
                years.most_activities.1.to_string(),
            ]],
        );
        print_table(
            "6b. Year with the most recorded hours:",
            &["Year", "Total Recorded Hours"],
            &[vec![
                years.most_hours.0.to_string(),
                format!("{:.2}", years.most_hours.1),
            ]],
        );
        if years.same_year {
            println!(
                "The year with the most activities ({}) is also the year with the most recorded hours.\n",
                years.most_activities.0
            );
        } else {
            println!(
                "The year with the most activities ({}) is different from the year with the most recorded hours ({}).\n",
                years.most_activities.0, years.most_hours.0
            );
        }
    }

    let walk_filter = DistanceFilter::walking_2008_user112();
    println!(
        "7. Total distance walked in {} by user with id={}:\n   {:.2} km\n",
        walk_filter.year,
        walk_filter.user_id,
        engine.total_distance_km(&walk_filter)?
    );

    let gains = engine.top_users_by_altitude_gain()?;
    print_table(
        "8. Top 20 users who have gained the most altitude meters:",
        &["User ID", "Total Meters Gained"],
        &rows2(
            gains
                .iter()
                .map(|r| (r.user_id.clone(), format!("{:.2}", r.value))),
        ),
    );

    let invalid = engine.invalid_activity_counts()?;
    print_table(
        "9. Users with invalid activities and their count:",
        &["User ID", "Invalid Activity Count"],
        &rows2(
            invalid
                .iter()
                .map(|r| (r.user_id.clone(), r.value.to_string())),
        ),
    );

    let fence = Geofence::forbidden_city();
    let fence_users = engine.users_in_geofence(&fence)?;
    print_table(
        &format!("10. Users who have tracked an activity in the {}:", fence.name),
        &["User ID"],
        &fence_users.iter().map(|u| vec![u.clone()]).collect::<Vec<_>>(),
    );

    let modes = engine.most_used_modes()?;
    print_table(
        "11. Users with registered transportation_mode and their most used mode:",
        &["User ID", "Most Used Transportation Mode"],
        &rows2(modes.iter().map(|m| (m.user_id.clone(), m.mode.clone()))),
    );

    Ok(())
}

fn rows2(pairs: impl Iterator<Item = (String, String)>) -> Vec<Vec<String>> {
    pairs.map(|(a, b)| vec![a, b]).collect()
}

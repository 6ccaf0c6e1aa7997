//! End-to-end pipeline tests over a synthetic on-disk dataset.
//!
//! Builds a Geolife-shaped directory tree in a temp dir (labeled id list,
//! per-user `Trajectory/` logs, `labels.txt`), runs ingest → reconcile →
//! verify against a temp SQLite database, and checks that the pipeline's
//! guarantees hold across module boundaries.

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use trackstore::{
    assign_modes, ingest_dataset, load_labeled_ids, verify_modes, ActivityStore, AnalyticsEngine,
    Geofence, LabelStore, MAX_TRACKPOINTS,
};

const PLT_HEADER: &str = "Geolife trajectory\n\
                          WGS 84\n\
                          Altitude is in Feet\n\
                          Reserved 3\n\
                          0,2,255,My Track,0,0,2,8421376\n\
                          0\n";

/// Write one trajectory file with evenly spaced samples starting at
/// `2008-10-23 02:53:04`, 2 seconds apart.
fn write_plt(dir: &Path, user: &str, stem: &str, rows: usize, altitude: i32) {
    let trajectory_dir = dir.join("Data").join(user).join("Trajectory");
    fs::create_dir_all(&trajectory_dir).unwrap();

    let mut body = String::from(PLT_HEADER);
    for i in 0..rows {
        let total = 2 * 3600 + 53 * 60 + 4 + 2 * i;
        body.push_str(&format!(
            "39.9{:04},116.3{:04},0,{},39744.12,2008-10-23,{:02}:{:02}:{:02}\n",
            i % 10000,
            i % 10000,
            altitude,
            total / 3600,
            (total / 60) % 60,
            total % 60
        ));
    }
    fs::write(trajectory_dir.join(format!("{stem}.plt")), body).unwrap();
}

fn write_labels(dir: &Path, user: &str, rows: &[(&str, &str, &str)]) {
    let user_dir = dir.join("Data").join(user);
    fs::create_dir_all(&user_dir).unwrap();
    let mut body = String::from("Start Time\tEnd Time\tTransportation Mode\n");
    for (start, end, mode) in rows {
        body.push_str(&format!("{start}\t{end}\t{mode}\n"));
    }
    fs::write(user_dir.join("labels.txt"), body).unwrap();
}

fn write_labeled_ids(dir: &Path, ids: &[&str]) {
    fs::write(dir.join("labeled_ids.txt"), ids.join("\n")).unwrap();
}

fn open_temp_store(tmp: &TempDir) -> ActivityStore {
    let store = ActivityStore::open(&tmp.path().join("test.db")).unwrap();
    store.drop_schema().unwrap();
    store.init_schema().unwrap();
    store
}

#[test]
fn full_pipeline_labels_and_verifies_consistently() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    write_labeled_ids(root, &["010", "020"]);
    // 010: ten samples 2s apart -> window 02:53:04 .. 02:53:22.
    write_plt(root, "010", "20081023025304", 10, 492);
    write_labels(
        root,
        "010",
        &[
            // Exact window: matches.
            ("2008/10/23 02:53:04", "2008/10/23 02:53:22", "bus"),
            // One second off: must not match anything.
            ("2008/10/23 02:53:04", "2008/10/23 02:53:23", "taxi"),
        ],
    );
    // 020 is labeled but ships no labels.txt.
    write_plt(root, "020", "20081023030000", 5, 100);
    // 030 is unlabeled.
    write_plt(root, "030", "20081023040000", 5, 100);

    let mut store = open_temp_store(&tmp);
    let labeled_ids = load_labeled_ids(root).unwrap();
    let ingest = ingest_dataset(&mut store, root, &labeled_ids).unwrap();

    assert_eq!(ingest.users_inserted, 3);
    assert_eq!(ingest.activities_inserted, 3);
    assert_eq!(ingest.trackpoints_inserted, 20);
    assert_eq!(ingest.duplicate_activities, 0);

    let (labels, label_report) = LabelStore::load(root).unwrap();
    assert_eq!(label_report.missing_sources, vec!["020".to_string()]);

    let reconcile = assign_modes(&store, &labels).unwrap();
    assert_eq!(reconcile.activities_labeled, 1);
    assert_eq!(reconcile.users_missing_labels, vec!["020".to_string()]);

    let windows = store.activity_windows("010").unwrap();
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].mode.as_deref(), Some("bus"));

    // Round-trip property: verifier right after reconciler, same source.
    let verification = verify_modes(&store, &labels).unwrap();
    assert_eq!(verification.total_with_label, 1);
    assert_eq!(verification.correct, 1);
    assert!(verification.is_consistent());
}

#[test]
fn oversized_file_is_excluded_and_cap_file_is_kept() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    write_labeled_ids(root, &[]);
    write_plt(root, "010", "20081023025304", MAX_TRACKPOINTS + 1, 100);
    write_plt(root, "010", "20081024025304", MAX_TRACKPOINTS, 100);

    let mut store = open_temp_store(&tmp);
    let ingest = ingest_dataset(&mut store, root, &Default::default()).unwrap();

    assert_eq!(ingest.files_too_long, 1);
    assert_eq!(ingest.activities_inserted, 1);
    assert_eq!(ingest.trackpoints_inserted, MAX_TRACKPOINTS);

    // Only the capped file produced an activity.
    let refs = store.activity_refs().unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].0, 1020081024025304);
}

#[test]
fn undecodable_file_is_skipped_and_ingest_continues() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    write_labeled_ids(root, &[]);
    write_plt(root, "010", "20081023025304", 5, 100);
    // A corrupt log full of non-UTF-8 bytes sits next to the good one.
    let trajectory_dir = root.join("Data").join("010").join("Trajectory");
    fs::write(
        trajectory_dir.join("20081024025304.plt"),
        [0xff, 0xfe, 0x00, 0x41, 0xff],
    )
    .unwrap();

    let mut store = open_temp_store(&tmp);
    let ingest = ingest_dataset(&mut store, root, &Default::default()).unwrap();

    assert_eq!(ingest.files_unreadable, 1);
    assert_eq!(ingest.activities_inserted, 1);
    let refs = store.activity_refs().unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].0, 1020081023025304);
}

#[test]
fn reingest_into_populated_store_reports_duplicates() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    write_labeled_ids(root, &[]);
    write_plt(root, "010", "20081023025304", 5, 100);

    let mut store = open_temp_store(&tmp);
    let first = ingest_dataset(&mut store, root, &Default::default()).unwrap();
    assert_eq!(first.activities_inserted, 1);

    // Second run without dropping: both keys collide, nothing is overwritten.
    let second = ingest_dataset(&mut store, root, &Default::default()).unwrap();
    assert_eq!(second.duplicate_users, 1);
    assert_eq!(second.duplicate_activities, 1);
    assert_eq!(second.activities_inserted, 0);
    assert_eq!(store.count_trackpoints().unwrap(), 5);
}

#[test]
fn analytics_battery_runs_over_an_ingested_dataset() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    write_labeled_ids(root, &["010"]);
    write_plt(root, "010", "20081023025304", 10, 492);
    write_labels(
        root,
        "010",
        &[("2008/10/23 02:53:04", "2008/10/23 02:53:22", "taxi")],
    );

    let mut store = open_temp_store(&tmp);
    let labeled_ids = load_labeled_ids(root).unwrap();
    ingest_dataset(&mut store, root, &labeled_ids).unwrap();
    let (labels, _) = LabelStore::load(root).unwrap();
    assign_modes(&store, &labels).unwrap();

    let engine = AnalyticsEngine::new(&store);

    let counts = engine.dataset_counts().unwrap();
    assert_eq!(counts.users, 1);
    assert_eq!(counts.activities, 1);
    assert_eq!(counts.trackpoints, 10);

    assert_eq!(engine.users_with_mode("taxi").unwrap(), vec!["010".to_string()]);
    assert_eq!(
        engine.mode_counts().unwrap(),
        vec![("taxi".to_string(), 1)]
    );
    assert_eq!(engine.most_used_modes().unwrap()[0].mode, "taxi");

    // Constant altitude: zero gain, but the user still appears.
    let gains = engine.top_users_by_altitude_gain().unwrap();
    assert_eq!(gains[0].value, 0.0);

    // 2-second sampling: no invalid gaps.
    assert!(engine.invalid_activity_counts().unwrap().is_empty());

    // Synthetic coordinates are nowhere near the reference fence.
    assert!(engine
        .users_in_geofence(&Geofence::forbidden_city())
        .unwrap()
        .is_empty());

    let years = engine.year_comparison().unwrap().unwrap();
    assert_eq!(years.most_activities, (2008, 1));
    assert!(years.same_year);
}

//! # Trackstore
//!
//! GPS trajectory ingestion, label reconciliation and activity analytics
//! over a SQLite store.
//!
//! The pipeline ingests Geolife-style per-user trajectory logs into
//! `users`/`activities`/`trackpoints` collections, assigns ground-truth
//! transportation modes by exact time-interval matching, audits the result,
//! and runs a battery of independent read-only analytics passes.
//!
//! ## Quick Start
//!
//! ```rust
//! use trackstore::{ActivityStore, AnalyticsEngine};
//!
//! let store = ActivityStore::in_memory().unwrap();
//! store.init_schema().unwrap();
//!
//! let engine = AnalyticsEngine::new(&store);
//! let counts = engine.dataset_counts().unwrap();
//! assert_eq!(counts.activities, 0);
//! ```
//!
//! Batch processing is single-threaded and synchronous by design; the store
//! is the only shared resource and the only fatal failure mode.

// Unified error handling
pub mod error;
pub use error::{Result, TrackError};

// Domain types and constants
pub mod types;
pub use types::{
    Activity, Geofence, LabelInterval, TrackPoint, User, ALTITUDE_SENTINEL, FEET_TO_METERS,
    MAX_TRACKPOINTS,
};

// Geographic utilities (haversine, coordinate rounding)
pub mod geo_utils;

// Trajectory file parsing
pub mod parser;
pub use parser::{parse_trajectory_file, ParseOutcome, ParsedTrajectory};

// Ground-truth label loading
pub mod labels;
pub use labels::{load_labeled_ids, LabelLoadReport, LabelStore};

// SQLite-backed activity store
pub mod store;
pub use store::{ActivityStore, ActivityWindow};

// Dataset ingestion
pub mod ingest;
pub use ingest::{derive_activity_id, ingest_dataset, IngestReport};

// Label reconciliation
pub mod reconcile;
pub use reconcile::{assign_modes, ReconcileReport};

// Consistency verification
pub mod verify;
pub use verify::{verify_modes, Mismatch, VerificationReport};

// Read-only analytics passes
pub mod analytics;
pub use analytics::{
    AnalyticsEngine, DatasetCounts, DistanceFilter, MostUsedMode, UserRanking, YearComparison,
    INVALID_GAP_SECONDS, RANKING_LIMIT,
};

// Tabular output rendering
pub mod report;

//! Trajectory file parsing.
//!
//! A trajectory log carries 6 metadata header lines followed by
//! comma-separated rows `lat,lon,flag,altitude,elapsed_days,date,time`.
//! Parsing is tolerant: a malformed row is skipped with a diagnostic and
//! counted, never an error. The only whole-file outcomes are the point-count
//! cap (the file is excluded from the dataset) and zero parsable rows.

use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;

use crate::error::Result;
use crate::types::{TrackPoint, ALTITUDE_SENTINEL, MAX_TRACKPOINTS, TRAJECTORY_TIME_FORMAT};

/// Number of metadata lines at the top of every trajectory file.
const HEADER_LINES: usize = 6;

/// Minimum comma-separated fields per data row.
const MIN_FIELDS: usize = 7;

/// Result of parsing one trajectory file.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// The file parsed into a time window and an ordered point sequence.
    Parsed(ParsedTrajectory),
    /// The file exceeded the data-line cap and is excluded whole.
    TooLong { lines: usize },
    /// No data line parsed successfully.
    Empty,
}

/// A successfully parsed trajectory file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTrajectory {
    /// Timestamp of the first successfully parsed row.
    pub start_time: NaiveDateTime,
    /// Timestamp of the last successfully parsed row.
    pub end_time: NaiveDateTime,
    /// Points in file order (timestamp ascending in well-formed sources).
    pub points: Vec<TrackPoint>,
    /// Malformed rows skipped while parsing this file.
    pub skipped_lines: usize,
}

/// Parse one trajectory file into a [`ParseOutcome`].
///
/// I/O failure opening or reading the file (including undecodable bytes) is
/// surfaced as an error for the caller to treat as a skipped file; everything
/// about the file *content* resolves to an outcome value.
pub fn parse_trajectory_file(path: &Path) -> Result<ParseOutcome> {
    let content = fs::read_to_string(path)?;
    // Keep the original line index so diagnostics stay accurate when blank
    // lines are interleaved with data rows.
    let data_lines: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .skip(HEADER_LINES)
        .filter(|(_, line)| !line.trim().is_empty())
        .collect();

    if data_lines.len() > MAX_TRACKPOINTS {
        log::warn!(
            "skipping {}: {} data lines exceed the {} point cap",
            path.display(),
            data_lines.len(),
            MAX_TRACKPOINTS
        );
        return Ok(ParseOutcome::TooLong {
            lines: data_lines.len(),
        });
    }

    let mut points = Vec::with_capacity(data_lines.len());
    let mut skipped_lines = 0;

    for &(lineno, line) in &data_lines {
        match parse_line(line) {
            Some(point) => points.push(point),
            None => {
                // Line numbers are 1-based and count the header.
                log::warn!(
                    "skipping malformed line {} in {}: {:?}",
                    lineno + 1,
                    path.display(),
                    line
                );
                skipped_lines += 1;
            }
        }
    }

    let (first, last) = match (points.first(), points.last()) {
        (Some(first), Some(last)) => (first.time, last.time),
        _ => return Ok(ParseOutcome::Empty),
    };

    Ok(ParseOutcome::Parsed(ParsedTrajectory {
        start_time: first,
        end_time: last,
        points,
        skipped_lines,
    }))
}

/// Parse one data row into a point. `None` means the row is malformed.
fn parse_line(line: &str) -> Option<TrackPoint> {
    let fields: Vec<&str> = line.trim().split(',').collect();
    if fields.len() < MIN_FIELDS {
        return None;
    }

    let lat: f64 = fields[0].trim().parse().ok()?;
    let lon: f64 = fields[1].trim().parse().ok()?;
    // Altitudes are recorded as decimal feet but carried as whole feet.
    let altitude_raw: f64 = fields[3].trim().parse().ok()?;
    let elapsed_days: f64 = fields[4].trim().parse().ok()?;

    let stamp = format!("{} {}", fields[5].trim(), fields[6].trim());
    let time = NaiveDateTime::parse_from_str(&stamp, TRAJECTORY_TIME_FORMAT).ok()?;

    let altitude = match altitude_raw as i32 {
        ALTITUDE_SENTINEL => None,
        feet => Some(feet),
    };

    Some(TrackPoint {
        lat,
        lon,
        altitude,
        elapsed_days,
        time,
    })
}

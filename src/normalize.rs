//! # Track Normalizer
//!
//! Cleans raw coordinate sequences before any geometry runs on them. Invalid
//! points are dropped (never repaired) and order is always preserved.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::geo_utils::haversine_km;
use crate::{BoundingBox, Coordinate, Track, TrackPoint};

/// Consecutive rejections after which a far point is accepted as a new anchor.
///
/// A device that resumes recording somewhere else would otherwise lose the rest
/// of the track.
const MAX_CONSECUTIVE_JUMPS: usize = 10;

/// Outcome of checking every coordinate of a track.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct ValidationResult {
    pub valid_count: u32,
    pub total_count: u32,
    /// One entry per invalid coordinate, in input order
    pub issues: Vec<String>,
}

/// Drop invalid coordinates, keeping order.
pub fn normalize_track(coords: &[Coordinate]) -> Track {
    let track: Track = coords.iter().copied().filter(Coordinate::is_valid).collect();
    if track.len() != coords.len() {
        debug!(
            "[Normalize] Dropped {} of {} coordinates",
            coords.len() - track.len(),
            coords.len()
        );
    }
    track
}

/// Drop track points whose coordinate is invalid, keeping order.
pub fn normalize_points(points: &[TrackPoint]) -> Vec<TrackPoint> {
    points
        .iter()
        .copied()
        .filter(|p| p.coordinate.is_valid())
        .collect()
}

/// Check every coordinate and describe each invalid one.
///
/// # Example
///
/// ```rust
/// use track_engine::{validate_coordinates, Coordinate};
///
/// let result = validate_coordinates(&[
///     Coordinate::new(40.7128, -74.0060),
///     Coordinate::new(91.0, 0.0),
///     Coordinate::new(0.0, 0.0),
/// ]);
/// assert_eq!(result.valid_count, 1);
/// assert_eq!(result.total_count, 3);
/// assert_eq!(result.issues.len(), 2);
/// ```
pub fn validate_coordinates(coords: &[Coordinate]) -> ValidationResult {
    let mut issues = Vec::new();
    for (i, c) in coords.iter().enumerate() {
        if let Some(reason) = c.invalid_reason() {
            issues.push(format!("Coordinate {}: {}", i, reason));
        }
    }

    ValidationResult {
        valid_count: (coords.len() - issues.len()) as u32,
        total_count: coords.len() as u32,
        issues,
    }
}

/// Keep only coordinates inside `bounds` (inclusive).
pub fn filter_by_bounds(coords: &[Coordinate], bounds: &BoundingBox) -> Track {
    coords.iter().copied().filter(|c| bounds.contains(c)).collect()
}

/// Drop GPS spikes: points farther than `max_jump_km` from the last kept point.
///
/// The first point is always kept. After ten rejections in a row the next far
/// point is accepted and becomes the new anchor.
pub fn filter_unrealistic_jumps(coords: &[Coordinate], max_jump_km: f64) -> Track {
    let Some(first) = coords.first() else {
        return Vec::new();
    };

    let mut kept = vec![*first];
    let mut rejected = 0;

    for c in &coords[1..] {
        let last = kept[kept.len() - 1];
        if haversine_km(&last, c) > max_jump_km && rejected < MAX_CONSECUTIVE_JUMPS {
            rejected += 1;
            continue;
        }
        rejected = 0;
        kept.push(*c);
    }

    if kept.len() != coords.len() {
        debug!(
            "[Normalize] Jump filter removed {} points (limit {} km)",
            coords.len() - kept.len(),
            max_jump_km
        );
    }
    kept
}

/// Split a track wherever consecutive points are more than `max_gap_km` apart.
///
/// `_max_time_gap_seconds` is reserved and ignored, since plain coordinates
/// carry no time.
///
/// # Example
///
/// ```rust
/// use track_engine::{split_track_by_gaps, Coordinate};
///
/// let parts = split_track_by_gaps(&[
///     Coordinate::new(37.7749, -122.4194),
///     Coordinate::new(37.7849, -122.4094),
///     Coordinate::new(40.7128, -74.0060),
///     Coordinate::new(40.7228, -74.0160),
/// ], 100.0, None);
/// assert_eq!(parts.len(), 2);
/// ```
pub fn split_track_by_gaps(
    coords: &[Coordinate],
    max_gap_km: f64,
    _max_time_gap_seconds: Option<f64>,
) -> Vec<Track> {
    let mut parts = Vec::new();
    let mut current: Track = Vec::new();

    for c in coords {
        if let Some(last) = current.last() {
            if haversine_km(last, c) > max_gap_km {
                parts.push(std::mem::take(&mut current));
            }
        }
        current.push(*c);
    }
    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

//! Track simplification and resampling.
//!
//! [`simplify_track`] is Douglas-Peucker in plain (latitude, longitude) degree
//! space. Tolerance is therefore in degrees; `0.0001` is roughly 11 m of
//! latitude.

use log::debug;

use crate::{Coordinate, Track};

/// Simplify a track with the Douglas-Peucker algorithm.
///
/// The first and last points are always kept and the output is an
/// order-preserving subsequence of the input. A non-positive or non-finite
/// tolerance, or a track of two points or fewer, is returned unchanged.
///
/// # Example
///
/// ```rust
/// use track_engine::{simplify_track, Coordinate};
///
/// let track: Vec<Coordinate> = (0..50)
///     .map(|i| Coordinate::new(45.0 + i as f64 * 0.001, 7.0))
///     .collect();
///
/// // A straight line collapses to its endpoints
/// let simplified = simplify_track(&track, 0.0001);
/// assert_eq!(simplified, vec![track[0], track[49]]);
/// ```
pub fn simplify_track(track: &[Coordinate], tolerance: f64) -> Track {
    if track.len() <= 2 || !tolerance.is_finite() || tolerance <= 0.0 {
        return track.to_vec();
    }

    let last = track.len() - 1;
    let mut keep = vec![false; track.len()];
    keep[0] = true;
    keep[last] = true;

    // Explicit stack so very long tracks can't overflow the call stack
    let mut stack = vec![(0usize, last)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }

        let mut max_dist = 0.0;
        let mut max_index = start;
        for i in (start + 1)..end {
            let d = segment_distance(&track[i], &track[start], &track[end]);
            // Strict comparison keeps the earliest index on ties
            if d > max_dist {
                max_dist = d;
                max_index = i;
            }
        }

        if max_dist > tolerance {
            keep[max_index] = true;
            stack.push((max_index, end));
            stack.push((start, max_index));
        }
    }

    let simplified: Track = track
        .iter()
        .zip(&keep)
        .filter_map(|(c, &k)| k.then_some(*c))
        .collect();

    debug!(
        "[Simplify] {} -> {} points (tolerance {})",
        track.len(),
        simplified.len(),
        tolerance
    );
    simplified
}

/// Distance in degrees from `p` to the segment `a`-`b`.
fn segment_distance(p: &Coordinate, a: &Coordinate, b: &Coordinate) -> f64 {
    let (px, py) = (p.longitude, p.latitude);
    let (ax, ay) = (a.longitude, a.latitude);
    let (dx, dy) = (b.longitude - ax, b.latitude - ay);

    let len_sq = dx * dx + dy * dy;
    let t = if len_sq > 0.0 {
        (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let (cx, cy) = (ax + t * dx, ay + t * dy);
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}

/// Thin a track to about `target` points by even index spacing.
///
/// Returns the input unchanged when it already has `target` points or fewer.
/// Otherwise picks `target` evenly spaced points and appends the last point,
/// so the result has at most `target + 1` points and always ends where the
/// input ends.
///
/// ```rust
/// use track_engine::{resample_track, Coordinate};
///
/// let track: Vec<Coordinate> = (0..10_000)
///     .map(|i| Coordinate::new(45.0 + i as f64 * 1e-5, 7.0))
///     .collect();
/// assert_eq!(resample_track(&track, 1000).len(), 1001);
/// ```
pub fn resample_track(track: &[Coordinate], target: usize) -> Track {
    if target >= track.len() {
        return track.to_vec();
    }
    if target == 0 {
        return Vec::new();
    }

    let step = track.len() as f64 / target as f64;
    let last = track.len() - 1;
    let mut out: Track = (0..target)
        .map(|i| track[((i as f64 * step) as usize).min(last)])
        .collect();

    let last_index = (((target - 1) as f64) * step) as usize;
    if last_index < last {
        out.push(track[last]);
    }
    out
}

//! Cross-track intersection detection.
//!
//! Every segment of every track goes into one R-tree, padded by the tolerance.
//! Segment pairs from different tracks are then tested in a local
//! equirectangular plane (kilometers) around the pair: a crossing or touch is
//! reported at the crossing point, otherwise the closest approach is reported
//! at its midpoint when it is within tolerance.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Coord, Line};
use log::debug;
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use crate::geo_utils::{haversine_km, meters_to_degrees, LocalProjection};
use crate::normalize::normalize_track;
use crate::{Coordinate, Track};

/// Hits closer than this are the same place even at zero tolerance.
const MIN_MERGE_KM: f64 = 1e-6;

/// A location where two or more tracks cross or pass within tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Intersection {
    pub coordinate: Coordinate,
    /// Indices into the input track list, ascending, at least two
    pub track_indices: Vec<u32>,
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    track: usize,
    a: Coordinate,
    b: Coordinate,
    pad_deg: f64,
}

impl RTreeObject for Segment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [
                self.a.longitude.min(self.b.longitude) - self.pad_deg,
                self.a.latitude.min(self.b.latitude) - self.pad_deg,
            ],
            [
                self.a.longitude.max(self.b.longitude) + self.pad_deg,
                self.a.latitude.max(self.b.latitude) + self.pad_deg,
            ],
        )
    }
}

fn segments_of(track_index: usize, track: &[Coordinate], pad_m: f64) -> Vec<Segment> {
    let segment = |a: Coordinate, b: Coordinate| Segment {
        track: track_index,
        a,
        b,
        pad_deg: meters_to_degrees(pad_m, a.latitude),
    };
    match track {
        [] => Vec::new(),
        // A lone point acts as a zero-length segment
        [p] => vec![segment(*p, *p)],
        _ => track.windows(2).map(|w| segment(w[0], w[1])).collect(),
    }
}

/// Closest point on segment `a`-`b` to `p`, in the plane.
fn closest_on_segment(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> Coord<f64> {
    let d = b - a;
    let len_sq = d.x * d.x + d.y * d.y;
    if len_sq == 0.0 {
        return a;
    }
    let t = (((p.x - a.x) * d.x + (p.y - a.y) * d.y) / len_sq).clamp(0.0, 1.0);
    a + d * t
}

fn planar_distance(p: Coord<f64>, q: Coord<f64>) -> f64 {
    ((p.x - q.x).powi(2) + (p.y - q.y).powi(2)).sqrt()
}

/// Where two segments meet or pass closest, if within `tolerance_km`.
fn segment_hit(s: &Segment, t: &Segment, tolerance_km: f64) -> Option<Coordinate> {
    let proj = LocalProjection::new(s.a);
    let (a1, a2) = (proj.project(&s.a), proj.project(&s.b));
    let (b1, b2) = (proj.project(&t.a), proj.project(&t.b));

    if a1 != a2 && b1 != b2 {
        match line_intersection(Line::new(a1, a2), Line::new(b1, b2)) {
            Some(LineIntersection::SinglePoint { intersection, .. }) => {
                return Some(proj.unproject(intersection));
            }
            Some(LineIntersection::Collinear { intersection }) => {
                return Some(proj.unproject((intersection.start + intersection.end) / 2.0));
            }
            None => {}
        }
    }

    // No crossing: the closest approach is at an endpoint of one segment
    let candidates = [
        (a1, closest_on_segment(a1, b1, b2)),
        (a2, closest_on_segment(a2, b1, b2)),
        (b1, closest_on_segment(b1, a1, a2)),
        (b2, closest_on_segment(b2, a1, a2)),
    ];
    let (p, q) = candidates
        .into_iter()
        .min_by(|x, y| planar_distance(x.0, x.1).total_cmp(&planar_distance(y.0, y.1)))?;

    (planar_distance(p, q) <= tolerance_km).then(|| proj.unproject((p + q) / 2.0))
}

/// Find where tracks cross or come within `tolerance_km` of each other.
///
/// Hits within tolerance of an earlier hit are merged into it, so a place
/// several tracks share is reported once with all their indices. Fewer than
/// two tracks give no intersections.
///
/// # Example
///
/// ```rust
/// use track_engine::{find_track_intersections, Coordinate};
///
/// let north_south = vec![Coordinate::new(47.0, 8.5), Coordinate::new(47.1, 8.5)];
/// let east_west = vec![Coordinate::new(47.05, 8.4), Coordinate::new(47.05, 8.6)];
///
/// let hits = find_track_intersections(&[north_south, east_west], 0.01);
/// assert_eq!(hits.len(), 1);
/// assert_eq!(hits[0].track_indices, vec![0, 1]);
/// assert!((hits[0].coordinate.latitude - 47.05).abs() < 1e-6);
/// ```
pub fn find_track_intersections(tracks: &[Track], tolerance_km: f64) -> Vec<Intersection> {
    if tracks.len() < 2 {
        return Vec::new();
    }
    let tolerance_km = if tolerance_km.is_finite() { tolerance_km.max(0.0) } else { 0.0 };
    let pad_m = tolerance_km * 1000.0;

    let per_track: Vec<Vec<Segment>> = tracks
        .iter()
        .enumerate()
        .map(|(i, t)| segments_of(i, &normalize_track(t), pad_m))
        .collect();
    let tree = RTree::bulk_load(per_track.iter().flatten().copied().collect());

    let merge_km = tolerance_km.max(MIN_MERGE_KM);
    let mut found: Vec<Intersection> = Vec::new();
    let mut pair_tests = 0usize;

    for segments in &per_track {
        for s in segments {
            for t in tree.locate_in_envelope_intersecting(&s.envelope()) {
                // Each unordered track pair once, never a track with itself
                if t.track <= s.track {
                    continue;
                }
                pair_tests += 1;
                if let Some(point) = segment_hit(s, t, tolerance_km) {
                    record_hit(&mut found, point, s.track, t.track, merge_km);
                }
            }
        }
    }

    debug!(
        "[Intersections] {} tracks, {} segment pairs tested, {} intersections",
        tracks.len(),
        pair_tests,
        found.len()
    );
    found
}

fn record_hit(found: &mut Vec<Intersection>, point: Coordinate, i: usize, j: usize, merge_km: f64) {
    let (i, j) = (i as u32, j as u32);
    if let Some(existing) = found
        .iter_mut()
        .find(|x| haversine_km(&x.coordinate, &point) <= merge_km)
    {
        for idx in [i, j] {
            if let Err(pos) = existing.track_indices.binary_search(&idx) {
                existing.track_indices.insert(pos, idx);
            }
        }
        return;
    }
    found.push(Intersection {
        coordinate: point,
        track_indices: vec![i, j],
    });
}

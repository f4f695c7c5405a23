//! Route density heatmap.
//!
//! Folds many overlapping tracks into frequency buckets:
//! - Each track is reduced to a fixed-size signature (resampled by distance)
//! - Tracks whose signatures stay within a mean distance of a bucket's
//!   representative, in either direction, join that bucket
//! - Frequency is the number of tracks in the bucket
//!
//! Candidate buckets are found through an R-tree over bucket envelopes, so a
//! new track is only compared against buckets near it.

use log::{debug, info};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use crate::formats::{parse_files, ParsedFile};
use crate::geo_utils::{
    compute_bounds, haversine_km, haversine_meters, meters_to_degrees, track_length_km,
};
use crate::normalize::{filter_unrealistic_jumps, normalize_track};
use crate::polyline::process_polyline;
use crate::{BoundingBox, Coordinate, Track};

/// Configuration for heatmap aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct HeatmapConfig {
    /// Mean pointwise distance under which two tracks count as the same route (default: 50m)
    pub match_threshold_meters: f64,
    /// Signature length used for comparison (default: 32)
    pub sample_points: u32,
    /// Drop GPS jumps longer than this before matching (default: off)
    pub max_jump_km: Option<f64>,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            match_threshold_meters: 50.0,
            sample_points: 32,
            max_jump_km: None,
        }
    }
}

/// One bucket of the heatmap: a representative geometry and how many tracks
/// followed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct HeatmapTrack {
    pub coordinates: Track,
    /// Always at least 1
    pub frequency: u32,
}

/// Complete heatmap result
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct HeatmapResult {
    /// Buckets in creation order
    pub tracks: Vec<HeatmapTrack>,
    /// Largest bucket frequency, 0 when there are no buckets
    pub max_frequency: u32,
}

/// A group of similar tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TrackCluster {
    pub representative: Track,
    /// Input indices of the member tracks, ascending
    pub members: Vec<u32>,
    /// 1.0 when every member matches the representative exactly, falling to 0.0
    /// at the threshold
    pub similarity: f64,
}

// ============================================================================
// Bucket builder
// ============================================================================

/// Envelope of a bucket's representative, padded by the match threshold.
#[derive(Debug, Clone)]
struct BucketEnvelope {
    bucket: usize,
    bounds: BoundingBox,
}

impl RTreeObject for BucketEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bounds.min_lon, self.bounds.min_lat],
            [self.bounds.max_lon, self.bounds.max_lat],
        )
    }
}

#[derive(Debug)]
struct Bucket {
    representative: Track,
    signature: Vec<Coordinate>,
    members: Vec<usize>,
    /// Mean signature distance of each member to the representative, meters
    distances: Vec<f64>,
}

struct BucketBuilder {
    threshold_meters: f64,
    sample_points: usize,
    buckets: Vec<Bucket>,
    tree: RTree<BucketEnvelope>,
}

impl BucketBuilder {
    fn new(threshold_meters: f64, sample_points: u32) -> Self {
        Self {
            threshold_meters: threshold_meters.max(0.0),
            sample_points: (sample_points as usize).max(2),
            buckets: Vec::new(),
            tree: RTree::new(),
        }
    }

    /// Add a track that was already normalized. Empty tracks are ignored.
    fn add_track(&mut self, index: usize, track: Track) {
        if track.is_empty() {
            return;
        }

        let signature = resample_by_distance(&track, self.sample_points);
        let bounds = compute_bounds(&track);
        let query = AABB::from_corners(
            [bounds.min_lon, bounds.min_lat],
            [bounds.max_lon, bounds.max_lat],
        );

        let mut candidates: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query)
            .map(|e| e.bucket)
            .collect();
        // Earliest bucket wins
        candidates.sort_unstable();

        for bucket_index in candidates {
            let bucket = &mut self.buckets[bucket_index];
            if let Some(distance) = match_distance(&bucket.signature, &signature, self.threshold_meters) {
                bucket.members.push(index);
                bucket.distances.push(distance);
                return;
            }
        }

        let pad = meters_to_degrees(self.threshold_meters, bounds.center().latitude);
        self.tree.insert(BucketEnvelope {
            bucket: self.buckets.len(),
            bounds: BoundingBox {
                min_lat: bounds.min_lat - pad,
                min_lon: bounds.min_lon - pad,
                max_lat: bounds.max_lat + pad,
                max_lon: bounds.max_lon + pad,
            },
        });
        self.buckets.push(Bucket {
            representative: track,
            signature,
            members: vec![index],
            distances: vec![0.0],
        });
    }

    fn build(self) -> HeatmapResult {
        let tracks: Vec<HeatmapTrack> = self
            .buckets
            .into_iter()
            .map(|b| HeatmapTrack {
                frequency: b.members.len() as u32,
                coordinates: b.representative,
            })
            .collect();
        let max_frequency = tracks.iter().map(|t| t.frequency).max().unwrap_or(0);

        HeatmapResult { tracks, max_frequency }
    }

    fn build_clusters(self) -> Vec<TrackCluster> {
        let threshold = self.threshold_meters;
        self.buckets
            .into_iter()
            .map(|b| {
                let mean = b.distances.iter().sum::<f64>() / b.distances.len() as f64;
                let similarity = if threshold > 0.0 {
                    (1.0 - mean / threshold).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                TrackCluster {
                    representative: b.representative,
                    members: b.members.iter().map(|&m| m as u32).collect(),
                    similarity,
                }
            })
            .collect()
    }
}

/// Mean pointwise distance in meters, forward or reversed, if within threshold.
fn match_distance(a: &[Coordinate], b: &[Coordinate], threshold_meters: f64) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let n = a.len() as f64;
    let forward = a.iter().zip(b).map(|(p, q)| haversine_meters(p, q)).sum::<f64>() / n;
    let reverse = a.iter().zip(b.iter().rev()).map(|(p, q)| haversine_meters(p, q)).sum::<f64>() / n;
    let best = forward.min(reverse);
    (best <= threshold_meters).then_some(best)
}

/// Resample a track to exactly `target` points, evenly spaced by distance.
fn resample_by_distance(points: &[Coordinate], target: usize) -> Vec<Coordinate> {
    let Some(&first) = points.first() else {
        return Vec::new();
    };
    let last = points[points.len() - 1];

    let total = track_length_km(points);
    if points.len() < 2 || total == 0.0 {
        return vec![first; target];
    }

    let step = total / (target - 1) as f64;
    let mut resampled = vec![first];
    let mut accumulated = 0.0;
    let mut next_threshold = step;
    let mut prev = first;

    for curr in &points[1..] {
        let seg = haversine_km(&prev, curr);

        while seg > 0.0 && accumulated + seg >= next_threshold && resampled.len() < target - 1 {
            // Interpolate point at the threshold distance
            let ratio = (next_threshold - accumulated) / seg;
            resampled.push(Coordinate::new(
                prev.latitude + ratio * (curr.latitude - prev.latitude),
                prev.longitude + ratio * (curr.longitude - prev.longitude),
            ));
            next_threshold += step;
        }

        accumulated += seg;
        prev = *curr;
    }

    // Rounding can leave the walk a point short
    while resampled.len() < target {
        resampled.push(last);
    }
    resampled
}

// ============================================================================
// Public entry points
// ============================================================================

/// Aggregate tracks into frequency buckets.
///
/// Each track is normalized first; tracks left empty are skipped. Output order
/// is bucket creation order, so identical input gives identical output.
///
/// # Example
///
/// ```rust
/// use track_engine::{aggregate_tracks, Coordinate, HeatmapConfig};
///
/// let route: Vec<Coordinate> = (0..20)
///     .map(|i| Coordinate::new(47.37 + i as f64 * 0.0005, 8.54))
///     .collect();
/// let reversed: Vec<Coordinate> = route.iter().rev().copied().collect();
///
/// let result = aggregate_tracks(&[route, reversed], &HeatmapConfig::default());
/// assert_eq!(result.tracks.len(), 1);
/// assert_eq!(result.max_frequency, 2);
/// ```
pub fn aggregate_tracks(tracks: &[Track], config: &HeatmapConfig) -> HeatmapResult {
    let mut builder = BucketBuilder::new(config.match_threshold_meters, config.sample_points);
    for (i, track) in tracks.iter().enumerate() {
        builder.add_track(i, prepare_track(track, config));
    }
    let result = builder.build();

    info!(
        "[Heatmap] {} tracks -> {} buckets (max frequency {})",
        tracks.len(),
        result.tracks.len(),
        result.max_frequency
    );
    result
}

/// Normalize a heatmap input and apply the optional jump filter.
fn prepare_track(track: &[Coordinate], config: &HeatmapConfig) -> Track {
    let track = normalize_track(track);
    match config.max_jump_km {
        Some(max_jump_km) => filter_unrealistic_jumps(&track, max_jump_km),
        None => track,
    }
}

/// Decode polylines (or JSON coordinate arrays) and aggregate them.
pub fn process_polylines(polylines: &[String], config: &HeatmapConfig) -> HeatmapResult {
    let tracks: Vec<Track> = polylines.iter().map(|p| process_polyline(p)).collect();
    aggregate_tracks(&tracks, config)
}

/// Parse activity files and aggregate every track they contain.
///
/// Unrecognized or empty files contribute nothing.
pub fn process_files(files: &[Vec<u8>], config: &HeatmapConfig) -> HeatmapResult {
    let tracks: Vec<Track> = parse_files(files)
        .iter()
        .flat_map(ParsedFile::coordinate_tracks)
        .collect();
    debug!("[Heatmap] {} files yielded {} tracks", files.len(), tracks.len());
    aggregate_tracks(&tracks, config)
}

/// Group tracks whose mean distance to a representative is within
/// `threshold_km`.
///
/// Every non-empty input track belongs to exactly one cluster.
pub fn cluster_tracks_by_similarity(tracks: &[Track], threshold_km: f64) -> Vec<TrackCluster> {
    let mut builder = BucketBuilder::new(threshold_km * 1000.0, HeatmapConfig::default().sample_points);
    for (i, track) in tracks.iter().enumerate() {
        builder.add_track(i, normalize_track(track));
    }
    builder.build_clusters()
}

/// Collapse tracks within `threshold_km` of each other into one representative.
pub fn merge_nearby_tracks(tracks: &[Track], threshold_km: f64) -> Vec<Track> {
    cluster_tracks_by_similarity(tracks, threshold_km)
        .into_iter()
        .map(|c| c.representative)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polyline::encode_polyline;

    fn line(lat0: f64, lon0: f64, n: usize, step: f64) -> Track {
        (0..n)
            .map(|i| Coordinate::new(lat0 + i as f64 * step, lon0))
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let result = aggregate_tracks(&[], &HeatmapConfig::default());
        assert!(result.tracks.is_empty());
        assert_eq!(result.max_frequency, 0);

        let result = process_polylines(&[], &HeatmapConfig::default());
        assert_eq!(result.max_frequency, 0);
    }

    #[test]
    fn test_invalid_tracks_skipped() {
        let result = aggregate_tracks(
            &[vec![Coordinate::new(0.0, 0.0)], vec![], line(47.0, 8.0, 5, 0.001)],
            &HeatmapConfig::default(),
        );
        assert_eq!(result.tracks.len(), 1);
        assert_eq!(result.max_frequency, 1);
    }

    #[test]
    fn test_repeated_route_counts() {
        let a = line(47.0, 8.0, 50, 0.0005);
        // Same route with a few meters of GPS noise and different sampling
        let b: Track = line(47.0, 8.00003, 80, 0.0005 * 49.0 / 79.0);
        let c = line(46.0, 7.0, 50, 0.0005);

        let result = aggregate_tracks(&[a.clone(), b, c.clone(), a], &HeatmapConfig::default());
        assert_eq!(result.tracks.len(), 2);
        assert_eq!(result.tracks[0].frequency, 3);
        assert_eq!(result.tracks[1].frequency, 1);
        assert_eq!(result.tracks[1].coordinates, c);
        assert_eq!(result.max_frequency, 3);
    }

    #[test]
    fn test_reverse_direction_matches() {
        let a = line(47.0, 8.0, 30, 0.001);
        let b: Track = a.iter().rev().copied().collect();
        let result = aggregate_tracks(&[a.clone(), b], &HeatmapConfig::default());
        assert_eq!(result.tracks.len(), 1);
        assert_eq!(result.tracks[0].coordinates, a);
    }

    #[test]
    fn test_overlapping_but_different_routes_stay_apart() {
        // Shares the first half, then diverges
        let a = line(47.0, 8.0, 40, 0.001);
        let mut b = line(47.0, 8.0, 20, 0.001);
        b.extend((1..20).map(|i| Coordinate::new(47.019, 8.0 + i as f64 * 0.001)));
        let result = aggregate_tracks(&[a, b], &HeatmapConfig::default());
        assert_eq!(result.tracks.len(), 2);
        assert_eq!(result.max_frequency, 1);
    }

    #[test]
    fn test_deterministic() {
        let tracks = vec![
            line(47.0, 8.0, 30, 0.001),
            line(47.0, 8.1, 30, 0.001),
            line(47.0, 8.0, 30, 0.001),
        ];
        let config = HeatmapConfig::default();
        assert_eq!(aggregate_tracks(&tracks, &config), aggregate_tracks(&tracks, &config));
    }

    #[test]
    fn test_single_point_tracks() {
        let p = vec![Coordinate::new(47.0, 8.0)];
        let result = aggregate_tracks(&[p.clone(), p], &HeatmapConfig::default());
        assert_eq!(result.max_frequency, 2);
    }

    #[test]
    fn test_process_polylines_counts_duplicates() {
        let encoded = encode_polyline(&line(47.0, 8.0, 20, 0.001));
        let result = process_polylines(
            &[encoded.clone(), encoded, "".to_string()],
            &HeatmapConfig::default(),
        );
        assert_eq!(result.tracks.len(), 1);
        assert_eq!(result.max_frequency, 2);
    }

    #[test]
    fn test_jump_filter_before_matching() {
        let clean = line(47.0, 8.0, 20, 0.0005);
        let mut spiked = clean.clone();
        spiked[10] = Coordinate::new(48.5, 9.9);

        let plain = aggregate_tracks(&[clean.clone(), spiked.clone()], &HeatmapConfig::default());
        assert_eq!(plain.tracks.len(), 2);

        let config = HeatmapConfig {
            max_jump_km: Some(5.0),
            ..Default::default()
        };
        let filtered = aggregate_tracks(&[clean, spiked], &config);
        assert_eq!(filtered.tracks.len(), 1);
        assert_eq!(filtered.max_frequency, 2);
    }

    #[test]
    fn test_resample_by_distance_exact_length() {
        let track = line(47.0, 8.0, 7, 0.003);
        let sig = resample_by_distance(&track, 32);
        assert_eq!(sig.len(), 32);
        assert_eq!(sig[0], track[0]);
        assert!(haversine_km(&sig[31], &track[6]) < 1e-6);
        assert_eq!(resample_by_distance(&[Coordinate::new(1.0, 1.0)], 4).len(), 4);
    }

    #[test]
    fn test_cluster_and_merge() {
        let tracks = vec![
            line(37.77, -122.41, 20, 0.0001),
            line(37.77, -122.41, 20, 0.0001),
            line(40.71, -74.0, 20, 0.0001),
        ];
        let clusters = cluster_tracks_by_similarity(&tracks, 0.5);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].members, vec![0, 1]);
        assert!((clusters[0].similarity - 1.0).abs() < 1e-9);
        for cluster in &clusters {
            assert!(!cluster.representative.is_empty());
            assert!((0.0..=1.0).contains(&cluster.similarity));
        }

        let merged = merge_nearby_tracks(&tracks, 0.1);
        assert_eq!(merged.len(), 2);
    }
}

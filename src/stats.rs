//! Track statistics.

use serde::{Deserialize, Serialize};

use crate::formats::parse_file;
use crate::geo_utils::{compute_bounds, haversine_km, track_length_km};
use crate::normalize::normalize_points;
use crate::{BoundingBox, Coordinate, TrackPoint};

/// Summary of one track.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TrackStatistics {
    /// Sum of Haversine distances between consecutive points
    pub distance_km: f64,
    pub point_count: u32,
    pub bounding_box: BoundingBox,
    /// Sum of positive elevation deltas in meters
    pub elevation_gain: Option<f64>,
    /// Kilometers per hour over the first to last timestamp
    pub average_speed: Option<f64>,
}

impl TrackStatistics {
    /// Statistics for points parsed from a file, using elevation and time when
    /// the points carry them.
    ///
    /// `elevation_gain` needs at least two points with elevation and
    /// `average_speed` needs at least two timestamps spanning a positive
    /// duration; otherwise they are `None`.
    pub fn from_points(points: &[TrackPoint]) -> Self {
        let coords: Vec<Coordinate> = points.iter().map(|p| p.coordinate).collect();
        let mut stats = calculate_track_statistics(&coords);

        let elevations: Vec<f64> = points
            .iter()
            .filter_map(|p| p.elevation)
            .filter(|e| e.is_finite())
            .collect();
        if elevations.len() >= 2 {
            stats.elevation_gain = Some(
                elevations
                    .windows(2)
                    .map(|w| (w[1] - w[0]).max(0.0))
                    .sum(),
            );
        }

        let mut times = points.iter().filter_map(|p| p.timestamp);
        if let (Some(first), Some(last)) = (times.next(), times.last()) {
            let hours = (last - first) as f64 / 3600.0;
            if hours > 0.0 {
                stats.average_speed = Some(stats.distance_km / hours);
            }
        }

        stats
    }
}

/// Distance, point count and bounding box of a coordinate track.
///
/// Empty input gives zero distance, zero count and the all-zero box.
///
/// ```rust
/// use track_engine::{calculate_track_statistics, Coordinate};
///
/// let stats = calculate_track_statistics(&[
///     Coordinate::new(40.7128, -74.0060),
///     Coordinate::new(34.0522, -118.2437),
/// ]);
/// assert_eq!(stats.point_count, 2);
/// assert!(stats.distance_km > 3900.0 && stats.distance_km < 4000.0);
/// ```
pub fn calculate_track_statistics(coords: &[Coordinate]) -> TrackStatistics {
    TrackStatistics {
        distance_km: track_length_km(coords),
        point_count: coords.len() as u32,
        bounding_box: compute_bounds(coords),
        elevation_gain: None,
        average_speed: None,
    }
}

/// Statistics for every track of an activity file, in file order.
///
/// Invalid points are dropped first and tracks left empty are skipped, so the
/// result lines up with the tracks counted by
/// [`get_file_info`](crate::get_file_info). Unrecognized files give an empty
/// list.
pub fn calculate_file_statistics(bytes: &[u8]) -> Vec<TrackStatistics> {
    parse_file(bytes)
        .tracks
        .iter()
        .map(|t| normalize_points(&t.points))
        .filter(|points| !points.is_empty())
        .map(|points| TrackStatistics::from_points(&points))
        .collect()
}

/// Haversine distance in kilometers between two latitude/longitude pairs.
pub fn calculate_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    haversine_km(&Coordinate::new(lat1, lon1), &Coordinate::new(lat2, lon2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lon: f64, ele: Option<f64>, time: Option<i64>) -> TrackPoint {
        TrackPoint {
            coordinate: Coordinate::new(lat, lon),
            elevation: ele,
            timestamp: time,
        }
    }

    #[test]
    fn test_empty_track() {
        let stats = calculate_track_statistics(&[]);
        assert_eq!(stats.distance_km, 0.0);
        assert_eq!(stats.point_count, 0);
        assert_eq!(stats.bounding_box.to_array(), [0.0; 4]);
    }

    #[test]
    fn test_single_point() {
        let stats = calculate_track_statistics(&[Coordinate::new(37.7749, -122.4194)]);
        assert_eq!(stats.distance_km, 0.0);
        assert_eq!(stats.point_count, 1);
        assert_eq!(stats.bounding_box.to_array(), [37.7749, -122.4194, 37.7749, -122.4194]);
    }

    #[test]
    fn test_nyc_to_la() {
        let d = calculate_distance(40.7128, -74.0060, 34.0522, -118.2437);
        assert!((3900.0..=4000.0).contains(&d));
        assert_eq!(calculate_distance(40.7128, -74.0060, 40.7128, -74.0060), 0.0);
    }

    #[test]
    fn test_elevation_gain_and_speed() {
        let points = vec![
            point(46.0, 7.0, Some(1000.0), Some(0)),
            point(46.01, 7.0, Some(1050.0), Some(1800)),
            point(46.02, 7.0, Some(1020.0), None),
            point(46.03, 7.0, Some(1100.0), Some(3600)),
        ];
        let stats = TrackStatistics::from_points(&points);
        assert_eq!(stats.point_count, 4);
        assert_eq!(stats.elevation_gain, Some(130.0));
        let speed = stats.average_speed.unwrap();
        // ~3.34 km in one hour
        assert!((speed - stats.distance_km).abs() < 1e-9);
        assert!(speed > 3.0 && speed < 3.5);
    }

    #[test]
    fn test_file_statistics_use_elevation_and_time() {
        let gpx = br#"<?xml version="1.0"?>
<gpx version="1.1" creator="unit-test">
  <trk><trkseg>
    <trkpt lat="45.5" lon="-122.5"><ele>100</ele><time>2024-01-01T00:00:00Z</time></trkpt>
    <trkpt lat="0" lon="0"/>
    <trkpt lat="45.51" lon="-122.5"><ele>90</ele><time>2024-01-01T00:03:00Z</time></trkpt>
    <trkpt lat="45.52" lon="-122.5"><ele>130</ele><time>2024-01-01T00:06:00Z</time></trkpt>
  </trkseg></trk>
  <trk><trkseg><trkpt lat="0" lon="0"/></trkseg></trk>
</gpx>"#;

        let stats = calculate_file_statistics(gpx);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].point_count, 3);
        assert_eq!(stats[0].elevation_gain, Some(40.0));
        // ~2.22 km in six minutes
        let speed = stats[0].average_speed.unwrap();
        assert!((speed - stats[0].distance_km * 10.0).abs() < 1e-9);
        assert!(speed > 21.0 && speed < 23.0);

        assert!(calculate_file_statistics(b"not a track file").is_empty());
    }

    #[test]
    fn test_optional_fields_absent_without_data() {
        let points = vec![
            point(46.0, 7.0, Some(1000.0), Some(100)),
            point(46.01, 7.0, None, Some(100)),
        ];
        let stats = TrackStatistics::from_points(&points);
        assert_eq!(stats.elevation_gain, None);
        // Zero duration
        assert_eq!(stats.average_speed, None);
    }
}

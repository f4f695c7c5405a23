//! # Track Engine
//!
//! GPS track analysis for visualization clients.
//!
//! This library provides:
//! - Format sniffing and lenient parsing of GPX, TCX, KML and FIT files
//! - The encoded polyline codec (1e5 precision)
//! - Douglas-Peucker simplification, statistics and coverage metrics
//! - Route density heatmaps that fold repeated tracks into frequency buckets
//! - Cross-track intersection detection
//! - GPX and GeoJSON export
//!
//! Every operation is a pure, synchronous function. Malformed input degrades to
//! an empty or default result instead of an error; the only fallible step is
//! the one-time [`Bootstrap`] of an [`Engine`] handle.
//!
//! ## Features
//!
//! - **`ffi`** - Export the operation surface through UniFFI (implies `parallel`)
//! - **`parallel`** - Parse multi-file inputs with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use track_engine::Engine;
//!
//! let engine = Engine::default();
//!
//! let track = engine.decode_polyline("_p~iF~ps|U_ulLnnqC_mqNvxq`@");
//! assert_eq!(track.len(), 3);
//!
//! let stats = engine.calculate_track_statistics(&track);
//! println!("{:.1} km over {} points", stats.distance_km, stats.point_count);
//!
//! let heatmap = engine.process_polylines(&[
//!     "_p~iF~ps|U_ulLnnqC_mqNvxq`@".to_string(),
//!     "_p~iF~ps|U_ulLnnqC_mqNvxq`@".to_string(),
//! ]);
//! assert_eq!(heatmap.max_frequency, 2);
//! ```

use serde::{Deserialize, Serialize};

pub mod geo_utils;

pub mod polyline;
pub use crate::polyline::{decode_polyline, encode_polyline, process_polyline};

pub mod formats;
pub use formats::{
    detect_format, extract_file_metadata, get_file_info, parse_file, parse_files, FileFormat,
    FileInfo, FileMetadata, ParsedFile, ParsedTrack,
};

pub mod normalize;
pub use normalize::{
    filter_by_bounds, filter_unrealistic_jumps, normalize_points, normalize_track,
    split_track_by_gaps, validate_coordinates, ValidationResult,
};

pub mod simplify;
pub use simplify::{resample_track, simplify_track};

pub mod stats;
pub use stats::{
    calculate_distance, calculate_file_statistics, calculate_track_statistics, TrackStatistics,
};

// Route density heatmap
pub mod heatmap;
pub use heatmap::{
    aggregate_tracks, cluster_tracks_by_similarity, merge_nearby_tracks, process_files,
    process_polylines, HeatmapConfig, HeatmapResult, HeatmapTrack, TrackCluster,
};

pub mod intersections;
pub use intersections::{find_track_intersections, Intersection};

pub mod coverage;
pub use coverage::{calculate_coverage, Coverage};

pub mod export;
pub use export::{to_geojson, to_gpx, GpxMetadata};

pub mod engine;
pub use engine::{
    Bootstrap, BootstrapConfig, BootstrapError, Engine, EngineConfig, EngineLoader,
    JsonFileLoader, SourceAttempt, StaticLoader,
};

#[cfg(feature = "ffi")]
mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("TrackEngineRust")
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude in degrees.
///
/// Serialized as a `[latitude, longitude]` pair.
///
/// # Example
/// ```
/// use track_engine::Coordinate;
/// let point = Coordinate::new(40.7128, -74.0060); // New York
/// assert!(point.is_valid());
/// assert!(!Coordinate::new(0.0, 0.0).is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Create a new coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the coordinate is a real position.
    ///
    /// Both components must be finite and in range, and `(0, 0)` is rejected
    /// because GPS devices emit it as a "no fix" sentinel.
    pub fn is_valid(&self) -> bool {
        self.invalid_reason().is_none()
    }

    /// Describe why the coordinate is invalid, or `None` if it is valid.
    pub fn invalid_reason(&self) -> Option<String> {
        let (lat, lon) = (self.latitude, self.longitude);
        if !lat.is_finite() || !lon.is_finite() {
            return Some(format!("non-finite value ({}, {})", lat, lon));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Some(format!("latitude {} outside [-90, 90]", lat));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Some(format!("longitude {} outside [-180, 180]", lon));
        }
        if lat == 0.0 && lon == 0.0 {
            return Some("null island (0, 0) sentinel".to_string());
        }
        None
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from(pair: [f64; 2]) -> Self {
        Self::new(pair[0], pair[1])
    }
}

impl From<Coordinate> for [f64; 2] {
    fn from(c: Coordinate) -> Self {
        [c.latitude, c.longitude]
    }
}

/// An ordered sequence of coordinates in traversal order.
pub type Track = Vec<Coordinate>;

/// A parsed track point, carrying elevation and time when the source has them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub coordinate: Coordinate,
    /// Elevation in meters
    pub elevation: Option<f64>,
    /// Unix timestamp in seconds
    pub timestamp: Option<i64>,
}

impl TrackPoint {
    /// Create a point with position only.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            coordinate: Coordinate::new(latitude, longitude),
            elevation: None,
            timestamp: None,
        }
    }
}

/// Axis-aligned latitude/longitude envelope.
///
/// Serialized as `[min_lat, min_lon, max_lat, max_lon]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Create bounds from coordinates, `None` for an empty slice.
    pub fn from_points(points: &[Coordinate]) -> Option<Self> {
        let first = points.first()?;
        let mut bounds = Self {
            min_lat: first.latitude,
            min_lon: first.longitude,
            max_lat: first.latitude,
            max_lon: first.longitude,
        };
        for p in &points[1..] {
            bounds.extend(p);
        }
        Some(bounds)
    }

    /// Grow the box to include a coordinate.
    pub fn extend(&mut self, p: &Coordinate) {
        self.min_lat = self.min_lat.min(p.latitude);
        self.max_lat = self.max_lat.max(p.latitude);
        self.min_lon = self.min_lon.min(p.longitude);
        self.max_lon = self.max_lon.max(p.longitude);
    }

    /// Union of two boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_lat: self.min_lat.min(other.min_lat),
            min_lon: self.min_lon.min(other.min_lon),
            max_lat: self.max_lat.max(other.max_lat),
            max_lon: self.max_lon.max(other.max_lon),
        }
    }

    /// Check whether a coordinate lies inside (inclusive).
    pub fn contains(&self, p: &Coordinate) -> bool {
        p.latitude >= self.min_lat
            && p.latitude <= self.max_lat
            && p.longitude >= self.min_lon
            && p.longitude <= self.max_lon
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    /// `[min_lat, min_lon, max_lat, max_lon]`
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lat, self.min_lon, self.max_lat, self.max_lon]
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(a: [f64; 4]) -> Self {
        Self { min_lat: a[0], min_lon: a[1], max_lat: a[2], max_lon: a[3] }
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        b.to_array()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(40.7128, -74.0060).is_valid());
        assert!(Coordinate::new(90.0, 180.0).is_valid());
        assert!(Coordinate::new(-90.0, -180.0).is_valid());
        assert!(Coordinate::new(0.0, 10.0).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, 181.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, f64::INFINITY).is_valid());
        assert!(!Coordinate::new(0.0, 0.0).is_valid());
    }

    #[test]
    fn test_coordinate_serializes_as_pair() {
        let json = serde_json::to_string(&Coordinate::new(40.5, -74.25)).unwrap();
        assert_eq!(json, "[40.5,-74.25]");
        let back: Coordinate = serde_json::from_str("[1.5,2.5]").unwrap();
        assert_eq!(back, Coordinate::new(1.5, 2.5));
    }

    #[test]
    fn test_bounding_box_single_point() {
        let p = Coordinate::new(37.7749, -122.4194);
        let bounds = BoundingBox::from_points(&[p]).unwrap();
        assert_eq!(bounds.to_array(), [37.7749, -122.4194, 37.7749, -122.4194]);
        assert!(BoundingBox::from_points(&[]).is_none());
    }

    #[test]
    fn test_bounding_box_union_and_contains() {
        let a = BoundingBox::from([1.0, 1.0, 2.0, 2.0]);
        let b = BoundingBox::from([1.5, 0.5, 3.0, 1.5]);
        let u = a.union(&b);
        assert_eq!(u.to_array(), [1.0, 0.5, 3.0, 2.0]);
        assert!(u.contains(&Coordinate::new(2.5, 1.0)));
        assert!(!a.contains(&Coordinate::new(2.5, 1.0)));
    }
}

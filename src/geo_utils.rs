//! # Geographic Utilities
//!
//! Core geographic computation utilities for GPS track analysis.
//!
//! Every distance in this crate is a spherical great-circle distance on an
//! Earth of radius [`EARTH_RADIUS_KM`]. Results are reported in kilometers
//! unless the function name says otherwise.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_km`] | Great-circle distance between two coordinates |
//! | [`track_length_km`] | Total length of a track |
//! | [`compute_bounds`] | Bounding box of a track (all zeros when empty) |
//! | [`meters_to_degrees`] | Convert meters to approximate degrees at a latitude |
//! | [`LocalProjection`] | Equirectangular projection to a local km plane |
//!
//! ## Example
//!
//! ```rust
//! use track_engine::{Coordinate, geo_utils};
//!
//! let track = vec![
//!     Coordinate::new(51.5074, -0.1278),  // London
//!     Coordinate::new(51.5080, -0.1290),
//!     Coordinate::new(51.5090, -0.1300),
//! ];
//!
//! let length = geo_utils::track_length_km(&track);
//! println!("Track length: {:.3} km", length);
//!
//! let bounds = geo_utils::compute_bounds(&track);
//! println!("Bounds: {:.4}N to {:.4}N", bounds.min_lat, bounds.max_lat);
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Haversine Formula
//!
//! The haversine formula calculates the great-circle distance between two points on a sphere.
//! It is accurate to within 0.3% of the ellipsoidal distance for practical GPS work.
//!
//! Reference: [Haversine formula (Wikipedia)](https://en.wikipedia.org/wiki/Haversine_formula)

use geo::Coord;

use crate::{BoundingBox, Coordinate};

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two coordinates in kilometers.
///
/// # Example
///
/// ```rust
/// use track_engine::{Coordinate, geo_utils};
///
/// let nyc = Coordinate::new(40.7128, -74.0060);
/// let la = Coordinate::new(34.0522, -118.2437);
///
/// let distance = geo_utils::haversine_km(&nyc, &la);
/// assert!(distance > 3900.0 && distance < 4000.0);
/// ```
#[inline]
pub fn haversine_km(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair past 1 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_KM * c
}

/// Great-circle distance in meters.
#[inline]
pub fn haversine_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    haversine_km(a, b) * 1000.0
}

/// Calculate the total length of a track in kilometers.
///
/// Sums the haversine distance between consecutive points. Empty or single-point
/// tracks return 0.0.
pub fn track_length_km(points: &[Coordinate]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_km(&w[0], &w[1]))
        .sum()
}

/// Convert meters to approximate degrees at a given latitude.
///
/// Returns a single value suitable for bounding box padding where a square
/// search area is acceptable. The longitude shrink factor is clamped so the
/// result stays finite near the poles.
///
/// # Notes
///
/// - At the equator, 1 degree ≈ 111,320 meters
/// - At 45°N/S, 1 degree of longitude ≈ 78,710 meters
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let lat_rad = latitude.to_radians();
    let meters_per_degree = 111_320.0 * lat_rad.cos().max(0.1);
    meters / meters_per_degree
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Compute the bounding box of a track.
///
/// Returns the all-zero box for empty input.
///
/// # Example
///
/// ```rust
/// use track_engine::{Coordinate, geo_utils};
///
/// let track = vec![
///     Coordinate::new(51.5000, -0.1300),
///     Coordinate::new(51.5100, -0.1200),
///     Coordinate::new(51.5050, -0.1250),
/// ];
///
/// let bounds = geo_utils::compute_bounds(&track);
/// assert_eq!(bounds.to_array(), [51.5000, -0.1300, 51.5100, -0.1200]);
/// assert_eq!(geo_utils::compute_bounds(&[]).to_array(), [0.0; 4]);
/// ```
pub fn compute_bounds(points: &[Coordinate]) -> BoundingBox {
    BoundingBox::from_points(points).unwrap_or_default()
}

// =============================================================================
// Local Projection
// =============================================================================

/// Equirectangular projection onto a flat plane in kilometers.
///
/// Good to well under a percent for the few-kilometer extents where segment
/// geometry is evaluated.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjection {
    origin: Coordinate,
    km_per_deg_lat: f64,
    km_per_deg_lon: f64,
}

impl LocalProjection {
    /// Project around `origin`.
    pub fn new(origin: Coordinate) -> Self {
        let km_per_deg_lat = EARTH_RADIUS_KM.to_radians();
        Self {
            origin,
            km_per_deg_lat,
            km_per_deg_lon: km_per_deg_lat * origin.latitude.to_radians().cos(),
        }
    }

    /// Coordinate to plane (x = east km, y = north km).
    pub fn project(&self, c: &Coordinate) -> Coord<f64> {
        Coord {
            x: (c.longitude - self.origin.longitude) * self.km_per_deg_lon,
            y: (c.latitude - self.origin.latitude) * self.km_per_deg_lat,
        }
    }

    /// Plane back to coordinate.
    pub fn unproject(&self, p: Coord<f64>) -> Coordinate {
        let lon = if self.km_per_deg_lon.abs() > f64::EPSILON {
            self.origin.longitude + p.x / self.km_per_deg_lon
        } else {
            self.origin.longitude
        };
        Coordinate::new(self.origin.latitude + p.y / self.km_per_deg_lat, lon)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_haversine_same_point() {
        let p = Coordinate::new(51.5074, -0.1278);
        assert_eq!(haversine_km(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_known_value() {
        // London to Paris is approximately 344 km
        let london = Coordinate::new(51.5074, -0.1278);
        let paris = Coordinate::new(48.8566, 2.3522);
        assert!(approx_eq(haversine_km(&london, &paris), 343.5, 5.0));
    }

    #[test]
    fn test_haversine_symmetric() {
        let a = Coordinate::new(40.7128, -74.0060);
        let b = Coordinate::new(34.0522, -118.2437);
        assert!(approx_eq(haversine_km(&a, &b), haversine_km(&b, &a), 1e-9));
    }

    #[test]
    fn test_haversine_antipodal_is_finite() {
        let a = Coordinate::new(10.0, 20.0);
        let b = Coordinate::new(-10.0, -160.0);
        let d = haversine_km(&a, &b);
        assert!(d.is_finite());
        assert!(approx_eq(d, std::f64::consts::PI * EARTH_RADIUS_KM, 1.0));
    }

    #[test]
    fn test_track_length() {
        assert_eq!(track_length_km(&[]), 0.0);
        assert_eq!(track_length_km(&[Coordinate::new(51.5, -0.1)]), 0.0);

        let track = vec![
            Coordinate::new(51.5074, -0.1278),
            Coordinate::new(51.5080, -0.1280),
        ];
        let length = track_length_km(&track);
        assert!(length > 0.0);
        assert!(length < 0.1); // about 68m
    }

    #[test]
    fn test_compute_bounds_empty_is_zero() {
        assert_eq!(compute_bounds(&[]), BoundingBox::default());
    }

    #[test]
    fn test_meters_to_degrees() {
        let deg = meters_to_degrees(111_320.0, 0.0);
        assert!(approx_eq(deg, 1.0, 0.01));
        assert!(meters_to_degrees(111_320.0, 45.0) > 1.0);
    }

    #[test]
    fn test_local_projection_round_trip() {
        let origin = Coordinate::new(47.37, 8.54);
        let proj = LocalProjection::new(origin);
        let p = Coordinate::new(47.38, 8.55);
        let xy = proj.project(&p);
        let back = proj.unproject(xy);
        assert!(approx_eq(back.latitude, p.latitude, 1e-9));
        assert!(approx_eq(back.longitude, p.longitude, 1e-9));
        // Local plane distance agrees with haversine at this scale
        let planar = (xy.x * xy.x + xy.y * xy.y).sqrt();
        assert!(approx_eq(planar, haversine_km(&origin, &p), 0.01));
    }
}

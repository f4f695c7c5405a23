//! Coverage metrics over a set of tracks.

use serde::{Deserialize, Serialize};

use crate::geo_utils::EARTH_RADIUS_KM;
use crate::{BoundingBox, Track};

/// Area and extent covered by a set of tracks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Coverage {
    /// Union bounding box of all points
    pub bounding_box: BoundingBox,
    /// Surface area of that box on the sphere
    pub area_km2: f64,
    pub point_count: u32,
}

/// Union bounding box, its spherical area and the total point count.
///
/// The area is the exact area of the latitude/longitude rectangle on a sphere
/// of radius 6371 km: `R² · |sin φ₂ − sin φ₁| · Δλ`. Empty input (or only empty
/// tracks) gives the zero box, zero area and zero points.
///
/// ```rust
/// use track_engine::{calculate_coverage, Coordinate};
///
/// let coverage = calculate_coverage(&[vec![
///     Coordinate::new(0.0, 10.0),
///     Coordinate::new(1.0, 11.0),
/// ]]);
/// // One degree square at the equator is about 12,364 km²
/// assert!((coverage.area_km2 - 12_364.0).abs() < 10.0);
/// ```
pub fn calculate_coverage(tracks: &[Track]) -> Coverage {
    let bounds = tracks
        .iter()
        .filter_map(|t| BoundingBox::from_points(t))
        .reduce(|acc, b| acc.union(&b));

    let Some(bounds) = bounds else {
        return Coverage::default();
    };

    Coverage {
        bounding_box: bounds,
        area_km2: rectangle_area_km2(&bounds),
        point_count: tracks.iter().map(Vec::len).sum::<usize>() as u32,
    }
}

fn rectangle_area_km2(b: &BoundingBox) -> f64 {
    let lat_term = (b.max_lat.to_radians().sin() - b.min_lat.to_radians().sin()).abs();
    let lon_span = (b.max_lon - b.min_lon).to_radians().abs();
    EARTH_RADIUS_KM * EARTH_RADIUS_KM * lat_term * lon_span
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Coordinate;

    fn c(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon)
    }

    #[test]
    fn test_empty() {
        assert_eq!(calculate_coverage(&[]), Coverage::default());
        assert_eq!(calculate_coverage(&[vec![], vec![]]), Coverage::default());
    }

    #[test]
    fn test_single_point_has_no_area() {
        let coverage = calculate_coverage(&[vec![c(37.7749, -122.4194)]]);
        assert_eq!(coverage.point_count, 1);
        assert_eq!(coverage.area_km2, 0.0);
        assert_eq!(coverage.bounding_box.to_array(), [37.7749, -122.4194, 37.7749, -122.4194]);
    }

    #[test]
    fn test_union_of_tracks() {
        let coverage = calculate_coverage(&[
            vec![c(10.0, 10.0), c(11.0, 11.0)],
            vec![],
            vec![c(12.0, 9.0)],
        ]);
        assert_eq!(coverage.point_count, 3);
        assert_eq!(coverage.bounding_box.to_array(), [10.0, 9.0, 12.0, 11.0]);
        assert!(coverage.area_km2 > 0.0);
    }

    #[test]
    fn test_area_shrinks_with_latitude() {
        let equator = calculate_coverage(&[vec![c(0.0, 0.5), c(1.0, 1.5)]]);
        let north = calculate_coverage(&[vec![c(60.0, 0.5), c(61.0, 1.5)]]);
        assert!(north.area_km2 < equator.area_km2 * 0.6);
    }
}

//! UniFFI exports for mobile and JS hosts.
//!
//! Every export initializes logging first so Android hosts see the crate's
//! `log` output under the "TrackEngineRust" tag.

use log::{debug, info, warn};
use serde_json::{Map, Value};

use crate::*;

#[uniffi::export]
pub fn ffi_decode_polyline(encoded: String) -> Vec<Coordinate> {
    init_logging();
    decode_polyline(&encoded)
}

#[uniffi::export]
pub fn ffi_encode_polyline(coordinates: Vec<Coordinate>) -> String {
    init_logging();
    encode_polyline(&coordinates)
}

/// Route density over encoded polylines (or JSON coordinate arrays).
#[uniffi::export]
pub fn ffi_process_polylines(polylines: Vec<String>, config: HeatmapConfig) -> HeatmapResult {
    init_logging();
    info!("[TrackEngineRust] process_polylines called with {} inputs", polylines.len());
    process_polylines(&polylines, &config)
}

/// Route density over raw GPX, TCX, KML or FIT file contents.
#[uniffi::export]
pub fn ffi_process_gpx_files(files: Vec<Vec<u8>>, config: HeatmapConfig) -> HeatmapResult {
    init_logging();
    info!("[TrackEngineRust] process_gpx_files called with {} files", files.len());
    process_files(&files, &config)
}

#[uniffi::export]
pub fn ffi_validate_coordinates(coordinates: Vec<Coordinate>) -> ValidationResult {
    init_logging();
    validate_coordinates(&coordinates)
}

#[uniffi::export]
pub fn ffi_calculate_track_statistics(coordinates: Vec<Coordinate>) -> TrackStatistics {
    init_logging();
    calculate_track_statistics(&coordinates)
}

/// Per-track statistics of raw file contents, including elevation gain and speed.
#[uniffi::export]
pub fn ffi_calculate_file_statistics(file: Vec<u8>) -> Vec<TrackStatistics> {
    init_logging();
    calculate_file_statistics(&file)
}

#[uniffi::export]
pub fn ffi_simplify_track(coordinates: Vec<Coordinate>, tolerance: f64) -> Vec<Coordinate> {
    init_logging();
    let simplified = simplify_track(&coordinates, tolerance);
    debug!(
        "[TrackEngineRust] simplify_track {} -> {} points",
        coordinates.len(),
        simplified.len()
    );
    simplified
}

#[uniffi::export]
pub fn ffi_resample_track(coordinates: Vec<Coordinate>, target_points: u32) -> Vec<Coordinate> {
    init_logging();
    resample_track(&coordinates, target_points as usize)
}

#[uniffi::export]
pub fn ffi_find_track_intersections(tracks: Vec<Vec<Coordinate>>, tolerance_km: f64) -> Vec<Intersection> {
    init_logging();
    find_track_intersections(&tracks, tolerance_km)
}

#[uniffi::export]
pub fn ffi_calculate_coverage_area(tracks: Vec<Vec<Coordinate>>) -> Coverage {
    init_logging();
    calculate_coverage(&tracks)
}

/// GeoJSON Feature as a JSON string.
///
/// `properties_json` must be a JSON object; anything else is replaced by `{}`.
#[uniffi::export]
pub fn ffi_coordinates_to_geojson(coordinates: Vec<Coordinate>, properties_json: Option<String>) -> String {
    init_logging();
    let properties = match properties_json.as_deref().map(serde_json::from_str::<Value>) {
        Some(Ok(Value::Object(map))) => map,
        Some(Ok(_)) | Some(Err(_)) => {
            warn!("[TrackEngineRust] GeoJSON properties are not a JSON object, using {{}}");
            Map::new()
        }
        None => Map::new(),
    };
    to_geojson(&coordinates, properties).to_string()
}

#[uniffi::export]
pub fn ffi_export_to_gpx(tracks: Vec<Vec<Coordinate>>, metadata: GpxMetadata) -> String {
    init_logging();
    to_gpx(&tracks, &metadata)
}

#[uniffi::export]
pub fn ffi_get_file_info(bytes: Vec<u8>) -> FileInfo {
    init_logging();
    get_file_info(&bytes)
}

#[uniffi::export]
pub fn ffi_extract_file_metadata(bytes: Vec<u8>) -> FileMetadata {
    init_logging();
    extract_file_metadata(&bytes)
}

#[uniffi::export]
pub fn ffi_calculate_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    init_logging();
    calculate_distance(lat1, lon1, lat2, lon2)
}

#[uniffi::export]
pub fn ffi_split_track_by_gaps(coordinates: Vec<Coordinate>, max_gap_km: f64) -> Vec<Vec<Coordinate>> {
    init_logging();
    split_track_by_gaps(&coordinates, max_gap_km, None)
}

#[uniffi::export]
pub fn ffi_filter_coordinates_by_bounds(coordinates: Vec<Coordinate>, bounds: BoundingBox) -> Vec<Coordinate> {
    init_logging();
    filter_by_bounds(&coordinates, &bounds)
}

#[uniffi::export]
pub fn ffi_get_bounding_box(coordinates: Vec<Coordinate>) -> BoundingBox {
    init_logging();
    geo_utils::compute_bounds(&normalize_track(&coordinates))
}

#[uniffi::export]
pub fn ffi_merge_nearby_tracks(tracks: Vec<Vec<Coordinate>>, threshold_km: f64) -> Vec<Vec<Coordinate>> {
    init_logging();
    merge_nearby_tracks(&tracks, threshold_km)
}

#[uniffi::export]
pub fn ffi_cluster_tracks_by_similarity(tracks: Vec<Vec<Coordinate>>, threshold_km: f64) -> Vec<TrackCluster> {
    init_logging();
    let clusters = cluster_tracks_by_similarity(&tracks, threshold_km);
    info!(
        "[TrackEngineRust] {} tracks -> {} clusters",
        tracks.len(),
        clusters.len()
    );
    clusters
}

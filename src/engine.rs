//! Operation facade and its one-time asynchronous bootstrap.
//!
//! [`Engine`] bundles the crate's free functions behind one configured value.
//! Hosts that load configuration at runtime go through [`Bootstrap`], which
//! tries a list of sources with an [`EngineLoader`] and caches the outcome:
//!
//! ```rust
//! use track_engine::{Bootstrap, BootstrapConfig, EngineConfig, StaticLoader};
//!
//! let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! rt.block_on(async {
//!     let bootstrap = Bootstrap::new(
//!         BootstrapConfig { sources: vec!["builtin".into()] },
//!         StaticLoader::new(EngineConfig::default()),
//!     );
//!     let engine = bootstrap.engine().await.unwrap();
//!     assert!((engine.calculate_distance(0.0, 0.0, 0.0, 1.0) - 111.19).abs() < 0.01);
//! });
//! ```

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use crate::coverage::{calculate_coverage, Coverage};
use crate::export::{to_geojson, to_gpx, GpxMetadata};
use crate::formats::{extract_file_metadata, get_file_info, FileInfo, FileMetadata};
use crate::geo_utils::compute_bounds;
use crate::heatmap::{
    cluster_tracks_by_similarity, merge_nearby_tracks, process_files, process_polylines,
    HeatmapConfig, HeatmapResult, TrackCluster,
};
use crate::intersections::{find_track_intersections, Intersection};
use crate::normalize::{
    filter_by_bounds, normalize_track, split_track_by_gaps, validate_coordinates,
    ValidationResult,
};
use crate::polyline::{decode_polyline, encode_polyline};
use crate::simplify::{resample_track, simplify_track};
use crate::stats::{
    calculate_distance, calculate_file_statistics, calculate_track_statistics, TrackStatistics,
};
use crate::{BoundingBox, Coordinate, Track};

// ============================================================================
// Configuration
// ============================================================================

/// Runtime settings for an [`Engine`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub heatmap: HeatmapConfig,
}

// ============================================================================
// Engine
// ============================================================================

/// Configured entry point for every track operation.
///
/// Stateless apart from its configuration, so one instance can be shared
/// freely (behind an `Arc`) across threads.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn decode_polyline(&self, encoded: &str) -> Track {
        decode_polyline(encoded)
    }

    pub fn encode_polyline(&self, track: &[Coordinate]) -> String {
        encode_polyline(track)
    }

    /// Heatmap over encoded polylines or JSON `[[lat, lon], ...]` strings.
    pub fn process_polylines(&self, polylines: &[String]) -> HeatmapResult {
        process_polylines(polylines, &self.config.heatmap)
    }

    /// Heatmap over raw GPX, TCX, KML or FIT files.
    pub fn process_gpx_files(&self, files: &[Vec<u8>]) -> HeatmapResult {
        process_files(files, &self.config.heatmap)
    }

    pub fn validate_coordinates(&self, coords: &[Coordinate]) -> ValidationResult {
        validate_coordinates(coords)
    }

    pub fn calculate_track_statistics(&self, coords: &[Coordinate]) -> TrackStatistics {
        calculate_track_statistics(coords)
    }

    /// Per-track statistics of an activity file, with elevation gain and speed.
    pub fn calculate_file_statistics(&self, bytes: &[u8]) -> Vec<TrackStatistics> {
        calculate_file_statistics(bytes)
    }

    pub fn simplify_track(&self, coords: &[Coordinate], tolerance: f64) -> Track {
        simplify_track(coords, tolerance)
    }

    pub fn resample_track(&self, coords: &[Coordinate], target_points: usize) -> Track {
        resample_track(coords, target_points)
    }

    pub fn find_track_intersections(&self, tracks: &[Track], tolerance_km: f64) -> Vec<Intersection> {
        find_track_intersections(tracks, tolerance_km)
    }

    pub fn calculate_coverage_area(&self, tracks: &[Track]) -> Coverage {
        calculate_coverage(tracks)
    }

    pub fn coordinates_to_geojson(&self, coords: &[Coordinate], properties: Map<String, Value>) -> Value {
        to_geojson(coords, properties)
    }

    pub fn export_to_gpx(&self, tracks: &[Track], metadata: &GpxMetadata) -> String {
        to_gpx(tracks, metadata)
    }

    pub fn get_file_info(&self, bytes: &[u8]) -> FileInfo {
        get_file_info(bytes)
    }

    pub fn extract_file_metadata(&self, bytes: &[u8]) -> FileMetadata {
        extract_file_metadata(bytes)
    }

    pub fn calculate_distance(&self, lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
        calculate_distance(lat1, lon1, lat2, lon2)
    }

    pub fn split_track_by_gaps(
        &self,
        coords: &[Coordinate],
        max_gap_km: f64,
        max_time_gap_seconds: Option<f64>,
    ) -> Vec<Track> {
        split_track_by_gaps(coords, max_gap_km, max_time_gap_seconds)
    }

    pub fn filter_coordinates_by_bounds(&self, coords: &[Coordinate], bounds: &BoundingBox) -> Track {
        filter_by_bounds(coords, bounds)
    }

    /// Bounding box of the valid coordinates; the zero box when there are none.
    pub fn get_bounding_box(&self, coords: &[Coordinate]) -> BoundingBox {
        compute_bounds(&normalize_track(coords))
    }

    pub fn merge_nearby_tracks(&self, tracks: &[Track], threshold_km: f64) -> Vec<Track> {
        merge_nearby_tracks(tracks, threshold_km)
    }

    pub fn cluster_tracks_by_similarity(&self, tracks: &[Track], threshold_km: f64) -> Vec<TrackCluster> {
        cluster_tracks_by_similarity(tracks, threshold_km)
    }
}

// ============================================================================
// Loaders
// ============================================================================

/// Produces an [`EngineConfig`] from a named source.
///
/// What a source string means is up to the loader.
pub trait EngineLoader: Send + Sync {
    fn load<'a>(&'a self, source: &'a str) -> BoxFuture<'a, Result<EngineConfig, String>>;
}

/// Returns the same configuration for every source.
#[derive(Debug, Clone, Default)]
pub struct StaticLoader {
    config: EngineConfig,
}

impl StaticLoader {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl EngineLoader for StaticLoader {
    fn load<'a>(&'a self, _source: &'a str) -> BoxFuture<'a, Result<EngineConfig, String>> {
        let config = self.config.clone();
        Box::pin(async move { Ok(config) })
    }
}

/// Treats each source as a path to a JSON [`EngineConfig`].
///
/// Missing keys take their defaults, so `{}` is a valid file.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFileLoader;

impl EngineLoader for JsonFileLoader {
    fn load<'a>(&'a self, source: &'a str) -> BoxFuture<'a, Result<EngineConfig, String>> {
        Box::pin(async move {
            let bytes = tokio::fs::read(source)
                .await
                .map_err(|e| format!("failed to read {}: {}", source, e))?;
            serde_json::from_slice(&bytes).map_err(|e| format!("invalid config in {}: {}", source, e))
        })
    }
}

// ============================================================================
// Bootstrap
// ============================================================================

/// Where the bootstrap should look for configuration, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub sources: Vec<String>,
}

/// One failed configuration source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAttempt {
    pub location: String,
    pub cause: String,
}

impl fmt::Display for SourceAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.cause)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapError {
    #[error("no configuration sources were provided")]
    NoSources,
    #[error("every configuration source failed: {}", join_attempts(.attempts))]
    AllSourcesFailed { attempts: Vec<SourceAttempt> },
}

fn join_attempts(attempts: &[SourceAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Builds the shared [`Engine`] at most once.
///
/// The first caller of [`Bootstrap::engine`] runs the loader; concurrent
/// callers wait for that same attempt. Success and failure are both cached,
/// so a failed bootstrap is not retried.
pub struct Bootstrap<L: EngineLoader> {
    config: BootstrapConfig,
    loader: L,
    engine: OnceCell<Result<Arc<Engine>, BootstrapError>>,
}

impl<L: EngineLoader> Bootstrap<L> {
    pub fn new(config: BootstrapConfig, loader: L) -> Self {
        Self {
            config,
            loader,
            engine: OnceCell::new(),
        }
    }

    pub async fn engine(&self) -> Result<Arc<Engine>, BootstrapError> {
        self.engine.get_or_init(|| self.initialize()).await.clone()
    }

    /// The cached outcome, if bootstrap has finished.
    pub fn get(&self) -> Option<&Result<Arc<Engine>, BootstrapError>> {
        self.engine.get()
    }

    async fn initialize(&self) -> Result<Arc<Engine>, BootstrapError> {
        if self.config.sources.is_empty() {
            warn!("[Bootstrap] No configuration sources");
            return Err(BootstrapError::NoSources);
        }

        let mut attempts = Vec::new();
        for source in &self.config.sources {
            match self.loader.load(source).await {
                Ok(config) => {
                    info!("[Bootstrap] Engine configured from {}", source);
                    return Ok(Arc::new(Engine::new(config)));
                }
                Err(cause) => {
                    warn!("[Bootstrap] Source {} failed: {}", source, cause);
                    attempts.push(SourceAttempt {
                        location: source.clone(),
                        cause,
                    });
                }
            }
        }
        Err(BootstrapError::AllSourcesFailed { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn line(lat0: f64, n: usize) -> Track {
        (0..n)
            .map(|i| Coordinate::new(lat0 + i as f64 * 0.0005, 8.54))
            .collect()
    }

    /// Counts calls and fails for sources starting with "bad".
    struct CountingLoader {
        calls: AtomicUsize,
    }

    impl EngineLoader for CountingLoader {
        fn load<'a>(&'a self, source: &'a str) -> BoxFuture<'a, Result<EngineConfig, String>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                if source.starts_with("bad") {
                    Err(format!("{} unavailable", source))
                } else {
                    Ok(EngineConfig {
                        heatmap: HeatmapConfig {
                            max_jump_km: Some(1.0),
                            ..Default::default()
                        },
                    })
                }
            })
        }
    }

    fn counting() -> CountingLoader {
        CountingLoader {
            calls: AtomicUsize::new(0),
        }
    }

    fn sources(names: &[&str]) -> BootstrapConfig {
        BootstrapConfig {
            sources: names.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_load() {
        let bootstrap = Bootstrap::new(sources(&["good"]), counting());

        let results = futures::future::join_all((0..8).map(|_| bootstrap.engine())).await;

        assert_eq!(bootstrap.loader.calls.load(Ordering::SeqCst), 1);
        let first = results[0].as_ref().unwrap();
        for r in &results {
            assert!(Arc::ptr_eq(first, r.as_ref().unwrap()));
        }
        assert_eq!(first.config().heatmap.max_jump_km, Some(1.0));
    }

    #[tokio::test]
    async fn test_falls_through_to_later_source() {
        let bootstrap = Bootstrap::new(sources(&["bad-a", "good", "bad-b"]), counting());
        assert!(bootstrap.engine().await.is_ok());
        assert_eq!(bootstrap.loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_lists_every_attempt_and_is_cached() {
        let bootstrap = Bootstrap::new(sources(&["bad-a", "bad-b"]), counting());

        let err = bootstrap.engine().await.unwrap_err();
        match &err {
            BootstrapError::AllSourcesFailed { attempts } => {
                assert_eq!(attempts.len(), 2);
                assert_eq!(attempts[0].location, "bad-a");
                assert_eq!(attempts[1].cause, "bad-b unavailable");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("bad-a: bad-a unavailable"));

        // Cached: no second round of loads
        assert_eq!(bootstrap.engine().await.unwrap_err(), err);
        assert_eq!(bootstrap.loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_sources() {
        let bootstrap = Bootstrap::new(BootstrapConfig::default(), StaticLoader::default());
        assert!(bootstrap.get().is_none());
        assert_eq!(bootstrap.engine().await.unwrap_err(), BootstrapError::NoSources);
        assert!(bootstrap.get().is_some());
    }

    #[tokio::test]
    async fn test_json_file_loader() {
        let path = std::env::temp_dir().join(format!("track-engine-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"heatmap": {"match_threshold_meters": 25.0}}"#).unwrap();
        let path_str = path.to_string_lossy().into_owned();

        let config = JsonFileLoader.load(&path_str).await.unwrap();
        assert_eq!(config.heatmap.match_threshold_meters, 25.0);
        assert_eq!(config.heatmap.sample_points, HeatmapConfig::default().sample_points);
        assert_eq!(config.heatmap.max_jump_km, None);

        std::fs::remove_file(&path).unwrap();
        let err = JsonFileLoader.load(&path_str).await.unwrap_err();
        assert!(err.starts_with("failed to read"));
    }

    #[test]
    fn test_jump_filter_applies_to_heatmap_inputs() {
        let mut with_spike = line(47.37, 20);
        with_spike[10] = Coordinate::new(48.5, 9.9);
        let clean = line(47.37, 20);
        let tracks = vec![
            encode_polyline(&clean),
            encode_polyline(&with_spike),
        ];

        let plain = Engine::default().process_polylines(&tracks);
        assert_eq!(plain.tracks.len(), 2);

        let filtered = Engine::new(EngineConfig {
            heatmap: HeatmapConfig {
                max_jump_km: Some(5.0),
                ..Default::default()
            },
        })
        .process_polylines(&tracks);
        assert_eq!(filtered.tracks.len(), 1);
        assert_eq!(filtered.max_frequency, 2);
    }

    #[test]
    fn test_bounding_box_skips_invalid() {
        let engine = Engine::default();
        let bbox = engine.get_bounding_box(&[
            Coordinate::new(10.0, 20.0),
            Coordinate::new(f64::NAN, 0.0),
            Coordinate::new(11.0, 19.0),
        ]);
        assert_eq!(bbox.to_array(), [10.0, 19.0, 11.0, 20.0]);
        assert_eq!(engine.get_bounding_box(&[]), BoundingBox::default());
    }

    #[test]
    fn test_file_operations() {
        let gpx = engine_gpx();
        let engine = Engine::default();
        let info = engine.get_file_info(gpx.as_bytes());
        assert!(info.valid);
        assert_eq!(info.track_count, 1);
        assert_eq!(info.point_count, 20);

        let stats = engine.calculate_file_statistics(gpx.as_bytes());
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].point_count, 20);
        assert_eq!(stats[0].average_speed, None);

        let result = engine.process_gpx_files(&[gpx.into_bytes()]);
        assert_eq!(result.tracks.len(), 1);
        assert_eq!(result.max_frequency, 1);
    }

    fn engine_gpx() -> String {
        Engine::default().export_to_gpx(&[line(47.37, 20)], &GpxMetadata::default())
    }
}

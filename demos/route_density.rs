//! Route density, intersections and coverage over a batch of tracks.
//!
//! Run with: cargo run --example route_density

use std::time::Instant;

use track_engine::{Coordinate, Engine, EngineConfig, HeatmapConfig, Track};

/// A straight track with a little deterministic wobble.
fn track(start: (f64, f64), end: (f64, f64), points: usize, wobble: f64) -> Track {
    (0..points)
        .map(|i| {
            let t = i as f64 / (points - 1) as f64;
            let jitter = ((i * 7919) % 13) as f64 / 13.0 - 0.5;
            Coordinate::new(
                start.0 + (end.0 - start.0) * t + jitter * wobble,
                start.1 + (end.1 - start.1) * t - jitter * wobble,
            )
        })
        .collect()
}

fn main() {
    println!("Route Density Example\n");

    // Zurich: a commute ridden many times in both directions, plus a few one-offs
    let home = (47.3667, 8.5500);
    let office = (47.3900, 8.5150);
    let mut tracks = Vec::new();
    for i in 0..12 {
        let wobble = 0.00005 * (i % 3) as f64;
        if i % 2 == 0 {
            tracks.push(track(home, office, 120, wobble));
        } else {
            tracks.push(track(office, home, 120, wobble));
        }
    }
    tracks.push(track((47.3600, 8.5300), (47.3950, 8.5450), 80, 0.0));
    tracks.push(track((47.3750, 8.5000), (47.3750, 8.5600), 80, 0.0));
    tracks.push(track((47.4100, 8.5400), (47.4200, 8.5600), 40, 0.0));

    let engine = Engine::new(EngineConfig {
        heatmap: HeatmapConfig {
            match_threshold_meters: 30.0,
            max_jump_km: Some(2.0),
            ..Default::default()
        },
    });

    let polylines: Vec<String> = tracks.iter().map(|t| engine.encode_polyline(t)).collect();

    let start = Instant::now();
    let heatmap = engine.process_polylines(&polylines);
    println!("1. Heatmap ({:?}):", start.elapsed());
    println!("   {} tracks -> {} buckets", tracks.len(), heatmap.tracks.len());
    for (i, bucket) in heatmap.tracks.iter().enumerate() {
        let share = bucket.frequency as f64 / heatmap.max_frequency as f64;
        println!(
            "   #{:<2} {:>3} points  frequency {:>2}  {}",
            i,
            bucket.coordinates.len(),
            bucket.frequency,
            "#".repeat((share * 20.0).round() as usize)
        );
    }

    println!("\n2. Intersections (50 m tolerance):");
    let representatives: Vec<Track> = heatmap.tracks.iter().map(|b| b.coordinates.clone()).collect();
    for hit in engine.find_track_intersections(&representatives, 0.05) {
        println!(
            "   ({:.5}, {:.5}) shared by buckets {:?}",
            hit.coordinate.latitude, hit.coordinate.longitude, hit.track_indices
        );
    }

    println!("\n3. Coverage:");
    let coverage = engine.calculate_coverage_area(&tracks);
    println!("   {:.2} km² over {} points", coverage.area_km2, coverage.point_count);

    println!("\n4. Clusters (100 m):");
    for cluster in engine.cluster_tracks_by_similarity(&tracks, 0.1) {
        println!(
            "   {} member(s) {:?}, similarity {:.2}",
            cluster.members.len(),
            cluster.members,
            cluster.similarity
        );
    }

    println!("\n5. Simplified representatives:");
    for (i, rep) in representatives.iter().enumerate() {
        let simplified = engine.simplify_track(rep, 0.0001);
        println!("   #{:<2} {} -> {} points", i, rep.len(), simplified.len());
    }
}

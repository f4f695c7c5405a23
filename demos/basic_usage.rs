//! Basic tour of the track operations.
//!
//! Run with: cargo run --example basic_usage

use serde_json::{json, Map};
use track_engine::{Coordinate, Engine, GpxMetadata};

fn main() {
    let engine = Engine::default();

    println!("Track Engine Basics\n");

    // Polyline from the Google documentation
    let track = engine.decode_polyline("_p~iF~ps|U_ulLnnqC_mqNvxq`@");
    println!("1. Decoded polyline:");
    for c in &track {
        println!("   ({:.5}, {:.5})", c.latitude, c.longitude);
    }
    println!("   Re-encoded: {}\n", engine.encode_polyline(&track));

    // A short walk around Central Park with one bad fix
    let walk = vec![
        Coordinate::new(40.7812, -73.9665),
        Coordinate::new(40.7830, -73.9650),
        Coordinate::new(0.0, 0.0), // GPS cold start
        Coordinate::new(40.7851, -73.9632),
        Coordinate::new(40.7869, -73.9617),
        Coordinate::new(40.7880, -73.9600),
    ];

    println!("2. Validation:");
    let validation = engine.validate_coordinates(&walk);
    println!("   {}/{} valid", validation.valid_count, validation.total_count);
    for issue in &validation.issues {
        println!("   - {}", issue);
    }

    println!("\n3. Statistics:");
    let stats = engine.calculate_track_statistics(&walk);
    println!("   Distance: {:.3} km", stats.distance_km);
    println!("   Points: {}", stats.point_count);
    println!("   Bounds: {:?}", stats.bounding_box.to_array());

    println!("\n4. Simplification:");
    for tolerance in [0.0, 0.0001, 0.001] {
        let simplified = engine.simplify_track(&walk, tolerance);
        println!("   tolerance {:<7} -> {} points", tolerance, simplified.len());
    }

    println!("\n5. Distance New York -> London:");
    println!(
        "   {:.1} km",
        engine.calculate_distance(40.7128, -74.0060, 51.5074, -0.1278)
    );

    println!("\n6. GeoJSON:");
    let mut properties = Map::new();
    properties.insert("name".to_string(), json!("Central Park walk"));
    let clean = engine.filter_coordinates_by_bounds(&walk, &engine.get_bounding_box(&walk));
    let feature = engine.coordinates_to_geojson(&clean, properties);
    println!("   {}", feature);

    println!("\n7. GPX:");
    let gpx = engine.export_to_gpx(
        &[walk],
        &GpxMetadata {
            name: Some("Morning walk".to_string()),
            ..Default::default()
        },
    );
    println!("{}", gpx);

    let info = engine.get_file_info(gpx.as_bytes());
    println!(
        "\n   Re-read as {}: {} track(s), {} points, valid={}",
        info.format, info.track_count, info.point_count, info.valid
    );
}

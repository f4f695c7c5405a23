//! Encoded polyline codec.
//!
//! The format stores each coordinate as the signed delta from the previous one,
//! scaled by 1e5, zig-zag encoded and split into 5-bit groups. Each group is
//! written as one ASCII character in `'?'..='~'`, with bit 0x20 marking
//! continuation.
//!
//! Decoding is forgiving: a character outside the alphabet, or input that ends
//! in the middle of a value, stops decoding and the complete pairs read so far
//! are returned.

use geo::coord;
use log::{debug, warn};

use crate::normalize::normalize_track;
use crate::{Coordinate, Track};

const PRECISION: f64 = 1e5;
const PRECISION_DIGITS: u32 = 5;

/// Largest shift accepted while reading one value. Keeps hostile input from
/// overflowing the accumulator.
const MAX_SHIFT: u32 = 60;

/// Decode an encoded polyline into a track.
///
/// # Example
///
/// ```rust
/// use track_engine::decode_polyline;
///
/// let track = decode_polyline("_p~iF~ps|U_ulLnnqC_mqNvxq`@");
/// assert_eq!(track.len(), 3);
/// assert!((track[0].latitude - 38.5).abs() < 1e-9);
/// assert!((track[0].longitude + 120.2).abs() < 1e-9);
/// ```
pub fn decode_polyline(encoded: &str) -> Track {
    let bytes = encoded.as_bytes();
    let mut track = Vec::new();
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lon: i64 = 0;

    while index < bytes.len() {
        let Some((d_lat, next)) = read_value(bytes, index) else {
            debug!("[Polyline] Stopped at byte {} of {}", index, bytes.len());
            break;
        };
        let Some((d_lon, next)) = read_value(bytes, next) else {
            debug!("[Polyline] Dangling latitude at byte {}", index);
            break;
        };
        index = next;
        lat = lat.saturating_add(d_lat);
        lon = lon.saturating_add(d_lon);
        track.push(Coordinate::new(lat as f64 / PRECISION, lon as f64 / PRECISION));
    }

    track
}

/// Read one zig-zag value starting at `start`, returning it and the next index.
fn read_value(bytes: &[u8], start: usize) -> Option<(i64, usize)> {
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    let mut index = start;

    loop {
        let c = *bytes.get(index)?;
        if !(b'?'..=b'~').contains(&c) {
            return None;
        }
        let chunk = (c - b'?') as i64;
        index += 1;
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
        if shift > MAX_SHIFT {
            return None;
        }
    }

    let value = if result & 1 != 0 { !(result >> 1) } else { result >> 1 };
    Some((value, index))
}

/// Encode a track as a polyline string. Invalid coordinates are skipped.
///
/// # Example
///
/// ```rust
/// use track_engine::{encode_polyline, Coordinate};
///
/// let track = vec![
///     Coordinate::new(38.5, -120.2),
///     Coordinate::new(40.7, -120.95),
///     Coordinate::new(43.252, -126.453),
/// ];
/// assert_eq!(encode_polyline(&track), "_p~iF~ps|U_ulLnnqC_mqNvxq`@");
/// ```
pub fn encode_polyline(track: &[Coordinate]) -> String {
    // The encoder rejects out-of-range values, so only valid coordinates go in
    let coords = normalize_track(track)
        .into_iter()
        .map(|c| coord! { x: c.longitude, y: c.latitude });
    match ::polyline::encode_coordinates(coords, PRECISION_DIGITS) {
        Ok(encoded) => encoded,
        Err(e) => {
            warn!("[Polyline] Encoding failed: {}", e);
            String::new()
        }
    }
}

/// Interpret mixed client input as a track.
///
/// A JSON array of `[lat, lon]` pairs is taken as coordinates; anything else is
/// decoded as a polyline. Invalid coordinates are dropped either way.
///
/// ```rust
/// use track_engine::process_polyline;
///
/// assert_eq!(process_polyline("[[40.7128, -74.006], [40.72, -74.01]]").len(), 2);
/// assert_eq!(process_polyline("_p~iF~ps|U_ulLnnqC_mqNvxq`@").len(), 3);
/// ```
pub fn process_polyline(input: &str) -> Track {
    let trimmed = input.trim();
    if trimmed.starts_with('[') {
        if let Ok(pairs) = serde_json::from_str::<Vec<[f64; 2]>>(trimmed) {
            let coords: Vec<Coordinate> = pairs.into_iter().map(Coordinate::from).collect();
            return normalize_track(&coords);
        }
    }
    normalize_track(&decode_polyline(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_decode_sample() {
        let track = decode_polyline(SAMPLE);
        let expected = [(38.5, -120.2), (40.7, -120.95), (43.252, -126.453)];
        assert_eq!(track.len(), expected.len());
        for (c, (lat, lon)) in track.iter().zip(expected) {
            assert!(approx_eq(c.latitude, lat), "{} != {}", c.latitude, lat);
            assert!(approx_eq(c.longitude, lon), "{} != {}", c.longitude, lon);
        }
    }

    #[test]
    fn test_decode_empty() {
        assert!(decode_polyline("").is_empty());
    }

    #[test]
    fn test_decode_stops_at_invalid_character() {
        // First pair complete, then a space which is outside the alphabet
        let input = format!("{} junk", &SAMPLE[..10]);
        let track = decode_polyline(&input);
        assert_eq!(track.len(), 1);
        assert!(approx_eq(track[0].latitude, 38.5));
    }

    #[test]
    fn test_decode_drops_dangling_value() {
        // "_p~iF" is a complete latitude with no longitude after it
        assert!(decode_polyline("_p~iF").is_empty());
        // Continuation bit set on the final character
        let track = decode_polyline(&format!("{}_", &SAMPLE[..10]));
        assert_eq!(track.len(), 1);
    }

    #[test]
    fn test_decode_never_panics_on_garbage() {
        for input in ["~~~~~~~~~~~~~~~~~~~~~~~~~", "\u{1F600}", "????", "\0\0"] {
            let _ = decode_polyline(input);
        }
    }

    #[test]
    fn test_round_trip_within_precision() {
        let track = vec![
            Coordinate::new(47.376887, 8.541694),
            Coordinate::new(47.377512, 8.542301),
            Coordinate::new(-33.868820, 151.209296),
            Coordinate::new(-33.868821, 151.209290),
        ];
        let decoded = decode_polyline(&encode_polyline(&track));
        assert_eq!(decoded.len(), track.len());
        for (a, b) in decoded.iter().zip(&track) {
            assert!((a.latitude - b.latitude).abs() <= 1e-5);
            assert!((a.longitude - b.longitude).abs() <= 1e-5);
        }
    }

    #[test]
    fn test_encode_empty() {
        assert_eq!(encode_polyline(&[]), "");
    }

    #[test]
    fn test_encode_skips_invalid_coordinates() {
        let track = vec![
            Coordinate::new(38.5, -120.2),
            Coordinate::new(f64::NAN, 1.0),
            Coordinate::new(40.7, -120.95),
            Coordinate::new(91.0, 0.0),
            Coordinate::new(43.252, -126.453),
        ];
        assert_eq!(encode_polyline(&track), SAMPLE);
    }

    #[test]
    fn test_process_polyline_json_input_is_normalized() {
        let track = process_polyline("[[40.7128, -74.006], [0, 0], [95, 10], [40.72, -74.01]]");
        assert_eq!(track.len(), 2);
        assert!(approx_eq(track[1].latitude, 40.72));
    }

    #[test]
    fn test_process_polyline_falls_back_to_decode() {
        assert_eq!(process_polyline(SAMPLE).len(), 3);
        assert!(process_polyline("").is_empty());
    }
}

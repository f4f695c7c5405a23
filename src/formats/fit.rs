//! FIT decoding on top of `fitparser`.
//!
//! Objects are pulled one at a time from a [`FitStreamProcessor`], so a file
//! that breaks halfway still yields every position decoded before the break.
//!
//! | Message | Fields used |
//! |---------|-------------|
//! | file_id | product_name |
//! | session, lap | start_position_lat/long, timestamp |
//! | record | position_lat/long, altitude, enhanced_altitude, timestamp |

use std::panic::{self, AssertUnwindSafe};

use fitparser::de::{DecodeOption, FitObject, FitStreamProcessor};
use fitparser::profile::MesgNum;
use fitparser::{FitDataRecord, Value};
use log::{debug, warn};

use super::{FileFormat, ParsedFile, ParsedTrack};
use crate::{Coordinate, TrackPoint};

const SEMICIRCLES_TO_DEGREES: f64 = 180.0 / 2_147_483_648.0;

/// Check the FIT file header: size byte, then `.FIT` at bytes 8..12.
pub fn is_fit_file(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && matches!(bytes[0], 12 | 14) && &bytes[8..12] == b".FIT"
}

/// Positions collected while decoding.
#[derive(Debug, Default)]
struct Collected {
    records: Vec<TrackPoint>,
    starts: Vec<TrackPoint>,
    creator: Option<String>,
}

impl Collected {
    fn add(&mut self, record: &FitDataRecord) {
        match record.kind() {
            MesgNum::Record => {
                if let Some(point) = track_point(record, "position_lat", "position_long") {
                    self.records.push(point);
                }
            }
            MesgNum::Lap | MesgNum::Session => {
                if let Some(point) =
                    track_point(record, "start_position_lat", "start_position_long")
                {
                    self.starts.push(point);
                }
            }
            MesgNum::FileId if self.creator.is_none() => {
                self.creator = product_name(record);
            }
            _ => {}
        }
    }
}

fn semicircles(value: &Value) -> Option<f64> {
    match value {
        Value::SInt32(v) => Some(*v as f64 * SEMICIRCLES_TO_DEGREES),
        _ => None,
    }
}

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Float32(v) => Some(*v as f64),
        Value::Float64(v) => Some(*v),
        Value::UInt16(v) => Some(*v as f64),
        Value::UInt32(v) => Some(*v as f64),
        Value::SInt16(v) => Some(*v as f64),
        Value::SInt32(v) => Some(*v as f64),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn track_point(record: &FitDataRecord, lat_field: &str, lon_field: &str) -> Option<TrackPoint> {
    let (mut lat, mut lon) = (None, None);
    let (mut altitude, mut enhanced_altitude) = (None, None);
    let mut timestamp = None;

    for field in record.fields() {
        let name = field.name();
        if name == lat_field {
            lat = semicircles(field.value());
        } else if name == lon_field {
            lon = semicircles(field.value());
        } else {
            match name {
                "altitude" => altitude = value_to_f64(field.value()),
                "enhanced_altitude" => enhanced_altitude = value_to_f64(field.value()),
                "timestamp" => {
                    if let Value::Timestamp(t) = field.value() {
                        timestamp = Some(t.timestamp());
                    }
                }
                _ => {}
            }
        }
    }

    let coordinate = Coordinate::new(lat?, lon?);
    coordinate.is_valid().then_some(TrackPoint {
        coordinate,
        elevation: enhanced_altitude.or(altitude),
        timestamp,
    })
}

fn product_name(record: &FitDataRecord) -> Option<String> {
    record.fields().iter().find_map(|field| match field.value() {
        Value::String(s) if field.name() == "product_name" => {
            let name = s.trim_matches(char::from(0)).trim();
            (!name.is_empty()).then(|| name.to_string())
        }
        _ => None,
    })
}

/// Decode objects until the input runs out or one fails.
///
/// Returns true when every byte decoded. CRCs are not checked: a bad checksum
/// alone does not discard positions that decode cleanly.
fn decode_stream(bytes: &[u8], collected: &mut Collected) -> bool {
    let mut processor = FitStreamProcessor::new();
    processor.add_option(DecodeOption::SkipHeaderCrcValidation);
    processor.add_option(DecodeOption::SkipDataCrcValidation);

    let mut input = bytes;
    while !input.is_empty() {
        let (rest, object) = match processor.deserialize_next(input) {
            Ok(next) => next,
            Err(err) => {
                warn!("[FIT] Decode stopped at byte {}: {}", bytes.len() - input.len(), err);
                return false;
            }
        };
        input = rest;

        match object {
            // Chained files restart with a fresh header
            FitObject::Crc(_) => processor.reset(),
            FitObject::DataMessage(message) => match processor.decode_message(message) {
                Ok(record) => collected.add(&record),
                Err(err) => {
                    warn!("[FIT] Bad data message: {}", err);
                    return false;
                }
            },
            _ => {}
        }
    }
    true
}

/// Record times only move forward. An earlier one comes from a wrapped
/// compressed timestamp and is dropped.
fn drop_backward_timestamps(points: &mut [TrackPoint]) {
    let mut latest: Option<i64> = None;
    for point in points.iter_mut() {
        match (point.timestamp, latest) {
            (Some(t), Some(prev)) if t < prev => point.timestamp = None,
            (Some(t), _) => latest = Some(t),
            _ => {}
        }
    }
}

/// Decode a FIT file and collect its positions as one track.
///
/// Record positions are preferred. A file without any (a manual lap log, for
/// instance) falls back to the lap and session start positions.
pub fn parse_fit(bytes: &[u8]) -> ParsedFile {
    let mut parsed = ParsedFile::empty(FileFormat::Fit);
    if !is_fit_file(bytes) {
        return parsed;
    }

    let mut collected = Collected::default();
    // A decoder panic on hostile counters ends the decode like any other error
    let complete = panic::catch_unwind(AssertUnwindSafe(|| decode_stream(bytes, &mut collected)))
        .unwrap_or_else(|_| {
            warn!("[FIT] Decoder panicked, keeping {} records", collected.records.len());
            false
        });

    let Collected { records, starts, creator } = collected;
    let mut points = if records.is_empty() {
        debug!("[FIT] No record positions, using {} lap/session starts", starts.len());
        starts
    } else {
        records
    };
    drop_backward_timestamps(&mut points);

    if !points.is_empty() {
        parsed.tracks.push(ParsedTrack { name: None, points });
    }
    parsed.creator = creator;
    parsed.well_formed = complete;
    parsed
}

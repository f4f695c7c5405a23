//! # Format Detector/Parser
//!
//! Identifies activity files from their bytes and extracts raw tracks.
//!
//! | Format | Detected by | Parser |
//! |--------|-------------|--------|
//! | GPX | root element `gpx` | [`xml`] |
//! | TCX | root element `TrainingCenterDatabase` | [`xml`] |
//! | KML | root element `kml` | [`xml`] |
//! | FIT | `.FIT` signature in the binary header | [`fit`] |
//!
//! Parsing never fails. A broken file yields whatever was read before the
//! damage, with [`ParsedFile::well_formed`] cleared.

use std::fmt;

use log::{debug, info};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::normalize::normalize_points;
use crate::{Track, TrackPoint};

pub mod fit;
pub mod xml;

/// Events inspected before giving up on finding a root element.
const MAX_PROLOG_EVENTS: usize = 64;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

// ============================================================================
// Types
// ============================================================================

/// Recognized activity file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum FileFormat {
    Gpx,
    Tcx,
    Kml,
    Fit,
    Unknown,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Gpx => "gpx",
            FileFormat::Tcx => "tcx",
            FileFormat::Kml => "kml",
            FileFormat::Fit => "fit",
            FileFormat::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One track as found in a file, before normalization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParsedTrack {
    pub name: Option<String>,
    pub points: Vec<TrackPoint>,
}

impl ParsedTrack {
    /// Coordinates of the valid points, in order.
    pub fn coordinates(&self) -> Track {
        normalize_points(&self.points)
            .into_iter()
            .map(|p| p.coordinate)
            .collect()
    }
}

/// Everything extracted from one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFile {
    pub format: FileFormat,
    pub tracks: Vec<ParsedTrack>,
    /// False when parsing stopped at an error or the file was truncated
    pub well_formed: bool,
    pub creator: Option<String>,
}

impl ParsedFile {
    fn empty(format: FileFormat) -> Self {
        Self {
            format,
            tracks: Vec::new(),
            well_formed: false,
            creator: None,
        }
    }

    /// Normalized coordinate tracks, skipping tracks left with no points.
    pub fn coordinate_tracks(&self) -> Vec<Track> {
        self.tracks
            .iter()
            .map(ParsedTrack::coordinates)
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// Summary of a file for clients deciding whether to import it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct FileInfo {
    pub format: FileFormat,
    /// Tracks with at least one valid point
    pub track_count: u32,
    /// Valid points across those tracks
    pub point_count: u32,
    pub valid: bool,
    pub file_size: u64,
}

/// Descriptive metadata of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct FileMetadata {
    pub format: FileFormat,
    pub creator: Option<String>,
    pub track_names: Vec<String>,
    /// Earliest point timestamp, Unix seconds
    pub start_time: Option<i64>,
    /// Latest point timestamp, Unix seconds
    pub end_time: Option<i64>,
}

// ============================================================================
// Detection
// ============================================================================

/// Identify the format of a file from its bytes.
///
/// FIT is recognized by its binary header. XML formats are recognized by the
/// local name of the root element, skipping a BOM, the declaration, comments,
/// processing instructions and a doctype. Anything else is
/// [`FileFormat::Unknown`].
///
/// ```rust
/// use track_engine::{detect_format, FileFormat};
///
/// let gpx = br#"<?xml version="1.0"?><gpx version="1.1"><trk/></gpx>"#;
/// assert_eq!(detect_format(gpx), FileFormat::Gpx);
/// assert_eq!(detect_format(b"hello"), FileFormat::Unknown);
/// ```
pub fn detect_format(bytes: &[u8]) -> FileFormat {
    if fit::is_fit_file(bytes) {
        return FileFormat::Fit;
    }
    match root_element(bytes) {
        Some(root) => match root.as_slice() {
            b"gpx" => FileFormat::Gpx,
            b"TrainingCenterDatabase" => FileFormat::Tcx,
            b"kml" => FileFormat::Kml,
            _ => FileFormat::Unknown,
        },
        None => FileFormat::Unknown,
    }
}

/// Local name of the first element, if the bytes start like an XML document.
fn root_element(bytes: &[u8]) -> Option<Vec<u8>> {
    let bytes = strip_bom(bytes);
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(true);
    let mut buf = Vec::new();

    for _ in 0..MAX_PROLOG_EVENTS {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(e.local_name().as_ref().to_vec());
            }
            Ok(Event::Decl(_)) | Ok(Event::Comment(_)) | Ok(Event::DocType(_)) | Ok(Event::PI(_)) => {}
            // Text before the root means this isn't XML
            Ok(_) | Err(_) => return None,
        }
        buf.clear();
    }
    None
}

pub(crate) fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

// ============================================================================
// Parsing
// ============================================================================

/// Detect the format and extract every track.
pub fn parse_file(bytes: &[u8]) -> ParsedFile {
    let format = detect_format(bytes);
    let parsed = match format {
        FileFormat::Fit => fit::parse_fit(bytes),
        FileFormat::Gpx | FileFormat::Tcx | FileFormat::Kml => xml::parse_xml(bytes, format),
        FileFormat::Unknown => {
            debug!("[Formats] Unrecognized file of {} bytes", bytes.len());
            ParsedFile::empty(FileFormat::Unknown)
        }
    };

    if format != FileFormat::Unknown {
        info!(
            "[Formats] Parsed {} file: {} tracks, {} points, well_formed={}",
            format,
            parsed.tracks.len(),
            parsed.tracks.iter().map(|t| t.points.len()).sum::<usize>(),
            parsed.well_formed
        );
    }
    parsed
}

/// Parse several files, keeping input order.
///
/// With the `parallel` feature the files are parsed on the rayon pool.
#[cfg(feature = "parallel")]
pub fn parse_files(files: &[Vec<u8>]) -> Vec<ParsedFile> {
    use rayon::prelude::*;

    files.par_iter().map(|bytes| parse_file(bytes)).collect()
}

/// Parse several files, keeping input order.
#[cfg(not(feature = "parallel"))]
pub fn parse_files(files: &[Vec<u8>]) -> Vec<ParsedFile> {
    files.iter().map(|bytes| parse_file(bytes)).collect()
}

/// Format, counts and validity of a file.
///
/// ```rust
/// use track_engine::{get_file_info, FileFormat};
///
/// let info = get_file_info(b"");
/// assert_eq!(info.format, FileFormat::Unknown);
/// assert!(!info.valid);
/// assert_eq!(info.file_size, 0);
/// ```
pub fn get_file_info(bytes: &[u8]) -> FileInfo {
    let parsed = parse_file(bytes);
    let tracks = parsed.coordinate_tracks();

    FileInfo {
        format: parsed.format,
        track_count: tracks.len() as u32,
        point_count: tracks.iter().map(|t| t.len()).sum::<usize>() as u32,
        valid: parsed.format != FileFormat::Unknown && parsed.well_formed,
        file_size: bytes.len() as u64,
    }
}

/// Creator, track names and time span of a file.
pub fn extract_file_metadata(bytes: &[u8]) -> FileMetadata {
    let parsed = parse_file(bytes);

    let times = parsed
        .tracks
        .iter()
        .flat_map(|t| t.points.iter())
        .filter_map(|p| p.timestamp);
    let (start_time, end_time) = times.fold((None, None), |(lo, hi): (Option<i64>, Option<i64>), t| {
        (
            Some(lo.map_or(t, |v| v.min(t))),
            Some(hi.map_or(t, |v| v.max(t))),
        )
    });

    FileMetadata {
        format: parsed.format,
        creator: parsed.creator,
        track_names: parsed.tracks.iter().filter_map(|t| t.name.clone()).collect(),
        start_time,
        end_time,
    }
}

//! Streaming parser for the XML activity formats (GPX, TCX, KML).
//!
//! One event loop serves all three formats. Element names are matched by local
//! name so namespace prefixes (`gx:Track`, `tcx:Trackpoint`) don't matter.
//! Text is buffered per element and consumed when the element closes.

use chrono::DateTime;
use log::warn;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{strip_bom, FileFormat, ParsedFile, ParsedTrack};
use crate::{Coordinate, TrackPoint};

/// Parse an XML activity file of a known format.
pub fn parse_xml(bytes: &[u8], format: FileFormat) -> ParsedFile {
    let mut reader = Reader::from_reader(strip_bom(bytes));
    reader.trim_text(true);

    let mut state = XmlState::new(format);
    let mut buf = Vec::new();

    let well_formed = loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                state.open(e);
                state.stack.push(local_name(e));
            }
            Ok(Event::Empty(ref e)) => {
                state.open(e);
                let name = local_name(e);
                state.close(&name);
            }
            Ok(Event::Text(e)) => match e.unescape() {
                Ok(text) => state.text.push_str(&text),
                Err(err) => {
                    warn!("[XML] Bad text at byte {}: {}", reader.buffer_position(), err);
                    break false;
                }
            },
            Ok(Event::CData(e)) => {
                state.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::End(_)) => {
                let Some(name) = state.stack.pop() else {
                    break false;
                };
                state.close(&name);
            }
            Ok(Event::Eof) => break state.stack.is_empty() && state.saw_root,
            Err(err) => {
                warn!("[XML] Parse error at byte {}: {}", reader.buffer_position(), err);
                break false;
            }
            _ => {}
        }
        buf.clear();
    };

    state.finish(well_formed)
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

fn parse_f64(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// RFC 3339 timestamp to Unix seconds.
fn parse_time(s: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(s.trim()).ok().map(|dt| dt.timestamp())
}

/// A point whose child elements are still being read.
#[derive(Debug, Default)]
struct PendingPoint {
    lat: Option<f64>,
    lon: Option<f64>,
    elevation: Option<f64>,
    timestamp: Option<i64>,
}

impl PendingPoint {
    fn build(self) -> Option<TrackPoint> {
        Some(TrackPoint {
            coordinate: Coordinate::new(self.lat?, self.lon?),
            elevation: self.elevation,
            timestamp: self.timestamp,
        })
    }
}

struct XmlState {
    format: FileFormat,
    stack: Vec<String>,
    text: String,
    saw_root: bool,
    creator: Option<String>,
    tracks: Vec<ParsedTrack>,
    current: Option<ParsedTrack>,
    point: Option<PendingPoint>,
    /// KML: name of the enclosing Placemark
    placemark_name: Option<String>,
    /// KML gx:Track: `when` and `coord` lists, paired by index on close
    whens: Vec<Option<i64>>,
    coords: Vec<TrackPoint>,
}

impl XmlState {
    fn new(format: FileFormat) -> Self {
        Self {
            format,
            stack: Vec::new(),
            text: String::new(),
            saw_root: false,
            creator: None,
            tracks: Vec::new(),
            current: None,
            point: None,
            placemark_name: None,
            whens: Vec::new(),
            coords: Vec::new(),
        }
    }

    fn parent(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    fn open(&mut self, e: &BytesStart<'_>) {
        self.text.clear();
        let name = e.local_name();
        let name = name.as_ref();
        if self.stack.is_empty() {
            self.saw_root = true;
        }

        match (self.format, name) {
            (FileFormat::Gpx, b"gpx") => self.creator = attribute(e, b"creator"),
            (FileFormat::Gpx, b"trk" | b"rte") => self.start_track(None),
            (FileFormat::Gpx, b"trkpt" | b"rtept") if self.current.is_some() => {
                self.point = Some(PendingPoint {
                    lat: attribute(e, b"lat").as_deref().and_then(parse_f64),
                    lon: attribute(e, b"lon").as_deref().and_then(parse_f64),
                    ..Default::default()
                });
            }

            (FileFormat::Tcx, b"Activity" | b"Course") => self.start_track(None),
            (FileFormat::Tcx, b"Trackpoint") if self.current.is_some() => {
                self.point = Some(PendingPoint::default());
            }

            (FileFormat::Kml, b"Placemark") => self.placemark_name = None,
            (FileFormat::Kml, b"LineString") => self.start_track(self.placemark_name.clone()),
            (FileFormat::Kml, b"Track") => {
                self.start_track(self.placemark_name.clone());
                self.whens.clear();
                self.coords.clear();
            }
            _ => {}
        }
    }

    /// Handle the end of element `name`; the stack no longer contains it.
    fn close(&mut self, name: &str) {
        let text = std::mem::take(&mut self.text);
        let parent = self.parent().map(str::to_owned);
        let parent = parent.as_deref();

        match self.format {
            FileFormat::Gpx => self.close_gpx(name, parent, &text),
            FileFormat::Tcx => self.close_tcx(name, parent, &text),
            FileFormat::Kml => self.close_kml(name, parent, &text),
            FileFormat::Fit | FileFormat::Unknown => {}
        }
    }

    fn close_gpx(&mut self, name: &str, parent: Option<&str>, text: &str) {
        match name {
            "ele" => {
                if let Some(p) = self.point.as_mut() {
                    p.elevation = parse_f64(text);
                }
            }
            "time" => {
                if let Some(p) = self.point.as_mut() {
                    p.timestamp = parse_time(text);
                }
            }
            "name" if matches!(parent, Some("trk" | "rte")) => self.set_name(text),
            "trkpt" | "rtept" => self.finish_point(),
            "trk" | "rte" => self.finish_track(),
            _ => {}
        }
    }

    fn close_tcx(&mut self, name: &str, parent: Option<&str>, text: &str) {
        match name {
            "LatitudeDegrees" => {
                if let Some(p) = self.point.as_mut() {
                    p.lat = parse_f64(text);
                }
            }
            "LongitudeDegrees" => {
                if let Some(p) = self.point.as_mut() {
                    p.lon = parse_f64(text);
                }
            }
            "AltitudeMeters" => {
                if let Some(p) = self.point.as_mut() {
                    p.elevation = parse_f64(text);
                }
            }
            "Time" if parent == Some("Trackpoint") => {
                if let Some(p) = self.point.as_mut() {
                    p.timestamp = parse_time(text);
                }
            }
            // Activities are identified by their start time
            "Id" if parent == Some("Activity") => self.set_name(text),
            "Name" if parent == Some("Course") => self.set_name(text),
            "Name" if parent == Some("Creator") && self.creator.is_none() => {
                let creator = text.trim();
                if !creator.is_empty() {
                    self.creator = Some(creator.to_string());
                }
            }
            "Trackpoint" => self.finish_point(),
            "Activity" | "Course" => self.finish_track(),
            _ => {}
        }
    }

    fn close_kml(&mut self, name: &str, parent: Option<&str>, text: &str) {
        match name {
            "name" if parent == Some("Placemark") => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    self.placemark_name = Some(trimmed.to_string());
                }
            }
            "coordinates" if parent == Some("LineString") => {
                if let Some(track) = self.current.as_mut() {
                    track.points.extend(parse_kml_coordinates(text));
                }
            }
            "when" if parent == Some("Track") => self.whens.push(parse_time(text)),
            "coord" if parent == Some("Track") => {
                // Keep a slot for unparseable coords so `when` pairing stays aligned
                let point = parse_gx_coord(text).unwrap_or(TrackPoint::new(f64::NAN, f64::NAN));
                self.coords.push(point);
            }
            "LineString" => self.finish_track(),
            "Track" => {
                let whens = std::mem::take(&mut self.whens);
                let coords = std::mem::take(&mut self.coords);
                if let Some(track) = self.current.as_mut() {
                    for (i, mut point) in coords.into_iter().enumerate() {
                        if !point.coordinate.latitude.is_finite() {
                            continue;
                        }
                        point.timestamp = whens.get(i).copied().flatten();
                        track.points.push(point);
                    }
                }
                self.finish_track();
            }
            _ => {}
        }
    }

    fn start_track(&mut self, name: Option<String>) {
        // A new track while one is open means the previous one never closed
        self.finish_track();
        self.current = Some(ParsedTrack { name, points: Vec::new() });
    }

    fn set_name(&mut self, text: &str) {
        let trimmed = text.trim();
        if let Some(track) = self.current.as_mut() {
            if track.name.is_none() && !trimmed.is_empty() {
                track.name = Some(trimmed.to_string());
            }
        }
    }

    fn finish_point(&mut self) {
        let Some(pending) = self.point.take() else {
            return;
        };
        if let (Some(point), Some(track)) = (pending.build(), self.current.as_mut()) {
            track.points.push(point);
        }
    }

    fn finish_track(&mut self) {
        self.finish_point();
        if let Some(track) = self.current.take() {
            self.tracks.push(track);
        }
    }

    fn finish(mut self, well_formed: bool) -> ParsedFile {
        // Keep everything read before an error or truncation
        if self.format == FileFormat::Kml && !self.coords.is_empty() {
            self.close_kml("Track", None, "");
        }
        self.finish_track();

        ParsedFile {
            format: self.format,
            tracks: self.tracks,
            well_formed,
            creator: self.creator,
        }
    }
}

/// KML `<coordinates>`: whitespace-separated `lon,lat[,alt]` tuples.
fn parse_kml_coordinates(text: &str) -> Vec<TrackPoint> {
    text.split_whitespace()
        .filter_map(|tuple| {
            let mut parts = tuple.split(',');
            let lon = parse_f64(parts.next()?)?;
            let lat = parse_f64(parts.next()?)?;
            let mut point = TrackPoint::new(lat, lon);
            point.elevation = parts.next().and_then(parse_f64);
            Some(point)
        })
        .collect()
}

/// `gx:coord`: space-separated `lon lat [alt]`.
fn parse_gx_coord(text: &str) -> Option<TrackPoint> {
    let mut parts = text.split_whitespace();
    let lon = parse_f64(parts.next()?)?;
    let lat = parse_f64(parts.next()?)?;
    let mut point = TrackPoint::new(lat, lon);
    point.elevation = parts.next().and_then(parse_f64);
    Some(point)
}

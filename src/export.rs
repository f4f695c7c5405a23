//! GPX and GeoJSON output.

use std::io::Cursor;

use log::warn;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{Coordinate, Track};

const GPX_NS: &str = "http://www.topografix.com/GPX/1/1";
const DEFAULT_CREATOR: &str = "track-engine";

/// Fallback document if the writer ever fails.
const EMPTY_GPX: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<gpx version=\"1.1\" creator=\"track-engine\"></gpx>";

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Document-level details written into an exported GPX file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[serde(default)]
pub struct GpxMetadata {
    /// Written to `<metadata><name>`
    pub name: Option<String>,
    /// Written to `<metadata><desc>`
    pub description: Option<String>,
    /// `creator` attribute of the root, "track-engine" when unset
    pub creator: Option<String>,
    /// Per-track names by position; missing entries become "Track N"
    pub track_names: Vec<String>,
}

/// Render tracks as a GPX 1.1 document.
///
/// Each track becomes one `<trk>` with a single `<trkseg>`. Coordinates are
/// printed with at most six decimals and at least four.
///
/// ```rust
/// use track_engine::{to_gpx, Coordinate, GpxMetadata};
///
/// let gpx = to_gpx(
///     &[vec![Coordinate::new(40.7128, -74.006), Coordinate::new(40.7589, -73.9851)]],
///     &GpxMetadata::default(),
/// );
/// assert!(gpx.starts_with("<?xml"));
/// assert!(gpx.contains("<name>Track 1</name>"));
/// assert!(gpx.contains(r#"<trkpt lat="40.7128" lon="-74.0060">"#));
/// ```
pub fn to_gpx(tracks: &[Track], metadata: &GpxMetadata) -> String {
    match write_gpx(tracks, metadata) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!("[Export] GPX writer failed: {}", e);
            EMPTY_GPX.to_string()
        }
    }
}

fn write_gpx(tracks: &[Track], metadata: &GpxMetadata) -> quick_xml::Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("gpx");
    root.push_attribute(("version", "1.1"));
    root.push_attribute((
        "creator",
        metadata.creator.as_deref().unwrap_or(DEFAULT_CREATOR),
    ));
    root.push_attribute(("xmlns", GPX_NS));
    writer.write_event(Event::Start(root))?;

    if metadata.name.is_some() || metadata.description.is_some() {
        writer.write_event(Event::Start(BytesStart::new("metadata")))?;
        if let Some(name) = &metadata.name {
            write_text_element(&mut writer, "name", name)?;
        }
        if let Some(desc) = &metadata.description {
            write_text_element(&mut writer, "desc", desc)?;
        }
        writer.write_event(Event::End(BytesEnd::new("metadata")))?;
    }

    for (i, track) in tracks.iter().enumerate() {
        let name = metadata
            .track_names
            .get(i)
            .cloned()
            .unwrap_or_else(|| format!("Track {}", i + 1));
        write_track(&mut writer, &name, track)?;
    }

    writer.write_event(Event::End(BytesEnd::new("gpx")))?;
    Ok(writer.into_inner().into_inner())
}

fn write_track(writer: &mut XmlWriter, name: &str, track: &[Coordinate]) -> quick_xml::Result<()> {
    writer.write_event(Event::Start(BytesStart::new("trk")))?;
    write_text_element(writer, "name", name)?;
    writer.write_event(Event::Start(BytesStart::new("trkseg")))?;

    for point in track {
        let lat = format_coordinate(point.latitude);
        let lon = format_coordinate(point.longitude);
        let mut trkpt = BytesStart::new("trkpt");
        trkpt.push_attribute(("lat", lat.as_str()));
        trkpt.push_attribute(("lon", lon.as_str()));
        // Open/close pair on one line: `<trkpt lat=".." lon=".."></trkpt>`
        writer.write_event(Event::Start(trkpt))?;
        writer.write_event(Event::Text(BytesText::new("")))?;
        writer.write_event(Event::End(BytesEnd::new("trkpt")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("trkseg")))?;
    writer.write_event(Event::End(BytesEnd::new("trk")))?;
    Ok(())
}

fn write_text_element(writer: &mut XmlWriter, tag: &str, text: &str) -> quick_xml::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// Six decimals, trailing zeros trimmed but never below four.
fn format_coordinate(value: f64) -> String {
    let mut s = format!("{:.6}", value);
    for _ in 0..2 {
        if s.ends_with('0') {
            s.pop();
        }
    }
    s
}

/// Build a GeoJSON `Feature` with a `LineString` geometry.
///
/// GeoJSON orders positions as `[longitude, latitude]`, the reverse of
/// [`Coordinate`].
pub fn to_geojson(coords: &[Coordinate], properties: Map<String, Value>) -> Value {
    let positions: Vec<[f64; 2]> = coords.iter().map(|c| [c.longitude, c.latitude]).collect();
    json!({
        "type": "Feature",
        "geometry": {
            "type": "LineString",
            "coordinates": positions,
        },
        "properties": properties,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{parse_file, FileFormat};

    fn c(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon)
    }

    #[test]
    fn test_format_coordinate() {
        assert_eq!(format_coordinate(40.7128), "40.7128");
        assert_eq!(format_coordinate(-74.006), "-74.0060");
        assert_eq!(format_coordinate(1.0), "1.0000");
        assert_eq!(format_coordinate(12.3456789), "12.345679");
        assert_eq!(format_coordinate(0.12345), "0.12345");
    }

    #[test]
    fn test_empty_document() {
        let gpx = to_gpx(&[], &GpxMetadata::default());
        assert!(gpx.starts_with("<?xml"));
        assert!(gpx.contains("<gpx"));
        assert!(gpx.contains("</gpx>"));
        assert!(!gpx.contains("<trk>"));
        assert!(!gpx.contains("<metadata>"));
    }

    #[test]
    fn test_tracks_and_names() {
        let tracks = vec![
            vec![c(40.7128, -74.006), c(40.7589, -73.9851)],
            vec![c(41.8781, -87.6298)],
        ];
        let meta = GpxMetadata {
            name: Some("Commutes".into()),
            description: Some("Week <1>".into()),
            creator: Some("unit-test".into()),
            track_names: vec!["Morning".into()],
        };
        let gpx = to_gpx(&tracks, &meta);

        assert!(gpx.contains(r#"creator="unit-test""#));
        assert!(gpx.contains("<name>Commutes</name>"));
        assert!(gpx.contains("<desc>Week &lt;1&gt;</desc>"));
        assert!(gpx.contains("<name>Morning</name>"));
        assert!(gpx.contains("<name>Track 2</name>"));
        assert_eq!(gpx.matches("<trk>").count(), 2);
        assert_eq!(gpx.matches("<trkseg>").count(), 2);
        assert_eq!(gpx.matches("<trkpt").count(), 3);
    }

    #[test]
    fn test_trkpt_written_as_element_pair() {
        let gpx = to_gpx(&[vec![c(40.7128, -74.0060)]], &GpxMetadata::default());
        assert!(gpx.contains(r#"<trkpt lat="40.7128" lon="-74.0060">"#));
        assert!(gpx.contains(r#"<trkpt lat="40.7128" lon="-74.0060"></trkpt>"#));
        assert!(!gpx.contains("/>"));
    }

    #[test]
    fn test_output_parses_back() {
        let track = vec![c(47.3769, 8.5417), c(47.3780, 8.5430), c(47.3791, 8.5444)];
        let gpx = to_gpx(&[track.clone()], &GpxMetadata::default());

        let parsed = parse_file(gpx.as_bytes());
        assert_eq!(parsed.format, FileFormat::Gpx);
        assert!(parsed.well_formed);
        assert_eq!(parsed.tracks.len(), 1);
        assert_eq!(parsed.tracks[0].name.as_deref(), Some("Track 1"));
        assert_eq!(parsed.tracks[0].coordinates(), track);
    }

    #[test]
    fn test_geojson_feature() {
        let mut props = Map::new();
        props.insert("name".into(), json!("loop"));
        let feature = to_geojson(&[c(40.0, -74.0), c(41.0, -75.0)], props);

        assert_eq!(feature["type"], "Feature");
        assert_eq!(feature["geometry"]["type"], "LineString");
        assert_eq!(feature["geometry"]["coordinates"], json!([[-74.0, 40.0], [-75.0, 41.0]]));
        assert_eq!(feature["properties"]["name"], "loop");
    }

    #[test]
    fn test_geojson_empty() {
        let feature = to_geojson(&[], Map::new());
        assert_eq!(feature["geometry"]["coordinates"], json!([]));
        assert_eq!(feature["properties"], json!({}));
    }
}

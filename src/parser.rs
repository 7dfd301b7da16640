use log::info;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Result, TrackError};
use crate::gpx_types::*;

/// Read the track points of a GPX document for import.
///
/// Malformed XML and files without any usable `<trkpt>` are both reported
/// as [`TrackError::ImportParseFailed`].
pub fn import_gpx(xml: &str) -> Result<ImportedTrack> {
    let track = parse_gpx(xml).map_err(|e| match e {
        TrackError::XmlParse(e) => TrackError::ImportParseFailed(format!("invalid XML: {e}")),
        other => other,
    })?;
    if track.points.is_empty() {
        return Err(TrackError::ImportParseFailed(
            "no valid track points found".to_string(),
        ));
    }
    info!(
        "imported {} track points ({} with elevation)",
        track.points.len(),
        track.points.iter().filter(|p| p.elevation.is_some()).count()
    );
    Ok(track)
}

/// Parse a GPX XML string, collecting every track point in document order.
pub fn parse_gpx(xml: &str) -> Result<ImportedTrack> {
    let mut reader = Reader::from_str(xml);
    let mut data = ImportedTrack::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"trk" => {
                parse_track(&mut reader, &mut data)?;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(TrackError::XmlParse(e)),
            _ => {}
        }
    }

    Ok(data)
}

/// Parse lat/lon attributes from a point element's start tag.
/// Returns `None` when either is missing or not a finite number.
fn parse_lat_lon(e: &BytesStart<'_>) -> Result<Option<(f64, f64)>> {
    let mut lat: Option<f64> = None;
    let mut lon: Option<f64> = None;

    for attr_result in e.attributes() {
        let attr = attr_result.map_err(|e| TrackError::XmlParse(e.into()))?;
        let val = std::str::from_utf8(&attr.value).unwrap_or_default();
        let parsed = val.trim().parse::<f64>().ok().filter(|v| v.is_finite());
        match attr.key.local_name().as_ref() {
            b"lat" => lat = parsed,
            b"lon" => lon = parsed,
            _ => {}
        }
    }

    Ok(lat.zip(lon))
}

/// Parse a `<trkpt>` element and its children.
/// Called after receiving Event::Start for the point element.
fn parse_point<'a>(
    start: &BytesStart<'a>,
    reader: &mut Reader<&'a [u8]>,
) -> Result<Option<ImportedPoint>> {
    let Some((lat, lon)) = parse_lat_lon(start)? else {
        // Skip this point if lat/lon are missing or invalid
        reader
            .read_to_end(start.name())
            .map_err(TrackError::XmlParse)?;
        return Ok(None);
    };

    let mut point = ImportedPoint::new(lat, lon);
    let end_name = start.name().0.to_vec();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"ele" => {
                    let text = read_text_owned(reader, &e)?;
                    point.elevation = text.trim().parse::<f64>().ok().filter(|v| v.is_finite());
                }
                _ => {
                    // time, extensions and anything else are not needed
                    reader
                        .read_to_end(e.name())
                        .map_err(TrackError::XmlParse)?;
                }
            },
            Ok(Event::End(e)) if e.name().0 == end_name.as_slice() => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(TrackError::XmlParse(e)),
            _ => {}
        }
    }

    Ok(Some(point))
}

/// Parse a `<trk>` element, appending its points to `data`.
fn parse_track<'a>(reader: &mut Reader<&'a [u8]>, data: &mut ImportedTrack) -> Result<()> {
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"name" => {
                    let name = read_text_owned(reader, &e)?;
                    let name = name.trim();
                    if data.name.is_none() && !name.is_empty() {
                        data.name = Some(name.to_string());
                    }
                }
                b"trkseg" => parse_segment(reader, data)?,
                _ => {
                    reader
                        .read_to_end(e.name())
                        .map_err(TrackError::XmlParse)?;
                }
            },
            Ok(Event::End(e)) if e.local_name().as_ref() == b"trk" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(TrackError::XmlParse(e)),
            _ => {}
        }
    }

    Ok(())
}

/// Parse a `<trkseg>` element, appending its points to `data`.
fn parse_segment<'a>(reader: &mut Reader<&'a [u8]>, data: &mut ImportedTrack) -> Result<()> {
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"trkpt" => {
                    if let Some(pt) = parse_point(&e, reader)? {
                        data.points.push(pt);
                    }
                }
                _ => {
                    reader
                        .read_to_end(e.name())
                        .map_err(TrackError::XmlParse)?;
                }
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"trkpt" {
                    if let Some((lat, lon)) = parse_lat_lon(&e)? {
                        data.points.push(ImportedPoint::new(lat, lon));
                    }
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"trkseg" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(TrackError::XmlParse(e)),
            _ => {}
        }
    }

    Ok(())
}

/// Read text content of an element as an owned String.
/// Handles regular text, CDATA sections, and entity references (Event::GeneralRef).
fn read_text_owned<'a>(reader: &mut Reader<&'a [u8]>, start: &BytesStart<'_>) -> Result<String> {
    let end_name = start.name().0.to_vec();
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Text(e)) => {
                let raw = std::str::from_utf8(e.as_ref()).unwrap_or_default();
                text.push_str(raw);
            }
            Ok(Event::CData(e)) => {
                let s = std::str::from_utf8(e.as_ref()).unwrap_or_default();
                text.push_str(s);
            }
            Ok(Event::GeneralRef(e)) => {
                if let Ok(Some(ch)) = e.resolve_char_ref() {
                    text.push(ch);
                } else {
                    let name = std::str::from_utf8(e.as_ref()).unwrap_or_default();
                    match name {
                        "amp" => text.push('&'),
                        "lt" => text.push('<'),
                        "gt" => text.push('>'),
                        "quot" => text.push('"'),
                        "apos" => text.push('\''),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) if e.name().0 == end_name.as_slice() => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(TrackError::XmlParse(e)),
            _ => {}
        }
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_track() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <trk>
    <name>Morning Run</name>
    <trkseg>
      <trkpt lat="35.0" lon="139.0"><ele>10.0</ele></trkpt>
      <trkpt lat="35.001" lon="139.001"><ele>11.0</ele></trkpt>
      <trkpt lat="35.002" lon="139.002"><ele>12.0</ele></trkpt>
    </trkseg>
  </trk>
</gpx>"#;
        let data = parse_gpx(xml).unwrap();
        assert_eq!(data.name.as_deref(), Some("Morning Run"));
        assert_eq!(data.points.len(), 3);
        assert_eq!(data.points[1].elevation, Some(11.0));
        assert!((data.points[2].lng - 139.002).abs() < 1e-10);
    }

    #[test]
    fn test_multi_segment_track_is_flattened() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <trk>
    <trkseg>
      <trkpt lat="35.0" lon="139.0"/>
      <trkpt lat="35.001" lon="139.001"/>
    </trkseg>
    <trkseg>
      <trkpt lat="36.0" lon="140.0"/>
    </trkseg>
  </trk>
  <trk>
    <trkseg>
      <trkpt lat="37.0" lon="141.0"/>
    </trkseg>
  </trk>
</gpx>"#;
        let data = parse_gpx(xml).unwrap();
        assert_eq!(data.points.len(), 4);
        assert!(data.points.iter().all(|p| p.elevation.is_none()));
        assert_eq!(data.points[3].lat, 37.0);
    }

    #[test]
    fn test_waypoints_and_routes_ignored() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <wpt lat="35.6762" lon="139.6503"><name>Tokyo</name></wpt>
  <rte><rtept lat="35.0" lon="139.0"/></rte>
</gpx>"#;
        let data = parse_gpx(xml).unwrap();
        assert!(data.points.is_empty());
        assert!(matches!(import_gpx(xml), Err(TrackError::ImportParseFailed(_))));
    }

    #[test]
    fn test_missing_or_bad_coordinates_skipped() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <trk><trkseg>
    <trkpt lat="35.0" lon="139.0"><ele>5</ele></trkpt>
    <trkpt lon="139.0"><ele>6</ele></trkpt>
    <trkpt lat="abc" lon="139.0"/>
    <trkpt lat="36.0" lon="140.0"><ele>n/a</ele></trkpt>
  </trkseg></trk>
</gpx>"#;
        let data = parse_gpx(xml).unwrap();
        assert_eq!(data.points.len(), 2);
        assert_eq!(data.points[0].elevation, Some(5.0));
        assert_eq!(data.points[1].elevation, None);
    }

    #[test]
    fn test_extensions_skipped() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <trk>
    <trkseg>
      <trkpt lat="35.0" lon="139.0">
        <ele>12.5</ele>
        <time>2025-01-01T00:00:00Z</time>
        <extensions>
          <gpxtpx:TrackPointExtension xmlns:gpxtpx="http://www.garmin.com/xmlschemas/TrackPointExtension/v1">
            <gpxtpx:hr>150</gpxtpx:hr>
          </gpxtpx:TrackPointExtension>
        </extensions>
      </trkpt>
    </trkseg>
  </trk>
</gpx>"#;
        let data = parse_gpx(xml).unwrap();
        assert_eq!(data.points.len(), 1);
        assert_eq!(data.points[0].elevation, Some(12.5));
    }

    #[test]
    fn test_cdata_track_name() {
        let xml = r#"<?xml version="1.0"?>
<gpx xmlns="http://www.topografix.com/GPX/1/1" version="1.1">
  <trk>
    <name><![CDATA[Tom & Jerry]]></name>
    <trkseg><trkpt lat="35.0" lon="139.0"/></trkseg>
  </trk>
</gpx>"#;
        let data = parse_gpx(xml).unwrap();
        assert_eq!(data.name.as_deref(), Some("Tom & Jerry"));
    }

    #[test]
    fn test_malformed_xml_rejected() {
        let xml = r#"<gpx><trk><trkseg><trkpt lat="1" lon="2"></trkseg></trk></gpx>"#;
        assert!(matches!(import_gpx(xml), Err(TrackError::ImportParseFailed(_))));
    }

    #[test]
    fn test_empty_gpx_rejected() {
        let xml = r#"<?xml version="1.0"?><gpx version="1.1"></gpx>"#;
        assert!(matches!(import_gpx(xml), Err(TrackError::ImportParseFailed(_))));
    }
}

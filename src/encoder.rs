use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::{Result, TrackError};
use crate::synth::TrackFix;

const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/1";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str =
    "http://www.topografix.com/GPX/1/1 http://www.topografix.com/GPX/1/1/gpx.xsd";
const TRACKPOINT_EXTENSION_NAMESPACE: &str =
    "http://www.garmin.com/xmlschemas/TrackPointExtension/v1";
const CREATOR: &str = "Apple Fitness";
const ACTIVITY_TYPE: &str = "Running";

/// Document-level data for an exported run.
#[derive(Debug, Clone)]
pub struct GpxMetadata {
    pub name: String,
    pub start_time: DateTime<Utc>,
}

/// Render a timestamp the way browsers do: millisecond precision, `Z` suffix.
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// File name for a run: non-alphanumerics become `_`, lower-cased, `.gpx`.
pub fn gpx_file_name(run_name: &str) -> String {
    let stem: String = run_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{stem}.gpx")
}

/// Serialize fixes as a single-track, single-segment GPX 1.1 document.
///
/// One `<trkpt>` per fix, in input order.
pub fn encode_gpx(fixes: &[TrackFix], metadata: &GpxMetadata) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("gpx");
    root.push_attribute(("version", "1.1"));
    root.push_attribute(("creator", CREATOR));
    root.push_attribute(("xmlns:xsi", XSI_NAMESPACE));
    root.push_attribute(("xmlns", GPX_NAMESPACE));
    root.push_attribute(("xsi:schemaLocation", SCHEMA_LOCATION));
    root.push_attribute(("xmlns:gpxtpx", TRACKPOINT_EXTENSION_NAMESPACE));
    writer.write_event(Event::Start(root))?;

    let start_time = format_timestamp(&metadata.start_time);

    start(&mut writer, "metadata")?;
    write_cdata_element(&mut writer, "name", &metadata.name)?;
    writer.write_event(Event::Empty(BytesStart::new("desc")))?;
    write_text_element(&mut writer, "time", &start_time)?;
    end(&mut writer, "metadata")?;

    start(&mut writer, "trk")?;
    write_cdata_element(&mut writer, "name", &metadata.name)?;
    writer.write_event(Event::Empty(BytesStart::new("desc")))?;
    write_text_element(&mut writer, "type", ACTIVITY_TYPE)?;
    start(&mut writer, "trkseg")?;

    for fix in fixes {
        write_trackpoint(&mut writer, fix)?;
    }

    end(&mut writer, "trkseg")?;
    end(&mut writer, "trk")?;
    end(&mut writer, "gpx")?;

    String::from_utf8(writer.into_inner()).map_err(|e| {
        TrackError::XmlWrite(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}

fn write_trackpoint(writer: &mut Writer<Vec<u8>>, fix: &TrackFix) -> Result<()> {
    let lat = format!("{:.6}", fix.lat);
    let lon = format!("{:.6}", fix.lng);
    let mut trkpt = BytesStart::new("trkpt");
    trkpt.push_attribute(("lat", lat.as_str()));
    trkpt.push_attribute(("lon", lon.as_str()));
    writer.write_event(Event::Start(trkpt))?;
    write_text_element(writer, "ele", &format!("{:.1}", fix.elevation_meters))?;
    write_text_element(writer, "time", &format_timestamp(&fix.timestamp))?;
    end(writer, "trkpt")
}

fn start(writer: &mut Writer<Vec<u8>>, name: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    Ok(())
}

fn end(writer: &mut Writer<Vec<u8>>, name: &str) -> Result<()> {
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    start(writer, name)?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    end(writer, name)
}

/// Write `text` inside CDATA. A literal `]]>` cannot appear in one section,
/// so it is split across two adjacent sections.
///
/// The sections go out as pre-escaped text so the indenting writer keeps them
/// on the element's line instead of padding the value with whitespace.
fn write_cdata_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    let sections: String = cdata_pieces(text)
        .into_iter()
        .map(|piece| format!("<![CDATA[{piece}]]>"))
        .collect();
    start(writer, name)?;
    writer.write_event(Event::Text(BytesText::from_escaped(sections)))?;
    end(writer, name)
}

fn cdata_pieces(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find("]]>") {
        // Keep "]]" in this section and start the next one at ">".
        pieces.push(&rest[..pos + 2]);
        rest = &rest[pos + 2..];
    }
    pieces.push(rest);
    pieces
}

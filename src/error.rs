use wasm_bindgen::JsValue;

/// Why an export request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportBlockReason {
    TooFewWaypoints { count: usize },
    ElevationPending { remaining: usize },
    EmptyTrack,
}

impl std::fmt::Display for ExportBlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewWaypoints { count } => write!(
                f,
                "Please add at least 2 points to generate a route (route has {count})"
            ),
            Self::ElevationPending { remaining } => write!(
                f,
                "Please wait for elevation data to load ({remaining} points remaining)"
            ),
            Self::EmptyTrack => write!(f, "Route is too short to produce any track points"),
        }
    }
}

#[derive(Debug)]
pub enum TrackError {
    IndexOutOfRange {
        index: usize,
        len: usize,
    },
    InvalidCoordinate {
        lat: f64,
        lng: f64,
    },
    ElevationFetchFailed(String),
    RouteSnapFailed(String),
    ExportBlocked(ExportBlockReason),
    ImportParseFailed(String),
    XmlParse(quick_xml::Error),
    XmlWrite(std::io::Error),
    InvalidOptions(String),
    DragInProgress,
    NoDragSession,
}

impl std::fmt::Display for TrackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IndexOutOfRange { index, len } => {
                write!(f, "Index {index} out of range for route of {len} waypoints")
            }
            Self::InvalidCoordinate { lat, lng } => {
                write!(f, "Invalid coordinate ({lat}, {lng})")
            }
            Self::ElevationFetchFailed(reason) => {
                write!(f, "Unable to fetch elevation data: {reason}")
            }
            Self::RouteSnapFailed(reason) => write!(f, "Route alignment failed: {reason}"),
            Self::ExportBlocked(reason) => write!(f, "Export blocked: {reason}"),
            Self::ImportParseFailed(reason) => write!(f, "Error reading GPX file: {reason}"),
            Self::XmlParse(e) => write!(f, "XML parse error: {e}"),
            Self::XmlWrite(e) => write!(f, "XML write error: {e}"),
            Self::InvalidOptions(reason) => write!(f, "Invalid options: {reason}"),
            Self::DragInProgress => write!(f, "Another waypoint is already being dragged"),
            Self::NoDragSession => write!(f, "No waypoint is being dragged"),
        }
    }
}

impl std::error::Error for TrackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::XmlParse(e) => Some(e),
            Self::XmlWrite(e) => Some(e),
            _ => None,
        }
    }
}

impl From<quick_xml::Error> for TrackError {
    fn from(e: quick_xml::Error) -> Self {
        Self::XmlParse(e)
    }
}

impl From<std::io::Error> for TrackError {
    fn from(e: std::io::Error) -> Self {
        Self::XmlWrite(e)
    }
}

impl From<TrackError> for JsValue {
    fn from(e: TrackError) -> Self {
        JsValue::from_str(&e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TrackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_blocked_message_names_reason() {
        let err = TrackError::ExportBlocked(ExportBlockReason::ElevationPending { remaining: 3 });
        assert!(err.to_string().contains("3 points remaining"));

        let err = TrackError::ExportBlocked(ExportBlockReason::TooFewWaypoints { count: 1 });
        assert!(err.to_string().contains("at least 2 points"));
    }

    #[test]
    fn test_index_out_of_range_display() {
        let err = TrackError::IndexOutOfRange { index: 7, len: 3 };
        assert_eq!(err.to_string(), "Index 7 out of range for route of 3 waypoints");
    }
}

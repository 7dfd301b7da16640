use serde::{Deserialize, Serialize};

use crate::geo::Waypoint;

/// A track point read from an imported GPX file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImportedPoint {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub elevation: Option<f64>,
}

impl ImportedPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            elevation: None,
        }
    }

    pub fn waypoint(&self) -> Waypoint {
        Waypoint::new(self.lat, self.lng)
    }
}

/// All track points of a GPX file, flattened across tracks and segments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportedTrack {
    /// Name of the first named track, if any.
    #[serde(default)]
    pub name: Option<String>,
    pub points: Vec<ImportedPoint>,
}

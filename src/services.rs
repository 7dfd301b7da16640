//! Request builders and response parsers for the two network collaborators:
//! an Open-Meteo style elevation API and an OSRM style foot router.
//!
//! The crate never performs I/O itself. The JS shell fetches, then hands the
//! response body here so failures become [`TrackError`] values.

use geojson::{Geometry, Value};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};
use crate::geo::Waypoint;

/// Coordinate lists for one elevation request, already formatted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElevationQuery {
    pub latitude: String,
    pub longitude: String,
}

impl ElevationQuery {
    pub fn to_query_string(&self) -> String {
        format!("latitude={}&longitude={}", self.latitude, self.longitude)
    }
}

/// Build the query for a batch of points. Coordinates use six decimals.
pub fn elevation_query(points: &[Waypoint]) -> ElevationQuery {
    let join = |f: fn(&Waypoint) -> f64| {
        points
            .iter()
            .map(|p| format!("{:.6}", f(p)))
            .collect::<Vec<_>>()
            .join(",")
    };
    ElevationQuery {
        latitude: join(|p: &Waypoint| p.lat),
        longitude: join(|p: &Waypoint| p.lng),
    }
}

#[derive(Debug, Deserialize)]
struct ElevationResponse {
    #[serde(default)]
    elevation: Option<Vec<f64>>,
    #[serde(default)]
    error: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Parse an elevation response body into meters, rounded to whole numbers.
///
/// `expected` is the number of coordinates that were requested; any other
/// count is a failure so results can never shift onto the wrong point.
pub fn parse_elevation_response(body: &str, expected: usize) -> Result<Vec<f64>> {
    let response: ElevationResponse = serde_json::from_str(body)
        .map_err(|e| TrackError::ElevationFetchFailed(format!("malformed response: {e}")))?;

    if response.error {
        let reason = response
            .reason
            .unwrap_or_else(|| "Unknown elevation API error".to_string());
        return Err(TrackError::ElevationFetchFailed(reason));
    }

    let values = match response.elevation {
        Some(values) if !values.is_empty() => values,
        _ => {
            return Err(TrackError::ElevationFetchFailed(
                "no elevation data returned".to_string(),
            ));
        }
    };
    if values.len() != expected {
        return Err(TrackError::ElevationFetchFailed(format!(
            "elevation data count mismatch: expected {expected}, got {}",
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(TrackError::ElevationFetchFailed(
            "non-numeric elevation value".to_string(),
        ));
    }

    Ok(values.into_iter().map(f64::round).collect())
}

/// Path and query for an OSRM foot route through `points`, `lng,lat` pairs
/// joined by `;`.
pub fn route_snap_path(points: &[Waypoint]) -> String {
    let coordinates = points
        .iter()
        .map(|p| format!("{},{}", p.lng, p.lat))
        .collect::<Vec<_>>()
        .join(";");
    format!("route/v1/foot/{coordinates}?steps=true&geometries=geojson&overview=full")
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    #[serde(default)]
    routes: Vec<RouteEntry>,
}

#[derive(Debug, Deserialize)]
struct RouteEntry {
    geometry: Geometry,
}

/// Parse a routing response into at most `max_points` waypoints following
/// the first route.
pub fn parse_route_snap_response(body: &str, max_points: usize) -> Result<Vec<Waypoint>> {
    let response: RouteResponse = serde_json::from_str(body).map_err(|e| {
        warn!("route snap response could not be parsed: {e}");
        TrackError::RouteSnapFailed(format!("malformed response: {e}"))
    })?;

    let Some(route) = response.routes.into_iter().next() else {
        return Err(TrackError::RouteSnapFailed("no route found".to_string()));
    };

    let points: Vec<Waypoint> = match route.geometry.value {
        Value::LineString(coords) => coords
            .iter()
            .filter(|c| c.len() >= 2)
            .map(|c| Waypoint::new(c[1], c[0]))
            .collect(),
        _ => {
            return Err(TrackError::RouteSnapFailed(
                "route geometry is not a LineString".to_string(),
            ));
        }
    };

    if points.len() < 2 {
        return Err(TrackError::RouteSnapFailed(
            "route has fewer than two points".to_string(),
        ));
    }

    Ok(subsample_route(points, max_points))
}

/// Keep every `floor(len / max_points)`-th point when the route is longer
/// than `max_points`. The final point is always kept.
pub fn subsample_route(points: Vec<Waypoint>, max_points: usize) -> Vec<Waypoint> {
    if max_points == 0 || points.len() <= max_points {
        return points;
    }
    let step = points.len() / max_points;
    let last = points.len() - 1;
    let mut kept: Vec<Waypoint> = points
        .iter()
        .enumerate()
        .filter(|(i, _)| i % step == 0)
        .map(|(_, p)| *p)
        .collect();
    if last % step != 0 {
        kept.push(points[last]);
    }
    kept
}

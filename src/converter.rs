use geojson::{Feature, Geometry, Value};
use serde_json::{Map, Value as JsonValue};

use crate::encoder::format_timestamp;
use crate::route::RouteModel;
use crate::synth::TrackFix;

/// The route polyline as a LineString feature in `[lng, lat]` order.
///
/// Routes with fewer than two waypoints produce an empty coordinate list so
/// the map layer can be cleared with the same call.
pub fn route_to_feature(route: &RouteModel) -> Feature {
    let coords: Vec<Vec<f64>> = if route.len() < 2 {
        Vec::new()
    } else {
        route.waypoints().iter().map(|w| vec![w.lng, w.lat]).collect()
    };

    let mut props = Map::new();
    props.insert("kind".to_string(), JsonValue::String("route".to_string()));
    props.insert(
        "waypointCount".to_string(),
        JsonValue::Number(route.len().into()),
    );
    insert_f64(&mut props, "distanceKm", route.total_distance_km());

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::LineString(coords))),
        id: None,
        properties: Some(props),
        foreign_members: None,
    }
}

/// Synthesized fixes as a `[lng, lat, ele]` LineString with per-coordinate
/// timestamps under `coordinateProperties.times`.
pub fn fixes_to_feature(fixes: &[TrackFix]) -> Feature {
    let coords: Vec<Vec<f64>> = fixes
        .iter()
        .map(|f| vec![f.lng, f.lat, f.elevation_meters])
        .collect();

    let mut props = Map::new();
    props.insert("kind".to_string(), JsonValue::String("track".to_string()));
    insert_coordinate_times(&mut props, fixes);

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::LineString(coords))),
        id: None,
        properties: Some(props),
        foreign_members: None,
    }
}

fn insert_f64(props: &mut Map<String, JsonValue>, key: &str, value: f64) {
    if let Some(n) = serde_json::Number::from_f64(value) {
        props.insert(key.to_string(), JsonValue::Number(n));
    }
}

fn insert_coordinate_times(props: &mut Map<String, JsonValue>, fixes: &[TrackFix]) {
    if fixes.is_empty() {
        return;
    }
    let times: Vec<JsonValue> = fixes
        .iter()
        .map(|f| JsonValue::String(format_timestamp(&f.timestamp)))
        .collect();

    let mut coord_props = Map::new();
    coord_props.insert("times".to_string(), JsonValue::Array(times));
    props.insert(
        "coordinateProperties".to_string(),
        JsonValue::Object(coord_props),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Waypoint;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_route_feature_coordinate_order() {
        let mut route = RouteModel::new();
        route.append(Waypoint::new(35.0, 139.0));
        route.append(Waypoint::new(35.001, 139.001));

        let f = route_to_feature(&route);
        if let Value::LineString(coords) = &f.geometry.as_ref().unwrap().value {
            assert_eq!(coords.len(), 2);
            assert_eq!(coords[0], vec![139.0, 35.0]); // [lng, lat]
        } else {
            panic!("Expected LineString geometry");
        }
        let props = f.properties.as_ref().unwrap();
        assert_eq!(props["kind"], "route");
        assert_eq!(props["waypointCount"], 2);
    }

    #[test]
    fn test_single_waypoint_route_has_no_line() {
        let mut route = RouteModel::new();
        route.append(Waypoint::new(35.0, 139.0));

        let f = route_to_feature(&route);
        if let Value::LineString(coords) = &f.geometry.as_ref().unwrap().value {
            assert!(coords.is_empty());
        } else {
            panic!("Expected LineString geometry");
        }
    }

    #[test]
    fn test_fixes_feature_with_times() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let fixes = vec![
            TrackFix {
                lat: 35.0,
                lng: 139.0,
                elevation_meters: 10.0,
                timestamp: t0,
            },
            TrackFix {
                lat: 35.001,
                lng: 139.001,
                elevation_meters: 11.0,
                timestamp: t0 + chrono::Duration::seconds(4),
            },
        ];

        let f = fixes_to_feature(&fixes);
        if let Value::LineString(coords) = &f.geometry.as_ref().unwrap().value {
            assert_eq!(coords[1], vec![139.001, 35.001, 11.0]);
        } else {
            panic!("Expected LineString geometry");
        }

        let props = f.properties.as_ref().unwrap();
        let coord_props = props["coordinateProperties"].as_object().unwrap();
        let times = coord_props["times"].as_array().unwrap();
        assert_eq!(times.len(), 2);
        assert_eq!(times[0], "2025-01-01T00:00:00.000Z");
        assert_eq!(times[1], "2025-01-01T00:00:04.000Z");
    }

    #[test]
    fn test_empty_fixes_have_no_times() {
        let f = fixes_to_feature(&[]);
        let props = f.properties.as_ref().unwrap();
        assert!(props.get("coordinateProperties").is_none());
    }
}

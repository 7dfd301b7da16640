pub mod converter;
pub mod editor;
pub mod elevation;
pub mod encoder;
pub mod error;
pub mod geo;
pub mod gpx_types;
pub mod history;
pub mod noise;
pub mod options;
pub mod pace;
pub mod parser;
pub mod route;
pub mod services;
pub mod synth;

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::editor::{ClickOutcome, EditorEvent, ElevationBatch, ElevationLookup, RouteEditor};
use crate::error::TrackError;
use crate::geo::Waypoint;
use crate::noise::RandomNoise;
use crate::options::{EditorConfig, ExportOptions};
use crate::pace::PaceConfig;
use crate::route::WaypointId;

#[cfg(target_arch = "wasm32")]
mod console_logger {
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use wasm_bindgen::JsValue;

    struct ConsoleLogger;

    static LOGGER: ConsoleLogger = ConsoleLogger;

    impl Log for ConsoleLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= Level::Info
        }

        fn log(&self, record: &Record) {
            if !self.enabled(record.metadata()) {
                return;
            }
            let msg = JsValue::from_str(&format!("[{}] {}", record.target(), record.args()));
            match record.level() {
                Level::Error => web_sys::console::error_1(&msg),
                Level::Warn => web_sys::console::warn_1(&msg),
                Level::Info => web_sys::console::info_1(&msg),
                _ => web_sys::console::debug_1(&msg),
            }
        }

        fn flush(&self) {}
    }

    pub(crate) fn install() {
        // Fails only when a logger is already set, which is fine.
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Info);
        }
    }
}

/// Route `log` output to the browser console. Safe to call repeatedly.
#[cfg(target_arch = "wasm32")]
pub fn init_logging() {
    console_error_panic_hook::set_once();
    console_logger::install();
}

#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging() {
    // No-op on native targets; tests pick their own logger
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn parse_or_default<T: Default + serde::de::DeserializeOwned>(value: JsValue) -> Result<T, JsValue> {
    if value.is_undefined() || value.is_null() {
        Ok(T::default())
    } else {
        serde_wasm_bindgen::from_value(value).map_err(|e| JsValue::from_str(&e.to_string()))
    }
}

fn batch_or_null(batch: Option<ElevationBatch>) -> Result<JsValue, JsValue> {
    match batch {
        Some(batch) if !batch.is_empty() => to_js(&batch.chunks().collect::<Vec<_>>()),
        _ => Ok(JsValue::NULL),
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClickView<'a> {
    Ignored,
    Deselected,
    NeedsRouteSnap {
        from: Waypoint,
        to: Waypoint,
        path: String,
    },
    Added {
        index: usize,
        chunks: Vec<&'a [ElevationLookup]>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EditorStateView<'a> {
    waypoints: &'a [Waypoint],
    elevations: &'a [Option<f64>],
    loading: &'a [bool],
    ids: &'a [WaypointId],
    selected_index: Option<usize>,
    can_undo: bool,
    can_redo: bool,
    edit_mode: bool,
    auto_align: bool,
    elevation_notice: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportView<'a> {
    name: Option<String>,
    point_count: usize,
    chunks: Vec<&'a [ElevationLookup]>,
}

/// The editing session, exposed to the page as a JS class.
///
/// Methods that need elevations return the lookups to fetch as an array of
/// chunks (or `null`); each chunk's response goes back through
/// `completeElevation`.
#[wasm_bindgen]
pub struct RunEditor {
    inner: RouteEditor,
}

#[wasm_bindgen]
impl RunEditor {
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<RunEditor, JsValue> {
        init_logging();
        let config: EditorConfig = parse_or_default(config)?;
        let inner = RouteEditor::new(config)?;
        Ok(RunEditor { inner })
    }

    /// Register `callback(event)` for editor events.
    #[wasm_bindgen(js_name = setObserver)]
    pub fn set_observer(&mut self, callback: js_sys::Function) {
        self.inner.set_observer(move |event: &EditorEvent| {
            if let Ok(value) = serde_wasm_bindgen::to_value(event) {
                if let Err(e) = callback.call1(&JsValue::NULL, &value) {
                    log::warn!("editor observer threw: {e:?}");
                }
            }
        });
    }

    #[wasm_bindgen(js_name = clearObserver)]
    pub fn clear_observer(&mut self) {
        self.inner.clear_observer();
    }

    pub fn state(&self) -> Result<JsValue, JsValue> {
        let route = self.inner.route();
        to_js(&EditorStateView {
            waypoints: route.waypoints(),
            elevations: route.elevations(),
            loading: route.loading_flags(),
            ids: route.ids(),
            selected_index: route.selected(),
            can_undo: self.inner.can_undo(),
            can_redo: self.inner.can_redo(),
            edit_mode: self.inner.edit_mode(),
            auto_align: self.inner.auto_align(),
            elevation_notice: self.inner.elevation_notice_visible(),
        })
    }

    pub fn click(&mut self, lat: f64, lng: f64) -> Result<JsValue, JsValue> {
        match self.inner.click(Waypoint::new(lat, lng)) {
            ClickOutcome::Ignored => to_js(&ClickView::Ignored),
            ClickOutcome::Deselected => to_js(&ClickView::Deselected),
            ClickOutcome::NeedsRouteSnap { from, to } => to_js(&ClickView::NeedsRouteSnap {
                from,
                to,
                path: services::route_snap_path(&[from, to]),
            }),
            ClickOutcome::Added { index, batch } => to_js(&ClickView::Added {
                index,
                chunks: batch.chunks().collect(),
            }),
        }
    }

    #[wasm_bindgen(js_name = addPoint)]
    pub fn add_point(&mut self, lat: f64, lng: f64) -> Result<JsValue, JsValue> {
        let batch = self.inner.add_point(Waypoint::new(lat, lng))?;
        batch_or_null(Some(batch))
    }

    #[wasm_bindgen(js_name = insertPoint)]
    pub fn insert_point(&mut self, index: usize, lat: f64, lng: f64) -> Result<JsValue, JsValue> {
        let batch = self.inner.insert_point(index, Waypoint::new(lat, lng))?;
        batch_or_null(Some(batch))
    }

    /// Append the routed path towards `(lat, lng)`. `response` is the raw
    /// routing response body, or `null` when the request itself failed.
    #[wasm_bindgen(js_name = addRoutedPoints)]
    pub fn add_routed_points(
        &mut self,
        lat: f64,
        lng: f64,
        response: Option<String>,
    ) -> Result<JsValue, JsValue> {
        let max_points = self.inner.config().max_snap_points;
        let snapped = response.and_then(|body| {
            services::parse_route_snap_response(&body, max_points)
                .map_err(|e| log::warn!("{e}"))
                .ok()
        });
        batch_or_null(Some(
            self.inner.add_routed_points(Waypoint::new(lat, lng), snapped),
        ))
    }

    #[wasm_bindgen(js_name = insertionIndexFor)]
    pub fn insertion_index_for(&self, lat: f64, lng: f64) -> Option<usize> {
        self.inner.insertion_index_for(Waypoint::new(lat, lng))
    }

    pub fn select(&mut self, index: Option<usize>) -> Result<(), JsValue> {
        self.inner.select(index)?;
        Ok(())
    }

    #[wasm_bindgen(js_name = toggleEditMode)]
    pub fn toggle_edit_mode(&mut self) -> bool {
        self.inner.toggle_edit_mode()
    }

    #[wasm_bindgen(js_name = toggleAutoAlign)]
    pub fn toggle_auto_align(&mut self) -> bool {
        self.inner.toggle_auto_align()
    }

    #[wasm_bindgen(js_name = beginDrag)]
    pub fn begin_drag(&mut self, index: usize) -> Result<(), JsValue> {
        self.inner.begin_drag(index)?;
        Ok(())
    }

    #[wasm_bindgen(js_name = updateDrag)]
    pub fn update_drag(&mut self, lat: f64, lng: f64) -> Result<(), JsValue> {
        self.inner.update_drag(Waypoint::new(lat, lng))?;
        Ok(())
    }

    #[wasm_bindgen(js_name = endDrag)]
    pub fn end_drag(&mut self) -> Result<JsValue, JsValue> {
        batch_or_null(self.inner.end_drag()?)
    }

    /// Hand back one chunk of lookups with the elevation response body, or
    /// `null` when the request failed. Returns lookups to retry, if any.
    #[wasm_bindgen(js_name = completeElevation)]
    pub fn complete_elevation(
        &mut self,
        lookups: JsValue,
        response: Option<String>,
    ) -> Result<JsValue, JsValue> {
        let lookups: Vec<ElevationLookup> = serde_wasm_bindgen::from_value(lookups)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        let result = match response {
            Some(body) => services::parse_elevation_response(&body, lookups.len()),
            None => Err(TrackError::ElevationFetchFailed(
                "request failed".to_string(),
            )),
        };
        let completion = self.inner.complete_elevation(&lookups, result);
        batch_or_null(completion.retry)
    }

    #[wasm_bindgen(js_name = dismissElevationNotice)]
    pub fn dismiss_elevation_notice(&mut self) {
        self.inner.dismiss_elevation_notice();
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Returns `false` when there was nothing to undo, otherwise the lookups
    /// to fetch for the restored route (or `null`).
    pub fn undo(&mut self) -> Result<JsValue, JsValue> {
        match self.inner.undo() {
            Some(restored) => batch_or_null(restored.refetch),
            None => Ok(JsValue::FALSE),
        }
    }

    pub fn redo(&mut self) -> Result<JsValue, JsValue> {
        match self.inner.redo() {
            Some(restored) => batch_or_null(restored.refetch),
            None => Ok(JsValue::FALSE),
        }
    }

    #[wasm_bindgen(js_name = canUndo)]
    pub fn can_undo(&self) -> bool {
        self.inner.can_undo()
    }

    #[wasm_bindgen(js_name = canRedo)]
    pub fn can_redo(&self) -> bool {
        self.inner.can_redo()
    }

    #[wasm_bindgen(js_name = importGpx)]
    pub fn import_gpx(&mut self, xml: &str) -> Result<JsValue, JsValue> {
        let track = parser::import_gpx(xml)?;
        let name = track.name.clone();
        let point_count = track.points.len();
        let batch = self.inner.import_track(track)?;
        to_js(&ImportView {
            name,
            point_count,
            chunks: batch.as_ref().map(|b| b.chunks().collect()).unwrap_or_default(),
        })
    }

    #[wasm_bindgen(js_name = exportGpx)]
    pub fn export_gpx(&self, options: JsValue) -> Result<JsValue, JsValue> {
        let opts: ExportOptions = parse_or_default(options)?;
        let mut noise = RandomNoise::from_seed_option(opts.seed);
        let export = self.inner.export_gpx(&opts, &mut noise)?;
        to_js(&export)
    }

    /// GeoJSON feature of the synthesized track, for previewing on the map.
    #[wasm_bindgen(js_name = trackGeoJson)]
    pub fn track_geojson(&self, options: JsValue) -> Result<JsValue, JsValue> {
        let opts: ExportOptions = parse_or_default(options)?;
        let mut noise = RandomNoise::from_seed_option(opts.seed);
        let fixes = self.inner.synthesize_track(&opts, &mut noise)?;
        to_js(&converter::fixes_to_feature(&fixes))
    }

    #[wasm_bindgen(js_name = routeGeoJson)]
    pub fn route_geojson(&self) -> Result<JsValue, JsValue> {
        to_js(&converter::route_to_feature(self.inner.route()))
    }

    pub fn stats(&self, pace_seconds_per_km: f64, consistency_percent: u8) -> Result<JsValue, JsValue> {
        let config = PaceConfig::new(pace_seconds_per_km, consistency_percent)?;
        to_js(&self.inner.stats(&config))
    }

    #[wasm_bindgen(js_name = paceProfile)]
    pub fn pace_profile(
        &self,
        pace_seconds_per_km: f64,
        consistency_percent: u8,
    ) -> Result<JsValue, JsValue> {
        let config = PaceConfig::new(pace_seconds_per_km, consistency_percent)?;
        let mut noise = RandomNoise::from_entropy();
        let samples =
            pace::pace_profile(self.inner.route().total_distance_km(), &config, &mut noise);
        to_js(&samples)
    }

    pub fn bounds(&self) -> Result<JsValue, JsValue> {
        match geo::Bounds::from_waypoints(self.inner.route().waypoints()) {
            Some(bounds) => to_js(&bounds),
            None => Ok(JsValue::NULL),
        }
    }
}

/// File name for a run name, e.g. `"Morning Run"` → `"morning_run.gpx"`.
#[wasm_bindgen(js_name = gpxFileName)]
pub fn gpx_file_name(run_name: &str) -> String {
    encoder::gpx_file_name(run_name)
}

/// Query string for an elevation request over `points` (`[{lat, lng}]`).
#[wasm_bindgen(js_name = elevationQuery)]
pub fn elevation_query(points: JsValue) -> Result<String, JsValue> {
    let points: Vec<Waypoint> =
        serde_wasm_bindgen::from_value(points).map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(services::elevation_query(&points).to_query_string())
}

#[wasm_bindgen(js_name = parseElevationResponse)]
pub fn parse_elevation_response(body: &str, expected: usize) -> Result<Vec<f64>, JsValue> {
    console_error_panic_hook::set_once();
    Ok(services::parse_elevation_response(body, expected)?)
}

#[wasm_bindgen(js_name = parseRouteSnapResponse)]
pub fn parse_route_snap_response(body: &str) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();
    let points =
        services::parse_route_snap_response(body, EditorConfig::default().max_snap_points)?;
    to_js(&points)
}

#[wasm_bindgen(js_name = formatPace)]
pub fn format_pace(seconds_per_km: f64) -> String {
    pace::format_pace(seconds_per_km)
}

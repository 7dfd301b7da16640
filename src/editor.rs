//! The editing session behind the map: route, history, interaction modes and
//! the bookkeeping for elevation lookups that are still in flight.
//!
//! Network calls happen outside. Every edit that needs elevations returns an
//! [`ElevationBatch`]; the caller fetches it (in chunks) and reports back via
//! [`RouteEditor::complete_elevation`]. Results are matched by waypoint id,
//! so edits made while a fetch is outstanding never receive a wrong value.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::encoder::{GpxMetadata, encode_gpx, gpx_file_name};
use crate::error::{ExportBlockReason, Result, TrackError};
use crate::geo::{Waypoint, distance_to_segment};
use crate::gpx_types::ImportedTrack;
use crate::history::HistoryStack;
use crate::noise::NoiseSource;
use crate::options::{EditorConfig, ExportOptions, SynthesisConfig};
use crate::pace::{PaceConfig, RouteStats};
use crate::route::{RouteModel, RouteSnapshot, WaypointId};
use crate::services::subsample_route;
use crate::synth::{TrackFix, TrackSynthesizer};

/// Identifies one elevation request issued by the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub u64);

/// One coordinate to look up, tagged with the waypoint it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElevationLookup {
    pub batch: BatchId,
    pub id: WaypointId,
    pub point: Waypoint,
}

/// Lookups issued together by one edit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElevationBatch {
    pub batch: BatchId,
    pub lookups: Vec<ElevationLookup>,
    #[serde(skip)]
    chunk_size: usize,
}

impl ElevationBatch {
    pub fn len(&self) -> usize {
        self.lookups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }

    /// Slices small enough for a single request to the elevation service.
    pub fn chunks(&self) -> std::slice::Chunks<'_, ElevationLookup> {
        self.lookups.chunks(self.chunk_size.max(1))
    }

    pub fn points(&self) -> Vec<Waypoint> {
        self.lookups.iter().map(|l| l.point).collect()
    }
}

/// What happened to a set of elevation results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElevationCompletion {
    /// Results written into the route
    pub applied: usize,
    /// Results dropped because their waypoint was removed or a newer
    /// request for it was issued
    pub skipped: usize,
    /// The request failed and the default elevation was used
    pub used_fallback: bool,
    /// Waypoints that moved since the request and need a new lookup
    pub retry: Option<ElevationBatch>,
}

/// Result of a map click.
#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    /// A drag is in progress
    Ignored,
    /// Edit mode: the click cleared the selection
    Deselected,
    /// Auto-align is on: fetch a route between these two points, then call
    /// [`RouteEditor::add_routed_points`]
    NeedsRouteSnap { from: Waypoint, to: Waypoint },
    Added { index: usize, batch: ElevationBatch },
}

/// Result of a successful undo or redo.
#[derive(Debug, Clone, PartialEq)]
pub struct Restored {
    /// Placeholders in the restored route with no lookup in flight
    pub refetch: Option<ElevationBatch>,
}

/// A finished GPX export.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpxExport {
    pub file_name: String,
    pub document: String,
    pub fix_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EditorEvent {
    RouteChanged,
    ElevationResolved { id: WaypointId, index: usize },
    HistoryChanged { can_undo: bool, can_redo: bool },
    /// Elevation lookups are failing; shown once until dismissed
    ElevationNotice,
}

/// Receives editor events, typically to redraw the map and chart.
pub trait EditorObserver {
    fn on_event(&mut self, event: &EditorEvent);
}

impl<F: FnMut(&EditorEvent)> EditorObserver for F {
    fn on_event(&mut self, event: &EditorEvent) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy)]
struct DragSession {
    id: WaypointId,
    origin: Waypoint,
    moved: bool,
}

pub struct RouteEditor {
    config: EditorConfig,
    route: RouteModel,
    history: HistoryStack<RouteSnapshot>,
    synthesizer: TrackSynthesizer,
    edit_mode: bool,
    auto_align: bool,
    drag: Option<DragSession>,
    notice_armed: bool,
    next_batch: u64,
    /// Latest batch requested for each waypoint
    in_flight: HashMap<WaypointId, BatchId>,
    /// Unsettled waypoints per batch, and whether any result was applied
    batches: HashMap<BatchId, (HashSet<WaypointId>, bool)>,
    observer: Option<Box<dyn EditorObserver>>,
}

impl std::fmt::Debug for RouteEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEditor")
            .field("waypoints", &self.route.len())
            .field("history", &self.history.len())
            .field("edit_mode", &self.edit_mode)
            .field("auto_align", &self.auto_align)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl Default for RouteEditor {
    fn default() -> Self {
        Self::build(EditorConfig::default(), SynthesisConfig::default())
    }
}

impl RouteEditor {
    pub fn new(config: EditorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, SynthesisConfig::default()))
    }

    pub fn with_synthesis(config: EditorConfig, synthesis: SynthesisConfig) -> Result<Self> {
        config.validate()?;
        synthesis.validate()?;
        Ok(Self::build(config, synthesis))
    }

    fn build(config: EditorConfig, synthesis: SynthesisConfig) -> Self {
        let mut history = HistoryStack::with_capacity(config.history_capacity);
        let route = RouteModel::new();
        history.push(route.snapshot());
        Self {
            config,
            route,
            history,
            synthesizer: TrackSynthesizer::new(synthesis),
            edit_mode: false,
            auto_align: false,
            drag: None,
            notice_armed: true,
            next_batch: 0,
            in_flight: HashMap::new(),
            batches: HashMap::new(),
            observer: None,
        }
    }

    pub fn set_observer(&mut self, observer: impl EditorObserver + 'static) {
        self.observer = Some(Box::new(observer));
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn route(&self) -> &RouteModel {
        &self.route
    }

    pub fn history(&self) -> &HistoryStack<RouteSnapshot> {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn edit_mode(&self) -> bool {
        self.edit_mode
    }

    pub fn auto_align(&self) -> bool {
        self.auto_align
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Number of waypoints with a lookup outstanding.
    pub fn lookups_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn emit(&mut self, event: EditorEvent) {
        if let Some(observer) = self.observer.as_mut() {
            observer.on_event(&event);
        }
    }

    fn record(&mut self) {
        if self.history.push(self.route.snapshot()) {
            let event = EditorEvent::HistoryChanged {
                can_undo: self.history.can_undo(),
                can_redo: self.history.can_redo(),
            };
            self.emit(event);
        }
    }

    fn raise_elevation_notice(&mut self) {
        if self.notice_armed {
            self.notice_armed = false;
            self.emit(EditorEvent::ElevationNotice);
        }
    }

    /// Re-arm the elevation notice after the user dismissed it.
    pub fn dismiss_elevation_notice(&mut self) {
        self.notice_armed = true;
    }

    pub fn elevation_notice_visible(&self) -> bool {
        !self.notice_armed
    }

    // ---- interaction ----

    pub fn click(&mut self, point: Waypoint) -> ClickOutcome {
        if self.drag.is_some() {
            return ClickOutcome::Ignored;
        }
        if !point.is_valid() {
            warn!("ignoring click at invalid coordinate ({}, {})", point.lat, point.lng);
            return ClickOutcome::Ignored;
        }
        if self.edit_mode {
            self.route.deselect();
            self.emit(EditorEvent::RouteChanged);
            return ClickOutcome::Deselected;
        }
        if self.auto_align {
            if let Some(&from) = self.route.last() {
                return ClickOutcome::NeedsRouteSnap { from, to: point };
            }
        }
        let batch = self.append_point(point);
        ClickOutcome::Added {
            index: self.route.len() - 1,
            batch,
        }
    }

    /// Append a waypoint and request its elevation.
    pub fn add_point(&mut self, point: Waypoint) -> Result<ElevationBatch> {
        check_coordinate(&point)?;
        Ok(self.append_point(point))
    }

    fn append_point(&mut self, point: Waypoint) -> ElevationBatch {
        let index = self.route.append(point);
        if self.edit_mode {
            self.route.select_last();
        }
        self.emit(EditorEvent::RouteChanged);
        let ids = self.route.id_at(index).into_iter().collect();
        self.issue_batch(ids)
    }

    /// Insert a waypoint at `index` (`0..=len`) and request its elevation.
    pub fn insert_point(&mut self, index: usize, point: Waypoint) -> Result<ElevationBatch> {
        check_coordinate(&point)?;
        self.route.insert_at(index, point)?;
        if self.edit_mode {
            self.route.select(Some(index))?;
        }
        self.emit(EditorEvent::RouteChanged);
        let ids = self.route.id_at(index).into_iter().collect();
        Ok(self.issue_batch(ids))
    }

    /// Append the result of a route snap towards `target`.
    ///
    /// The first snapped point duplicates the current tail and is dropped.
    /// Without a usable snap the raw target is appended instead.
    pub fn add_routed_points(
        &mut self,
        target: Waypoint,
        snapped: Option<Vec<Waypoint>>,
    ) -> ElevationBatch {
        let points = match snapped {
            Some(points) if points.len() >= 2 => {
                let points = subsample_route(points, self.config.max_snap_points);
                let skip = usize::from(!self.route.is_empty());
                points.into_iter().skip(skip).filter(Waypoint::is_valid).collect()
            }
            _ => {
                warn!("route snap unavailable, adding the clicked point directly");
                vec![target]
            }
        };

        let ids: Vec<WaypointId> = points
            .into_iter()
            .filter_map(|p| {
                let index = self.route.append(p);
                self.route.id_at(index)
            })
            .collect();
        debug!("added {} routed points", ids.len());
        self.emit(EditorEvent::RouteChanged);
        self.issue_batch(ids)
    }

    /// Index at which a point clicked on the route line should be inserted:
    /// right after the start of the nearest segment.
    pub fn insertion_index_for(&self, point: Waypoint) -> Option<usize> {
        let waypoints = self.route.waypoints();
        if waypoints.len() < 2 {
            return None;
        }
        waypoints
            .windows(2)
            .enumerate()
            .map(|(i, pair)| (i, distance_to_segment(&point, &pair[0], &pair[1])))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i + 1)
    }

    pub fn select(&mut self, index: Option<usize>) -> Result<()> {
        self.route.select(index)?;
        self.emit(EditorEvent::RouteChanged);
        Ok(())
    }

    /// Returns the new state. Entering edit mode turns auto-align off; the
    /// selection is reset either way.
    pub fn toggle_edit_mode(&mut self) -> bool {
        self.edit_mode = !self.edit_mode;
        if self.edit_mode {
            self.auto_align = false;
        }
        self.route.deselect();
        self.emit(EditorEvent::RouteChanged);
        self.edit_mode
    }

    pub fn toggle_auto_align(&mut self) -> bool {
        self.auto_align = !self.auto_align;
        self.auto_align
    }

    // ---- drag ----

    pub fn begin_drag(&mut self, index: usize) -> Result<()> {
        if self.drag.is_some() {
            return Err(TrackError::DragInProgress);
        }
        let (Some(id), Some(&origin)) = (self.route.id_at(index), self.route.waypoint(index))
        else {
            return Err(TrackError::IndexOutOfRange {
                index,
                len: self.route.len(),
            });
        };
        self.route.select(Some(index))?;
        self.drag = Some(DragSession {
            id,
            origin,
            moved: false,
        });
        debug!("drag started on waypoint {index}");
        Ok(())
    }

    /// Move the dragged waypoint. No history is recorded until the drag ends
    /// and the new elevation arrives.
    pub fn update_drag(&mut self, point: Waypoint) -> Result<()> {
        check_coordinate(&point)?;
        let session = self.drag.as_mut().ok_or(TrackError::NoDragSession)?;
        session.moved = point != session.origin;
        let id = session.id;
        let Some(index) = self.route.index_of(id) else {
            self.drag = None;
            return Err(TrackError::NoDragSession);
        };
        self.route.move_to(index, point)?;
        self.emit(EditorEvent::RouteChanged);
        Ok(())
    }

    /// Finish the drag. Returns a lookup for the new position if it moved.
    pub fn end_drag(&mut self) -> Result<Option<ElevationBatch>> {
        let session = self.drag.take().ok_or(TrackError::NoDragSession)?;
        if !session.moved {
            debug!("drag ended without movement");
            return Ok(None);
        }
        let Some(index) = self.route.index_of(session.id) else {
            return Ok(None);
        };
        self.route.mark_pending(index)?;
        self.emit(EditorEvent::RouteChanged);
        Ok(Some(self.issue_batch(vec![session.id])))
    }

    // ---- elevation bookkeeping ----

    fn issue_batch(&mut self, ids: Vec<WaypointId>) -> ElevationBatch {
        let batch = BatchId(self.next_batch);
        self.next_batch += 1;

        let mut lookups = Vec::with_capacity(ids.len());
        let mut pending = HashSet::new();
        for id in ids {
            let Some(point) = self.route.index_of(id).and_then(|i| self.route.waypoint(i)) else {
                continue;
            };
            lookups.push(ElevationLookup {
                batch,
                id,
                point: *point,
            });
            pending.insert(id);
            if let Some(previous) = self.in_flight.insert(id, batch) {
                self.forget_in_batch(previous, id);
            }
        }
        if !pending.is_empty() {
            self.batches.insert(batch, (pending, false));
        }
        debug!("elevation batch {} with {} lookups", batch.0, lookups.len());

        ElevationBatch {
            batch,
            lookups,
            chunk_size: self.config.elevation_batch_size,
        }
    }

    fn forget_in_batch(&mut self, batch: BatchId, id: WaypointId) {
        if let Some((pending, _)) = self.batches.get_mut(&batch) {
            pending.remove(&id);
            if pending.is_empty() {
                self.batches.remove(&batch);
            }
        }
    }

    /// Apply the outcome of fetching `lookups`.
    ///
    /// On failure every still-current lookup gets the default elevation and
    /// the elevation notice is raised. A history snapshot is recorded once
    /// all lookups of a batch have settled.
    pub fn complete_elevation(
        &mut self,
        lookups: &[ElevationLookup],
        result: Result<Vec<f64>>,
    ) -> ElevationCompletion {
        let mut completion = ElevationCompletion::default();
        let values: Vec<f64> = match result {
            Ok(values) if values.len() == lookups.len() => values,
            Ok(values) => {
                warn!(
                    "elevation result count mismatch: expected {}, got {}",
                    lookups.len(),
                    values.len()
                );
                completion.used_fallback = true;
                vec![self.config.default_elevation_m; lookups.len()]
            }
            Err(e) => {
                warn!("elevation lookup failed, using default: {e}");
                completion.used_fallback = true;
                vec![self.config.default_elevation_m; lookups.len()]
            }
        };

        let mut settled = HashSet::new();
        let mut moved = Vec::new();

        for (lookup, value) in lookups.iter().zip(values) {
            if self.in_flight.get(&lookup.id) != Some(&lookup.batch) {
                debug!("superseded elevation for waypoint {}", lookup.id.0);
                completion.skipped += 1;
                continue;
            }
            self.in_flight.remove(&lookup.id);
            settled.insert(lookup.batch);
            let batch_state = self.batches.get_mut(&lookup.batch);

            let Some(index) = self.route.index_of(lookup.id) else {
                debug!("waypoint {} removed before its elevation arrived", lookup.id.0);
                if let Some((pending, _)) = batch_state {
                    pending.remove(&lookup.id);
                }
                completion.skipped += 1;
                continue;
            };

            if self.route.waypoint(index) != Some(&lookup.point) {
                if let Some((pending, _)) = batch_state {
                    pending.remove(&lookup.id);
                }
                match self.route.elevations()[index] {
                    // Restored from history together with its own elevation.
                    Some(existing) => self.route.resolve_elevation(index, existing),
                    None => moved.push(lookup.id),
                }
                completion.skipped += 1;
                continue;
            }

            if let Some((pending, applied)) = batch_state {
                pending.remove(&lookup.id);
                *applied = true;
            }
            self.route.resolve_elevation(index, value);
            completion.applied += 1;
            self.emit(EditorEvent::ElevationResolved {
                id: lookup.id,
                index,
            });
        }

        if completion.used_fallback && completion.applied > 0 {
            self.raise_elevation_notice();
        }
        if completion.skipped > 0 {
            warn!("{} stale elevation results ignored", completion.skipped);
        }
        if completion.applied > 0 {
            self.emit(EditorEvent::RouteChanged);
        }

        for batch in settled {
            let done = matches!(self.batches.get(&batch), Some((pending, _)) if pending.is_empty());
            if done {
                if let Some((_, applied)) = self.batches.remove(&batch) {
                    if applied {
                        self.record();
                    }
                }
            }
        }

        if !moved.is_empty() {
            completion.retry = Some(self.issue_batch(moved));
        }
        completion
    }

    // ---- whole-route edits ----

    /// Remove every waypoint and leave edit mode and auto-align.
    pub fn clear(&mut self) {
        self.route.clear();
        self.in_flight.clear();
        self.batches.clear();
        self.drag = None;
        self.edit_mode = false;
        self.auto_align = false;
        self.emit(EditorEvent::RouteChanged);
        self.record();
    }

    /// Replace the route with an imported track as one edit.
    ///
    /// Provided elevations are kept (rounded); the others are returned as a
    /// batch to fetch. A track without points leaves the route untouched.
    pub fn import_track(&mut self, track: ImportedTrack) -> Result<Option<ElevationBatch>> {
        if track.points.is_empty() {
            return Err(TrackError::ImportParseFailed(
                "no valid track points found".to_string(),
            ));
        }

        self.route.clear();
        self.in_flight.clear();
        self.batches.clear();
        self.drag = None;

        let mut missing = Vec::new();
        for point in &track.points {
            match point.elevation {
                Some(ele) => {
                    self.route.append_resolved(point.waypoint(), ele.round());
                }
                None => {
                    let index = self.route.append(point.waypoint());
                    missing.extend(self.route.id_at(index));
                }
            }
        }
        self.route.deselect();
        info!(
            "imported {} waypoints, {} need elevation",
            self.route.len(),
            missing.len()
        );
        self.emit(EditorEvent::RouteChanged);

        if missing.is_empty() {
            self.record();
            Ok(None)
        } else {
            Ok(Some(self.issue_batch(missing)))
        }
    }

    // ---- history ----

    pub fn undo(&mut self) -> Option<Restored> {
        let snapshot = self.history.undo()?;
        Some(self.restore(snapshot))
    }

    pub fn redo(&mut self) -> Option<Restored> {
        let snapshot = self.history.redo()?;
        Some(self.restore(snapshot))
    }

    fn restore(&mut self, snapshot: RouteSnapshot) -> Restored {
        self.drag = None;
        let route = &mut self.route;
        let in_flight = &self.in_flight;
        self.history.restoring(|_| {
            route.restore(&snapshot, |id| in_flight.contains_key(&id));
        });

        let orphans: Vec<WaypointId> = self
            .route
            .ids()
            .iter()
            .zip(self.route.elevations())
            .filter(|(id, ele)| ele.is_none() && !self.in_flight.contains_key(*id))
            .map(|(&id, _)| id)
            .collect();

        self.emit(EditorEvent::RouteChanged);
        let event = EditorEvent::HistoryChanged {
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        };
        self.emit(event);

        let refetch = if orphans.is_empty() {
            None
        } else {
            debug!("re-requesting {} elevations after restore", orphans.len());
            Some(self.issue_batch(orphans))
        };
        Restored { refetch }
    }

    // ---- output ----

    pub fn stats(&self, pace: &PaceConfig) -> RouteStats {
        RouteStats::compute(&self.route, pace)
    }

    /// Synthesize the run without encoding it, for previews.
    pub fn synthesize_track(
        &self,
        options: &ExportOptions,
        noise: &mut dyn NoiseSource,
    ) -> Result<Vec<TrackFix>> {
        let (fixes, _) = self.synthesize_at(options, options.start_time_or_now(), noise)?;
        Ok(fixes)
    }

    /// Synthesize and encode the run.
    ///
    /// Blocked with fewer than two waypoints, while any elevation is still
    /// pending, or when the route has no length.
    pub fn export_gpx(
        &self,
        options: &ExportOptions,
        noise: &mut dyn NoiseSource,
    ) -> Result<GpxExport> {
        let start_time = options.start_time_or_now();
        let (fixes, pace) = self.synthesize_at(options, start_time, noise)?;

        let name = options.effective_run_name().to_string();
        let document = encode_gpx(
            &fixes,
            &GpxMetadata {
                name: name.clone(),
                start_time,
            },
        )?;

        info!(
            "exported {:.2} km at {:.0} s/km ({}% consistency): {} points, expected {:.1} min",
            self.route.total_distance_km(),
            pace.base_seconds_per_km(),
            pace.consistency_percent(),
            fixes.len(),
            self.route.duration_minutes(pace.base_seconds_per_km())
        );

        Ok(GpxExport {
            file_name: gpx_file_name(&name),
            document,
            fix_count: fixes.len(),
        })
    }

    fn synthesize_at(
        &self,
        options: &ExportOptions,
        start_time: DateTime<Utc>,
        noise: &mut dyn NoiseSource,
    ) -> Result<(Vec<TrackFix>, PaceConfig)> {
        if self.route.len() < 2 {
            return Err(TrackError::ExportBlocked(ExportBlockReason::TooFewWaypoints {
                count: self.route.len(),
            }));
        }
        if self.route.has_pending_elevation() {
            return Err(TrackError::ExportBlocked(ExportBlockReason::ElevationPending {
                remaining: self.route.pending_count(),
            }));
        }

        let pace = options.pace_config()?;
        let fixes = self
            .synthesizer
            .synthesize(&self.route, &pace, start_time, noise);
        if fixes.is_empty() {
            return Err(TrackError::ExportBlocked(ExportBlockReason::EmptyTrack));
        }
        Ok((fixes, pace))
    }
}

fn check_coordinate(point: &Waypoint) -> Result<()> {
    if point.is_valid() {
        Ok(())
    } else {
        Err(TrackError::InvalidCoordinate {
            lat: point.lat,
            lng: point.lng,
        })
    }
}

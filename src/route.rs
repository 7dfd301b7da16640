//! The sparse, user-edited route.
//!
//! Waypoints, elevations, loading flags and ids are kept in parallel vectors
//! sharing one index space. The index is what the UI sees; the [`WaypointId`]
//! is what background elevation lookups use to find their waypoint again
//! after the route has been edited underneath them.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};
use crate::geo::{Waypoint, path_length};

/// Elevation changes at or below this many meters are treated as noise.
pub const ELEVATION_GAIN_THRESHOLD_METERS: f64 = 3.0;

/// Stable identity of a waypoint, independent of its current index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaypointId(pub u64);

/// Immutable deep copy of the route taken for the undo history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSnapshot {
    pub waypoints: Vec<Waypoint>,
    pub elevations: Vec<Option<f64>>,
    pub ids: Vec<WaypointId>,
    pub selected_index: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct RouteModel {
    waypoints: Vec<Waypoint>,
    elevations: Vec<Option<f64>>,
    loading: Vec<bool>,
    ids: Vec<WaypointId>,
    selected: Option<usize>,
    next_id: u64,
}

impl RouteModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn elevations(&self) -> &[Option<f64>] {
        &self.elevations
    }

    pub fn loading_flags(&self) -> &[bool] {
        &self.loading
    }

    pub fn ids(&self) -> &[WaypointId] {
        &self.ids
    }

    pub fn waypoint(&self, index: usize) -> Option<&Waypoint> {
        self.waypoints.get(index)
    }

    pub fn id_at(&self, index: usize) -> Option<WaypointId> {
        self.ids.get(index).copied()
    }

    /// Current index of a waypoint, if it still exists.
    pub fn index_of(&self, id: WaypointId) -> Option<usize> {
        self.ids.iter().position(|&i| i == id)
    }

    pub fn last(&self) -> Option<&Waypoint> {
        self.waypoints.last()
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn select(&mut self, index: Option<usize>) -> Result<()> {
        if let Some(i) = index {
            self.check_index(i)?;
        }
        self.selected = index;
        Ok(())
    }

    pub fn deselect(&mut self) {
        self.selected = None;
    }

    /// Select the most recently appended waypoint; deselects an empty route.
    pub fn select_last(&mut self) {
        self.selected = self.waypoints.len().checked_sub(1);
    }

    fn allocate_id(&mut self) -> WaypointId {
        let id = WaypointId(self.next_id);
        self.next_id += 1;
        id
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.waypoints.len() {
            Ok(())
        } else {
            Err(TrackError::IndexOutOfRange {
                index,
                len: self.waypoints.len(),
            })
        }
    }

    /// Append a waypoint with a pending elevation placeholder.
    pub fn append(&mut self, point: Waypoint) -> usize {
        let id = self.allocate_id();
        self.waypoints.push(point);
        self.elevations.push(None);
        self.loading.push(true);
        self.ids.push(id);
        self.waypoints.len() - 1
    }

    /// Append a waypoint whose elevation is already known.
    pub fn append_resolved(&mut self, point: Waypoint, elevation: f64) -> usize {
        let index = self.append(point);
        self.elevations[index] = Some(elevation);
        self.loading[index] = false;
        index
    }

    /// Insert a waypoint with a pending elevation at `index`, shifting later
    /// entries up by one. `index == len` appends.
    pub fn insert_at(&mut self, index: usize, point: Waypoint) -> Result<()> {
        if index > self.waypoints.len() {
            return Err(TrackError::IndexOutOfRange {
                index,
                len: self.waypoints.len(),
            });
        }
        let id = self.allocate_id();
        self.waypoints.insert(index, point);
        self.elevations.insert(index, None);
        self.loading.insert(index, true);
        self.ids.insert(index, id);
        if let Some(sel) = self.selected {
            if sel >= index {
                self.selected = Some(sel + 1);
            }
        }
        Ok(())
    }

    /// Overwrite the coordinates at `index`. Elevation is left untouched.
    pub fn move_to(&mut self, index: usize, point: Waypoint) -> Result<()> {
        self.check_index(index)?;
        self.waypoints[index] = point;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.waypoints.clear();
        self.elevations.clear();
        self.loading.clear();
        self.ids.clear();
        self.selected = None;
    }

    /// Mark the elevation at `index` as being fetched again.
    pub fn mark_pending(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.loading[index] = true;
        Ok(())
    }

    /// Store a resolved elevation. A no-op when the index no longer exists.
    pub fn resolve_elevation(&mut self, index: usize, value: f64) {
        if index < self.elevations.len() {
            self.elevations[index] = Some(value);
            self.loading[index] = false;
        }
    }

    /// Store a resolved elevation by identity. Returns the index it landed
    /// on, or `None` if the waypoint no longer exists.
    pub fn resolve_elevation_by_id(&mut self, id: WaypointId, value: f64) -> Option<usize> {
        let index = self.index_of(id)?;
        self.resolve_elevation(index, value);
        Some(index)
    }

    pub fn has_pending_elevation(&self) -> bool {
        self.loading.iter().any(|&l| l)
    }

    pub fn pending_count(&self) -> usize {
        self.loading.iter().filter(|&&l| l).count()
    }

    /// Total route length in meters.
    pub fn total_distance_meters(&self) -> f64 {
        path_length(&self.waypoints)
    }

    pub fn total_distance_km(&self) -> f64 {
        if self.waypoints.len() < 2 {
            return 0.0;
        }
        self.total_distance_meters() / 1000.0
    }

    /// Expected duration in minutes at the given pace.
    pub fn duration_minutes(&self, seconds_per_km: f64) -> f64 {
        self.total_distance_km() * seconds_per_km / 60.0
    }

    /// Sum of positive climbs above the noise threshold between consecutive
    /// resolved samples. Unresolved samples are skipped, not zeroed.
    pub fn elevation_gain_meters(&self) -> f64 {
        let resolved: Vec<f64> = self.elevations.iter().flatten().copied().collect();
        if resolved.len() < 2 {
            return 0.0;
        }
        resolved
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .filter(|&delta| delta > ELEVATION_GAIN_THRESHOLD_METERS)
            .sum()
    }

    pub fn snapshot(&self) -> RouteSnapshot {
        RouteSnapshot {
            waypoints: self.waypoints.clone(),
            elevations: self.elevations.clone(),
            ids: self.ids.clone(),
            selected_index: self.selected,
        }
    }

    /// Replace the whole route with a copy of `snapshot`.
    ///
    /// `in_flight` reports ids whose elevation is still being fetched; those
    /// and any unresolved entries come back marked as loading.
    pub fn restore(&mut self, snapshot: &RouteSnapshot, in_flight: impl Fn(WaypointId) -> bool) {
        self.waypoints = snapshot.waypoints.clone();
        self.elevations = snapshot.elevations.clone();
        self.ids = snapshot.ids.clone();
        self.loading = self
            .ids
            .iter()
            .zip(&self.elevations)
            .map(|(&id, elev)| elev.is_none() || in_flight(id))
            .collect();
        self.selected = snapshot.selected_index.filter(|&i| i < self.waypoints.len());
        // Ids are never reused, even across undo.
        let max_id = self.ids.iter().map(|id| id.0 + 1).max().unwrap_or(0);
        self.next_id = self.next_id.max(max_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_with(points: &[(f64, f64)]) -> RouteModel {
        let mut m = RouteModel::new();
        for &(lat, lng) in points {
            m.append(Waypoint::new(lat, lng));
        }
        m
    }

    fn assert_parallel(m: &RouteModel) {
        assert_eq!(m.waypoints().len(), m.elevations().len());
        assert_eq!(m.waypoints().len(), m.loading_flags().len());
        assert_eq!(m.waypoints().len(), m.ids().len());
    }

    #[test]
    fn test_select_last() {
        let mut m = RouteModel::new();
        m.select_last();
        assert_eq!(m.selected(), None);
        m.append(Waypoint::new(1.0, 1.0));
        m.append(Waypoint::new(2.0, 2.0));
        m.select_last();
        assert_eq!(m.selected(), Some(1));
    }

    #[test]
    fn test_append_returns_index_and_placeholder() {
        let mut m = RouteModel::new();
        assert_eq!(m.append(Waypoint::new(1.0, 1.0)), 0);
        assert_eq!(m.append(Waypoint::new(2.0, 2.0)), 1);
        assert_eq!(m.elevations(), &[None, None]);
        assert!(m.has_pending_elevation());
        assert_eq!(m.pending_count(), 2);
        assert_parallel(&m);
    }

    #[test]
    fn test_insert_at_shifts_entries() {
        let mut m = model_with(&[(0.0, 0.0), (2.0, 2.0)]);
        m.resolve_elevation(1, 20.0);
        let tail_id = m.id_at(1).unwrap();
        m.insert_at(1, Waypoint::new(1.0, 1.0)).unwrap();
        assert_eq!(m.waypoint(1), Some(&Waypoint::new(1.0, 1.0)));
        assert_eq!(m.elevations()[2], Some(20.0));
        assert_eq!(m.index_of(tail_id), Some(2));
        assert_parallel(&m);

        m.insert_at(3, Waypoint::new(3.0, 3.0)).unwrap();
        assert_eq!(m.len(), 4);
    }

    #[test]
    fn test_insert_at_out_of_range() {
        let mut m = model_with(&[(0.0, 0.0)]);
        let err = m.insert_at(2, Waypoint::new(1.0, 1.0)).unwrap_err();
        assert!(matches!(err, TrackError::IndexOutOfRange { index: 2, len: 1 }));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_insert_before_selection_keeps_selected_waypoint() {
        let mut m = model_with(&[(0.0, 0.0), (1.0, 1.0)]);
        m.select(Some(1)).unwrap();
        m.insert_at(0, Waypoint::new(5.0, 5.0)).unwrap();
        assert_eq!(m.selected(), Some(2));
    }

    #[test]
    fn test_move_to_keeps_elevation() {
        let mut m = model_with(&[(0.0, 0.0)]);
        m.resolve_elevation(0, 42.0);
        m.move_to(0, Waypoint::new(1.0, 1.0)).unwrap();
        assert_eq!(m.waypoint(0), Some(&Waypoint::new(1.0, 1.0)));
        assert_eq!(m.elevations()[0], Some(42.0));
        assert!(m.move_to(1, Waypoint::new(0.0, 0.0)).is_err());
    }

    #[test]
    fn test_clear_resets_selection() {
        let mut m = model_with(&[(0.0, 0.0), (1.0, 1.0)]);
        m.select(Some(1)).unwrap();
        m.clear();
        assert!(m.is_empty());
        assert_eq!(m.selected(), None);
        assert_parallel(&m);
    }

    #[test]
    fn test_resolve_after_clear_is_noop() {
        let mut m = model_with(&[(0.0, 0.0)]);
        let id = m.id_at(0).unwrap();
        m.clear();
        m.resolve_elevation(0, 10.0);
        assert_eq!(m.resolve_elevation_by_id(id, 10.0), None);
        assert!(m.is_empty());
    }

    #[test]
    fn test_distance_zero_for_short_routes() {
        assert_eq!(RouteModel::new().total_distance_km(), 0.0);
        assert_eq!(model_with(&[(1.0, 1.0)]).total_distance_km(), 0.0);
    }

    #[test]
    fn test_distance_additivity() {
        let pts = [(48.85, 2.35), (48.86, 2.36), (48.87, 2.34), (48.88, 2.37)];
        let whole = model_with(&pts).total_distance_km();
        for split in 1..pts.len() - 1 {
            let left = model_with(&pts[..=split]).total_distance_km();
            let right = model_with(&pts[split..]).total_distance_km();
            assert!((whole - (left + right)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_elevation_gain_threshold() {
        let mut m = model_with(&[(0.0, 0.0), (0.0, 0.0), (0.0, 0.0)]);
        for (i, e) in [100.0, 105.0, 110.0].into_iter().enumerate() {
            m.resolve_elevation(i, e);
        }
        assert_eq!(m.elevation_gain_meters(), 10.0);

        let mut m = model_with(&[(0.0, 0.0), (0.0, 0.0), (0.0, 0.0)]);
        for (i, e) in [100.0, 102.0, 104.0].into_iter().enumerate() {
            m.resolve_elevation(i, e);
        }
        assert_eq!(m.elevation_gain_meters(), 0.0);

        // Exactly 3 m is excluded.
        let mut m = model_with(&[(0.0, 0.0), (0.0, 0.0)]);
        m.resolve_elevation(0, 100.0);
        m.resolve_elevation(1, 103.0);
        assert_eq!(m.elevation_gain_meters(), 0.0);
    }

    #[test]
    fn test_elevation_gain_bridges_pending_gaps() {
        let mut m = model_with(&[(0.0, 0.0), (0.0, 0.0), (0.0, 0.0)]);
        m.resolve_elevation(0, 100.0);
        m.resolve_elevation(2, 104.0);
        // 100 -> (pending) -> 104 compares across the gap.
        assert_eq!(m.elevation_gain_meters(), 4.0);
    }

    #[test]
    fn test_elevation_gain_ignores_descents() {
        let mut m = model_with(&[(0.0, 0.0), (0.0, 0.0), (0.0, 0.0)]);
        for (i, e) in [100.0, 80.0, 90.0].into_iter().enumerate() {
            m.resolve_elevation(i, e);
        }
        assert_eq!(m.elevation_gain_meters(), 10.0);
    }

    #[test]
    fn test_snapshot_restore_is_deep() {
        let mut m = model_with(&[(0.0, 0.0), (1.0, 1.0)]);
        m.resolve_elevation(0, 5.0);
        m.resolve_elevation(1, 6.0);
        let snap = m.snapshot();

        m.move_to(0, Waypoint::new(9.0, 9.0)).unwrap();
        m.append(Waypoint::new(2.0, 2.0));
        assert_eq!(snap.waypoints[0], Waypoint::new(0.0, 0.0));

        m.restore(&snap, |_| false);
        assert_eq!(m.snapshot(), snap);
        assert!(!m.has_pending_elevation());

        // New ids never collide with restored ones.
        let idx = m.append(Waypoint::new(3.0, 3.0));
        let new_id = m.id_at(idx).unwrap();
        assert!(!snap.ids.contains(&new_id));
    }

    #[test]
    fn test_restore_marks_unresolved_as_loading() {
        let mut m = model_with(&[(0.0, 0.0), (1.0, 1.0)]);
        m.resolve_elevation(0, 5.0);
        let snap = m.snapshot();
        m.clear();
        m.restore(&snap, |_| false);
        assert_eq!(m.loading_flags(), &[false, true]);
    }
}

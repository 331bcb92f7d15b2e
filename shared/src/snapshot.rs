//! Full-state snapshots, the bounded vault that stores them, and linear
//! interpolation between buffered snapshots.

use crate::geometry::Vec2;
use crate::{INTERPOLATION_BUFFER_MS, SNAPSHOT_VAULT_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// One entity inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub id: u32,
    pub zone_id: String,
    pub x: f32,
    pub y: f32,
}

impl EntityState {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Immutable capture of every active entity at one server time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: u64,
    /// Server wall-clock time in milliseconds.
    pub timestamp: u64,
    pub state: Vec<EntityState>,
}

impl Snapshot {
    pub fn new(id: u64, timestamp: u64, state: Vec<EntityState>) -> Self {
        Self {
            id,
            timestamp,
            state,
        }
    }

    pub fn get(&self, entity_id: u32) -> Option<&EntityState> {
        self.state.iter().find(|e| e.id == entity_id)
    }
}

/// Time-ordered ring of snapshots; the oldest entry is evicted first.
#[derive(Debug, Clone)]
pub struct SnapshotVault {
    snapshots: VecDeque<Snapshot>,
    capacity: usize,
}

impl SnapshotVault {
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Inserts a snapshot keeping timestamp order.
    ///
    /// Late arrivals are slotted into place instead of appended, so
    /// out-of-order delivery never corrupts lookups. A snapshot older than
    /// everything in a full vault is dropped.
    pub fn add(&mut self, snapshot: Snapshot) {
        if self.snapshots.len() >= self.capacity
            && self
                .snapshots
                .front()
                .is_some_and(|oldest| snapshot.timestamp < oldest.timestamp)
        {
            return;
        }

        let index = self
            .snapshots
            .partition_point(|s| s.timestamp <= snapshot.timestamp);
        self.snapshots.insert(index, snapshot);

        while self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter()
    }

    /// Snapshot whose timestamp is nearest `time`; ties go to the older one.
    pub fn get_closest(&self, time: u64) -> Option<&Snapshot> {
        self.snapshots
            .iter()
            .min_by_key(|s| s.timestamp.abs_diff(time))
    }

    /// The newest snapshot at or before `time` and the oldest one after it.
    pub fn surrounding(&self, time: u64) -> (Option<&Snapshot>, Option<&Snapshot>) {
        let index = self.snapshots.partition_point(|s| s.timestamp <= time);
        let older = index.checked_sub(1).and_then(|i| self.snapshots.get(i));
        let newer = self.snapshots.get(index);
        (older, newer)
    }

    /// Interpolated state of every entity present on both sides of `time`.
    ///
    /// Entities seen in fewer than two snapshots get no value; callers keep
    /// whatever they displayed last.
    pub fn interpolate(&self, time: u64) -> HashMap<u32, EntityState> {
        match self.surrounding(time) {
            (Some(older), Some(newer)) => interpolate_between(older, newer, time),
            _ => HashMap::new(),
        }
    }
}

impl Default for SnapshotVault {
    fn default() -> Self {
        Self::new(SNAPSHOT_VAULT_SIZE)
    }
}

/// Linear interpolation between two snapshots at `time`.
///
/// An entity that changed zone between the two snapshots is not blended;
/// it takes the newer position.
pub fn interpolate_between(older: &Snapshot, newer: &Snapshot, time: u64) -> HashMap<u32, EntityState> {
    let span = newer.timestamp.saturating_sub(older.timestamp);
    let alpha = if span == 0 {
        1.0
    } else {
        (time.saturating_sub(older.timestamp) as f32 / span as f32).clamp(0.0, 1.0)
    };

    let mut result = HashMap::with_capacity(newer.state.len());
    for to in &newer.state {
        let Some(from) = older.get(to.id) else {
            continue;
        };

        let position = if from.zone_id == to.zone_id {
            from.position().lerp(&to.position(), alpha)
        } else {
            to.position()
        };

        result.insert(
            to.id,
            EntityState {
                id: to.id,
                zone_id: to.zone_id.clone(),
                x: position.x,
                y: position.y,
            },
        );
    }
    result
}

/// Client-side interpolation driver: a vault plus the render delay derived
/// from the current latency estimate.
#[derive(Debug, Clone)]
pub struct SnapshotInterpolation {
    pub vault: SnapshotVault,
    buffer_ms: u64,
    latency_ms: u64,
}

impl SnapshotInterpolation {
    pub fn new(buffer_ms: u64) -> Self {
        Self {
            vault: SnapshotVault::default(),
            buffer_ms,
            latency_ms: 0,
        }
    }

    pub fn set_latency(&mut self, latency_ms: u64) {
        self.latency_ms = latency_ms;
    }

    pub fn latency(&self) -> u64 {
        self.latency_ms
    }

    pub fn render_delay(&self) -> u64 {
        self.buffer_ms + self.latency_ms
    }

    pub fn render_time(&self, now: u64) -> u64 {
        now.saturating_sub(self.render_delay())
    }

    pub fn add_snapshot(&mut self, snapshot: Snapshot) {
        self.vault.add(snapshot);
    }

    pub fn interpolate(&self, now: u64) -> HashMap<u32, EntityState> {
        self.vault.interpolate(self.render_time(now))
    }
}

impl Default for SnapshotInterpolation {
    fn default() -> Self {
        Self::new(INTERPOLATION_BUFFER_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn entity(id: u32, x: f32, y: f32) -> EntityState {
        EntityState {
            id,
            zone_id: "N1".to_string(),
            x,
            y,
        }
    }

    fn snap(id: u64, timestamp: u64, state: Vec<EntityState>) -> Snapshot {
        Snapshot::new(id, timestamp, state)
    }

    #[test]
    fn test_vault_evicts_oldest() {
        let mut vault = SnapshotVault::new(3);
        for t in 0..5 {
            vault.add(snap(t, t * 100, vec![]));
        }
        assert_eq!(vault.len(), 3);
        let times: Vec<u64> = vault.iter().map(|s| s.timestamp).collect();
        assert_eq!(times, vec![200, 300, 400]);
    }

    #[test]
    fn test_vault_orders_late_arrivals() {
        let mut vault = SnapshotVault::new(10);
        vault.add(snap(1, 100, vec![]));
        vault.add(snap(3, 300, vec![]));
        vault.add(snap(2, 200, vec![]));
        let ids: Vec<u64> = vault.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(vault.latest().map(|s| s.id), Some(3));
    }

    #[test]
    fn test_vault_drops_stale_when_full() {
        let mut vault = SnapshotVault::new(2);
        vault.add(snap(2, 200, vec![]));
        vault.add(snap(3, 300, vec![]));
        vault.add(snap(1, 100, vec![]));
        let ids: Vec<u64> = vault.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_get_closest() {
        let mut vault = SnapshotVault::new(10);
        vault.add(snap(1, 100, vec![]));
        vault.add(snap(2, 200, vec![]));
        vault.add(snap(3, 300, vec![]));

        assert_eq!(vault.get_closest(0).map(|s| s.id), Some(1));
        assert_eq!(vault.get_closest(240).map(|s| s.id), Some(2));
        assert_eq!(vault.get_closest(260).map(|s| s.id), Some(3));
        assert_eq!(vault.get_closest(10_000).map(|s| s.id), Some(3));
        assert!(SnapshotVault::new(4).get_closest(5).is_none());
    }

    #[test]
    fn test_interpolation_strictly_between() {
        let mut vault = SnapshotVault::new(10);
        vault.add(snap(1, 1000, vec![entity(0, 0.0, 100.0)]));
        vault.add(snap(2, 1100, vec![entity(0, 50.0, 100.0)]));
        vault.add(snap(3, 1200, vec![entity(0, 90.0, 100.0)]));

        for tau in [1001, 1025, 1050, 1099] {
            let result = vault.interpolate(tau);
            let x = result[&0].x;
            assert!(x > 0.0 && x < 50.0, "x={} at {}", x, tau);
        }
        assert_approx_eq!(vault.interpolate(1050)[&0].x, 25.0);
        assert_approx_eq!(vault.interpolate(1150)[&0].x, 70.0);
    }

    #[test]
    fn test_interpolation_needs_two_snapshots() {
        let mut vault = SnapshotVault::new(10);
        vault.add(snap(1, 1000, vec![entity(0, 0.0, 0.0)]));
        assert!(vault.interpolate(1000).is_empty());
        assert!(vault.interpolate(900).is_empty());

        vault.add(snap(2, 1100, vec![entity(0, 10.0, 0.0), entity(1, 5.0, 5.0)]));
        let result = vault.interpolate(1050);
        assert!(result.contains_key(&0));
        // Entity 1 only appears in the newer snapshot.
        assert!(!result.contains_key(&1));
    }

    #[test]
    fn test_interpolation_does_not_blend_across_zones() {
        let mut vault = SnapshotVault::new(10);
        vault.add(snap(1, 0, vec![entity(0, 600.0, 40.0)]));
        let mut moved = entity(0, 320.0, 900.0);
        moved.zone_id = "N2".to_string();
        vault.add(snap(2, 100, vec![moved]));

        let result = vault.interpolate(50);
        assert_eq!(result[&0].zone_id, "N2");
        assert_approx_eq!(result[&0].x, 320.0);
        assert_approx_eq!(result[&0].y, 900.0);
    }

    #[test]
    fn test_render_delay_tracks_latency() {
        let mut si = SnapshotInterpolation::new(100);
        assert_eq!(si.render_delay(), 100);
        si.set_latency(40);
        assert_eq!(si.render_delay(), 140);
        assert_eq!(si.render_time(1000), 860);
        assert_eq!(si.render_time(50), 0);
    }
}

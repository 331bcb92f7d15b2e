//! Local player prediction and reconciliation.
//!
//! The local player moves immediately using the same movement rule and the
//! same integrator as the server, so walls of the current zone stop the
//! prediction exactly where they stop the authoritative body. Every frame the predicted position is stored in a history vault;
//! when an authoritative snapshot is available, the history entry closest to
//! its timestamp is compared against it and a fraction of the difference is
//! removed from the current position.

use log::debug;
use shared::movement::intent_velocity;
use shared::physics::{ArcadeIntegrator, Body, Integrator};
use shared::{
    Direction, EntityState, Rect, Snapshot, SnapshotVault, Vec2, CORRECTION_IDLE,
    CORRECTION_MOVING, PLAYER_HEIGHT, PLAYER_WIDTH, SNAPSHOT_VAULT_SIZE,
};

#[derive(Debug, Clone)]
pub struct Predictor {
    pub id: u32,
    pub zone_id: String,
    pub position: Vec2,
    pub intent: Direction,
    history: SnapshotVault,
    frame: u64,
    integrator: ArcadeIntegrator,
    /// Walls of `zone_id`.
    walls: Vec<Rect>,
}

impl Predictor {
    pub fn new(id: u32, zone_id: &str, position: Vec2) -> Self {
        Self {
            id,
            zone_id: zone_id.to_string(),
            position,
            intent: Direction::None,
            history: SnapshotVault::new(SNAPSHOT_VAULT_SIZE),
            frame: 0,
            integrator: ArcadeIntegrator::default(),
            walls: Vec::new(),
        }
    }

    pub fn with_walls(mut self, walls: Vec<Rect>) -> Self {
        self.walls = walls;
        self
    }

    pub fn set_intent(&mut self, direction: Direction) {
        self.intent = direction;
    }

    pub fn is_moving(&self) -> bool {
        self.intent.is_moving()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Moves optimistically and records the result under `now`.
    pub fn advance(&mut self, dt: f32, now: u64) {
        let mut body = Body::new(self.position, PLAYER_WIDTH, PLAYER_HEIGHT);
        body.collide_world_bounds = true;
        self.integrator
            .apply_velocity(&mut body, intent_velocity(self.intent), dt, &self.walls);
        self.position = body.position;

        let entry = EntityState {
            id: self.id,
            zone_id: self.zone_id.clone(),
            x: self.position.x,
            y: self.position.y,
        };
        self.history.add(Snapshot::new(self.frame, now, vec![entry]));
        self.frame += 1;
    }

    /// Blends toward the latest authoritative position in `server`.
    ///
    /// Returns the measured offset, or `None` when there is nothing to
    /// compare against yet.
    pub fn reconcile(&mut self, server: &SnapshotVault) -> Option<Vec2> {
        let snapshot = server.latest()?;
        let authoritative = snapshot.get(self.id)?;
        if authoritative.zone_id != self.zone_id {
            return None;
        }
        let local = self.history.get_closest(snapshot.timestamp)?.get(self.id)?;

        let offset = local.position().sub(&authoritative.position());
        let factor = if self.is_moving() {
            CORRECTION_MOVING
        } else {
            CORRECTION_IDLE
        };
        self.position = self.position.sub(&offset.scale(1.0 / factor));
        Some(offset)
    }

    /// Jumps to an authoritative position, e.g. after a zone change. The
    /// history no longer applies and is dropped; `walls` replace the old
    /// zone's.
    pub fn snap_to(&mut self, position: Vec2, zone_id: &str, walls: Vec<Rect>) {
        debug!(
            "Player {} snapped to ({:.1}, {:.1}) in {}",
            self.id, position.x, position.y, zone_id
        );
        self.position = position;
        self.zone_id = zone_id.to_string();
        self.walls = walls;
        self.history.clear();
    }
}

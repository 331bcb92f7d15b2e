//! Authoritative per-connection actor.

use crate::projectiles::ProjectilePool;
use log::{debug, info};
use shared::codec::round_coord;
use shared::movement::intent_velocity;
use shared::physics::{Body, Integrator};
use shared::{
    Direction, Rect, UpdateRecord, Vec2, MOVE_THRESHOLD, NO_PROJECTILE, PLAYER_HEIGHT,
    PLAYER_WIDTH, PROJECTILE_CAPACITY,
};

#[derive(Debug, Clone)]
pub struct Player {
    pub id: u32,
    pub body: Body,
    pub intent: Direction,
    /// Last non-`None` intent; projectiles are fired this way.
    pub facing: Direction,
    pub zone_id: String,
    pub previous_zone_id: String,
    pub previous_position: Vec2,
    pub alive: bool,
    pub previous_alive: bool,
    pub damaged: bool,
    pub last_fired_projectile: i32,
    pub last_hit_projectile: i32,
    /// True once the resting state has been broadcast.
    pub idle: bool,
    pub projectiles: ProjectilePool,
}

impl Player {
    pub fn new(id: u32, zone_id: &str, spawn: Vec2) -> Self {
        let mut body = Body::new(spawn, PLAYER_WIDTH, PLAYER_HEIGHT);
        body.collide_world_bounds = true;

        Self {
            id,
            body,
            intent: Direction::None,
            facing: Direction::Down,
            zone_id: zone_id.to_string(),
            // A fresh player has no previous zone, so its first record
            // always goes out.
            previous_zone_id: String::new(),
            previous_position: spawn,
            alive: true,
            previous_alive: false,
            damaged: false,
            last_fired_projectile: NO_PROJECTILE,
            last_hit_projectile: NO_PROJECTILE,
            idle: false,
            projectiles: ProjectilePool::new(id, PROJECTILE_CAPACITY),
        }
    }

    pub fn position(&self) -> Vec2 {
        self.body.position
    }

    pub fn bounds(&self) -> Rect {
        self.body.bounds()
    }

    /// Stores the latest movement intent. Setting the same intent again is a
    /// no-op.
    pub fn set_intent(&mut self, direction: Direction) {
        if self.intent == direction {
            return;
        }
        self.intent = direction;
        if direction.is_moving() {
            self.facing = direction;
        }
    }

    pub fn velocity(&self) -> Vec2 {
        if self.alive {
            intent_velocity(self.intent)
        } else {
            Vec2::ZERO
        }
    }

    /// Integrates position once from the current intent.
    pub fn tick<I: Integrator>(&mut self, dt: f32, integrator: &I, blockers: &[Rect]) {
        if !self.alive {
            return;
        }
        let velocity = self.velocity();
        integrator.apply_velocity(&mut self.body, velocity, dt, blockers);
    }

    /// Marks the player dead. Id, zone and projectile pool are kept so the
    /// slot can be revived later.
    pub fn kill(&mut self) {
        self.alive = false;
        self.intent = Direction::None;
        self.body.enabled = false;
        info!("Player {} killed in zone {}", self.id, self.zone_id);
    }

    /// Brings a dead player back under `id` at `spawn` in `zone_id`.
    pub fn revive(&mut self, id: u32, zone_id: &str, spawn: Vec2) {
        self.id = id;
        self.projectiles.set_owner(id);
        self.alive = true;
        self.body.enabled = true;
        self.body.reset(spawn);
        self.previous_position = spawn;
        self.intent = Direction::None;
        self.facing = Direction::Down;
        self.damaged = false;
        self.last_fired_projectile = NO_PROJECTILE;
        self.last_hit_projectile = NO_PROJECTILE;
        self.idle = false;
        if self.zone_id != zone_id {
            self.zone_id = zone_id.to_string();
        }
        info!("Player {} revived in zone {}", id, self.zone_id);
    }

    /// Fires from the pool in the facing direction and records the outcome.
    pub fn fire(&mut self, now_ms: u64) -> Option<u32> {
        if !self.alive {
            return None;
        }
        let fired = self
            .projectiles
            .fire(self.facing, self.position(), &self.zone_id, now_ms);
        self.last_fired_projectile = fired.map_or(NO_PROJECTILE, |id| id as i32);
        fired
    }

    /// Records that one of this player's projectiles hit something.
    /// Returns false if that projectile was no longer in flight.
    pub fn projectile_collided(&mut self, projectile_id: u32) -> bool {
        if self.projectiles.collide(projectile_id) {
            self.last_hit_projectile = projectile_id as i32;
            true
        } else {
            debug!(
                "Player {}: collision for inactive projectile {}",
                self.id, projectile_id
            );
            false
        }
    }

    pub fn zone_changed(&self) -> bool {
        self.zone_id != self.previous_zone_id
    }

    /// Whether any broadcast field differs from the previous tick.
    pub fn has_changed(&self) -> bool {
        let position = self.position();
        (position.x - self.previous_position.x).abs() > MOVE_THRESHOLD
            || (position.y - self.previous_position.y).abs() > MOVE_THRESHOLD
            || self.alive != self.previous_alive
            || self.zone_changed()
            || self.damaged
            || self.last_fired_projectile != NO_PROJECTILE
            || self.last_hit_projectile != NO_PROJECTILE
    }

    pub fn update_record(&self) -> UpdateRecord {
        let position = self.position();
        UpdateRecord {
            id: self.id,
            dead: !self.alive,
            zone_id: self.zone_id.clone(),
            damaged: self.damaged,
            fired_projectile: self.last_fired_projectile,
            hit_projectile: self.last_hit_projectile,
            x: round_coord(position.x),
            y: round_coord(position.y),
        }
    }

    /// Produces this tick's delta record, if any.
    ///
    /// Changed players are sent while alive or on the tick they die. A player
    /// that stopped changing is sent once more to mark it idle. Transient
    /// flags are cleared only once they have gone out in a record.
    pub fn take_update(&mut self) -> Option<UpdateRecord> {
        let emit = if self.has_changed() {
            if self.alive != self.previous_alive || self.alive {
                self.idle = false;
                true
            } else {
                false
            }
        } else if !self.idle {
            self.idle = true;
            true
        } else {
            false
        };

        if !emit {
            return None;
        }

        let record = self.update_record();
        self.damaged = false;
        self.last_fired_projectile = NO_PROJECTILE;
        self.last_hit_projectile = NO_PROJECTILE;
        Some(record)
    }

    /// Remembers this tick's state for next tick's change detection.
    pub fn post_update(&mut self) {
        self.previous_position = self.position();
        self.previous_alive = self.alive;
        self.previous_zone_id = self.zone_id.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::physics::ArcadeIntegrator;
    use assert_approx_eq::assert_approx_eq;
    use shared::PLAYER_SPEED;

    const DT: f32 = 1.0 / 60.0;

    fn settled(id: u32) -> Player {
        let mut player = Player::new(id, "N1", Vec2::new(200.0, 200.0));
        player.take_update();
        player.post_update();
        player.take_update();
        player.post_update();
        player
    }

    #[test]
    fn test_new_player_emits_first_record() {
        let mut player = Player::new(0, "N1", Vec2::new(200.0, 200.0));
        let record = player.take_update().unwrap();
        assert_eq!(record.id, 0);
        assert!(!record.dead);
        assert_eq!(record.zone_id, "N1");
        assert_eq!((record.x, record.y), (200, 200));
    }

    #[test]
    fn test_tick_moves_at_fixed_speed() {
        let integrator = ArcadeIntegrator::default();
        let mut player = settled(0);
        player.set_intent(Direction::Right);
        for _ in 0..60 {
            player.tick(DT, &integrator, &[]);
        }
        assert_approx_eq!(player.position().x, 200.0 + PLAYER_SPEED, 0.01);

        player.set_intent(Direction::None);
        let before = player.position();
        player.tick(DT, &integrator, &[]);
        assert_eq!(player.position(), before);
    }

    #[test]
    fn test_set_intent_idempotent_and_facing() {
        let mut player = settled(0);
        player.set_intent(Direction::Left);
        player.set_intent(Direction::Left);
        assert_eq!(player.intent, Direction::Left);
        player.set_intent(Direction::None);
        assert_eq!(player.facing, Direction::Left);
    }

    #[test]
    fn test_idle_player_sends_one_final_record() {
        let integrator = ArcadeIntegrator::default();
        let mut player = settled(0);
        assert!(player.idle);

        player.set_intent(Direction::Down);
        player.tick(DT, &integrator, &[]);
        assert!(player.take_update().is_some());
        player.post_update();
        assert!(!player.idle);

        player.set_intent(Direction::None);
        player.tick(DT, &integrator, &[]);
        assert!(player.take_update().is_some());
        player.post_update();
        assert!(player.idle);

        player.tick(DT, &integrator, &[]);
        assert!(player.take_update().is_none());
    }

    #[test]
    fn test_kill_emits_dead_record_once() {
        let mut player = settled(3);
        player.kill();
        let record = player.take_update().unwrap();
        assert!(record.dead);
        player.post_update();

        // Dead and unchanged after that: the idle record, then silence.
        let _ = player.take_update();
        player.post_update();
        assert!(player.take_update().is_none());
    }

    #[test]
    fn test_dead_player_does_not_move_or_fire() {
        let integrator = ArcadeIntegrator::default();
        let mut player = settled(0);
        player.set_intent(Direction::Up);
        player.kill();
        let before = player.position();
        player.tick(DT, &integrator, &[]);
        assert_eq!(player.position(), before);
        assert_eq!(player.fire(10_000), None);
    }

    #[test]
    fn test_fire_records_projectile_and_clears_after_broadcast() {
        let mut player = settled(0);
        assert_eq!(player.fire(1_000), Some(0));
        assert_eq!(player.last_fired_projectile, 0);

        let record = player.take_update().unwrap();
        assert_eq!(record.fired_projectile, 0);
        assert_eq!(player.last_fired_projectile, NO_PROJECTILE);
        player.post_update();

        // Cooldown still running.
        assert_eq!(player.fire(1_100), None);
        assert_eq!(player.last_fired_projectile, NO_PROJECTILE);
    }

    #[test]
    fn test_projectile_collided_sets_hit() {
        let mut player = settled(0);
        player.fire(0);
        assert!(player.projectile_collided(0));
        assert!(!player.projectile_collided(0));
        assert_eq!(player.last_hit_projectile, 0);
        assert_eq!(player.projectiles.active_count(), 0);
    }

    #[test]
    fn test_revive_clears_flags_and_reuses_pool() {
        let mut player = settled(0);
        player.fire(0);
        player.damaged = true;
        player.kill();

        player.revive(5, "N2", Vec2::new(64.0, 64.0));
        assert!(player.alive);
        assert_eq!(player.id, 5);
        assert_eq!(player.zone_id, "N2");
        assert!(!player.damaged);
        assert_eq!(player.last_fired_projectile, NO_PROJECTILE);
        assert_eq!(player.projectiles.owner_id(), 5);
        assert_eq!(player.position(), Vec2::new(64.0, 64.0));
    }
}

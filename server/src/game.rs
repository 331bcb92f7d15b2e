use crate::player::Player;
use crate::zone::{CollisionEvent, ZoneManager};
use log::{debug, info, warn};
use shared::codec::encode_all;
use shared::physics::ArcadeIntegrator;
use shared::{Direction, EntityState, Snapshot, UpdateRecord};
use shared::world::WorldLayout;
use std::collections::{BTreeMap, BTreeSet};

/// Result of one simulation tick.
#[derive(Debug, Clone, Default)]
pub struct TickOutput {
    pub updates: Vec<UpdateRecord>,
    /// Set on the ticks that carry a full snapshot.
    pub snapshot: Option<Snapshot>,
}

#[derive(Debug, Clone)]
pub struct GameState {
    pub tick: u32,
    pub players: BTreeMap<u32, Player>,
    pub zones: ZoneManager,
    integrator: ArcadeIntegrator,
    next_player_id: u32,
    /// Ids handed out by `assign_player_id` and still owned by a session.
    claimed: BTreeSet<u32>,
    snapshot_every: u32,
    next_snapshot_id: u64,
}

impl GameState {
    pub fn new() -> Self {
        Self::with_layout(WorldLayout::builtin())
    }

    pub fn with_layout(layout: WorldLayout) -> Self {
        Self {
            tick: 0,
            players: BTreeMap::new(),
            zones: ZoneManager::new(layout),
            integrator: ArcadeIntegrator::default(),
            next_player_id: 0,
            claimed: BTreeSet::new(),
            snapshot_every: shared::SNAPSHOT_EVERY_N_TICKS,
            next_snapshot_id: 0,
        }
    }

    pub fn with_snapshot_every(mut self, ticks: u32) -> Self {
        self.snapshot_every = ticks.max(1);
        self
    }

    /// Picks the id for a new connection: the lowest dead, unclaimed player
    /// or a fresh one. The dead player stays dead until `add_player`.
    pub fn assign_player_id(&mut self) -> u32 {
        let reusable = self
            .players
            .values()
            .find(|p| !p.alive && !self.claimed.contains(&p.id))
            .map(|p| p.id);

        let id = match reusable {
            Some(id) => id,
            None => {
                let id = self.next_player_id;
                self.next_player_id += 1;
                id
            }
        };
        self.claimed.insert(id);
        debug!("Assigned player id {}", id);
        id
    }

    pub fn is_claimed(&self, player_id: u32) -> bool {
        self.claimed.contains(&player_id)
    }

    /// Spawns a new player or revives a dead one under `player_id`. Returns
    /// false if the player is already alive or the id was never assigned.
    pub fn add_player(&mut self, player_id: u32) -> bool {
        if !self.claimed.contains(&player_id) {
            warn!("Add for unassigned player id {}", player_id);
            return false;
        }

        let zone_id = self.zones.default_zone().to_string();
        let Some(spawn) = self.zones.spawn_point(&zone_id) else {
            warn!("Default zone {} has no spawn point", zone_id);
            return false;
        };

        match self.players.get_mut(&player_id) {
            Some(player) if player.alive => {
                debug!("Player {} is already alive", player_id);
                return false;
            }
            Some(player) => player.revive(player_id, &zone_id, spawn),
            None => {
                self.players
                    .insert(player_id, Player::new(player_id, &zone_id, spawn));
                info!(
                    "Added player {} in zone {} at ({}, {})",
                    player_id, zone_id, spawn.x, spawn.y
                );
            }
        }

        self.zones.enter(player_id, &zone_id);
        true
    }

    /// Kills the player, drops its collision registrations and releases the
    /// id claim. Returns true if a live player was removed.
    pub fn remove_player(&mut self, player_id: u32) -> bool {
        self.claimed.remove(&player_id);

        let Some(player) = self.players.get_mut(&player_id) else {
            return false;
        };
        if !player.alive {
            return false;
        }

        player.kill();
        let zone_id = player.zone_id.clone();
        self.zones.leave(player_id, &zone_id);
        info!("Removed player {}", player_id);
        true
    }

    pub fn set_intent(&mut self, player_id: u32, direction: Direction) {
        match self.players.get_mut(&player_id) {
            Some(player) => player.set_intent(direction),
            None => warn!("Intent for unknown player {}", player_id),
        }
    }

    pub fn fire(&mut self, player_id: u32, now_ms: u64) -> Option<u32> {
        match self.players.get_mut(&player_id) {
            Some(player) => player.fire(now_ms),
            None => {
                warn!("Fire for unknown player {}", player_id);
                None
            }
        }
    }

    /// Advances players and projectiles, then resolves collisions and warps.
    pub fn update_physics(&mut self, dt: f32) {
        for player in self.players.values_mut() {
            let blockers = self.zones.blockers(player.id, &player.zone_id);
            player.tick(dt, &self.integrator, blockers);
        }

        for player in self.players.values_mut() {
            let expired = player.projectiles.advance(dt, &self.integrator);
            if !expired.is_empty() {
                debug!("Player {}: projectiles {:?} expired", player.id, expired);
            }
        }

        self.handle_collisions();
        self.zones.apply_transfers(&mut self.players);
    }

    fn handle_collisions(&mut self) {
        let events = self.zones.detect_collisions(&self.players, &self.integrator);

        for event in events {
            match event {
                CollisionEvent::Warp {
                    player_id,
                    destination,
                } => match self.players.get_mut(&player_id) {
                    Some(player) => {
                        self.zones.resolve_warp(player, &destination);
                    }
                    None => warn!("Warp for unknown player {}", player_id),
                },
                CollisionEvent::ProjectileWall {
                    owner_id,
                    projectile_id,
                } => match self.players.get_mut(&owner_id) {
                    Some(owner) => {
                        if owner.projectile_collided(projectile_id) {
                            debug!(
                                "Player {}: projectile {} hit a wall",
                                owner_id, projectile_id
                            );
                        }
                    }
                    None => warn!("Wall hit for unknown owner {}", owner_id),
                },
                CollisionEvent::ProjectileHit {
                    owner_id,
                    projectile_id,
                    target_id,
                } => {
                    let hit = match self.players.get_mut(&owner_id) {
                        Some(owner) => owner.projectile_collided(projectile_id),
                        None => {
                            warn!("Hit for unknown owner {}", owner_id);
                            false
                        }
                    };
                    if !hit {
                        continue;
                    }
                    match self.players.get_mut(&target_id) {
                        Some(target) => {
                            target.damaged = true;
                            debug!(
                                "Player {} hit player {} with projectile {}",
                                owner_id, target_id, projectile_id
                            );
                        }
                        None => warn!("Hit on unknown player {}", target_id),
                    }
                }
            }
        }
    }

    /// Delta records for this tick. Every player's previous-tick state is
    /// updated afterwards.
    pub fn collect_updates(&mut self) -> Vec<UpdateRecord> {
        let updates = self
            .players
            .values_mut()
            .filter_map(|player| player.take_update())
            .collect();
        for player in self.players.values_mut() {
            player.post_update();
        }
        updates
    }

    pub fn create_snapshot(&mut self, timestamp: u64) -> Snapshot {
        let state = self
            .players
            .values()
            .filter(|p| p.alive)
            .map(|p| {
                let position = p.position();
                EntityState {
                    id: p.id,
                    zone_id: p.zone_id.clone(),
                    x: position.x,
                    y: position.y,
                }
            })
            .collect();
        let snapshot = Snapshot::new(self.next_snapshot_id, timestamp, state);
        self.next_snapshot_id += 1;
        snapshot
    }

    /// Runs one full tick: simulation, delta collection and, every
    /// `snapshot_every` ticks, a snapshot.
    pub fn step(&mut self, dt: f32, now_ms: u64) -> TickOutput {
        self.tick = self.tick.wrapping_add(1);
        self.update_physics(dt);
        let updates = self.collect_updates();
        let snapshot = if self.tick % self.snapshot_every == 0 {
            Some(self.create_snapshot(now_ms))
        } else {
            None
        };
        TickOutput { updates, snapshot }
    }

    /// A record for every player, dead ones included. Transient flags are
    /// left untouched.
    pub fn encoded_state(&self) -> String {
        let records: Vec<UpdateRecord> =
            self.players.values().map(|p| p.update_record()).collect();
        encode_all(&records)
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

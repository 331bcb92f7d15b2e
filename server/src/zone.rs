//! Zone manager.
//!
//! Owns one [`Zone`] per zone id: its player group, walls, warps and the
//! collision registrations of the players currently inside. Registrations
//! are torn down when a player leaves and re-created when it enters, so a
//! player is never checked against a zone it is no longer in.
//!
//! Warp transfers found during a tick are queued and applied by
//! [`ZoneManager::apply_transfers`] once every entity has been processed.

use crate::player::Player;
use log::{debug, info, warn};
use shared::physics::Integrator;
use shared::world::{Warp, WorldError, WorldLayout, ZoneLayout};
use shared::{Rect, Vec2};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneKind {
    Designed,
    /// Cave zones produced by the map generator; ids start with `C`.
    Procedural,
}

impl ZoneKind {
    pub fn of(zone_id: &str) -> Self {
        if zone_id.starts_with('C') {
            ZoneKind::Procedural
        } else {
            ZoneKind::Designed
        }
    }
}

/// A collision pair registered for one player inside a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collider {
    /// Player against walls. Resolved by the integrator, not here.
    PlayerWall(u32),
    PlayerWarp(u32),
    /// Player against every opponent projectile in the zone.
    PlayerProjectiles(u32),
    /// The player's own projectiles against walls.
    ProjectileWall(u32),
}

impl Collider {
    pub fn all_for(player_id: u32) -> [Collider; 4] {
        [
            Collider::PlayerWall(player_id),
            Collider::PlayerWarp(player_id),
            Collider::PlayerProjectiles(player_id),
            Collider::ProjectileWall(player_id),
        ]
    }

    pub fn player_id(&self) -> u32 {
        match *self {
            Collider::PlayerWall(id)
            | Collider::PlayerWarp(id)
            | Collider::PlayerProjectiles(id)
            | Collider::ProjectileWall(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollisionEvent {
    Warp {
        player_id: u32,
        destination: String,
    },
    ProjectileHit {
        owner_id: u32,
        projectile_id: u32,
        target_id: u32,
    },
    ProjectileWall {
        owner_id: u32,
        projectile_id: u32,
    },
}

/// A zone change decided during a tick, applied after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub player_id: u32,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone)]
pub struct Zone {
    pub id: String,
    pub kind: ZoneKind,
    pub players: BTreeSet<u32>,
    pub walls: Vec<Rect>,
    pub warps: Vec<Warp>,
    pub spawn: Vec2,
    colliders: Vec<Collider>,
}

impl Zone {
    fn from_layout(layout: ZoneLayout) -> Self {
        Self {
            kind: ZoneKind::of(&layout.id),
            id: layout.id,
            players: BTreeSet::new(),
            walls: layout.walls,
            warps: layout.warps,
            spawn: layout.spawn,
            colliders: Vec::new(),
        }
    }

    pub fn colliders(&self) -> &[Collider] {
        &self.colliders
    }

    /// Number of collision pairs registered for `player_id`.
    pub fn registrations(&self, player_id: u32) -> usize {
        self.colliders
            .iter()
            .filter(|c| c.player_id() == player_id)
            .count()
    }

    pub fn has_collider(&self, collider: Collider) -> bool {
        self.colliders.contains(&collider)
    }

    fn register(&mut self, player_id: u32) {
        self.unregister(player_id);
        self.colliders.extend(Collider::all_for(player_id));
    }

    fn unregister(&mut self, player_id: u32) -> usize {
        let before = self.colliders.len();
        self.colliders.retain(|c| c.player_id() != player_id);
        before - self.colliders.len()
    }
}

#[derive(Debug, Clone)]
pub struct ZoneManager {
    zones: BTreeMap<String, Zone>,
    default_zone: String,
    pending: Vec<Transfer>,
}

impl ZoneManager {
    pub fn new(layout: WorldLayout) -> Self {
        let zones = layout
            .zones
            .into_iter()
            .map(|zone| (zone.id.clone(), Zone::from_layout(zone)))
            .collect();
        Self {
            zones,
            default_zone: layout.default_zone,
            pending: Vec::new(),
        }
    }

    pub fn default_zone(&self) -> &str {
        &self.default_zone
    }

    pub fn get(&self, zone_id: &str) -> Option<&Zone> {
        self.zones.get(zone_id)
    }

    pub fn contains(&self, zone_id: &str) -> bool {
        self.zones.contains_key(zone_id)
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    pub fn spawn_point(&self, zone_id: &str) -> Option<Vec2> {
        self.zones.get(zone_id).map(|zone| zone.spawn)
    }

    /// Walls that block `player_id` in `zone_id`; empty unless the player has
    /// a wall registration there.
    pub fn blockers(&self, player_id: u32, zone_id: &str) -> &[Rect] {
        match self.zones.get(zone_id) {
            Some(zone) if zone.has_collider(Collider::PlayerWall(player_id)) => &zone.walls,
            _ => &[],
        }
    }

    /// The zone whose player group holds `player_id`.
    pub fn zone_of(&self, player_id: u32) -> Option<&str> {
        self.zones
            .values()
            .find(|zone| zone.players.contains(&player_id))
            .map(|zone| zone.id.as_str())
    }

    /// Adds or replaces a zone, e.g. a freshly generated cave. Players and
    /// registrations already in the zone are kept. Ids that cannot be
    /// encoded and warps into unknown zones are rejected.
    pub fn insert_zone(&mut self, layout: ZoneLayout) -> Result<(), WorldError> {
        layout.validate_id()?;
        if let Some(warp) = layout
            .warps
            .iter()
            .find(|w| w.destination != layout.id && !self.zones.contains_key(&w.destination))
        {
            return Err(WorldError::UnknownDestination {
                zone: layout.id.clone(),
                destination: warp.destination.clone(),
            });
        }

        match self.zones.get_mut(&layout.id) {
            Some(zone) => {
                zone.walls = layout.walls;
                zone.warps = layout.warps;
                zone.spawn = layout.spawn;
            }
            None => {
                info!("Zone {} added ({:?})", layout.id, ZoneKind::of(&layout.id));
                self.zones
                    .insert(layout.id.clone(), Zone::from_layout(layout));
            }
        }
        Ok(())
    }

    /// Puts `player_id` into `zone_id` and registers its collision pairs.
    /// A player still in another zone is taken out of it first.
    pub fn enter(&mut self, player_id: u32, zone_id: &str) -> bool {
        if !self.zones.contains_key(zone_id) {
            warn!("Player {} cannot enter unknown zone {}", player_id, zone_id);
            return false;
        }

        if let Some(current) = self.zone_of(player_id).map(str::to_string) {
            if current != zone_id {
                self.leave(player_id, &current);
            }
        }

        if let Some(zone) = self.zones.get_mut(zone_id) {
            zone.players.insert(player_id);
            zone.register(player_id);
            debug!("Player {} entered zone {}", player_id, zone_id);
        }
        true
    }

    /// Removes `player_id` from the zone's group and drops its registrations.
    pub fn leave(&mut self, player_id: u32, zone_id: &str) -> bool {
        let Some(zone) = self.zones.get_mut(zone_id) else {
            warn!("Player {} cannot leave unknown zone {}", player_id, zone_id);
            return false;
        };
        let was_member = zone.players.remove(&player_id);
        let removed = zone.unregister(player_id);
        debug!(
            "Player {} left zone {} ({} registrations removed)",
            player_id, zone_id, removed
        );
        was_member
    }

    /// Points the player at `destination` and queues the group move.
    ///
    /// Only one warp is taken per approach: once `zone_id` differs from
    /// `previous_zone_id` further warps are ignored until the change has
    /// been broadcast.
    pub fn resolve_warp(&mut self, player: &mut Player, destination: &str) -> bool {
        if !player.alive || player.zone_changed() || player.zone_id == destination {
            return false;
        }
        if !self.zones.contains_key(destination) {
            warn!(
                "Player {} hit a warp to unknown zone {}",
                player.id, destination
            );
            return false;
        }

        let from = std::mem::replace(&mut player.zone_id, destination.to_string());
        self.pending.push(Transfer {
            player_id: player.id,
            from,
            to: destination.to_string(),
        });
        true
    }

    pub fn pending_transfers(&self) -> &[Transfer] {
        &self.pending
    }

    /// Moves every queued player to its destination group and spawn point.
    pub fn apply_transfers(&mut self, players: &mut BTreeMap<u32, Player>) -> Vec<Transfer> {
        let transfers = std::mem::take(&mut self.pending);
        for transfer in &transfers {
            self.leave(transfer.player_id, &transfer.from);
            self.enter(transfer.player_id, &transfer.to);

            match players.get_mut(&transfer.player_id) {
                Some(player) => {
                    if let Some(spawn) = self.spawn_point(&transfer.to) {
                        player.body.reset(spawn);
                    }
                    info!(
                        "Player {} warped {} -> {}",
                        transfer.player_id, transfer.from, transfer.to
                    );
                }
                None => warn!("Transfer for unknown player {}", transfer.player_id),
            }
        }
        transfers
    }

    /// Runs every registered collision pair once.
    pub fn detect_collisions<I: Integrator>(
        &self,
        players: &BTreeMap<u32, Player>,
        integrator: &I,
    ) -> Vec<CollisionEvent> {
        let mut events = Vec::new();

        for zone in self.zones.values() {
            for collider in &zone.colliders {
                match *collider {
                    Collider::PlayerWall(_) => {}
                    Collider::PlayerWarp(player_id) => {
                        let Some(player) = players.get(&player_id) else {
                            warn!("Zone {}: no player {} for warp check", zone.id, player_id);
                            continue;
                        };
                        if !player.alive {
                            continue;
                        }
                        if let Some(warp) = zone
                            .warps
                            .iter()
                            .find(|warp| integrator.on_overlap(&player.body, &warp.rect))
                        {
                            events.push(CollisionEvent::Warp {
                                player_id,
                                destination: warp.destination.clone(),
                            });
                        }
                    }
                    Collider::PlayerProjectiles(target_id) => {
                        let Some(target) = players.get(&target_id) else {
                            warn!("Zone {}: no player {} for hit check", zone.id, target_id);
                            continue;
                        };
                        if !target.alive {
                            continue;
                        }
                        let bounds = target.bounds();
                        for owner in players.values().filter(|p| p.id != target_id) {
                            for projectile in owner
                                .projectiles
                                .active()
                                .filter(|p| p.zone_id == zone.id)
                            {
                                if integrator.on_overlap(&projectile.body, &bounds) {
                                    events.push(CollisionEvent::ProjectileHit {
                                        owner_id: owner.id,
                                        projectile_id: projectile.id,
                                        target_id,
                                    });
                                }
                            }
                        }
                    }
                    Collider::ProjectileWall(owner_id) => {
                        let Some(owner) = players.get(&owner_id) else {
                            warn!("Zone {}: no player {} for wall check", zone.id, owner_id);
                            continue;
                        };
                        for projectile in owner
                            .projectiles
                            .active()
                            .filter(|p| p.zone_id == zone.id)
                        {
                            if zone
                                .walls
                                .iter()
                                .any(|wall| integrator.on_overlap(&projectile.body, wall))
                            {
                                events.push(CollisionEvent::ProjectileWall {
                                    owner_id,
                                    projectile_id: projectile.id,
                                });
                            }
                        }
                    }
                }
            }
        }

        events
    }
}

impl Default for ZoneManager {
    fn default() -> Self {
        Self::new(WorldLayout::builtin())
    }
}

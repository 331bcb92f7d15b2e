use crate::prediction::Predictor;
use log::{debug, info};
use shared::codec::{decode, round_coord, UpdateRecord};
use shared::world::WorldLayout;
use shared::{Direction, Rect, Snapshot, SnapshotInterpolation, Vec2};
use std::collections::BTreeMap;

/// Last known state of one player as this client sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlayer {
    pub id: u32,
    pub zone_id: String,
    pub position: Vec2,
    pub alive: bool,
    pub damaged: bool,
    pub last_fired: Option<u32>,
    pub last_hit: Option<u32>,
    /// Server timestamp of the newest update applied to this mirror.
    pub updated_at: u64,
}

impl RemotePlayer {
    fn from_record(record: &UpdateRecord, timestamp: u64) -> Self {
        Self {
            id: record.id,
            zone_id: record.zone_id.clone(),
            position: Vec2::new(record.x as f32, record.y as f32),
            alive: !record.dead,
            damaged: record.damaged,
            last_fired: record.fired(),
            last_hit: record.hit(),
            updated_at: timestamp,
        }
    }

    fn apply(&mut self, record: &UpdateRecord, timestamp: u64) {
        self.updated_at = timestamp;
        self.zone_id = record.zone_id.clone();
        self.position = Vec2::new(record.x as f32, record.y as f32);
        self.alive = !record.dead;
        self.damaged = record.damaged;
        if record.fired().is_some() {
            self.last_fired = record.fired();
        }
        if record.hit().is_some() {
            self.last_hit = record.hit();
        }
    }
}

/// Client view of the game: mirrors of every player, the snapshot buffer
/// used to interpolate them and the predictor for the local player.
#[derive(Debug, Clone)]
pub struct ClientGameState {
    pub local_id: Option<u32>,
    pub players: BTreeMap<u32, RemotePlayer>,
    pub interpolation: SnapshotInterpolation,
    pub predictor: Option<Predictor>,
    /// Intent carried over to a predictor created later.
    intent: Direction,
    /// Offset measured by the most recent reconciliation.
    pub last_correction: Option<Vec2>,
    /// Zone walls, handed to the predictor.
    layout: WorldLayout,
    /// Players the server removed, with the newest update timestamp seen
    /// when the removal arrived. Only a newer live record brings them back.
    removed: BTreeMap<u32, u64>,
    /// Newest update timestamp applied so far.
    newest_update: u64,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self {
            local_id: None,
            players: BTreeMap::new(),
            interpolation: SnapshotInterpolation::default(),
            predictor: None,
            intent: Direction::None,
            last_correction: None,
            layout: WorldLayout::builtin(),
            removed: BTreeMap::new(),
            newest_update: 0,
        }
    }

    /// Uses `layout` instead of the built-in world for prediction walls.
    pub fn with_layout(mut self, layout: WorldLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn set_local_id(&mut self, id: u32) {
        info!("Local player id is {}", id);
        self.local_id = Some(id);
        if let Some(player) = self.players.get(&id).cloned() {
            self.sync_local(None, &player);
        }
    }

    /// Seeds the mirrors from the `getState` body. It carries no timestamp,
    /// so any update already applied takes precedence.
    pub fn bootstrap(&mut self, state: &str) -> usize {
        let records = decode(state);
        self.apply_records(&records, 0);
        info!("Bootstrapped {} players", records.len());
        records.len()
    }

    /// Applies one `PlayersUpdate` buffer stamped `timestamp` by the
    /// server. Malformed records are skipped.
    pub fn apply_updates(&mut self, buffer: &str, timestamp: u64) -> usize {
        let records = decode(buffer);
        self.apply_records(&records, timestamp);
        records.len()
    }

    /// Applies records sent at `timestamp`. Records older than what a
    /// mirror already holds are dropped, as are records for removed players
    /// until a newer live one revives them.
    pub fn apply_records(&mut self, records: &[UpdateRecord], timestamp: u64) {
        for record in records {
            if let Some(&removed_at) = self.removed.get(&record.id) {
                if record.dead || timestamp <= removed_at {
                    debug!("Dropping update for removed player {}", record.id);
                    continue;
                }
                self.removed.remove(&record.id);
            }

            let previous = self.players.get(&record.id).cloned();
            if let Some(held) = previous.as_ref().filter(|p| timestamp < p.updated_at) {
                debug!(
                    "Dropping stale update for player {} ({} < {})",
                    record.id, timestamp, held.updated_at
                );
                continue;
            }

            let player = self
                .players
                .entry(record.id)
                .and_modify(|p| p.apply(record, timestamp))
                .or_insert_with(|| RemotePlayer::from_record(record, timestamp))
                .clone();

            if Some(record.id) == self.local_id {
                self.sync_local(previous.as_ref(), &player);
            }
        }
        self.newest_update = self.newest_update.max(timestamp);
    }

    /// Keeps the predictor aligned with discontinuities the server decided:
    /// first appearance, revival and zone changes.
    fn sync_local(&mut self, previous: Option<&RemotePlayer>, current: &RemotePlayer) {
        if !current.alive {
            return;
        }

        let intent = self.intent;
        let layout = &self.layout;
        let predictor = self.predictor.get_or_insert_with(|| {
            let mut predictor = Predictor::new(current.id, &current.zone_id, current.position)
                .with_walls(zone_walls(layout, &current.zone_id));
            predictor.set_intent(intent);
            predictor
        });

        let revived = previous.is_some_and(|p| !p.alive);
        if revived || predictor.zone_id != current.zone_id {
            predictor.snap_to(
                current.position,
                &current.zone_id,
                zone_walls(layout, &current.zone_id),
            );
        }
    }

    /// Buffers a snapshot and creates mirrors for players not seen yet.
    /// Removed players stay removed.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        for entity in &snapshot.state {
            if self.removed.contains_key(&entity.id) {
                continue;
            }
            self.players.entry(entity.id).or_insert_with(|| {
                debug!("Player {} first seen in snapshot {}", entity.id, snapshot.id);
                RemotePlayer {
                    id: entity.id,
                    zone_id: entity.zone_id.clone(),
                    position: entity.position(),
                    alive: true,
                    damaged: false,
                    last_fired: None,
                    last_hit: None,
                    updated_at: snapshot.timestamp,
                }
            });
        }
        self.interpolation.add_snapshot(snapshot);
    }

    pub fn remove_player(&mut self, id: u32) {
        if self.players.remove(&id).is_some() {
            info!("Player {} left", id);
        }
        self.removed.insert(id, self.newest_update);
        if Some(id) == self.local_id {
            self.predictor = None;
        }
    }

    pub fn set_latency(&mut self, latency_ms: u64) {
        self.interpolation.set_latency(latency_ms);
    }

    pub fn set_intent(&mut self, direction: Direction) {
        self.intent = direction;
        if let Some(predictor) = self.predictor.as_mut() {
            predictor.set_intent(direction);
        }
    }

    pub fn local_alive(&self) -> bool {
        self.local_id
            .and_then(|id| self.players.get(&id))
            .is_some_and(|p| p.alive)
    }

    /// Advances one frame: predicts the local player, reconciles it against
    /// the newest snapshot, then interpolates everyone else.
    pub fn update(&mut self, dt: f32, now: u64) {
        let local_alive = self.local_alive();
        if let Some(predictor) = self.predictor.as_mut() {
            predictor.advance(dt, now);
            if local_alive {
                if let Some(offset) = predictor.reconcile(&self.interpolation.vault) {
                    self.last_correction = Some(offset);
                }
            }
        }

        let interpolated = self.interpolation.interpolate(now);
        for player in self.players.values_mut() {
            if Some(player.id) == self.local_id {
                continue;
            }
            if let Some(entity) = interpolated.get(&player.id) {
                if entity.zone_id == player.zone_id {
                    player.position = entity.position();
                }
            }
        }
    }

    /// Position to draw for a player: predicted for the local one, the
    /// mirror otherwise.
    pub fn render_position(&self, id: u32) -> Option<Vec2> {
        if Some(id) == self.local_id {
            if let Some(predictor) = &self.predictor {
                return Some(predictor.position);
            }
        }
        self.players.get(&id).map(|p| p.position)
    }

    /// One line per visible player, for status logs.
    pub fn describe(&self) -> String {
        self.players
            .values()
            .filter(|p| p.alive)
            .filter_map(|p| {
                self.render_position(p.id).map(|pos| {
                    format!(
                        "{}@{}({},{})",
                        p.id,
                        p.zone_id,
                        round_coord(pos.x),
                        round_coord(pos.y)
                    )
                })
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn zone_walls(layout: &WorldLayout, zone_id: &str) -> Vec<Rect> {
    layout
        .zone(zone_id)
        .map(|zone| zone.walls.clone())
        .unwrap_or_default()
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::codec::{encode, encode_all};
    use shared::{EntityState, NO_PROJECTILE};

    fn record(id: u32, zone: &str, x: i64, y: i64) -> UpdateRecord {
        UpdateRecord {
            id,
            dead: false,
            zone_id: zone.to_string(),
            damaged: false,
            fired_projectile: NO_PROJECTILE,
            hit_projectile: NO_PROJECTILE,
            x,
            y,
        }
    }

    fn snapshot(id: u64, timestamp: u64, entities: &[(u32, &str, f32, f32)]) -> Snapshot {
        Snapshot::new(
            id,
            timestamp,
            entities
                .iter()
                .map(|(id, zone, x, y)| EntityState {
                    id: *id,
                    zone_id: zone.to_string(),
                    x: *x,
                    y: *y,
                })
                .collect(),
        )
    }

    #[test]
    fn test_bootstrap_creates_mirrors() {
        let mut game = ClientGameState::new();
        let state = encode_all(&[record(0, "N1", 200, 480), record(1, "N2", 10, 20)]);
        assert_eq!(game.bootstrap(&state), 2);
        assert_eq!(game.players[&1].zone_id, "N2");
        assert_eq!(game.players[&0].position, Vec2::new(200.0, 480.0));
    }

    #[test]
    fn test_malformed_update_is_skipped() {
        let mut game = ClientGameState::new();
        let mut buffer = encode(&record(3, "N1", 5, 5));
        buffer.push_str("zz,0,N1,");
        assert_eq!(game.apply_updates(&buffer, 0), 1);
        assert!(game.players.contains_key(&3));
    }

    #[test]
    fn test_local_player_gets_predictor() {
        let mut game = ClientGameState::new();
        game.set_local_id(0);
        assert!(game.predictor.is_none());

        game.apply_records(&[record(0, "N1", 200, 480)], 10);
        let predictor = game.predictor.as_ref().unwrap();
        assert_eq!(predictor.position, Vec2::new(200.0, 480.0));
        assert_eq!(predictor.zone_id, "N1");
    }

    #[test]
    fn test_prediction_moves_immediately() {
        let mut game = ClientGameState::new();
        game.set_local_id(0);
        game.apply_records(&[record(0, "N1", 200, 480)], 20);

        game.set_intent(Direction::Right);
        game.update(0.5, 1_000);
        assert_approx_eq!(game.render_position(0).unwrap().x, 280.0);
        // The mirror still holds the last authoritative position.
        assert_eq!(game.players[&0].position, Vec2::new(200.0, 480.0));
    }

    #[test]
    fn test_intent_before_spawn_is_kept() {
        let mut game = ClientGameState::new();
        game.set_local_id(0);
        game.set_intent(Direction::Up);
        game.apply_records(&[record(0, "N1", 200, 480)], 30);
        assert_eq!(game.predictor.as_ref().unwrap().intent, Direction::Up);
    }

    #[test]
    fn test_zone_change_snaps_predictor() {
        let mut game = ClientGameState::new();
        game.set_local_id(0);
        game.apply_records(&[record(0, "N1", 1_230, 470)], 40);
        game.update(1.0 / 60.0, 1_000);

        game.apply_records(&[record(0, "N2", 200, 480)], 50);
        let predictor = game.predictor.as_ref().unwrap();
        assert_eq!(predictor.zone_id, "N2");
        assert_eq!(predictor.position, Vec2::new(200.0, 480.0));
        assert_eq!(predictor.history_len(), 0);
    }

    #[test]
    fn test_revival_snaps_predictor() {
        let mut game = ClientGameState::new();
        game.set_local_id(0);
        game.apply_records(&[record(0, "N1", 500, 500)], 60);

        let mut dead = record(0, "N1", 500, 500);
        dead.dead = true;
        game.apply_records(&[dead], 70);
        assert!(!game.local_alive());

        game.apply_records(&[record(0, "N1", 200, 480)], 80);
        assert!(game.local_alive());
        assert_eq!(game.render_position(0), Some(Vec2::new(200.0, 480.0)));
    }

    #[test]
    fn test_reconcile_pulls_toward_server() {
        let mut game = ClientGameState::new();
        game.set_local_id(0);
        game.apply_records(&[record(0, "N1", 200, 480)], 90);
        game.update(1.0 / 60.0, 1_000);

        game.apply_snapshot(snapshot(0, 1_000, &[(0, "N1", 182.0, 480.0)]));
        game.update(1.0 / 60.0, 1_016);

        let offset = game.last_correction.unwrap();
        assert_approx_eq!(offset.x, 18.0);
        assert!(game.render_position(0).unwrap().x < 200.0);
    }

    #[test]
    fn test_remote_players_are_interpolated() {
        let mut game = ClientGameState::new();
        game.set_local_id(0);
        game.apply_snapshot(snapshot(0, 1_000, &[(1, "N1", 0.0, 0.0)]));
        game.apply_snapshot(snapshot(1, 1_100, &[(1, "N1", 100.0, 0.0)]));

        // Render time is 1_050 with the default 100ms buffer.
        game.update(1.0 / 60.0, 1_150);
        assert_approx_eq!(game.players[&1].position.x, 50.0);
    }

    #[test]
    fn test_remote_keeps_position_without_data() {
        let mut game = ClientGameState::new();
        game.apply_records(&[record(1, "N1", 40, 40)], 100);
        game.apply_snapshot(snapshot(0, 1_000, &[(1, "N1", 0.0, 0.0)]));

        game.update(1.0 / 60.0, 5_000);
        assert_eq!(game.players[&1].position, Vec2::new(40.0, 40.0));
    }

    #[test]
    fn test_remove_player() {
        let mut game = ClientGameState::new();
        game.set_local_id(0);
        game.apply_records(&[record(0, "N1", 1, 1), record(1, "N1", 2, 2)], 110);
        game.remove_player(1);
        assert!(!game.players.contains_key(&1));
        game.remove_player(0);
        assert!(game.predictor.is_none());
    }

    #[test]
    fn test_fire_and_hit_are_remembered() {
        let mut game = ClientGameState::new();
        let mut fired = record(2, "N1", 1, 1);
        fired.fired_projectile = 4;
        game.apply_records(&[fired], 120);
        game.apply_records(&[record(2, "N1", 3, 1)], 130);
        assert_eq!(game.players[&2].last_fired, Some(4));
        assert_eq!(game.players[&2].last_hit, None);
    }

    #[test]
    fn test_stale_update_is_dropped() {
        let mut game = ClientGameState::new();
        game.apply_records(&[record(1, "N2", 200, 480)], 2_000);
        game.apply_records(&[record(1, "N1", 1_200, 480)], 1_000);
        assert_eq!(game.players[&1].zone_id, "N2");
        assert_eq!(game.players[&1].position, Vec2::new(200.0, 480.0));
        assert_eq!(game.players[&1].updated_at, 2_000);

        // Same tick is still applied.
        game.apply_records(&[record(1, "N2", 210, 480)], 2_000);
        assert_eq!(game.players[&1].position, Vec2::new(210.0, 480.0));
    }

    #[test]
    fn test_stale_update_does_not_move_predictor() {
        let mut game = ClientGameState::new();
        game.set_local_id(1);
        let newer = encode(&record(1, "N2", 200, 480));
        let older = encode(&record(1, "N1", 1_200, 480));
        game.apply_updates(&newer, 2_000);
        game.apply_updates(&older, 1_000);

        let predictor = game.predictor.as_ref().unwrap();
        assert_eq!(predictor.zone_id, "N2");
        assert_eq!(predictor.position, Vec2::new(200.0, 480.0));
    }

    #[test]
    fn test_bootstrap_does_not_override_updates() {
        let mut game = ClientGameState::new();
        game.apply_records(&[record(1, "N2", 200, 480)], 2_000);
        game.bootstrap(&encode(&record(1, "N1", 50, 50)));
        assert_eq!(game.players[&1].zone_id, "N2");
    }

    #[test]
    fn test_prediction_stops_at_zone_wall() {
        let mut game = ClientGameState::new();
        game.set_local_id(0);
        game.apply_records(&[record(0, "N1", 300, 300)], 1_000);
        game.set_intent(Direction::Right);
        for frame in 0..60 {
            game.update(1.0 / 60.0, 1_000 + frame * 16);
        }
        // The first N1 wall starts at x = 384.
        assert_approx_eq!(game.render_position(0).unwrap().x, 384.0 - 11.0);
    }

    #[test]
    fn test_removed_player_is_not_recreated() {
        let mut game = ClientGameState::new();
        game.apply_records(&[record(1, "N1", 200, 480)], 1_000);
        game.remove_player(1);

        // The dead record of the removal tick and a late snapshot.
        let mut dead = record(1, "N1", 200, 480);
        dead.dead = true;
        game.apply_records(&[dead], 1_016);
        game.apply_snapshot(snapshot(3, 1_000, &[(1, "N1", 200.0, 480.0)]));
        assert!(!game.players.contains_key(&1));
        assert!(game.describe().is_empty());

        // Revival brings the player back.
        game.apply_records(&[record(1, "N1", 200, 480)], 5_000);
        assert!(game.players[&1].alive);
        game.apply_snapshot(snapshot(4, 5_000, &[(1, "N1", 200.0, 480.0)]));
        assert_eq!(game.players.len(), 1);
    }

    #[test]
    fn test_removed_local_player_gets_no_predictor() {
        let mut game = ClientGameState::new();
        game.set_local_id(0);
        game.apply_records(&[record(0, "N1", 200, 480)], 1_000);
        game.remove_player(0);
        game.apply_records(&[record(0, "N1", 200, 480)], 1_000);
        assert!(game.predictor.is_none());

        game.apply_records(&[record(0, "N1", 200, 480)], 3_000);
        assert!(game.predictor.is_some());
    }
}

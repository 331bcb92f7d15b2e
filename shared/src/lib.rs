//! Types and rules shared by the authoritative server and its clients:
//! wire packets, the delta update codec, snapshots and interpolation,
//! latency estimation, the world layout and the movement and physics
//! rules used both by the tick and by client prediction.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod codec;
pub mod geometry;
pub mod latency;
pub mod link;
pub mod movement;
pub mod physics;
pub mod snapshot;
pub mod world;

pub use codec::{UpdateRecord, NO_PROJECTILE};
pub use geometry::{Rect, Vec2};
pub use latency::LatencyEstimator;
pub use link::{Delivery, LinkConditioner, OrderedLink};
pub use movement::Direction;
pub use snapshot::{EntityState, Snapshot, SnapshotInterpolation, SnapshotVault};

pub const TICK_RATE: u32 = 60;
pub const PLAYER_SPEED: f32 = 160.0;
pub const PLAYER_WIDTH: f32 = 22.0;
pub const PLAYER_HEIGHT: f32 = 32.0;

pub const PROJECTILE_SPEED: f32 = 320.0;
pub const PROJECTILE_RANGE: f32 = 320.0;
pub const PROJECTILE_OFFSET: f32 = 32.0;
pub const PROJECTILE_SIZE: f32 = 8.0;
pub const PROJECTILE_CAPACITY: usize = 10;
pub const FIRE_COOLDOWN_MS: u64 = 250;

pub const TILE_SIZE: f32 = 32.0;
pub const WORLD_WIDTH: f32 = TILE_SIZE * 40.0;
pub const WORLD_HEIGHT: f32 = TILE_SIZE * 30.0;

/// Movement below this on both axes does not count as a change.
pub const MOVE_THRESHOLD: f32 = 0.5;

pub const LATENCY_SAMPLES: usize = 20;
pub const SNAPSHOT_EVERY_N_TICKS: u32 = 4;
pub const SNAPSHOT_VAULT_SIZE: usize = 120;
pub const INTERPOLATION_BUFFER_MS: u64 = 100;

/// Reconciliation divisors: small while moving (fast), large while idle.
pub const CORRECTION_MOVING: f32 = 60.0;
pub const CORRECTION_IDLE: f32 = 180.0;

/// Every event exchanged over the channel.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // client -> server
    GetPlayerId,
    PlayerAdd,
    PlayerMove {
        direction: Direction,
    },
    PlayerFire,
    Pong {
        timestamp: u64,
    },
    Disconnect,

    // server -> client
    Ready,
    SetPlayerId {
        /// Player id as base-36 text.
        id: String,
    },
    PlayersUpdate {
        timestamp: u64,
        updates: String,
    },
    SnapshotUpdate {
        timestamp: u64,
        snapshot: Snapshot,
    },
    Ping {
        timestamp: u64,
    },
    Latency {
        ms: u64,
    },
    PlayerRemove {
        id: u32,
    },
}

impl Packet {
    /// Event name as it appears in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Packet::GetPlayerId => "getPlayerID",
            Packet::PlayerAdd => "playerAdd",
            Packet::PlayerMove { .. } => "playerMove",
            Packet::PlayerFire => "playerFire",
            Packet::Pong { .. } => "pong",
            Packet::Disconnect => "disconnect",
            Packet::Ready => "ready",
            Packet::SetPlayerId { .. } => "setPlayerID",
            Packet::PlayersUpdate { .. } => "playersUpdate",
            Packet::SnapshotUpdate { .. } => "snapshotUpdate",
            Packet::Ping { .. } => "ping",
            Packet::Latency { .. } => "latency",
            Packet::PlayerRemove { .. } => "playerRemove",
        }
    }
}

/// HTTP path of the bootstrap state endpoint.
pub const STATE_PATH: &str = "/getState";

/// Body of the bootstrap state endpoint: one record per known player.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StateResponse {
    pub state: String,
}

/// Milliseconds since the Unix epoch.
pub fn timestamp_ms() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    millis.min(u64::MAX as u128) as u64
}

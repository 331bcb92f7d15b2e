//! # Game Server Library
//!
//! Authoritative server for the zoned multiplayer game. It owns every
//! player, projectile and zone, simulates them at a fixed tick rate and
//! pushes delta-filtered updates plus periodic full snapshots to clients.
//!
//! ## Tick Order
//!
//! Each tick runs in one task and is the only writer of game state:
//! 1. Queued session events (id requests, joins, intents, fire, disconnect)
//!    are applied in arrival order.
//! 2. Players move, then projectiles advance and expire.
//! 3. Registered collision pairs are checked per zone; hits, wall impacts
//!    and warps are resolved.
//! 4. Warp transfers collected during the tick move players between zones.
//! 5. Changed players are encoded into one `PlayersUpdate`; every few ticks
//!    a `SnapshotUpdate` follows.
//!
//! ## Module Organization
//!
//! - `projectiles`: per-player fixed-capacity projectile pool
//! - `player`: the authoritative player and its delta rule
//! - `zone`: zone groups, collision registrations and warp transfers
//! - `game`: the tick itself, id assignment and revival
//! - `client_manager`: sessions, latency samples and the event queue
//! - `network`: UDP transport, broadcasts, pings, simulated bad links
//! - `http`: the `getState` bootstrap endpoint
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::http::StateServer;
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:8080", Duration::from_millis(16), 32).await?;
//!
//!     let mut state_server = StateServer::new("127.0.0.1:8081");
//!     state_server.start(server.shared_state())?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod game;
pub mod http;
pub mod network;
pub mod player;
pub mod projectiles;
pub mod zone;

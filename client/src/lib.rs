//! # Game Client Library
//!
//! Headless client for the zoned multiplayer game. It joins the server,
//! drives its player from a scripted input pattern and keeps a local view
//! of every other player.
//!
//! ## Architecture Overview
//!
//! ### Client-Side Prediction
//! The local player moves as soon as the intent changes, using the same
//! movement rule and wall resolution as the server. Each predicted position
//! is stored with its timestamp.
//!
//! ### Reconciliation
//! When a snapshot arrives, the stored prediction closest to its timestamp
//! is compared with the authoritative position and a fraction of the
//! difference is removed every frame. The fraction is larger while moving
//! than while idle. Zone changes and revivals snap instead of blending.
//!
//! ### Interpolation
//! Other players are drawn in the past: snapshots are buffered and sampled
//! at `now - (buffer + latency)`, where latency is the median the server
//! reports back from ping echoes.
//!
//! ## Module Organization
//!
//! - `bootstrap`: HTTP fetch of the full encoded state on startup
//! - `game`: player mirrors, snapshot buffer and the local predictor
//! - `input`: scripted movement and fire cadence
//! - `network`: UDP event handling and the frame loop
//! - `prediction`: prediction history and correction
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::input::InputManager;
//! use client::network::Client;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let input = InputManager::from_pattern("right:30,left:30", 20)?;
//!     let mut client = Client::new("127.0.0.1:8080", "127.0.0.1:8081", input).await?;
//!     client.run(Some(Duration::from_secs(10))).await?;
//!     Ok(())
//! }
//! ```

pub mod bootstrap;
pub mod game;
pub mod input;
pub mod network;
pub mod prediction;

//! Per-connection sessions for the multiplayer server
//!
//! This module tracks every connected address and the state that belongs to
//! the connection rather than to the simulation:
//! - Session lifecycle (open on first datagram, explicit disconnect, timeout)
//! - The player id the session has been handed, if any
//! - Round-trip latency samples and their running median
//! - Inbound events waiting for the next simulation tick
//!
//! Events are never applied when they arrive. They are queued here in
//! arrival order and drained once per tick so the game state has a single
//! writer.

use log::info;
use shared::{Direction, LatencyEstimator};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Sessions that stay silent this long are dropped.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Inbound request waiting to be applied at the next tick boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    RequestId,
    Add,
    Move(Direction),
    Fire,
    Disconnect,
}

/// A connected session and its connection-scoped state
#[derive(Debug)]
pub struct Client {
    /// Session identifier assigned by the server
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Player owned by this session once an id has been assigned
    pub player_id: Option<u32>,
    pub latency: LatencyEstimator,
    /// Events tagged with their global arrival sequence
    pending_events: Vec<(u64, ClientEvent)>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            player_id: None,
            latency: LatencyEstimator::default(),
            pending_events: Vec::new(),
        }
    }

    /// Checks if the client has exceeded the connection timeout
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    pub fn pending_len(&self) -> usize {
        self.pending_events.len()
    }
}

/// Manages all sessions and the queue of their inbound events
pub struct ClientManager {
    clients: HashMap<u32, Client>,
    next_client_id: u32,
    /// Maximum number of concurrent sessions allowed
    max_clients: usize,
    timeout: Duration,
    next_sequence: u64,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout: CLIENT_TIMEOUT,
            next_sequence: 0,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Opens a session for `addr`.
    ///
    /// Returns None if the server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Closes a session and hands it back so the caller can release its
    /// player. Returns None if it was already gone.
    pub fn remove_client(&mut self, client_id: &u32) -> Option<Client> {
        let client = self.clients.remove(client_id)?;
        info!(
            "Client {} disconnected (player {:?})",
            client.id, client.player_id
        );
        Some(client)
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    pub fn set_player(&mut self, client_id: u32, player_id: u32) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.player_id = Some(player_id);
                true
            }
            None => false,
        }
    }

    pub fn player_of(&self, client_id: u32) -> Option<u32> {
        self.clients.get(&client_id).and_then(|c| c.player_id)
    }

    /// Queues an event for the next tick. Returns false for unknown sessions.
    pub fn push_event(&mut self, client_id: u32, event: ClientEvent) -> bool {
        let Some(client) = self.clients.get_mut(&client_id) else {
            return false;
        };
        client.last_seen = Instant::now();
        client.pending_events.push((self.next_sequence, event));
        self.next_sequence += 1;
        true
    }

    /// Takes every queued event across all sessions in arrival order.
    pub fn drain_events(&mut self) -> Vec<(u32, ClientEvent)> {
        let mut all_events: Vec<(u64, u32, ClientEvent)> = Vec::new();
        for (client_id, client) in &mut self.clients {
            all_events.extend(
                client
                    .pending_events
                    .drain(..)
                    .map(|(seq, event)| (seq, *client_id, event)),
            );
        }
        all_events.sort_by_key(|(seq, _, _)| *seq);
        all_events
            .into_iter()
            .map(|(_, client_id, event)| (client_id, event))
            .collect()
    }

    /// Feeds an echoed ping timestamp into the session's estimator and
    /// returns the new median.
    pub fn record_pong(&mut self, client_id: u32, now: u64, echoed: u64) -> Option<u64> {
        let client = self.clients.get_mut(&client_id)?;
        client.last_seen = Instant::now();
        client.latency.record_echo(now, echoed);
        Some(client.latency.median())
    }

    /// Removes sessions that went silent and returns them.
    pub fn check_timeouts(&mut self) -> Vec<Client> {
        let timeout = self.timeout;
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .iter()
            .filter_map(|client_id| self.remove_client(client_id))
            .collect()
    }

    /// Gets all session ids and their network addresses
    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

//! Server network layer handling UDP communications and game loop coordination

use crate::client_manager::{ClientEvent, ClientManager};
use crate::game::{GameState, TickOutput};
use crate::http::SharedState;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::codec::{encode_all, to_base36};
use shared::{timestamp_ms, LinkConditioner, OrderedLink, Packet};
use shared::world::WorldLayout;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

const RECV_BUFFER_SIZE: usize = 4096;
const PING_INTERVAL: Duration = Duration::from_secs(1);

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: u32,
        player_id: Option<u32>,
    },
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<u32>,
    },
}

/// A datagram waiting for its release time.
#[derive(Debug)]
struct Outbound {
    release: Instant,
    packet: Packet,
    addr: SocketAddr,
}

/// Main server coordinating networking and game simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game_state: GameState,
    tick_duration: Duration,
    link: LinkConditioner,
    state: SharedState,
    /// Players whose sessions timed out, released at the next tick.
    pending_removals: Vec<Option<u32>>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            game_state: GameState::new(),
            tick_duration,
            link: LinkConditioner::disabled(),
            state: Arc::new(Mutex::new(String::new())),
            pending_removals: Vec::new(),
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn with_layout(mut self, layout: WorldLayout) -> Self {
        self.game_state = GameState::with_layout(layout);
        self
    }

    pub fn with_snapshot_every(mut self, ticks: u32) -> Self {
        self.game_state = self.game_state.with_snapshot_every(ticks);
        self
    }

    /// Conditions every outbound datagram.
    pub fn with_link(mut self, link: LinkConditioner) -> Self {
        self.link = link;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Encoded full state, refreshed every tick. Hand it to the HTTP
    /// endpoint.
    pub fn shared_state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    /// Sender that can stop the main loop with [`ServerMessage::Shutdown`].
    pub fn control(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; RECV_BUFFER_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match deserialize::<Packet>(&buffer[0..len]) {
                        Ok(packet) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to deserialize packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let clients = Arc::clone(&self.clients);
        let mut link = OrderedLink::new(self.link);
        let release_tx = Self::spawn_release_queue(Arc::clone(&self.socket));
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        Self::deliver(&mut link, &release_tx, packet, addr);
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }
                            Self::deliver(&mut link, &release_tx, packet.clone(), addr);
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client in timed_out {
                    let message = ServerMessage::ClientTimeout {
                        client_id: client.id,
                        player_id: client.player_id,
                    };
                    if let Err(e) = server_tx.send(message) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    /// Spawns the task that puts datagrams on the wire. Release times
    /// arrive in order, so waiting for each one in turn keeps FIFO.
    fn spawn_release_queue(socket: Arc<UdpSocket>) -> mpsc::UnboundedSender<Outbound> {
        let (release_tx, mut release_rx) = mpsc::unbounded_channel::<Outbound>();
        tokio::spawn(async move {
            while let Some(outbound) = release_rx.recv().await {
                tokio::time::sleep_until(outbound.release.into()).await;
                if let Err(e) =
                    Self::send_packet_impl(&socket, &outbound.packet, outbound.addr).await
                {
                    error!("Failed to send packet to {}: {}", outbound.addr, e);
                }
            }
        });
        release_tx
    }

    /// Queues now, later or not at all, as the link conditioner decides.
    fn deliver(
        link: &mut OrderedLink,
        release_tx: &mpsc::UnboundedSender<Outbound>,
        packet: Packet,
        addr: SocketAddr,
    ) {
        let Some(release) = link.schedule_random(Instant::now()) else {
            debug!("Dropped {} to {}", packet.name(), addr);
            return;
        };
        let outbound = Outbound {
            release,
            packet,
            addr,
        };
        if let Err(e) = release_tx.send(outbound) {
            error!("Release queue closed: {}", e);
        }
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<u32>) {
        if let Err(e) = self
            .game_tx
            .send(GameMessage::BroadcastPacket { packet, exclude })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Routes an incoming packet to its session. Game events are only queued
    /// here and applied at the next tick.
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        let clients_lock = Arc::clone(&self.clients);
        let mut clients = clients_lock.write().await;

        let client_id = match clients.find_client_by_addr(addr) {
            Some(id) => id,
            None => match clients.add_client(addr) {
                Some(id) => {
                    self.send_packet(Packet::Ready, addr);
                    id
                }
                None => {
                    warn!("Server full, ignoring {} from {}", packet.name(), addr);
                    return;
                }
            },
        };

        let event = match packet {
            Packet::GetPlayerId => ClientEvent::RequestId,
            Packet::PlayerAdd => ClientEvent::Add,
            Packet::PlayerMove { direction } => ClientEvent::Move(direction),
            Packet::PlayerFire => ClientEvent::Fire,
            Packet::Disconnect => ClientEvent::Disconnect,
            Packet::Pong { timestamp } => {
                if let Some(ms) = clients.record_pong(client_id, timestamp_ms(), timestamp) {
                    self.send_packet(Packet::Latency { ms }, addr);
                }
                return;
            }
            other => {
                warn!("Unexpected {} from client {}", other.name(), client_id);
                return;
            }
        };
        clients.push_event(client_id, event);
    }

    /// Applies every queued session event to the game state.
    async fn apply_events(&mut self, now_ms: u64) {
        let clients_lock = Arc::clone(&self.clients);
        let mut clients = clients_lock.write().await;

        for (client_id, event) in clients.drain_events() {
            let Some((addr, player_id)) = clients.get(client_id).map(|c| (c.addr, c.player_id))
            else {
                continue;
            };

            match (event, player_id) {
                (ClientEvent::RequestId, Some(id)) => {
                    self.send_packet(Packet::SetPlayerId { id: to_base36(id as i64) }, addr);
                }
                (ClientEvent::RequestId, None) => {
                    let id = self.game_state.assign_player_id();
                    clients.set_player(client_id, id);
                    info!("Client {} assigned player {}", client_id, id);
                    self.send_packet(Packet::SetPlayerId { id: to_base36(id as i64) }, addr);
                }
                (ClientEvent::Add, Some(id)) => {
                    self.game_state.add_player(id);
                }
                (ClientEvent::Move(direction), Some(id)) => {
                    self.game_state.set_intent(id, direction);
                }
                (ClientEvent::Fire, Some(id)) => {
                    self.game_state.fire(id, now_ms);
                }
                (ClientEvent::Disconnect, _) => {
                    if let Some(client) = clients.remove_client(&client_id) {
                        self.release_player(client.player_id);
                    }
                }
                (event, None) => {
                    warn!(
                        "Client {} sent {:?} before requesting a player id",
                        client_id, event
                    );
                }
            }
        }
        drop(clients);

        for player_id in std::mem::take(&mut self.pending_removals) {
            self.release_player(player_id);
        }
    }

    /// Kills the session's player and tells everyone it is gone.
    fn release_player(&mut self, player_id: Option<u32>) {
        let Some(id) = player_id else {
            return;
        };
        if self.game_state.remove_player(id) {
            self.broadcast_packet(Packet::PlayerRemove { id }, None);
        }
    }

    fn broadcast_tick(&self, output: TickOutput, now_ms: u64) {
        if !output.updates.is_empty() {
            self.broadcast_packet(
                Packet::PlayersUpdate {
                    timestamp: now_ms,
                    updates: encode_all(&output.updates),
                },
                None,
            );
        }
        if let Some(snapshot) = output.snapshot {
            self.broadcast_packet(
                Packet::SnapshotUpdate {
                    timestamp: snapshot.timestamp,
                    snapshot,
                },
                None,
            );
        }
    }

    fn publish_state(&self) {
        match self.state.lock() {
            Ok(mut state) => *state = self.game_state.encoded_state(),
            Err(_) => error!("State lock poisoned"),
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);
        let mut ping_interval = interval(PING_INTERVAL);
        let dt = self.tick_duration.as_secs_f32();
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id, player_id }) => {
                            info!("Client {} timed out", client_id);
                            self.pending_removals.push(player_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let now_ms = timestamp_ms();
                    self.apply_events(now_ms).await;
                    let output = self.game_state.step(dt, now_ms);
                    self.broadcast_tick(output, now_ms);
                    self.publish_state();

                    if self.game_state.tick % 60 == 0 {
                        let elapsed = last_tick.elapsed().as_secs_f32();
                        let client_count = self.clients.read().await.len();
                        if client_count > 0 {
                            debug!("Tick {}: {} clients, {:.1}Hz",
                                   self.game_state.tick, client_count, 60.0 / elapsed);
                        }
                        last_tick = Instant::now();
                    }
                },

                _ = ping_interval.tick() => {
                    self.broadcast_packet(Packet::Ping { timestamp: timestamp_ms() }, None);
                },
            }
        }

        Ok(())
    }
}

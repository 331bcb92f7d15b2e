use crate::bootstrap::StateClient;
use crate::game::ClientGameState;
use crate::input::InputManager;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::codec::from_base36;
use shared::world::WorldLayout;
use shared::{timestamp_ms, Direction, LinkConditioner, OrderedLink, Packet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;

const RECV_BUFFER_SIZE: usize = 4096;
const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const STATUS_INTERVAL: Duration = Duration::from_secs(1);
/// Longest frame step fed to prediction after a stall.
const MAX_FRAME_DT: f32 = 0.1;

/// A datagram waiting for its release time.
#[derive(Debug)]
struct Outbound {
    release: Instant,
    packet: Packet,
}

pub struct Client {
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    state_client: StateClient,
    link: OrderedLink,
    release_tx: mpsc::UnboundedSender<Outbound>,

    player_id: Option<u32>,
    ready: bool,
    sent_intent: Option<Direction>,
    latency_ms: u64,

    game_state: ClientGameState,
    input_manager: InputManager,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        http_addr: &str,
        input_manager: InputManager,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
        let server_addr = server_addr.parse()?;
        let state_client = StateClient::new(http_addr)?;
        let release_tx = Self::spawn_release_queue(Arc::clone(&socket), server_addr);

        Ok(Client {
            socket,
            server_addr,
            state_client,
            link: OrderedLink::default(),
            release_tx,
            player_id: None,
            ready: false,
            sent_intent: None,
            latency_ms: 0,
            game_state: ClientGameState::new(),
            input_manager,
        })
    }

    /// Conditions every outbound datagram.
    pub fn with_link(mut self, link: LinkConditioner) -> Self {
        self.link = OrderedLink::new(link);
        self
    }

    /// Uses `layout` for prediction walls instead of the built-in world.
    pub fn with_layout(mut self, layout: WorldLayout) -> Self {
        self.game_state = std::mem::take(&mut self.game_state).with_layout(layout);
        self
    }

    pub fn player_id(&self) -> Option<u32> {
        self.player_id
    }

    pub fn game_state(&self) -> &ClientGameState {
        &self.game_state
    }

    /// Seeds the mirrors over HTTP. Failure is not fatal: snapshots and
    /// updates fill the mirrors in eventually.
    async fn bootstrap(&mut self) {
        match self.state_client.fetch_state().await {
            Ok(state) => {
                self.game_state.bootstrap(&state);
            }
            Err(e) => warn!("Bootstrap from {} failed: {}", self.state_client.url(), e),
        }
    }

    /// Spawns the task that puts datagrams on the wire in release order.
    fn spawn_release_queue(
        socket: Arc<UdpSocket>,
        addr: SocketAddr,
    ) -> mpsc::UnboundedSender<Outbound> {
        let (release_tx, mut release_rx) = mpsc::unbounded_channel::<Outbound>();
        tokio::spawn(async move {
            while let Some(outbound) = release_rx.recv().await {
                tokio::time::sleep_until(outbound.release.into()).await;
                if let Err(e) = Self::send_packet_impl(&socket, &outbound.packet, addr).await {
                    error!("Failed to send {}: {}", outbound.packet.name(), e);
                }
            }
        });
        release_tx
    }

    fn send_packet(&mut self, packet: Packet) {
        let Some(release) = self.link.schedule_random(Instant::now()) else {
            debug!("Dropped {}", packet.name());
            return;
        };
        if let Err(e) = self.release_tx.send(Outbound { release, packet }) {
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

    /// Applies one server packet and returns the reply it calls for, if any.
    pub fn handle_packet(&mut self, packet: Packet) -> Vec<Packet> {
        match packet {
            Packet::Ready => {
                if !self.ready {
                    info!("Server ready");
                }
                self.ready = true;
                Vec::new()
            }

            Packet::SetPlayerId { id } => {
                let Some(player_id) = from_base36(&id).and_then(|v| u32::try_from(v).ok()) else {
                    warn!("Ignoring malformed player id '{}'", id);
                    return Vec::new();
                };
                if self.player_id == Some(player_id) {
                    return Vec::new();
                }

                self.player_id = Some(player_id);
                self.game_state.set_local_id(player_id);

                let mut replies = vec![Packet::PlayerAdd];
                let intent = self.input_manager.current();
                if intent.is_moving() {
                    replies.push(Packet::PlayerMove { direction: intent });
                }
                self.sent_intent = Some(intent);
                replies
            }

            Packet::PlayersUpdate { timestamp, updates } => {
                self.game_state.apply_updates(&updates, timestamp);
                Vec::new()
            }

            Packet::SnapshotUpdate { snapshot, .. } => {
                self.game_state.apply_snapshot(snapshot);
                Vec::new()
            }

            Packet::Ping { timestamp } => vec![Packet::Pong { timestamp }],

            Packet::Latency { ms } => {
                self.latency_ms = ms;
                self.game_state.set_latency(ms);
                Vec::new()
            }

            Packet::PlayerRemove { id } => {
                self.game_state.remove_player(id);
                if Some(id) == self.player_id {
                    warn!("Server removed our player");
                    self.player_id = None;
                    self.sent_intent = None;
                }
                Vec::new()
            }

            other => {
                warn!("Unexpected packet {}", other.name());
                Vec::new()
            }
        }
    }

    /// Samples the input script and returns what to send for this frame.
    pub fn poll_input(&mut self) -> Vec<Packet> {
        let frame = self.input_manager.update();
        if let Some(direction) = frame.intent {
            self.game_state.set_intent(direction);
        }

        if self.player_id.is_none() {
            return Vec::new();
        }

        let mut packets = Vec::new();
        let intent = self.input_manager.current();
        if self.sent_intent != Some(intent) {
            self.sent_intent = Some(intent);
            packets.push(Packet::PlayerMove { direction: intent });
        }
        if frame.fire && self.game_state.local_alive() {
            packets.push(Packet::PlayerFire);
        }
        packets
    }

    /// Requests repeated every status tick until the server state shows
    /// they landed: the id request until answered, the spawn until our own
    /// record is alive, and afterwards the current intent.
    pub fn keepalive(&self) -> Vec<Packet> {
        if self.player_id.is_none() {
            return vec![Packet::GetPlayerId];
        }
        let intent = self.input_manager.current();
        if !self.game_state.local_alive() {
            let mut packets = vec![Packet::PlayerAdd];
            if intent.is_moving() {
                packets.push(Packet::PlayerMove { direction: intent });
            }
            return packets;
        }
        vec![Packet::PlayerMove { direction: intent }]
    }

    pub async fn run(&mut self, duration: Option<Duration>) -> Result<(), Box<dyn std::error::Error>> {
        self.bootstrap().await;
        self.send_packet(Packet::GetPlayerId);

        let deadline = duration.map(|d| Instant::now() + d);
        let mut frame_interval = interval(FRAME_INTERVAL);
        let mut status_interval = interval(STATUS_INTERVAL);
        let mut last_frame = Instant::now();

        let socket = Arc::clone(&self.socket);
        let mut buffer = [0u8; RECV_BUFFER_SIZE];

        info!("Client started, server {}", self.server_addr);

        loop {
            tokio::select! {
                result = socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => match deserialize::<Packet>(&buffer[0..len]) {
                            Ok(packet) => {
                                for reply in self.handle_packet(packet) {
                                    self.send_packet(reply);
                                }
                            }
                            Err(e) => warn!("Failed to deserialize packet: {}", e),
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = frame_interval.tick() => {
                    for packet in self.poll_input() {
                        self.send_packet(packet);
                    }

                    let dt = last_frame.elapsed().as_secs_f32().min(MAX_FRAME_DT);
                    last_frame = Instant::now();
                    self.game_state.update(dt, timestamp_ms());
                },

                _ = status_interval.tick() => {
                    for packet in self.keepalive() {
                        self.send_packet(packet);
                    }
                    info!(
                        "Player {:?} | {} players | latency {}ms | {}",
                        self.player_id,
                        self.game_state.players.len(),
                        self.latency_ms,
                        self.game_state.describe()
                    );

                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        break;
                    }
                },
            }
        }

        info!("Disconnecting");
        Self::send_packet_impl(&self.socket, &Packet::Disconnect, self.server_addr)
            .await
            .map_err(|e| e as Box<dyn std::error::Error>)?;
        Ok(())
    }
}

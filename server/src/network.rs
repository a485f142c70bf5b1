//! Server network layer handling UDP communications and game loop coordination

use crate::client_manager::ClientManager;
use crate::game::{Match, MatchEvent};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::config::GameConfig;
use shared::{
    diff, CommandInput, EntityId, Packet, WorldSnapshot, KEYFRAME_INTERVAL, MAX_PACKET_SIZE,
    MAX_PLAYERS, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Longest step the simulation takes after a stall
const MAX_DELTA_TIME: f32 = 1.0 / 20.0;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: u32,
        player: Option<EntityId>,
    },
    #[allow(dead_code)]
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

/// Owns the match and drives it from a fixed-rate tick loop
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game: Match,
    tick_duration: Duration,
    /// Last state sent to everyone; deltas are computed against it
    last_broadcast: Option<WorldSnapshot>,

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
        config: GameConfig,
        seed: u64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let max_clients = max_clients.clamp(1, MAX_PLAYERS);
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            game: Match::new(config, seed),
            tick_duration,
            last_broadcast: None,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(self.socket.local_addr()?)
    }

    pub fn game(&self) -> &Match {
        &self.game
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match deserialize::<Packet>(&buffer[..len]) {
                        Ok(packet) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(_) => warn!("Failed to deserialize packet from {}", addr),
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
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = clients.read().await.get_client_addrs();

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
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

                let timed_out = clients.write().await.check_timeouts();
                for client in timed_out {
                    let message = ServerMessage::ClientTimeout {
                        client_id: client.id,
                        player: client.player,
                    };
                    if let Err(e) = server_tx.send(message) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        if data.len() > MAX_PACKET_SIZE {
            warn!("Packet of {} bytes exceeds receive buffer", data.len());
        }
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

    fn reject(&self, addr: SocketAddr, reason: &str) {
        info!("Rejecting {}: {}", addr, reason);
        self.send_packet(
            Packet::Disconnected {
                reason: reason.to_string(),
            },
            addr,
        );
    }

    async fn drop_client(&mut self, client_id: u32) {
        let removed = self.clients.write().await.remove_client(client_id);
        if let Some(player) = removed.and_then(|client| client.player) {
            self.game.remove_player(player);
        }
    }

    /// Processes incoming packets and updates game state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!("Client connecting from {} (version: {})", addr, client_version);

                if client_version != PROTOCOL_VERSION {
                    self.reject(addr, "Protocol version mismatch");
                    return;
                }

                let existing = self.clients.read().await.find_client_by_addr(addr);
                if let Some(existing_id) = existing {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    self.drop_client(existing_id).await;
                }

                if !self.game.round().accepts_players() {
                    self.reject(addr, "Round in progress");
                    return;
                }

                let Some(client_id) = self.clients.write().await.add_client(addr) else {
                    self.reject(addr, "Server full");
                    return;
                };

                let Some(player) = self.game.add_player(client_id) else {
                    self.clients.write().await.remove_client(client_id);
                    self.reject(addr, "Match is full");
                    return;
                };
                self.clients.write().await.bind_player(client_id, player);

                let config = self.game.config().clone();
                self.send_packet(
                    Packet::Connected {
                        client_id,
                        player,
                        config,
                    },
                    addr,
                );
                // Deltas are built against the last broadcast, so start from it
                let snapshot = self
                    .last_broadcast
                    .clone()
                    .unwrap_or_else(|| self.game.snapshot());
                self.send_packet(Packet::Snapshot { snapshot }, addr);
            }

            Packet::Command {
                sequence,
                timestamp,
                command,
            } => {
                let mut clients = self.clients.write().await;
                match clients.find_client_by_addr(addr) {
                    Some(client_id) => {
                        clients.add_command(
                            client_id,
                            CommandInput {
                                sequence,
                                timestamp,
                                command,
                            },
                        );
                    }
                    None => debug!("Command from unknown address {}", addr),
                }
            }

            Packet::Disconnect => {
                let client_id = self.clients.read().await.find_client_by_addr(addr);
                if let Some(client_id) = client_id {
                    self.drop_client(client_id).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Applies queued commands in timestamp order, then advances the match.
    ///
    /// Returns true once the round has terminated.
    async fn process_commands(&mut self, dt: f32) -> bool {
        {
            let mut clients = self.clients.write().await;
            for (client_id, input) in clients.get_chronological_commands() {
                if let Some(player) = clients.player_of(client_id) {
                    self.game.apply_command(player, input.command);
                }
                clients.mark_command_processed(client_id, input.sequence);
            }
            clients.cleanup_processed_commands();
        }

        self.game.tick(dt);

        let mut finished = false;
        for event in self.game.take_events() {
            match event {
                MatchEvent::PlayerEliminated(player) => {
                    self.clients.write().await.unbind_player(player);
                }
                MatchEvent::RoundOver { winner } => {
                    self.broadcast_packet(Packet::RoundOver { winner }, None);
                }
                MatchEvent::Shutdown => finished = true,
            }
        }
        finished
    }

    /// Full snapshot every keyframe, field deltas in between
    fn build_state_packet(&mut self) -> Packet {
        let snapshot = self.game.snapshot();
        let packet = match &self.last_broadcast {
            Some(prev) if snapshot.tick % KEYFRAME_INTERVAL != 0 => Packet::Delta {
                base_tick: prev.tick,
                tick: snapshot.tick,
                changes: diff(prev, &snapshot),
            },
            _ => Packet::Snapshot {
                snapshot: snapshot.clone(),
            },
        };
        self.last_broadcast = Some(snapshot);
        packet
    }

    async fn broadcast_game_state(&mut self) {
        if self.clients.read().await.is_empty() {
            return;
        }
        let packet = self.build_state_packet();
        self.broadcast_packet(packet, None);
    }

    /// Tells every client the round is over; sent directly so it is not lost on exit
    async fn shutdown(&self) {
        let packet = Packet::Disconnected {
            reason: "Round finished".to_string(),
        };
        let addrs = self.clients.read().await.get_client_addrs();
        for (client_id, addr) in addrs {
            if let Err(e) = Self::send_packet_impl(&self.socket, &packet, addr).await {
                error!("Failed to notify client {} of shutdown: {}", client_id, e);
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id, player }) => {
                            info!("Client {} timed out", client_id);
                            if let Some(player) = player {
                                self.game.remove_player(player);
                            }
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let mut dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    if dt > MAX_DELTA_TIME {
                        warn!("Large delta time detected ({:.3}s), capping to {:.3}s", dt, MAX_DELTA_TIME);
                        dt = MAX_DELTA_TIME;
                    }

                    let finished = self.process_commands(dt).await;
                    self.broadcast_game_state().await;

                    let tick = self.game.tick_count();
                    if tick % 60 == 0 {
                        let client_count = self.clients.read().await.len();
                        if client_count > 0 {
                            debug!("Tick {}: {} clients, {:.1}Hz, round {:?}",
                                   tick, client_count, 1.0 / dt.max(f32::EPSILON), self.game.round().phase());
                        }
                    }

                    if finished {
                        info!("Round terminated, shutting down");
                        self.shutdown().await;
                        break;
                    }
                },
            }
        }

        Ok(())
    }
}

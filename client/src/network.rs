//! UDP connection to the game server
//!
//! macroquad owns the main thread, so the socket lives on a background
//! thread with its own tokio runtime. [`NetworkHandle`] is the frame loop's
//! side of the two channels between them.

use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::config::GameConfig;
use shared::{
    CommandInput, EntityId, FieldChange, Packet, WorldSnapshot, MAX_PACKET_SIZE,
    PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep};

/// Server traffic handed to the frame loop
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    Connected {
        client_id: u32,
        player: EntityId,
        config: GameConfig,
    },
    Snapshot(WorldSnapshot),
    Delta {
        base_tick: u32,
        tick: u32,
        changes: Vec<FieldChange>,
    },
    RoundOver {
        winner: Option<EntityId>,
    },
    Disconnected {
        reason: String,
    },
}

/// Requests from the frame loop to the network thread
#[derive(Debug)]
pub enum Outgoing {
    Command(CommandInput),
    Disconnect,
}

pub struct NetworkClient {
    socket: UdpSocket,
    server_addr: SocketAddr,
    client_id: Option<u32>,
    fake_ping_ms: u64,
}

impl NetworkClient {
    pub async fn new(
        server_addr: &str,
        fake_ping_ms: u64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(NetworkClient {
            socket,
            server_addr,
            client_id: None,
            fake_ping_ms,
        })
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn connect(&self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to {}...", self.server_addr);
        self.send_packet(&Packet::Connect {
            client_version: PROTOCOL_VERSION,
        })
        .await
    }

    /// Maps a server packet to a frame-loop event
    fn handle_packet(&mut self, packet: Packet) -> Option<NetworkEvent> {
        match packet {
            Packet::Connected {
                client_id,
                player,
                config,
            } => {
                info!("Connected! Client ID: {}, player {}", client_id, player);
                self.client_id = Some(client_id);
                Some(NetworkEvent::Connected {
                    client_id,
                    player,
                    config,
                })
            }
            Packet::Snapshot { snapshot } => Some(NetworkEvent::Snapshot(snapshot)),
            Packet::Delta {
                base_tick,
                tick,
                changes,
            } => Some(NetworkEvent::Delta {
                base_tick,
                tick,
                changes,
            }),
            Packet::RoundOver { winner } => Some(NetworkEvent::RoundOver { winner }),
            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.client_id = None;
                Some(NetworkEvent::Disconnected { reason })
            }
            _ => {
                warn!("Unexpected packet type from server");
                None
            }
        }
    }

    /// Pumps packets both ways until the frame loop hangs up
    pub async fn run(
        mut self,
        mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
        incoming: mpsc::UnboundedSender<NetworkEvent>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut retry_interval = interval(Duration::from_secs(1));
        retry_interval.tick().await;
        let mut buffer = [0u8; MAX_PACKET_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }

                            match deserialize::<Packet>(&buffer[..len]) {
                                Ok(packet) => {
                                    if let Some(event) = self.handle_packet(packet) {
                                        if incoming.send(event).is_err() {
                                            break;
                                        }
                                    }
                                }
                                Err(_) => warn!("Failed to deserialize packet from server"),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                message = outgoing.recv() => {
                    match message {
                        Some(Outgoing::Command(input)) => {
                            if self.client_id.is_none() {
                                continue;
                            }
                            let packet = Packet::Command {
                                sequence: input.sequence,
                                timestamp: input.timestamp,
                                command: input.command,
                            };
                            if let Err(e) = self.send_packet(&packet).await {
                                error!("Error sending command: {}", e);
                            }
                        },
                        Some(Outgoing::Disconnect) | None => break,
                    }
                },

                _ = retry_interval.tick() => {
                    if self.client_id.is_none() {
                        debug!("No handshake yet, resending connect");
                        self.connect().await?;
                    }
                },
            }
        }

        if self.client_id.is_some() {
            self.send_packet(&Packet::Disconnect).await?;
        }
        info!("Network task stopped");
        Ok(())
    }
}

/// Frame-loop side of the network thread
pub struct NetworkHandle {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    incoming: mpsc::UnboundedReceiver<NetworkEvent>,
}

impl NetworkHandle {
    /// Starts the network thread and returns immediately
    pub fn spawn(server_addr: &str, fake_ping_ms: u64) -> Result<Self, Box<dyn std::error::Error>> {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let server_addr = server_addr.to_string();

        std::thread::Builder::new()
            .name("network".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let failure = match NetworkClient::new(&server_addr, fake_ping_ms).await {
                        Ok(client) => client
                            .run(outgoing_rx, incoming_tx.clone())
                            .await
                            .err()
                            .map(|e| e.to_string()),
                        Err(e) => Some(e.to_string()),
                    };
                    if let Some(reason) = failure {
                        error!("Network error: {}", reason);
                        let _ = incoming_tx.send(NetworkEvent::Disconnected { reason });
                    }
                });
            })?;

        Ok(Self {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
        })
    }

    pub fn send_command(&self, input: CommandInput) {
        if self.outgoing.send(Outgoing::Command(input)).is_err() {
            debug!("Network thread is gone, dropping command");
        }
    }

    pub fn disconnect(&self) {
        let _ = self.outgoing.send(Outgoing::Disconnect);
    }

    /// Everything that arrived since the last frame
    pub fn poll(&mut self) -> Vec<NetworkEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.incoming.try_recv() {
            events.push(event);
        }
        events
    }
}

//! Connected clients and their queued commands
//!
//! Each UDP address that completed the handshake becomes a [`Client`] bound
//! to at most one player entity. Commands are buffered per client and handed
//! to the match in timestamp order once per tick.

use log::info;
use shared::{CommandInput, EntityId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Client {
    pub id: u32,
    pub addr: SocketAddr,
    pub last_seen: Instant,
    /// Highest command sequence already applied
    pub last_processed_command: u32,
    pub pending_commands: Vec<CommandInput>,
    /// Player entity this client controls, if it got one
    pub player: Option<EntityId>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            last_processed_command: 0,
            pending_commands: Vec::new(),
            player: None,
        }
    }

    /// Buffers a command, keeping the queue in sequence order
    pub fn add_command(&mut self, command: CommandInput) {
        self.last_seen = Instant::now();
        if command.sequence <= self.last_processed_command {
            return;
        }
        self.pending_commands.push(command);
        self.pending_commands.sort_by_key(|c| c.sequence);
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

pub struct ClientManager {
    clients: HashMap<u32, Client>,
    next_client_id: u32,
    max_clients: usize,
    timeout: Duration,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self::with_timeout(max_clients, Duration::from_secs(5))
    }

    pub fn with_timeout(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    /// Returns the new client id, or `None` at capacity
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

    /// Removes a client and returns the player it controlled
    pub fn remove_client(&mut self, client_id: u32) -> Option<Client> {
        let client = self.clients.remove(&client_id)?;
        info!("Client {} disconnected", client.id);
        Some(client)
    }

    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn bind_player(&mut self, client_id: u32, player: EntityId) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.player = Some(player);
        }
    }

    /// Drops the binding once the player entity is gone
    pub fn unbind_player(&mut self, player: EntityId) {
        for client in self.clients.values_mut() {
            if client.player == Some(player) {
                client.player = None;
            }
        }
    }

    pub fn player_of(&self, client_id: u32) -> Option<EntityId> {
        self.clients.get(&client_id).and_then(|client| client.player)
    }

    pub fn touch(&mut self, client_id: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.touch();
        }
    }

    pub fn add_command(&mut self, client_id: u32, command: CommandInput) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.add_command(command);
                true
            }
            None => false,
        }
    }

    /// Unprocessed commands from every client, oldest first.
    ///
    /// Ties on timestamp fall back to client id and sequence so the order
    /// never depends on map iteration.
    pub fn get_chronological_commands(&self) -> Vec<(u32, CommandInput)> {
        let mut all: Vec<(u32, CommandInput)> = self
            .clients
            .iter()
            .flat_map(|(client_id, client)| {
                client
                    .pending_commands
                    .iter()
                    .filter(|c| c.sequence > client.last_processed_command)
                    .map(move |c| (*client_id, c.clone()))
            })
            .collect();

        all.sort_by_key(|(client_id, command)| (command.timestamp, *client_id, command.sequence));
        all
    }

    pub fn mark_command_processed(&mut self, client_id: u32, sequence: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_processed_command = client.last_processed_command.max(sequence);
        }
    }

    pub fn cleanup_processed_commands(&mut self) {
        for client in self.clients.values_mut() {
            let last = client.last_processed_command;
            client.pending_commands.retain(|c| c.sequence > last);
        }
    }

    /// Removes silent clients and returns them for player teardown
    pub fn check_timeouts(&mut self) -> Vec<Client> {
        let timeout = self.timeout;
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .into_iter()
            .filter_map(|id| self.remove_client(id))
            .collect()
    }

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

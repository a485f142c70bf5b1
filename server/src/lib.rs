//! # Bomb Party Server Library
//!
//! Authoritative server for the bomb-passing party game. Every rule decision
//! (who holds the bomb, when it explodes, who gets knocked off the platform,
//! who is eliminated and who wins) is made here. Clients only send commands
//! and render the replicated result.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! One [`game::Match`] owns the players, the single bomb, the life manager
//! and the round orchestrator. A tick advances them in a fixed order so the
//! outcome of a tick never depends on message arrival order.
//!
//! ### Client Management
//! Handles the lifecycle of client connections:
//! - Handshake with protocol version check and player assignment
//! - Command queueing in timestamp order
//! - Disconnection and timeout cleanup, releasing any held bomb
//!
//! ### State Broadcasting
//! After every tick the server sends either a full keyframe snapshot or the
//! field changes since the previous broadcast. Clients apply deltas only on
//! a matching base tick and resynchronise on the next keyframe.
//!
//! ## Module Organization
//!
//! ### Simulation
//! - `spawn`: spawn point pool avoiding recently used and cooling points
//! - `player`: player body, movement, hold sockets and knockback flight
//! - `bomb`: the bomb state machine (held, in flight, waiting, exploded)
//! - `life`: lives, respawn scheduling and knockback accumulation
//! - `round`: lobby, countdown, active play, win detection and shutdown
//! - `game`: tick composition and explosion resolution
//!
//! ### Networking
//! - `client_manager`: connected clients and their command queues
//! - `network`: UDP server, network tasks and the fixed-rate game loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use shared::config::GameConfig;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(16), // ~60Hz
//!         4,
//!         GameConfig::default(),
//!         42,
//!     )
//!     .await?;
//!
//!     // Runs until the round ends and every client was told
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The server uses an event-driven architecture with internal async tasks:
//! - **Network Receiver**: listens for incoming packets
//! - **Network Sender**: drains the outgoing packet queue
//! - **Timeout Checker**: removes clients that went silent
//! - **Main Game Loop**: applies commands, ticks the match and broadcasts

pub mod bomb;
pub mod client_manager;
pub mod game;
pub mod life;
pub mod network;
pub mod player;
pub mod round;
pub mod spawn;

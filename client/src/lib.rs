//! # Bomb Party Client Library
//!
//! Client side of the bomb-passing party game. The client never simulates
//! the match: it sends commands, mirrors the server's replicated world and
//! turns every replicated change into HUD feedback.
//!
//! ## Architecture Overview
//!
//! ### Replicated World
//! The server sends a keyframe on join and every few ticks, and field deltas
//! in between. [`replica::ClientWorld`] applies a delta only when it builds on
//! the tick the client already has, so a lost packet costs at most one
//! keyframe interval of staleness.
//!
//! ### Observer Hooks
//! Each applied change is reported through [`replica::ReplicaObserver`]:
//! countdown text, winner, lives and knockback percentage (old and new),
//! bomb holder, and explosions with their knockback arcs rebuilt locally from
//! the same shared calculator the server used.
//!
//! ### Local Prediction
//! Only the aim preview is predicted. [`trajectory::TrajectoryPredictor`]
//! runs the shared bomb flight step forward from the replicated bomb,
//! including speculative bounces, to draw the path and landing markers.
//!
//! ## Module Organization
//!
//! - `replica`: replicated snapshot, delta application and hooks
//! - `hud`: HUD state built from the hooks
//! - `trajectory`: throw preview
//! - `input`: key sampling, edge detection and command sequencing
//! - `network`: UDP socket on a background tokio runtime, bridged by channels
//! - `rendering`: top-down macroquad debug view
//! - `app`: the frame loop tying the above together
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::app::App;
//! use client::network::NetworkHandle;
//! use shared::config::GameConfig;
//!
//! #[macroquad::main("Bomb Party")]
//! async fn main() {
//!     let network = NetworkHandle::spawn("127.0.0.1:8080", 0).unwrap();
//!     let app = App::new(&GameConfig::default(), 800, 600, 0).unwrap();
//!     app.run(network).await;
//! }
//! ```

pub mod app;
pub mod hud;
pub mod input;
pub mod network;
pub mod rendering;
pub mod replica;
pub mod trajectory;

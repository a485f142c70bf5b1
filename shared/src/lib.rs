//! # Shared simulation core
//!
//! Code that the authoritative server and every client must agree on:
//! configuration tables, entity handles, the timer queue, bomb flight
//! physics, the knockback arc calculator, the replication diff format and the
//! wire protocol.
//!
//! Anything in here must be deterministic. The server runs it to decide what
//! happens; clients run the same functions to preview throws and to redraw
//! knockback arcs from replicated positions and percentages.

pub mod ballistics;
pub mod config;
pub mod entity;
pub mod knockback;
pub mod replication;
pub mod timer;

pub use ballistics::{launch_velocity, step_flight, Contact, FlightBody, ThrowType};
pub use config::GameConfig;
pub use entity::{Arena, EntityId};
pub use knockback::{calculate_arc, KnockbackArcData};
pub use replication::{
    diff, BombPhase, BombSnapshot, ExplosionRecord, FieldChange, HoldSide, LifeStatus,
    PlayerSnapshot, RoundPhase, VictimRecord, WorldSnapshot,
};
pub use timer::{Scheduler, SimTime, TimerToken};

use glam::Vec3;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_PLAYERS: usize = 4;
/// Receive buffer size; a full four-player snapshot is well under this
pub const MAX_PACKET_SIZE: usize = 4096;
/// Full snapshots are sent this often so clients recover from lost deltas
pub const KEYFRAME_INTERVAL: u32 = 30;

/// Discrete player actions, validated by the server before they take effect
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PlayerCommand {
    /// Desired horizontal movement on the XZ plane, each axis in `[-1, 1]`
    Move { x: f32, z: f32, jump: bool },
    Throw {
        direction: Vec3,
        throw_type: ThrowType,
    },
    SwapHoldSide,
    ToggleThrowType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandInput {
    pub sequence: u32,
    pub timestamp: u64,
    pub command: PlayerCommand,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Command {
        sequence: u32,
        timestamp: u64,
        command: PlayerCommand,
    },
    Disconnect,

    /// Carries the match rules so client-side arcs and previews use the
    /// server's numbers
    Connected {
        client_id: u32,
        player: EntityId,
        config: GameConfig,
    },
    Snapshot {
        snapshot: WorldSnapshot,
    },
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

/// Yaw in radians for a horizontal direction, 0 facing +Z
pub fn yaw_of(direction: Vec3) -> Option<f32> {
    if direction.x.abs() < f32::EPSILON && direction.z.abs() < f32::EPSILON {
        None
    } else {
        Some(direction.x.atan2(direction.z))
    }
}

/// Rotates a rig-local offset by a yaw angle around +Y
pub fn rotate_by_yaw(offset: Vec3, yaw: f32) -> Vec3 {
    let (sin, cos) = yaw.sin_cos();
    Vec3::new(
        offset.x * cos + offset.z * sin,
        offset.y,
        -offset.x * sin + offset.z * cos,
    )
}

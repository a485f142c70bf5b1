//! Replicated world state and per-tick change lists
//!
//! The server builds a [`WorldSnapshot`] every tick and sends clients the
//! [`FieldChange`]s between consecutive snapshots. Clients apply each change
//! to their copy and fire the matching presentation hook, which replaces
//! implicit variable-sync callbacks with an explicit, testable diff.

use crate::ballistics::ThrowType;
use crate::entity::EntityId;
use glam::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoundPhase {
    /// Waiting for enough players
    #[default]
    Lobby,
    Countdown,
    Active,
    Ending,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifeStatus {
    Alive,
    Respawning,
    Eliminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BombPhase {
    Held,
    InFlight,
    WaitingToExplode,
    Exploded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HoldSide {
    Left,
    #[default]
    Right,
}

impl HoldSide {
    pub fn other(self) -> Self {
        match self {
            HoldSide::Left => HoldSide::Right,
            HoldSide::Right => HoldSide::Left,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: EntityId,
    pub player_number: u8,
    pub position: Vec3,
    /// Yaw in radians, 0 facing +Z
    pub facing: f32,
    pub lives: u32,
    pub knockback_percentage: f32,
    pub status: LifeStatus,
    pub knocked_back: bool,
    pub dazed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BombSnapshot {
    pub position: Vec3,
    pub velocity: Vec3,
    pub phase: BombPhase,
    pub holder: Option<EntityId>,
    pub hold_side: HoldSide,
    pub countdown: f32,
    pub countdown_paused: bool,
    pub throw_type: ThrowType,
    pub bounce_count: u32,
}

/// One player caught by an explosion, with the inputs the server used
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VictimRecord {
    pub id: EntityId,
    pub position: Vec3,
    pub knockback_percentage: f32,
    pub was_holder: bool,
    pub sector: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplosionRecord {
    /// Increments once per explosion in the match
    pub sequence: u32,
    pub position: Vec3,
    pub victims: Vec<VictimRecord>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u32,
    pub round_phase: RoundPhase,
    /// Whole seconds left in the pre-round countdown
    pub round_countdown: Option<u32>,
    pub winner: Option<EntityId>,
    /// Sorted by id
    pub players: Vec<PlayerSnapshot>,
    pub bomb: Option<BombSnapshot>,
    pub last_explosion: Option<ExplosionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldChange {
    RoundPhase(RoundPhase),
    RoundCountdown(Option<u32>),
    Winner(Option<EntityId>),
    Explosion(ExplosionRecord),
    PlayerLeft(EntityId),
    PlayerJoined(PlayerSnapshot),
    PlayerMoved {
        id: EntityId,
        position: Vec3,
        facing: f32,
    },
    PlayerLives {
        id: EntityId,
        old: u32,
        new: u32,
    },
    PlayerPercentage {
        id: EntityId,
        old: f32,
        new: f32,
    },
    PlayerStatus {
        id: EntityId,
        status: LifeStatus,
        knocked_back: bool,
        dazed: bool,
    },
    BombSpawned(BombSnapshot),
    BombRemoved,
    BombMoved {
        position: Vec3,
        velocity: Vec3,
    },
    BombPhase(BombPhase),
    BombHolder {
        holder: Option<EntityId>,
        side: HoldSide,
    },
    BombCountdown {
        countdown: f32,
        paused: bool,
    },
    BombThrowType(ThrowType),
    BombBounces(u32),
}

impl WorldSnapshot {
    pub fn player(&self, id: EntityId) -> Option<&PlayerSnapshot> {
        self.players.iter().find(|p| p.id == id)
    }

    fn player_mut(&mut self, id: EntityId) -> Option<&mut PlayerSnapshot> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// Applies one change. Changes for unknown players are ignored.
    pub fn apply(&mut self, change: &FieldChange) {
        match change {
            FieldChange::RoundPhase(phase) => self.round_phase = *phase,
            FieldChange::RoundCountdown(countdown) => self.round_countdown = *countdown,
            FieldChange::Winner(winner) => self.winner = *winner,
            FieldChange::Explosion(record) => self.last_explosion = Some(record.clone()),
            FieldChange::PlayerLeft(id) => self.players.retain(|p| p.id != *id),
            FieldChange::PlayerJoined(player) => {
                self.players.retain(|p| p.id != player.id);
                self.players.push(player.clone());
                self.players.sort_by_key(|p| p.id);
            }
            FieldChange::PlayerMoved {
                id,
                position,
                facing,
            } => {
                if let Some(player) = self.player_mut(*id) {
                    player.position = *position;
                    player.facing = *facing;
                }
            }
            FieldChange::PlayerLives { id, new, .. } => {
                if let Some(player) = self.player_mut(*id) {
                    player.lives = *new;
                }
            }
            FieldChange::PlayerPercentage { id, new, .. } => {
                if let Some(player) = self.player_mut(*id) {
                    player.knockback_percentage = *new;
                }
            }
            FieldChange::PlayerStatus {
                id,
                status,
                knocked_back,
                dazed,
            } => {
                if let Some(player) = self.player_mut(*id) {
                    player.status = *status;
                    player.knocked_back = *knocked_back;
                    player.dazed = *dazed;
                }
            }
            FieldChange::BombSpawned(bomb) => self.bomb = Some(bomb.clone()),
            FieldChange::BombRemoved => self.bomb = None,
            FieldChange::BombMoved { position, velocity } => {
                if let Some(bomb) = self.bomb.as_mut() {
                    bomb.position = *position;
                    bomb.velocity = *velocity;
                }
            }
            FieldChange::BombPhase(phase) => {
                if let Some(bomb) = self.bomb.as_mut() {
                    bomb.phase = *phase;
                }
            }
            FieldChange::BombHolder { holder, side } => {
                if let Some(bomb) = self.bomb.as_mut() {
                    bomb.holder = *holder;
                    bomb.hold_side = *side;
                }
            }
            FieldChange::BombCountdown { countdown, paused } => {
                if let Some(bomb) = self.bomb.as_mut() {
                    bomb.countdown = *countdown;
                    bomb.countdown_paused = *paused;
                }
            }
            FieldChange::BombThrowType(throw_type) => {
                if let Some(bomb) = self.bomb.as_mut() {
                    bomb.throw_type = *throw_type;
                }
            }
            FieldChange::BombBounces(count) => {
                if let Some(bomb) = self.bomb.as_mut() {
                    bomb.bounce_count = *count;
                }
            }
        }
    }
}

/// Changes that turn `prev` into `next`, in apply order
pub fn diff(prev: &WorldSnapshot, next: &WorldSnapshot) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    if prev.round_phase != next.round_phase {
        changes.push(FieldChange::RoundPhase(next.round_phase));
    }
    if prev.round_countdown != next.round_countdown {
        changes.push(FieldChange::RoundCountdown(next.round_countdown));
    }
    if prev.winner != next.winner {
        changes.push(FieldChange::Winner(next.winner));
    }

    let new_explosion = match (&prev.last_explosion, &next.last_explosion) {
        (Some(old), Some(new)) => old.sequence != new.sequence,
        (None, Some(_)) => true,
        _ => false,
    };
    if new_explosion {
        if let Some(record) = &next.last_explosion {
            changes.push(FieldChange::Explosion(record.clone()));
        }
    }

    for old in &prev.players {
        if next.player(old.id).is_none() {
            changes.push(FieldChange::PlayerLeft(old.id));
        }
    }

    for player in &next.players {
        let Some(old) = prev.player(player.id) else {
            changes.push(FieldChange::PlayerJoined(player.clone()));
            continue;
        };
        diff_player(old, player, &mut changes);
    }

    match (&prev.bomb, &next.bomb) {
        (None, Some(bomb)) => changes.push(FieldChange::BombSpawned(bomb.clone())),
        (Some(_), None) => changes.push(FieldChange::BombRemoved),
        (Some(old), Some(new)) => diff_bomb(old, new, &mut changes),
        (None, None) => {}
    }

    changes
}

fn diff_player(old: &PlayerSnapshot, new: &PlayerSnapshot, changes: &mut Vec<FieldChange>) {
    if old.position != new.position || old.facing != new.facing {
        changes.push(FieldChange::PlayerMoved {
            id: new.id,
            position: new.position,
            facing: new.facing,
        });
    }
    if old.lives != new.lives {
        changes.push(FieldChange::PlayerLives {
            id: new.id,
            old: old.lives,
            new: new.lives,
        });
    }
    if old.knockback_percentage != new.knockback_percentage {
        changes.push(FieldChange::PlayerPercentage {
            id: new.id,
            old: old.knockback_percentage,
            new: new.knockback_percentage,
        });
    }
    if old.status != new.status || old.knocked_back != new.knocked_back || old.dazed != new.dazed
    {
        changes.push(FieldChange::PlayerStatus {
            id: new.id,
            status: new.status,
            knocked_back: new.knocked_back,
            dazed: new.dazed,
        });
    }
}

fn diff_bomb(old: &BombSnapshot, new: &BombSnapshot, changes: &mut Vec<FieldChange>) {
    if old.phase != new.phase {
        changes.push(FieldChange::BombPhase(new.phase));
    }
    if old.holder != new.holder || old.hold_side != new.hold_side {
        changes.push(FieldChange::BombHolder {
            holder: new.holder,
            side: new.hold_side,
        });
    }
    if old.position != new.position || old.velocity != new.velocity {
        changes.push(FieldChange::BombMoved {
            position: new.position,
            velocity: new.velocity,
        });
    }
    if old.countdown != new.countdown || old.countdown_paused != new.countdown_paused {
        changes.push(FieldChange::BombCountdown {
            countdown: new.countdown,
            paused: new.countdown_paused,
        });
    }
    if old.throw_type != new.throw_type {
        changes.push(FieldChange::BombThrowType(new.throw_type));
    }
    if old.bounce_count != new.bounce_count {
        changes.push(FieldChange::BombBounces(new.bounce_count));
    }
}

use crate::life::PlayerLife;
use glam::Vec3;
use shared::config::{ArenaConfig, PlayerConfig};
use shared::{rotate_by_yaw, yaw_of, EntityId, HoldSide, KnockbackArcData, LifeStatus, PlayerSnapshot};

/// Bodies this far below the floor no longer snap back onto it
const LEDGE_TOLERANCE: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColliderMode {
    /// Blocks other players and catches bombs
    Solid,
    /// Overlap-only; used while a player waits to respawn
    Trigger,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldSockets {
    pub left: Option<Vec3>,
    pub right: Option<Vec3>,
}

impl HoldSockets {
    pub fn from_config(config: &PlayerConfig) -> Self {
        Self {
            left: config.left_socket,
            right: config.right_socket,
        }
    }

    pub fn get(&self, side: HoldSide) -> Option<Vec3> {
        match side {
            HoldSide::Left => self.left,
            HoldSide::Right => self.right,
        }
    }
}

/// An in-progress knockback launch
#[derive(Debug, Clone)]
pub struct KnockbackFlight {
    pub arc: KnockbackArcData,
    pub elapsed: f32,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: EntityId,
    pub client_id: u32,
    pub player_number: u8,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Yaw in radians, 0 facing +Z
    pub facing: f32,
    pub grounded: bool,
    pub move_input: Vec3,
    pub jump_requested: bool,
    pub movement_enabled: bool,
    pub collider: ColliderMode,
    /// Kinematic bodies ignore gravity and input
    pub kinematic: bool,
    pub sockets: HoldSockets,
    pub knockback: Option<KnockbackFlight>,
    pub dazed_for: f32,
    pub life: PlayerLife,
}

impl Player {
    pub fn new(
        id: EntityId,
        client_id: u32,
        player_number: u8,
        position: Vec3,
        config: &PlayerConfig,
        life: PlayerLife,
    ) -> Self {
        Self {
            id,
            client_id,
            player_number,
            position,
            velocity: Vec3::ZERO,
            facing: 0.0,
            grounded: true,
            move_input: Vec3::ZERO,
            jump_requested: false,
            movement_enabled: true,
            collider: ColliderMode::Solid,
            kinematic: false,
            sockets: HoldSockets::from_config(config),
            knockback: None,
            dazed_for: 0.0,
            life,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.life.state == LifeStatus::Alive
    }

    pub fn is_knocked_back(&self) -> bool {
        self.knockback.is_some()
    }

    pub fn is_dazed(&self) -> bool {
        self.dazed_for > 0.0
    }

    pub fn body_center(&self, config: &PlayerConfig) -> Vec3 {
        self.position + Vec3::Y * (config.height * 0.5)
    }

    /// World position of a hold socket, or `None` if the rig lacks it
    pub fn socket_world_position(&self, side: HoldSide) -> Option<Vec3> {
        self.sockets
            .get(side)
            .map(|offset| self.position + rotate_by_yaw(offset, self.facing))
    }

    pub fn set_move_input(&mut self, x: f32, z: f32, jump: bool) {
        let x = if x.is_finite() { x } else { 0.0 };
        let z = if z.is_finite() { z } else { 0.0 };
        self.move_input = Vec3::new(x, 0.0, z).clamp_length_max(1.0);
        self.jump_requested |= jump;
    }

    pub fn face_towards(&mut self, direction: Vec3) {
        if let Some(yaw) = yaw_of(direction) {
            self.facing = yaw;
        }
    }

    pub fn start_knockback(&mut self, arc: KnockbackArcData) {
        self.position = arc.start_point;
        self.velocity = Vec3::ZERO;
        self.kinematic = true;
        self.grounded = false;
        self.dazed_for = 0.0;
        self.knockback = Some(KnockbackFlight { arc, elapsed: 0.0 });
    }

    /// Puts the body back into normal play at `position`
    pub fn reset_body(&mut self, position: Vec3) {
        self.position = position;
        self.velocity = Vec3::ZERO;
        self.grounded = true;
        self.move_input = Vec3::ZERO;
        self.jump_requested = false;
        self.knockback = None;
        self.dazed_for = 0.0;
        self.kinematic = false;
        self.movement_enabled = true;
        self.collider = ColliderMode::Solid;
    }

    /// Parks the body while it waits to respawn
    pub fn disable_body(&mut self) {
        self.velocity = Vec3::ZERO;
        self.move_input = Vec3::ZERO;
        self.jump_requested = false;
        self.knockback = None;
        self.dazed_for = 0.0;
        self.kinematic = true;
        self.movement_enabled = false;
        self.collider = ColliderMode::Trigger;
    }

    pub fn update_movement(
        &mut self,
        dt: f32,
        arena: &ArenaConfig,
        config: &PlayerConfig,
        landing_blend: f32,
    ) {
        if let Some(flight) = self.knockback.as_mut() {
            flight.elapsed += dt;
            let progress = if flight.arc.duration > 0.0 {
                (flight.elapsed / flight.arc.duration).min(1.0)
            } else {
                1.0
            };
            self.position = flight.arc.point_at(progress, landing_blend);

            if progress >= 1.0 {
                let daze_time = flight.arc.daze_time;
                self.knockback = None;
                self.kinematic = false;
                self.dazed_for = daze_time;
            }
            return;
        }

        if self.kinematic {
            return;
        }

        self.dazed_for = (self.dazed_for - dt).max(0.0);
        let can_steer = self.movement_enabled && !self.is_dazed();
        let steer = if can_steer { self.move_input } else { Vec3::ZERO };

        self.velocity.x = steer.x * config.move_speed;
        self.velocity.z = steer.z * config.move_speed;

        if can_steer && self.jump_requested && self.grounded {
            self.velocity.y = config.jump_velocity;
            self.grounded = false;
        }
        self.jump_requested = false;

        self.velocity.y -= arena.gravity * dt;
        self.position += self.velocity * dt;

        let on_floor = arena.on_platform(self.position)
            && self.position.y <= arena.floor_y
            && self.position.y >= arena.floor_y - LEDGE_TOLERANCE
            && self.velocity.y <= 0.0;
        if on_floor {
            self.position.y = arena.floor_y;
            self.velocity.y = 0.0;
            self.grounded = true;
        } else {
            self.grounded = false;
        }

        self.face_towards(steer);
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id,
            player_number: self.player_number,
            position: self.position,
            facing: self.facing,
            lives: self.life.current_lives,
            knockback_percentage: self.life.knockback_percentage(),
            status: self.life.state,
            knocked_back: self.is_knocked_back(),
            dazed: self.is_dazed(),
        }
    }
}

/// Pushes two overlapping solid players apart on the XZ plane
pub fn separate_players(a: &mut Player, b: &mut Player, radius: f32) {
    let blocking = |p: &Player| p.is_alive() && p.collider == ColliderMode::Solid && !p.kinematic;
    if !blocking(a) || !blocking(b) {
        return;
    }

    let offset = Vec3::new(b.position.x - a.position.x, 0.0, b.position.z - a.position.z);
    let distance = offset.length();
    let min_distance = radius * 2.0;
    if distance >= min_distance {
        return;
    }

    if distance < 0.001 {
        a.position.x -= radius;
        b.position.x += radius;
        return;
    }

    let normal = offset / distance;
    let separation = (min_distance - distance) * 0.5;
    a.position -= normal * separation;
    b.position += normal * separation;
}

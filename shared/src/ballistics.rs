//! Bomb flight physics shared by the server simulation and client previews
//!
//! The server advances the real bomb with these functions and every client
//! runs the same code for its aim preview, so a preview only diverges from
//! the authoritative flight when a player gets in the way.

use crate::config::{ArenaConfig, BombConfig, ThrowProfile};
use glam::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThrowType {
    /// Flat, fast throw
    #[default]
    Normal,
    /// High arc, slow horizontal speed
    Lob,
}

impl ThrowType {
    pub fn toggled(self) -> Self {
        match self {
            ThrowType::Normal => ThrowType::Lob,
            ThrowType::Lob => ThrowType::Normal,
        }
    }

    pub fn profile(self, config: &BombConfig) -> ThrowProfile {
        match self {
            ThrowType::Normal => config.normal_throw,
            ThrowType::Lob => config.lob_throw,
        }
    }
}

/// What a flying body touched during a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contact {
    /// Bounced off the platform
    Floor,
    /// Entered the out-of-bounds volume around the arena
    Boundary,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightBody {
    pub position: Vec3,
    pub velocity: Vec3,
    pub mass: f32,
}

impl ArenaConfig {
    /// True while a point is above the walkable platform footprint
    pub fn on_platform(&self, position: Vec3) -> bool {
        position.x.abs() <= self.half_extent_x && position.z.abs() <= self.half_extent_z
    }

    /// True once a point is inside the boundary volume or below the kill plane
    pub fn in_boundary(&self, position: Vec3) -> bool {
        position.x.abs() > self.half_extent_x + self.boundary_margin
            || position.z.abs() > self.half_extent_z + self.boundary_margin
            || position.y < self.kill_plane_y
    }
}

/// Initial velocity for a throw: `direction * speed + up * upward`
pub fn launch_velocity(direction: Vec3, throw_type: ThrowType, config: &BombConfig) -> Vec3 {
    let profile = throw_type.profile(config);
    direction.normalize_or_zero() * profile.speed + Vec3::Y * profile.upward
}

/// Number of equal substeps needed so no substep moves farther than `max_travel`
pub fn required_substeps(speed: f32, dt: f32, max_travel: f32) -> u32 {
    let travel = speed * dt;
    if max_travel > 0.0 && travel > max_travel {
        (travel / max_travel).ceil() as u32
    } else {
        1
    }
}

/// Advances a flying body by one substep and reports the first contact
pub fn step_flight(
    body: &mut FlightBody,
    arena: &ArenaConfig,
    bomb: &BombConfig,
    dt: f32,
) -> Option<Contact> {
    body.velocity.y -= arena.gravity * dt;
    let damping = (1.0 - (bomb.drag / body.mass) * dt).max(0.0);
    body.velocity *= damping;
    body.position += body.velocity * dt;

    if arena.in_boundary(body.position) {
        return Some(Contact::Boundary);
    }

    let floor_contact = arena.floor_y + bomb.radius;
    if arena.on_platform(body.position) && body.position.y <= floor_contact && body.velocity.y < 0.0
    {
        body.position.y = floor_contact;
        body.velocity.y = -body.velocity.y * bomb.restitution;
        body.velocity.x *= bomb.friction;
        body.velocity.z *= bomb.friction;
        return Some(Contact::Floor);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn flying(position: Vec3, velocity: Vec3) -> FlightBody {
        FlightBody {
            position,
            velocity,
            mass: 0.5,
        }
    }

    #[test]
    fn test_launch_velocity_uses_profile() {
        let config = BombConfig::default();
        let v = launch_velocity(Vec3::new(2.0, 0.0, 0.0), ThrowType::Normal, &config);
        assert_approx_eq!(v.x, config.normal_throw.speed, 1e-5);
        assert_approx_eq!(v.y, config.normal_throw.upward, 1e-5);
        assert_approx_eq!(v.z, 0.0, 1e-5);

        let lob = launch_velocity(Vec3::Z, ThrowType::Lob, &config);
        assert_approx_eq!(lob.z, config.lob_throw.speed, 1e-5);
        assert_approx_eq!(lob.y, config.lob_throw.upward, 1e-5);
    }

    #[test]
    fn test_zero_direction_throws_straight_up() {
        let config = BombConfig::default();
        let v = launch_velocity(Vec3::ZERO, ThrowType::Normal, &config);
        assert_eq!(v, Vec3::Y * config.normal_throw.upward);
    }

    #[test]
    fn test_toggle_round_trips() {
        assert_eq!(ThrowType::Normal.toggled(), ThrowType::Lob);
        assert_eq!(ThrowType::Lob.toggled().toggled(), ThrowType::Lob);
    }

    #[test]
    fn test_floor_bounce_reflects_and_damps() {
        let arena = ArenaConfig::default();
        let bomb = BombConfig::default();
        let mut body = flying(Vec3::new(0.0, bomb.radius + 0.01, 0.0), Vec3::new(4.0, -6.0, 0.0));

        let contact = step_flight(&mut body, &arena, &bomb, 1.0 / 60.0);

        assert_eq!(contact, Some(Contact::Floor));
        assert!(body.velocity.y > 0.0);
        assert!(body.velocity.x < 4.0);
        assert_approx_eq!(body.position.y, arena.floor_y + bomb.radius, 1e-5);
    }

    #[test]
    fn test_leaving_arena_hits_boundary() {
        let arena = ArenaConfig::default();
        let bomb = BombConfig::default();
        let edge = arena.half_extent_x + arena.boundary_margin;
        let mut body = flying(Vec3::new(edge - 0.01, 3.0, 0.0), Vec3::new(10.0, 0.0, 0.0));

        assert_eq!(
            step_flight(&mut body, &arena, &bomb, 1.0 / 30.0),
            Some(Contact::Boundary)
        );
    }

    #[test]
    fn test_no_floor_outside_platform() {
        let arena = ArenaConfig::default();
        let bomb = BombConfig::default();
        let x = arena.half_extent_x + 0.5;
        let mut body = flying(Vec3::new(x, 0.2, 0.0), Vec3::new(0.0, -3.0, 0.0));

        assert_eq!(step_flight(&mut body, &arena, &bomb, 1.0 / 60.0), None);
        assert!(body.position.y < 0.2);
    }

    #[test]
    fn test_required_substeps() {
        assert_eq!(required_substeps(10.0, 1.0 / 60.0, 0.25), 1);
        assert_eq!(required_substeps(32.0, 0.125, 1.0), 4);
        assert_eq!(required_substeps(32.0, 0.125, 0.0), 1);
    }
}

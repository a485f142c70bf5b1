//! Tunable game constants grouped per subsystem
//!
//! Every table derives serde with `#[serde(default)]`, so a JSON file only has
//! to mention the values it overrides. Defaults are the shipped tuning.

use glam::Vec3;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Launch parameters for one throw style
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThrowProfile {
    /// Horizontal speed along the aim direction
    pub speed: f32,
    /// Vertical speed added on top of the aim direction
    pub upward: f32,
}

/// Platform and world bounds shared by every moving body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub half_extent_x: f32,
    pub half_extent_z: f32,
    /// Height of the walkable platform surface
    pub floor_y: f32,
    /// Distance past the platform edge where the boundary volume begins
    pub boundary_margin: f32,
    /// Anything in flight below this height has left the arena
    pub kill_plane_y: f32,
    pub gravity: f32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            half_extent_x: 12.0,
            half_extent_z: 12.0,
            floor_y: 0.0,
            boundary_margin: 2.0,
            kill_plane_y: -6.0,
            gravity: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BombConfig {
    /// Countdown a freshly spawned bomb starts with
    pub fuse_time: f32,
    pub throw_cooldown: f32,
    pub normal_throw: ThrowProfile,
    pub lob_throw: ThrowProfile,
    pub base_mass: f32,
    /// Applied to the mass for the duration of a flight
    pub flight_mass_multiplier: f32,
    /// Linear drag; the effective deceleration is `drag / mass`
    pub drag: f32,
    pub restitution: f32,
    /// Horizontal speed kept after each floor bounce
    pub friction: f32,
    pub max_bounces: u32,
    pub ground_explosion_delay: f32,
    /// Countdown freeze after the bomb returns to its thrower off a boundary
    pub return_pause: f32,
    pub radius: f32,
    /// Distance from a player's body centre at which a flying bomb is caught
    pub catch_radius: f32,
    /// The thrower cannot catch their own throw for this long
    pub thrower_grace: f32,
}

impl Default for BombConfig {
    fn default() -> Self {
        Self {
            fuse_time: 20.0,
            throw_cooldown: 0.5,
            normal_throw: ThrowProfile {
                speed: 14.0,
                upward: 4.0,
            },
            lob_throw: ThrowProfile {
                speed: 8.0,
                upward: 10.0,
            },
            base_mass: 1.0,
            flight_mass_multiplier: 0.5,
            drag: 0.05,
            restitution: 0.45,
            friction: 0.7,
            max_bounces: 3,
            ground_explosion_delay: 1.0,
            return_pause: 1.5,
            radius: 0.35,
            catch_radius: 0.9,
            thrower_grace: 0.25,
        }
    }
}

/// Explosion falloff and percentage scaling
///
/// `sector_bounds` are the upper edges of the concentric bands in normalized
/// distance, innermost first, ending at 1.0. `sector_multipliers[i]` is the
/// strength at the inner edge of band `i`; past the last band the strength is 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnockbackConfig {
    pub explosion_radius: f32,
    pub base_distance: f32,
    pub base_height: f32,
    pub base_duration: f32,
    pub base_daze_time: f32,
    /// Extra distance for the player who was holding the bomb
    pub holder_bonus: f32,
    pub sector_bounds: Vec<f32>,
    pub sector_multipliers: Vec<f32>,
    /// Fraction of each band that keeps full strength before easing out
    pub sector_blend_start: f32,
    pub percentage_breakpoints: Vec<f32>,
    pub distance_bonus: Vec<f32>,
    pub height_bonus: Vec<f32>,
    pub duration_bonus: Vec<f32>,
    pub arc_sample_count: usize,
    /// Progress after which the arc switches to the soft-landing ease
    pub landing_blend: f32,
}

impl Default for KnockbackConfig {
    fn default() -> Self {
        let bonus = vec![0.0, 0.25, 0.5, 0.75, 1.0];
        Self {
            explosion_radius: 6.0,
            base_distance: 6.0,
            base_height: 2.5,
            base_duration: 0.6,
            base_daze_time: 0.5,
            holder_bonus: 1.5,
            sector_bounds: vec![0.7, 0.9, 1.0],
            sector_multipliers: vec![1.0, 0.7, 0.4],
            sector_blend_start: 0.75,
            percentage_breakpoints: vec![0.0, 87.5, 175.0, 262.5, 350.0],
            distance_bonus: bonus.clone(),
            height_bonus: bonus.clone(),
            duration_bonus: bonus,
            arc_sample_count: 20,
            landing_blend: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifeConfig {
    pub max_lives: u32,
    pub respawn_delay: f32,
    pub fall_threshold: f32,
    /// Backstop for bodies that tunnel past `fall_threshold` in one step
    pub absolute_fall_limit: f32,
    pub base_multiplier: f32,
    /// Multiplier growth per second of holding the bomb
    pub hold_factor: f32,
    /// Per-hit growth, squared
    pub hit_factor: f32,
    pub max_multiplier: f32,
}

impl Default for LifeConfig {
    fn default() -> Self {
        Self {
            max_lives: 3,
            respawn_delay: 3.0,
            fall_threshold: -5.0,
            absolute_fall_limit: -30.0,
            base_multiplier: 1.0,
            hold_factor: 0.15,
            hit_factor: 0.25,
            max_multiplier: 4.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundConfig {
    /// Players needed before the pre-round countdown starts
    pub min_players: usize,
    pub countdown_seconds: u32,
    pub bomb_respawn_delay: f32,
    pub ending_grace: f32,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            countdown_seconds: 3,
            bomb_respawn_delay: 2.0,
            ending_grace: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub move_speed: f32,
    pub jump_velocity: f32,
    pub radius: f32,
    pub height: f32,
    /// Rig-local hold socket offsets; `None` models a rig without that socket
    pub left_socket: Option<Vec3>,
    pub right_socket: Option<Vec3>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            move_speed: 7.0,
            jump_velocity: 8.0,
            radius: 0.5,
            height: 1.8,
            left_socket: Some(Vec3::new(-0.45, 1.1, 0.3)),
            right_socket: Some(Vec3::new(0.45, 1.1, 0.3)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    pub points: Vec<Vec3>,
    pub cooldown: f32,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        let ring = 8.0;
        let points = (0..8)
            .map(|i| {
                let angle = i as f32 * std::f32::consts::TAU / 8.0;
                Vec3::new(angle.cos() * ring, 0.0, angle.sin() * ring)
            })
            .collect();
        Self {
            points,
            cooldown: 4.0,
        }
    }
}

/// Full configuration for one match
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub arena: ArenaConfig,
    pub bomb: BombConfig,
    pub knockback: KnockbackConfig,
    pub life: LifeConfig,
    pub round: RoundConfig,
    pub player: PlayerConfig,
    pub spawn: SpawnConfig,
}

impl GameConfig {
    /// Reads a JSON configuration file and repairs inconsistent tables
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut config: GameConfig = serde_json::from_str(&text)?;
        config.validate();
        info!("Loaded game config from {}", path.display());
        Ok(config)
    }

    /// Fixes values that would break an invariant, logging each repair.
    ///
    /// Misconfiguration is a developer-facing problem; the match still runs
    /// with the defaults for the offending table.
    pub fn validate(&mut self) {
        let kb = &mut self.knockback;
        let bounds_ok = !kb.sector_bounds.is_empty()
            && kb.sector_bounds.len() == kb.sector_multipliers.len()
            && kb.sector_bounds.windows(2).all(|w| w[0] < w[1])
            && kb.sector_bounds.iter().all(|b| *b > 0.0 && *b <= 1.0);
        if !bounds_ok {
            error!("Invalid knockback sector table, falling back to defaults");
            let defaults = KnockbackConfig::default();
            kb.sector_bounds = defaults.sector_bounds;
            kb.sector_multipliers = defaults.sector_multipliers;
        }

        let curve_len = kb.percentage_breakpoints.len();
        let curves_ok = curve_len >= 2
            && kb.percentage_breakpoints.windows(2).all(|w| w[0] < w[1])
            && [&kb.distance_bonus, &kb.height_bonus, &kb.duration_bonus]
                .iter()
                .all(|curve| curve.len() == curve_len);
        if !curves_ok {
            error!("Invalid knockback bonus curves, falling back to defaults");
            let defaults = KnockbackConfig::default();
            kb.percentage_breakpoints = defaults.percentage_breakpoints;
            kb.distance_bonus = defaults.distance_bonus;
            kb.height_bonus = defaults.height_bonus;
            kb.duration_bonus = defaults.duration_bonus;
        }

        if kb.arc_sample_count < 2 {
            error!("arc_sample_count must be at least 2, got {}", kb.arc_sample_count);
            kb.arc_sample_count = 2;
        }
        kb.sector_blend_start = kb.sector_blend_start.clamp(0.0, 0.99);
        kb.landing_blend = kb.landing_blend.clamp(0.0, 0.99);
        if kb.explosion_radius <= 0.0 {
            error!("explosion_radius must be positive, got {}", kb.explosion_radius);
            kb.explosion_radius = KnockbackConfig::default().explosion_radius;
        }

        if self.spawn.points.is_empty() {
            error!("Spawn pool is empty, using the default ring");
            self.spawn.points = SpawnConfig::default().points;
        }

        if self.life.max_multiplier < self.life.base_multiplier {
            error!(
                "max_multiplier {} is below base_multiplier {}, clamping",
                self.life.max_multiplier, self.life.base_multiplier
            );
            self.life.max_multiplier = self.life.base_multiplier;
        }

        if self.bomb.base_mass <= 0.0 || self.bomb.flight_mass_multiplier <= 0.0 {
            error!("Bomb mass settings must be positive, using defaults");
            let defaults = BombConfig::default();
            self.bomb.base_mass = defaults.base_mass;
            self.bomb.flight_mass_multiplier = defaults.flight_mass_multiplier;
        }

        self.round.min_players = self.round.min_players.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let mut config = GameConfig::default();
        let before = config.clone();
        config.validate();
        assert_eq!(config, before);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "bomb": { "max_bounces": 5 }, "life": { "max_lives": 1 } }"#;
        let config: GameConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.bomb.max_bounces, 5);
        assert_eq!(config.bomb.fuse_time, BombConfig::default().fuse_time);
        assert_eq!(config.life.max_lives, 1);
        assert_eq!(config.knockback, KnockbackConfig::default());
    }

    #[test]
    fn test_validate_repairs_unsorted_sectors() {
        let mut config = GameConfig::default();
        config.knockback.sector_bounds = vec![0.9, 0.5, 1.0];
        config.validate();
        assert_eq!(
            config.knockback.sector_bounds,
            KnockbackConfig::default().sector_bounds
        );
    }

    #[test]
    fn test_validate_repairs_mismatched_curves() {
        let mut config = GameConfig::default();
        config.knockback.height_bonus = vec![0.0, 1.0];
        config.validate();
        assert_eq!(config.knockback.height_bonus.len(), 5);
    }

    #[test]
    fn test_validate_refills_empty_spawn_pool() {
        let mut config = GameConfig::default();
        config.spawn.points.clear();
        config.validate();
        assert_eq!(config.spawn.points.len(), 8);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        assert!(GameConfig::load("/definitely/not/here.json").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join("bomb_party_config_test.json");
        std::fs::write(&path, r#"{ "round": { "countdown_seconds": 5 } }"#).unwrap();

        let config = GameConfig::load(&path).unwrap();
        assert_eq!(config.round.countdown_seconds, 5);

        let _ = std::fs::remove_file(&path);
    }
}

//! Lives, deaths, respawn timers and the knockback multiplier
//!
//! Each player carries a [`PlayerLife`]. The [`PlayerLifeManager`] owns the
//! respawn timer queue and applies the rules that move a player between
//! `Alive`, `Respawning` and `Eliminated`.

use crate::player::Player;
use glam::Vec3;
use log::{debug, info, warn};
use shared::config::LifeConfig;
use shared::{EntityId, LifeStatus, Scheduler, SimTime, TimerToken};

/// Retry interval when no spawn point could be handed out
const RESPAWN_RETRY: SimTime = 0.25;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerLife {
    pub current_lives: u32,
    pub total_hold_time: f32,
    pub knockback_hit_count: u32,
    pub knockback_multiplier: f32,
    pub state: LifeStatus,
    pub is_dead: bool,
    pub is_disconnected: bool,
    respawn_timer: Option<TimerToken>,
}

impl PlayerLife {
    pub fn new(config: &LifeConfig) -> Self {
        Self {
            current_lives: config.max_lives,
            total_hold_time: 0.0,
            knockback_hit_count: 0,
            knockback_multiplier: config.base_multiplier,
            state: LifeStatus::Alive,
            is_dead: false,
            is_disconnected: false,
            respawn_timer: None,
        }
    }

    /// Replicated percentage; 1.0 multiplier is 0%
    pub fn knockback_percentage(&self) -> f32 {
        ((self.knockback_multiplier - 1.0) * 100.0).max(0.0)
    }

    pub fn respawn_pending(&self) -> bool {
        self.respawn_timer.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeathOutcome {
    /// Player was not alive; nothing changed
    Ignored,
    Respawning { respawn_at: SimTime, lives_left: u32 },
    Eliminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RespawnTimer {
    player: EntityId,
}

pub struct PlayerLifeManager {
    config: LifeConfig,
    timers: Scheduler<RespawnTimer>,
}

impl PlayerLifeManager {
    pub fn new(config: LifeConfig) -> Self {
        Self {
            config,
            timers: Scheduler::new(),
        }
    }

    pub fn config(&self) -> &LifeConfig {
        &self.config
    }

    pub fn new_life(&self) -> PlayerLife {
        PlayerLife::new(&self.config)
    }

    /// `min(cap, base * (1 + hold * holdFactor) * (1 + hits * hitFactor)^2)`
    pub fn multiplier_for(&self, total_hold_time: f32, hit_count: u32) -> f32 {
        let hold = 1.0 + total_hold_time * self.config.hold_factor;
        let hits = 1.0 + hit_count as f32 * self.config.hit_factor;
        (self.config.base_multiplier * hold * hits * hits).min(self.config.max_multiplier)
    }

    fn refresh_multiplier(&self, life: &mut PlayerLife) {
        life.knockback_multiplier = self.multiplier_for(life.total_hold_time, life.knockback_hit_count);
    }

    /// Adds bomb hold time for a live holder
    pub fn accumulate_hold_time(&self, player: &mut Player, dt: f32) {
        if player.life.state != LifeStatus::Alive || dt <= 0.0 {
            return;
        }
        player.life.total_hold_time += dt;
        self.refresh_multiplier(&mut player.life);
    }

    pub fn register_knockback_hit(&self, player: &mut Player) {
        if player.life.state != LifeStatus::Alive {
            return;
        }
        player.life.knockback_hit_count += 1;
        self.refresh_multiplier(&mut player.life);
        debug!(
            "Player {} took hit {}, multiplier now {:.2}",
            player.id, player.life.knockback_hit_count, player.life.knockback_multiplier
        );
    }

    /// Checks both fall limits; the absolute one also covers knockback flights
    pub fn has_fallen(&self, player: &Player) -> bool {
        if player.life.state != LifeStatus::Alive {
            return false;
        }
        let y = player.position.y;
        if y < self.config.absolute_fall_limit {
            return true;
        }
        !player.is_knocked_back() && y < self.config.fall_threshold
    }

    pub fn handle_death(&mut self, player: &mut Player, now: SimTime) -> DeathOutcome {
        if player.life.state != LifeStatus::Alive {
            return DeathOutcome::Ignored;
        }

        player.life.current_lives = player.life.current_lives.saturating_sub(1);
        player.disable_body();

        if player.life.current_lives == 0 {
            player.life.state = LifeStatus::Eliminated;
            player.life.is_dead = true;
            self.cancel_respawn(player);
            info!("Player {} eliminated", player.id);
            return DeathOutcome::Eliminated;
        }

        player.life.state = LifeStatus::Respawning;
        let respawn_at = now + self.config.respawn_delay as SimTime;
        self.cancel_respawn(player);
        player.life.respawn_timer = Some(self.timers.schedule(
            respawn_at,
            RespawnTimer { player: player.id },
        ));

        info!(
            "Player {} died, {} lives left, respawning at {:.2}",
            player.id, player.life.current_lives, respawn_at
        );
        DeathOutcome::Respawning {
            respawn_at,
            lives_left: player.life.current_lives,
        }
    }

    /// Players whose respawn delay has elapsed, in firing order
    pub fn due_respawns(&mut self, now: SimTime) -> Vec<EntityId> {
        self.timers
            .poll(now)
            .into_iter()
            .map(|timer| timer.player)
            .collect()
    }

    /// Returns a respawning player to play at `spawn_position`.
    ///
    /// Hold time and hits reset so the multiplier starts over.
    pub fn complete_respawn(&self, player: &mut Player, spawn_position: Vec3) -> bool {
        if player.life.state != LifeStatus::Respawning {
            warn!("Ignoring respawn for player {} in state {:?}", player.id, player.life.state);
            return false;
        }

        player.life.respawn_timer = None;
        player.life.state = LifeStatus::Alive;
        player.life.total_hold_time = 0.0;
        player.life.knockback_hit_count = 0;
        self.refresh_multiplier(&mut player.life);
        player.reset_body(spawn_position);

        info!("Player {} respawned at {:?}", player.id, spawn_position);
        true
    }

    /// Tries again shortly when no spawn position was available
    pub fn defer_respawn(&mut self, player: &mut Player, now: SimTime) {
        if player.life.state != LifeStatus::Respawning {
            return;
        }
        player.life.respawn_timer = Some(self.timers.schedule(
            now + RESPAWN_RETRY,
            RespawnTimer { player: player.id },
        ));
    }

    /// Drops any pending respawn for a player being torn down
    pub fn forget(&mut self, player: &mut Player) {
        self.cancel_respawn(player);
    }

    fn cancel_respawn(&mut self, player: &mut Player) {
        if let Some(token) = player.life.respawn_timer.take() {
            self.timers.cancel(token);
        }
    }

    pub fn pending_respawns(&self) -> usize {
        self.timers.pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::config::GameConfig;

    fn setup() -> (PlayerLifeManager, Player) {
        let config = GameConfig::default();
        let manager = PlayerLifeManager::new(config.life.clone());
        let player = Player::new(
            EntityId { index: 0, generation: 1 },
            1,
            1,
            Vec3::ZERO,
            &config.player,
            manager.new_life(),
        );
        (manager, player)
    }

    #[test]
    fn test_fresh_life_has_base_multiplier() {
        let (manager, player) = setup();
        assert_eq!(player.life.current_lives, manager.config().max_lives);
        assert_eq!(player.life.knockback_multiplier, 1.0);
        assert_eq!(player.life.knockback_percentage(), 0.0);
    }

    #[test]
    fn test_multiplier_formula_and_cap() {
        let (manager, _) = setup();
        // 1 * (1 + 2 * 0.15) * (1 + 2 * 0.25)^2 = 1.3 * 2.25
        assert_approx_eq!(manager.multiplier_for(2.0, 2), 2.925, 1e-5);
        assert_eq!(manager.multiplier_for(1000.0, 50), manager.config().max_multiplier);
    }

    #[test]
    fn test_multiplier_never_decreases_while_alive() {
        let (manager, mut player) = setup();
        let mut last = player.life.knockback_multiplier;
        for i in 0..200 {
            if i % 7 == 0 {
                manager.register_knockback_hit(&mut player);
            } else {
                manager.accumulate_hold_time(&mut player, 0.1);
            }
            assert!(player.life.knockback_multiplier >= last);
            assert!(player.life.knockback_multiplier <= manager.config().max_multiplier);
            last = player.life.knockback_multiplier;
        }
        assert_approx_eq!(player.life.knockback_percentage(), 350.0, 1e-3);
    }

    #[test]
    fn test_death_schedules_respawn() {
        let (mut manager, mut player) = setup();
        let outcome = manager.handle_death(&mut player, 10.0);

        assert_eq!(
            outcome,
            DeathOutcome::Respawning {
                respawn_at: 13.0,
                lives_left: 2
            }
        );
        assert_eq!(player.life.state, LifeStatus::Respawning);
        assert!(player.kinematic);
        assert!(!player.movement_enabled);

        assert!(manager.due_respawns(12.9).is_empty());
        assert_eq!(manager.due_respawns(13.0), vec![player.id]);
    }

    #[test]
    fn test_second_death_while_respawning_is_ignored() {
        let (mut manager, mut player) = setup();
        manager.handle_death(&mut player, 0.0);
        assert_eq!(manager.handle_death(&mut player, 0.5), DeathOutcome::Ignored);
        assert_eq!(player.life.current_lives, 2);
        assert_eq!(manager.pending_respawns(), 1);
    }

    #[test]
    fn test_last_life_eliminates() {
        let (mut manager, mut player) = setup();
        player.life.current_lives = 1;

        assert_eq!(manager.handle_death(&mut player, 0.0), DeathOutcome::Eliminated);
        assert_eq!(player.life.state, LifeStatus::Eliminated);
        assert!(player.life.is_dead);
        assert_eq!(manager.pending_respawns(), 0);
    }

    #[test]
    fn test_respawn_resets_accumulators() {
        let (mut manager, mut player) = setup();
        manager.accumulate_hold_time(&mut player, 5.0);
        manager.register_knockback_hit(&mut player);
        manager.handle_death(&mut player, 0.0);

        let spawn = Vec3::new(3.0, 0.0, 3.0);
        assert!(manager.complete_respawn(&mut player, spawn));
        assert_eq!(player.life.state, LifeStatus::Alive);
        assert_eq!(player.life.total_hold_time, 0.0);
        assert_eq!(player.life.knockback_hit_count, 0);
        assert_eq!(player.life.knockback_multiplier, 1.0);
        assert_eq!(player.position, spawn);
        assert!(!player.kinematic);
    }

    #[test]
    fn test_forget_cancels_pending_respawn() {
        let (mut manager, mut player) = setup();
        manager.handle_death(&mut player, 0.0);
        manager.forget(&mut player);
        assert!(manager.due_respawns(100.0).is_empty());
    }

    #[test]
    fn test_fall_thresholds() {
        let (manager, mut player) = setup();
        player.position.y = -4.9;
        assert!(!manager.has_fallen(&player));
        player.position.y = -5.1;
        assert!(manager.has_fallen(&player));

        // Mid-flight only the absolute limit applies
        let arc = shared::calculate_arc(
            &shared::config::KnockbackConfig::default(),
            Vec3::ZERO,
            Vec3::X,
            0.0,
            false,
        );
        player.start_knockback(arc);
        player.position.y = -10.0;
        assert!(!manager.has_fallen(&player));
        player.position.y = -31.0;
        assert!(manager.has_fallen(&player));
    }
}

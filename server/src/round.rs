//! Round lifecycle
//!
//! `Lobby -> Countdown -> Active -> Ending -> Terminated`. The orchestrator
//! only tracks player ids; it reads lives through [`RosterView`] and reports
//! what the match should do as [`RoundEvent`]s.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use shared::config::RoundConfig;
use shared::{EntityId, RoundPhase, Scheduler, SimTime, TimerToken};

/// Retry interval while nobody can take a freshly spawned bomb
const BOMB_SPAWN_RETRY: SimTime = 0.5;

/// Read-only view of the players the round is tracking
pub trait RosterView {
    /// Lives left, or `None` once the player no longer exists
    fn lives(&self, id: EntityId) -> Option<u32>;
    fn can_hold_bomb(&self, id: EntityId) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundEvent {
    CountdownTick { remaining: u32 },
    CountdownCancelled,
    RoundStarted,
    SpawnBomb { holder: EntityId },
    Winner(EntityId),
    NoWinner,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundTimer {
    CountdownTick { remaining: u32 },
    BombRespawn,
    EndGrace,
}

pub struct RoundOrchestrator {
    config: RoundConfig,
    phase: RoundPhase,
    players: Vec<EntityId>,
    game_active: bool,
    countdown: Option<u32>,
    winner: Option<EntityId>,
    winner_declared: bool,
    timers: Scheduler<RoundTimer>,
    countdown_timer: Option<TimerToken>,
    bomb_respawn_timer: Option<TimerToken>,
    rng: StdRng,
    events: Vec<RoundEvent>,
}

impl RoundOrchestrator {
    pub fn new(config: RoundConfig, rng: StdRng) -> Self {
        Self {
            config,
            phase: RoundPhase::Lobby,
            players: Vec::new(),
            game_active: false,
            countdown: None,
            winner: None,
            winner_declared: false,
            timers: Scheduler::new(),
            countdown_timer: None,
            bomb_respawn_timer: None,
            rng,
            events: Vec::new(),
        }
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn is_game_active(&self) -> bool {
        self.game_active
    }

    pub fn countdown(&self) -> Option<u32> {
        self.countdown
    }

    pub fn winner(&self) -> Option<EntityId> {
        self.winner
    }

    pub fn players(&self) -> &[EntityId] {
        &self.players
    }

    pub fn is_registered(&self, id: EntityId) -> bool {
        self.players.contains(&id)
    }

    /// Joining is only possible before the round goes live
    pub fn accepts_players(&self) -> bool {
        matches!(self.phase, RoundPhase::Lobby | RoundPhase::Countdown)
    }

    pub fn bomb_respawn_pending(&self) -> bool {
        self.bomb_respawn_timer.is_some()
    }

    pub fn take_events(&mut self) -> Vec<RoundEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn register_player(&mut self, id: EntityId, now: SimTime) -> bool {
        if !self.accepts_players() {
            warn!("Rejecting player {} during {:?}", id, self.phase);
            return false;
        }
        if self.is_registered(id) {
            return false;
        }

        self.players.push(id);
        info!("Player {} joined the round ({} players)", id, self.players.len());

        if self.phase == RoundPhase::Lobby && self.players.len() >= self.config.min_players {
            self.start_countdown(now);
        }
        true
    }

    pub fn unregister_player(&mut self, id: EntityId, now: SimTime, roster: &impl RosterView) {
        let before = self.players.len();
        self.players.retain(|&p| p != id);
        if self.players.len() == before {
            return;
        }
        info!("Player {} left the round ({} players)", id, self.players.len());

        if self.phase == RoundPhase::Countdown && self.players.len() < self.config.min_players {
            self.cancel_countdown();
        }
        self.check_win(now, roster);
    }

    /// Declares a winner once exactly one registered player has lives left
    pub fn check_win(&mut self, now: SimTime, roster: &impl RosterView) {
        self.players.retain(|&id| roster.lives(id).is_some());

        if self.phase != RoundPhase::Active || self.winner_declared {
            return;
        }

        let remaining: Vec<EntityId> = self
            .players
            .iter()
            .copied()
            .filter(|&id| roster.lives(id).unwrap_or(0) > 0)
            .collect();

        match remaining.as_slice() {
            [winner] => self.declare_result(Some(*winner), now),
            [] => self.declare_result(None, now),
            _ => {}
        }
    }

    /// Schedules the next bomb unless the round already ended
    pub fn on_bomb_exploded(&mut self, now: SimTime) {
        if !self.game_active {
            debug!("Bomb exploded after the round ended, no respawn");
            return;
        }
        if let Some(token) = self.bomb_respawn_timer.take() {
            self.timers.cancel(token);
        }
        self.bomb_respawn_timer = Some(self.timers.schedule(
            now + self.config.bomb_respawn_delay as SimTime,
            RoundTimer::BombRespawn,
        ));
    }

    /// Random registered player able to take the bomb right now
    pub fn pick_holder(&mut self, roster: &impl RosterView) -> Option<EntityId> {
        let candidates: Vec<EntityId> = self
            .players
            .iter()
            .copied()
            .filter(|&id| roster.can_hold_bomb(id))
            .collect();
        candidates.choose(&mut self.rng).copied()
    }

    pub fn tick(&mut self, now: SimTime, roster: &impl RosterView) {
        for timer in self.timers.poll(now) {
            match timer {
                RoundTimer::CountdownTick { remaining } => {
                    self.countdown_timer = None;
                    if remaining == 0 {
                        self.start_round(now, roster);
                    } else {
                        self.countdown = Some(remaining);
                        self.events.push(RoundEvent::CountdownTick { remaining });
                        self.schedule_countdown_tick(now, remaining - 1);
                    }
                }
                RoundTimer::BombRespawn => {
                    self.bomb_respawn_timer = None;
                    if self.game_active {
                        self.spawn_bomb(now, roster);
                    } else {
                        debug!("Skipping bomb respawn, round is over");
                    }
                }
                RoundTimer::EndGrace => {
                    self.phase = RoundPhase::Terminated;
                    self.events.push(RoundEvent::Shutdown);
                    info!("Round terminated");
                }
            }
        }
    }

    fn start_countdown(&mut self, now: SimTime) {
        let seconds = self.config.countdown_seconds;
        self.phase = RoundPhase::Countdown;
        self.countdown = Some(seconds);
        self.events.push(RoundEvent::CountdownTick { remaining: seconds });
        info!("Round starts in {} seconds", seconds);
        self.schedule_countdown_tick(now, seconds.saturating_sub(1));
    }

    fn schedule_countdown_tick(&mut self, now: SimTime, remaining: u32) {
        self.countdown_timer = Some(
            self.timers
                .schedule(now + 1.0, RoundTimer::CountdownTick { remaining }),
        );
    }

    fn cancel_countdown(&mut self) {
        if let Some(token) = self.countdown_timer.take() {
            self.timers.cancel(token);
        }
        self.phase = RoundPhase::Lobby;
        self.countdown = None;
        self.events.push(RoundEvent::CountdownCancelled);
        info!("Not enough players, countdown cancelled");
    }

    fn start_round(&mut self, now: SimTime, roster: &impl RosterView) {
        self.players.retain(|&id| roster.lives(id).is_some());
        if self.players.len() < self.config.min_players {
            self.cancel_countdown();
            return;
        }

        self.phase = RoundPhase::Active;
        self.game_active = true;
        self.countdown = None;
        self.events.push(RoundEvent::RoundStarted);
        info!("Round started with {} players", self.players.len());
        self.spawn_bomb(now, roster);
    }

    fn spawn_bomb(&mut self, now: SimTime, roster: &impl RosterView) {
        match self.pick_holder(roster) {
            Some(holder) => {
                info!("Spawning bomb on player {}", holder);
                self.events.push(RoundEvent::SpawnBomb { holder });
            }
            None => {
                debug!("Nobody can take the bomb yet, retrying");
                self.bomb_respawn_timer = Some(
                    self.timers
                        .schedule(now + BOMB_SPAWN_RETRY, RoundTimer::BombRespawn),
                );
            }
        }
    }

    fn declare_result(&mut self, winner: Option<EntityId>, now: SimTime) {
        self.winner_declared = true;
        self.game_active = false;
        self.winner = winner;
        self.phase = RoundPhase::Ending;
        if let Some(token) = self.bomb_respawn_timer.take() {
            self.timers.cancel(token);
        }

        match winner {
            Some(id) => {
                info!("Player {} wins the round", id);
                self.events.push(RoundEvent::Winner(id));
            }
            None => {
                info!("Round ended with no winner");
                self.events.push(RoundEvent::NoWinner);
            }
        }

        self.timers.schedule(
            now + self.config.ending_grace as SimTime,
            RoundTimer::EndGrace,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeRoster {
        lives: HashMap<EntityId, u32>,
        respawning: Vec<EntityId>,
    }

    impl RosterView for FakeRoster {
        fn lives(&self, id: EntityId) -> Option<u32> {
            self.lives.get(&id).copied()
        }

        fn can_hold_bomb(&self, id: EntityId) -> bool {
            self.lives.get(&id).is_some_and(|&l| l > 0) && !self.respawning.contains(&id)
        }
    }

    fn id(index: u32) -> EntityId {
        EntityId {
            index,
            generation: 1,
        }
    }

    fn orchestrator() -> RoundOrchestrator {
        RoundOrchestrator::new(RoundConfig::default(), StdRng::seed_from_u64(42))
    }

    fn started_round(count: u32) -> (RoundOrchestrator, FakeRoster, SimTime) {
        let mut round = orchestrator();
        let mut roster = FakeRoster::default();
        for i in 0..count {
            roster.lives.insert(id(i), 3);
            assert!(round.register_player(id(i), 0.0));
        }
        let mut now = 0.0;
        while round.phase() != RoundPhase::Active {
            now += 0.5;
            round.tick(now, &roster);
            assert!(now < 10.0, "round never started");
        }
        (round, roster, now)
    }

    #[test]
    fn test_countdown_starts_at_min_players() {
        let mut round = orchestrator();
        let roster = FakeRoster::default();
        round.register_player(id(0), 0.0);
        assert_eq!(round.phase(), RoundPhase::Lobby);

        round.register_player(id(1), 0.0);
        assert_eq!(round.phase(), RoundPhase::Countdown);
        assert_eq!(round.countdown(), Some(3));

        round.tick(1.0, &roster);
        assert_eq!(round.countdown(), Some(2));
        round.tick(2.0, &roster);
        assert_eq!(round.countdown(), Some(1));

        let events = round.take_events();
        assert_eq!(
            events,
            vec![
                RoundEvent::CountdownTick { remaining: 3 },
                RoundEvent::CountdownTick { remaining: 2 },
                RoundEvent::CountdownTick { remaining: 1 },
            ]
        );
    }

    #[test]
    fn test_round_start_spawns_bomb_on_registered_player() {
        let (mut round, _roster, _) = started_round(3);
        assert!(round.is_game_active());

        let events = round.take_events();
        assert!(events.contains(&RoundEvent::RoundStarted));
        let holder = events.iter().find_map(|e| match e {
            RoundEvent::SpawnBomb { holder } => Some(*holder),
            _ => None,
        });
        assert!(holder.is_some_and(|h| round.is_registered(h)));
    }

    #[test]
    fn test_leaving_during_countdown_returns_to_lobby() {
        let mut round = orchestrator();
        let mut roster = FakeRoster::default();
        roster.lives.insert(id(0), 3);
        round.register_player(id(0), 0.0);
        round.register_player(id(1), 0.0);

        round.unregister_player(id(1), 0.5, &roster);
        assert_eq!(round.phase(), RoundPhase::Lobby);
        assert_eq!(round.countdown(), None);

        round.tick(5.0, &roster);
        assert_eq!(round.phase(), RoundPhase::Lobby);
    }

    #[test]
    fn test_joining_active_round_rejected() {
        let (mut round, _roster, now) = started_round(2);
        assert!(!round.register_player(id(9), now));
        assert!(!round.is_registered(id(9)));
    }

    #[test]
    fn test_single_winner_after_three_eliminations() {
        let (mut round, mut roster, now) = started_round(4);
        round.take_events();

        for i in 0..3 {
            roster.lives.insert(id(i), 0);
            round.unregister_player(id(i), now, &roster);
            roster.lives.remove(&id(i));
            if i < 2 {
                assert!(round.is_game_active());
            }
        }

        assert!(!round.is_game_active());
        assert_eq!(round.phase(), RoundPhase::Ending);
        assert_eq!(round.winner(), Some(id(3)));

        let winners: Vec<_> = round
            .take_events()
            .into_iter()
            .filter(|e| matches!(e, RoundEvent::Winner(_)))
            .collect();
        assert_eq!(winners, vec![RoundEvent::Winner(id(3))]);

        // Re-checking never declares twice
        round.check_win(now, &roster);
        assert!(round.take_events().is_empty());
    }

    #[test]
    fn test_explosion_after_round_end_skips_respawn() {
        let (mut round, mut roster, now) = started_round(2);
        roster.lives.insert(id(0), 0);
        round.unregister_player(id(0), now, &roster);
        assert!(!round.is_game_active());

        round.on_bomb_exploded(now);
        assert!(!round.bomb_respawn_pending());
    }

    #[test]
    fn test_bomb_respawn_after_delay() {
        let (mut round, roster, now) = started_round(2);
        round.take_events();

        round.on_bomb_exploded(now);
        assert!(round.bomb_respawn_pending());

        round.tick(now + 1.0, &roster);
        assert!(round.take_events().is_empty());

        round.tick(now + 2.0, &roster);
        let events = round.take_events();
        assert!(matches!(events.as_slice(), [RoundEvent::SpawnBomb { .. }]));
    }

    #[test]
    fn test_pending_bomb_respawn_rechecks_active_flag() {
        let (mut round, mut roster, now) = started_round(2);
        round.on_bomb_exploded(now);

        roster.lives.insert(id(1), 0);
        round.unregister_player(id(1), now + 0.5, &roster);
        round.take_events();

        round.tick(now + 5.0, &roster);
        assert!(!round
            .take_events()
            .iter()
            .any(|e| matches!(e, RoundEvent::SpawnBomb { .. })));
    }

    #[test]
    fn test_bomb_respawn_waits_for_eligible_holder() {
        let (mut round, mut roster, now) = started_round(2);
        round.take_events();
        roster.respawning = vec![id(0), id(1)];

        round.on_bomb_exploded(now);
        round.tick(now + 2.0, &roster);
        assert!(round.take_events().is_empty());
        assert!(round.bomb_respawn_pending());

        roster.respawning.clear();
        round.tick(now + 2.5, &roster);
        assert!(matches!(
            round.take_events().as_slice(),
            [RoundEvent::SpawnBomb { .. }]
        ));
    }

    #[test]
    fn test_ending_grace_terminates() {
        let (mut round, mut roster, now) = started_round(2);
        roster.lives.remove(&id(0));
        round.unregister_player(id(0), now, &roster);
        round.take_events();

        round.tick(now + 4.9, &roster);
        assert_eq!(round.phase(), RoundPhase::Ending);
        round.tick(now + 5.0, &roster);
        assert_eq!(round.phase(), RoundPhase::Terminated);
        assert_eq!(round.take_events(), vec![RoundEvent::Shutdown]);
    }
}

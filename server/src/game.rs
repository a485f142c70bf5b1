use crate::bomb::{Bomb, BombEvent, ThrowOutcome};
use crate::life::{DeathOutcome, PlayerLifeManager};
use crate::player::{separate_players, Player};
use crate::round::{RosterView, RoundEvent, RoundOrchestrator};
use crate::spawn::SpawnAllocator;
use glam::Vec3;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::config::GameConfig;
use shared::{
    calculate_arc, rotate_by_yaw, Arena, EntityId, ExplosionRecord, PlayerCommand, RoundPhase,
    SimTime, VictimRecord, WorldSnapshot, MAX_PLAYERS,
};

/// Things the network layer has to tell clients about
#[derive(Debug, Clone, PartialEq)]
pub enum MatchEvent {
    RoundOver { winner: Option<EntityId> },
    PlayerEliminated(EntityId),
    Shutdown,
}

struct Roster<'a>(&'a Arena<Player>);

impl RosterView for Roster<'_> {
    fn lives(&self, id: EntityId) -> Option<u32> {
        self.0.get(id).map(|player| player.life.current_lives)
    }

    fn can_hold_bomb(&self, id: EntityId) -> bool {
        self.0.get(id).is_some_and(|player| player.is_alive())
    }
}

/// One authoritative match: every player, the bomb and the round around them
pub struct Match {
    config: GameConfig,
    now: SimTime,
    tick: u32,
    players: Arena<Player>,
    bomb: Option<Bomb>,
    spawns: SpawnAllocator,
    lives: PlayerLifeManager,
    round: RoundOrchestrator,
    explosion_sequence: u32,
    last_explosion: Option<ExplosionRecord>,
    events: Vec<MatchEvent>,
}

impl Match {
    pub fn new(config: GameConfig, seed: u64) -> Self {
        let spawns = SpawnAllocator::new(&config.spawn, StdRng::seed_from_u64(seed));
        let round = RoundOrchestrator::new(
            config.round.clone(),
            StdRng::seed_from_u64(seed.wrapping_add(1)),
        );
        let lives = PlayerLifeManager::new(config.life.clone());

        Self {
            config,
            now: 0.0,
            tick: 0,
            players: Arena::new(),
            bomb: None,
            spawns,
            lives,
            round,
            explosion_sequence: 0,
            last_explosion: None,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn tick_count(&self) -> u32 {
        self.tick
    }

    pub fn players(&self) -> &Arena<Player> {
        &self.players
    }

    pub fn player(&self, id: EntityId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn player_mut(&mut self, id: EntityId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    pub fn bomb(&self) -> Option<&Bomb> {
        self.bomb.as_ref()
    }

    pub fn round(&self) -> &RoundOrchestrator {
        &self.round
    }

    pub fn last_explosion(&self) -> Option<&ExplosionRecord> {
        self.last_explosion.as_ref()
    }

    pub fn take_events(&mut self) -> Vec<MatchEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn add_player(&mut self, client_id: u32) -> Option<EntityId> {
        if self.players.len() >= MAX_PLAYERS {
            warn!("Match is full, rejecting client {}", client_id);
            return None;
        }
        if !self.round.accepts_players() {
            warn!("Round in progress, rejecting client {}", client_id);
            return None;
        }

        let number = (1..=MAX_PLAYERS as u8)
            .find(|n| !self.players.iter().any(|(_, p)| p.player_number == *n))?;
        let position = self.spawns.choose_spawn(self.now)?;
        let life = self.lives.new_life();
        let player_config = &self.config.player;

        let id = self.players.insert_with(|id| {
            let mut player = Player::new(id, client_id, number, position, player_config, life);
            player.face_towards(-position);
            player
        });

        info!(
            "Added player {} (client {}, P{}) at {:?}",
            id, client_id, number, position
        );
        self.round.register_player(id, self.now);
        self.drain_round_events();
        Some(id)
    }

    /// Tears a player down after a disconnect
    pub fn remove_player(&mut self, id: EntityId) -> bool {
        let Some(player) = self.players.get_mut(id) else {
            return false;
        };
        player.life.is_disconnected = true;
        self.lives.forget(player);

        if let Some(bomb) = self.bomb.as_mut() {
            if bomb.holder() == Some(id) {
                bomb.release();
            }
        }

        self.round
            .unregister_player(id, self.now, &Roster(&self.players));
        self.players.remove(id);
        info!("Removed player {}", id);

        self.drain_round_events();
        true
    }

    /// Applies a client command after checking it against current state
    pub fn apply_command(&mut self, id: EntityId, command: PlayerCommand) {
        let Some(player) = self.players.get_mut(id) else {
            debug!("Command for unknown player {}", id);
            return;
        };
        if !player.is_alive() {
            debug!("Ignoring {:?} from player {} who is not alive", command, id);
            return;
        }

        match command {
            PlayerCommand::Move { x, z, jump } => player.set_move_input(x, z, jump),
            PlayerCommand::Throw {
                direction,
                throw_type,
            } => {
                let Some(bomb) = self.bomb.as_mut() else {
                    debug!("Throw from {} with no bomb in play", id);
                    return;
                };
                let mut flat = Vec3::new(direction.x, 0.0, direction.z);
                if !flat.is_finite() || flat.length_squared() < f32::EPSILON {
                    flat = rotate_by_yaw(Vec3::Z, player.facing);
                }

                match bomb.throw_bomb(id, flat, throw_type, self.now) {
                    ThrowOutcome::Thrown => player.face_towards(flat),
                    rejected => debug!("Throw from {} rejected: {:?}", id, rejected),
                }
            }
            PlayerCommand::SwapHoldSide => {
                if let Some(bomb) = self.bomb.as_mut() {
                    bomb.swap_hold_point(player);
                }
            }
            PlayerCommand::ToggleThrowType => {
                if let Some(bomb) = self.bomb.as_mut() {
                    if !bomb.toggle_throw_type(id) {
                        debug!("Toggle from non-holder {} ignored", id);
                    }
                }
            }
        }
    }

    pub fn tick(&mut self, dt: f32) {
        self.now += dt as SimTime;
        self.tick = self.tick.wrapping_add(1);

        self.round.tick(self.now, &Roster(&self.players));
        self.drain_round_events();

        let landing_blend = self.config.knockback.landing_blend;
        for (_, player) in self.players.iter_mut() {
            player.update_movement(dt, &self.config.arena, &self.config.player, landing_blend);
        }
        self.resolve_player_overlaps();

        if let Some(bomb) = self.bomb.as_mut() {
            bomb.tick(dt, self.now, &self.players);
        }
        self.process_bomb_events();

        let holder = self
            .bomb
            .as_ref()
            .filter(|bomb| bomb.is_held())
            .and_then(|bomb| bomb.holder());
        if let Some(player) = holder.and_then(|id| self.players.get_mut(id)) {
            self.lives.accumulate_hold_time(player, dt);
        }

        let fallen: Vec<EntityId> = self
            .players
            .iter()
            .filter(|(_, player)| self.lives.has_fallen(player))
            .map(|(id, _)| id)
            .collect();
        for id in fallen {
            self.kill_player(id);
        }

        for id in self.lives.due_respawns(self.now) {
            self.respawn_player(id);
        }
    }

    fn resolve_player_overlaps(&mut self) {
        let ids = self.players.ids();
        let radius = self.config.player.radius;

        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                if let Some((a, b)) = self.players.get_pair_mut(ids[i], ids[j]) {
                    separate_players(a, b, radius);
                }
            }
        }
    }

    fn process_bomb_events(&mut self) {
        let Some(bomb) = self.bomb.as_mut() else {
            return;
        };

        for event in bomb.take_events() {
            match event {
                BombEvent::Exploded { position, holder } => {
                    self.resolve_explosion(position, holder);
                    self.bomb = None;
                    self.round.on_bomb_exploded(self.now);
                    return;
                }
                other => debug!("Bomb event: {:?}", other),
            }
        }
    }

    fn resolve_explosion(&mut self, position: Vec3, holder: Option<EntityId>) {
        self.explosion_sequence = self.explosion_sequence.wrapping_add(1);
        let knockback = &self.config.knockback;
        let mut victims = Vec::new();

        for (id, player) in self.players.iter_mut() {
            if !player.is_alive() {
                continue;
            }

            let percentage = player.life.knockback_percentage();
            let is_holder = holder == Some(id);
            let arc = calculate_arc(knockback, position, player.position, percentage, is_holder);
            if !arc.affected {
                continue;
            }

            victims.push(VictimRecord {
                id,
                position: player.position,
                knockback_percentage: percentage,
                was_holder: is_holder,
                sector: arc.sector,
            });
            self.lives.register_knockback_hit(player);
            player.start_knockback(arc);
        }

        info!(
            "Explosion {} at {:?} hit {} players",
            self.explosion_sequence,
            position,
            victims.len()
        );
        self.last_explosion = Some(ExplosionRecord {
            sequence: self.explosion_sequence,
            position,
            victims,
        });
    }

    fn kill_player(&mut self, id: EntityId) {
        let Some(player) = self.players.get_mut(id) else {
            return;
        };
        let was_holder = self.bomb.as_ref().is_some_and(|b| b.holder() == Some(id));

        match self.lives.handle_death(player, self.now) {
            DeathOutcome::Ignored => {}
            DeathOutcome::Respawning { .. } => {
                if was_holder {
                    self.pass_bomb_on(id);
                }
            }
            DeathOutcome::Eliminated => self.eliminate(id),
        }
    }

    /// Hands the bomb of a dead holder to someone still standing
    fn pass_bomb_on(&mut self, from: EntityId) {
        let next = self.round.pick_holder(&Roster(&self.players));
        let Some(bomb) = self.bomb.as_mut() else {
            return;
        };

        match next.and_then(|id| self.players.get(id)) {
            Some(player) => {
                info!("Player {} died holding the bomb, passing to {}", from, player.id);
                bomb.assign_to_player(player);
            }
            None => bomb.trigger_immediate_explosion(),
        }
        self.process_bomb_events();
    }

    /// Final teardown: explode a held bomb, leave the round, drop the entity
    fn eliminate(&mut self, id: EntityId) {
        if let Some(bomb) = self.bomb.as_mut() {
            if bomb.holder() == Some(id) {
                bomb.trigger_immediate_explosion();
            }
        }
        self.process_bomb_events();

        if let Some(player) = self.players.get_mut(id) {
            self.lives.forget(player);
        }
        self.round
            .unregister_player(id, self.now, &Roster(&self.players));
        self.players.remove(id);
        self.events.push(MatchEvent::PlayerEliminated(id));

        self.drain_round_events();
    }

    fn respawn_player(&mut self, id: EntityId) {
        let Some(player) = self.players.get_mut(id) else {
            debug!("Respawn timer for stale player {}", id);
            return;
        };

        match self.spawns.choose_spawn(self.now) {
            Some(position) => {
                if self.lives.complete_respawn(player, position) {
                    player.face_towards(-position);
                }
            }
            None => self.lives.defer_respawn(player, self.now),
        }
    }

    fn spawn_bomb_on(&mut self, holder: EntityId) {
        if self.bomb.is_some() {
            warn!("Bomb spawn requested while a bomb is in play");
            return;
        }
        let Some(player) = self.players.get(holder) else {
            warn!("Bomb spawn target {} is gone", holder);
            return;
        };

        let mut bomb = Bomb::new(&self.config, player.position);
        bomb.assign_to_player(player);
        self.bomb = Some(bomb);
    }

    fn drain_round_events(&mut self) {
        for event in self.round.take_events() {
            match event {
                RoundEvent::SpawnBomb { holder } => self.spawn_bomb_on(holder),
                RoundEvent::Winner(id) => self.events.push(MatchEvent::RoundOver { winner: Some(id) }),
                RoundEvent::NoWinner => self.events.push(MatchEvent::RoundOver { winner: None }),
                RoundEvent::Shutdown => self.events.push(MatchEvent::Shutdown),
                other => debug!("Round event: {:?}", other),
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.round.phase() == RoundPhase::Terminated
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        let mut players: Vec<_> = self.players.iter().map(|(_, p)| p.snapshot()).collect();
        players.sort_by_key(|p| p.id);

        WorldSnapshot {
            tick: self.tick,
            round_phase: self.round.phase(),
            round_countdown: self.round.countdown(),
            winner: self.round.winner(),
            players,
            bomb: self.bomb.as_ref().map(Bomb::snapshot),
            last_explosion: self.last_explosion.clone(),
        }
    }
}

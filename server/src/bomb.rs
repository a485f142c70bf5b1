//! The bomb and its possession state machine
//!
//! ```text
//! Held --throw--> InFlight --player contact--> Held (countdown keeps running)
//!                    |  \--boundary--> Held by thrower (countdown paused)
//!                    \--max bounces--> WaitingToExplode --delay--> Exploded
//! Held/InFlight --countdown expiry--> Exploded
//! ```
//!
//! All delayed transitions go through the bomb's own [`Scheduler`], so
//! dropping or exploding the bomb drops every pending continuation with it.

use crate::player::Player;
use glam::Vec3;
use log::{debug, error, info, warn};
use shared::ballistics::required_substeps;
use shared::config::{ArenaConfig, BombConfig, GameConfig, PlayerConfig};
use shared::{
    launch_velocity, step_flight, Arena, BombPhase, BombSnapshot, Contact, EntityId, FlightBody,
    HoldSide, Scheduler, SimTime, ThrowType, TimerToken,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrowOutcome {
    Thrown,
    NotHeld,
    NotHolder,
    CoolingDown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BombEvent {
    Assigned { holder: EntityId },
    Thrown { by: EntityId, throw_type: ThrowType },
    ReturnedToThrower { thrower: EntityId },
    Bounced { count: u32 },
    WaitingToExplode,
    Exploded { position: Vec3, holder: Option<EntityId> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BombTimer {
    ResumeCountdown,
    GroundDetonation,
}

pub struct Bomb {
    config: BombConfig,
    arena: ArenaConfig,
    player: PlayerConfig,
    phase: BombPhase,
    holder: Option<EntityId>,
    hold_side: HoldSide,
    held_state: bool,
    /// False when the holder's rig had no socket for `hold_side`
    attached: bool,
    countdown: f32,
    countdown_paused: bool,
    bounce_count: u32,
    last_thrower: Option<EntityId>,
    last_throw_time: Option<SimTime>,
    waiting_to_explode: bool,
    ground_hit_time: Option<SimTime>,
    throw_type: ThrowType,
    body: FlightBody,
    collider_enabled: bool,
    timers: Scheduler<BombTimer>,
    resume_timer: Option<TimerToken>,
    detonation_timer: Option<TimerToken>,
    events: Vec<BombEvent>,
}

impl Bomb {
    /// Creates a loose bomb at rest; the round hands it to a player right away
    pub fn new(config: &GameConfig, position: Vec3) -> Self {
        Self {
            config: config.bomb.clone(),
            arena: config.arena.clone(),
            player: config.player.clone(),
            phase: BombPhase::InFlight,
            holder: None,
            hold_side: HoldSide::default(),
            held_state: false,
            attached: false,
            countdown: config.bomb.fuse_time,
            countdown_paused: false,
            bounce_count: 0,
            last_thrower: None,
            last_throw_time: None,
            waiting_to_explode: false,
            ground_hit_time: None,
            throw_type: ThrowType::default(),
            body: FlightBody {
                position,
                velocity: Vec3::ZERO,
                mass: config.bomb.base_mass,
            },
            collider_enabled: true,
            timers: Scheduler::new(),
            resume_timer: None,
            detonation_timer: None,
            events: Vec::new(),
        }
    }

    pub fn phase(&self) -> BombPhase {
        self.phase
    }

    pub fn holder(&self) -> Option<EntityId> {
        self.holder
    }

    pub fn is_held(&self) -> bool {
        self.held_state
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn hold_side(&self) -> HoldSide {
        self.hold_side
    }

    pub fn countdown(&self) -> f32 {
        self.countdown
    }

    pub fn is_countdown_paused(&self) -> bool {
        self.countdown_paused
    }

    pub fn bounce_count(&self) -> u32 {
        self.bounce_count
    }

    pub fn last_thrower(&self) -> Option<EntityId> {
        self.last_thrower
    }

    pub fn throw_type(&self) -> ThrowType {
        self.throw_type
    }

    pub fn is_waiting_to_explode(&self) -> bool {
        self.waiting_to_explode
    }

    pub fn ground_hit_time(&self) -> Option<SimTime> {
        self.ground_hit_time
    }

    pub fn position(&self) -> Vec3 {
        self.body.position
    }

    pub fn velocity(&self) -> Vec3 {
        self.body.velocity
    }

    pub fn collider_enabled(&self) -> bool {
        self.collider_enabled
    }

    pub fn take_events(&mut self) -> Vec<BombEvent> {
        std::mem::take(&mut self.events)
    }

    /// Gives the bomb to `player` in the right hand without touching the countdown
    pub fn assign_to_player(&mut self, player: &Player) -> bool {
        if self.phase == BombPhase::Exploded {
            warn!("Cannot assign exploded bomb to player {}", player.id);
            return false;
        }
        if !player.is_alive() {
            debug!("Player {} is not alive, refusing bomb assignment", player.id);
            return false;
        }

        self.cancel_detonation();
        self.phase = BombPhase::Held;
        self.holder = Some(player.id);
        self.held_state = true;
        self.waiting_to_explode = false;
        self.ground_hit_time = None;
        self.bounce_count = 0;
        self.body.velocity = Vec3::ZERO;
        self.body.mass = self.config.base_mass;
        self.collider_enabled = false;
        self.hold_side = HoldSide::Right;
        self.attach(player);

        self.events.push(BombEvent::Assigned { holder: player.id });
        debug!("Bomb assigned to player {}", player.id);
        true
    }

    fn attach(&mut self, player: &Player) {
        match player.socket_world_position(self.hold_side) {
            Some(position) => {
                self.body.position = position;
                self.attached = true;
            }
            None => {
                error!(
                    "Player {} has no {:?} hold socket, bomb left unparented",
                    player.id, self.hold_side
                );
                self.attached = false;
            }
        }
    }

    pub fn swap_hold_point(&mut self, player: &Player) -> bool {
        if self.phase != BombPhase::Held || self.holder != Some(player.id) {
            debug!("Player {} cannot swap hold side without the bomb", player.id);
            return false;
        }
        self.hold_side = self.hold_side.other();
        self.attach(player);
        true
    }

    pub fn toggle_throw_type(&mut self, by: EntityId) -> bool {
        if self.phase != BombPhase::Held || self.holder != Some(by) {
            return false;
        }
        self.throw_type = self.throw_type.toggled();
        true
    }

    pub fn throw_bomb(
        &mut self,
        by: EntityId,
        direction: Vec3,
        throw_type: ThrowType,
        now: SimTime,
    ) -> ThrowOutcome {
        if self.phase != BombPhase::Held {
            return ThrowOutcome::NotHeld;
        }
        if self.holder != Some(by) {
            return ThrowOutcome::NotHolder;
        }
        if let Some(last) = self.last_throw_time {
            if now < last + self.config.throw_cooldown as SimTime {
                return ThrowOutcome::CoolingDown;
            }
        }

        self.throw_type = throw_type;
        self.body.velocity = launch_velocity(direction, throw_type, &self.config);
        self.body.mass = self.config.base_mass * self.config.flight_mass_multiplier;
        self.collider_enabled = true;
        self.attached = false;
        self.held_state = false;
        self.holder = None;
        self.last_thrower = Some(by);
        self.last_throw_time = Some(now);
        self.bounce_count = 0;
        self.phase = BombPhase::InFlight;

        self.events.push(BombEvent::Thrown { by, throw_type });
        info!("Player {} threw the bomb ({:?})", by, throw_type);
        ThrowOutcome::Thrown
    }

    /// Lets go of the bomb where it is, e.g. when the holder disconnects
    pub fn release(&mut self) {
        if self.phase != BombPhase::Held {
            return;
        }
        self.phase = BombPhase::InFlight;
        self.holder = None;
        self.held_state = false;
        self.attached = false;
        self.last_thrower = None;
        self.collider_enabled = true;
        self.body.velocity = Vec3::ZERO;
        self.bounce_count = 0;
    }

    pub fn trigger_immediate_explosion(&mut self) {
        self.explode();
    }

    pub fn tick(&mut self, dt: f32, now: SimTime, players: &Arena<Player>) {
        for timer in self.timers.poll(now) {
            match timer {
                BombTimer::ResumeCountdown => {
                    self.resume_timer = None;
                    self.countdown_paused = false;
                }
                BombTimer::GroundDetonation => {
                    self.detonation_timer = None;
                    self.explode();
                }
            }
        }

        if self.phase == BombPhase::Exploded {
            return;
        }

        if !self.countdown_paused {
            self.countdown = (self.countdown - dt).max(0.0);
            let expirable = matches!(self.phase, BombPhase::Held | BombPhase::InFlight);
            if self.countdown <= 0.0 && expirable {
                self.explode();
                return;
            }
        }

        match self.phase {
            BombPhase::Held => self.follow_holder(players),
            BombPhase::InFlight | BombPhase::WaitingToExplode => self.fly(dt, now, players),
            BombPhase::Exploded => {}
        }
    }

    fn follow_holder(&mut self, players: &Arena<Player>) {
        let holder = self.holder.and_then(|id| players.get(id));
        match holder {
            Some(player) => {
                if self.attached {
                    if let Some(position) = player.socket_world_position(self.hold_side) {
                        self.body.position = position;
                    }
                }
            }
            None => {
                warn!("Bomb holder no longer exists, dropping the bomb");
                self.release();
            }
        }
    }

    fn fly(&mut self, dt: f32, now: SimTime, players: &Arena<Player>) {
        let speed = self.body.velocity.length();
        let substeps = required_substeps(speed, dt, self.config.radius);
        let step = dt / substeps as f32;

        for _ in 0..substeps {
            let contact = step_flight(&mut self.body, &self.arena, &self.config, step);

            if self.phase == BombPhase::InFlight {
                if let Some(catcher) = self.find_catcher(now, players) {
                    self.assign_to_player(catcher);
                    return;
                }
            }

            match contact {
                Some(Contact::Boundary) => {
                    self.handle_boundary(now, players);
                    return;
                }
                Some(Contact::Floor) => self.handle_floor_hit(now),
                None => {}
            }
        }
    }

    fn find_catcher<'a>(&self, now: SimTime, players: &'a Arena<Player>) -> Option<&'a Player> {
        let in_grace = self
            .last_throw_time
            .is_some_and(|t| now < t + self.config.thrower_grace as SimTime);

        players
            .iter()
            .map(|(_, player)| player)
            .filter(|player| player.is_alive())
            .filter(|player| !(in_grace && Some(player.id) == self.last_thrower))
            .find(|player| {
                let center = player.body_center(&self.player);
                center.distance(self.body.position) <= self.config.catch_radius
            })
    }

    fn handle_boundary(&mut self, now: SimTime, players: &Arena<Player>) {
        if self.phase == BombPhase::WaitingToExplode {
            debug!("Grounded bomb left the arena, detonating");
            self.explode();
            return;
        }

        let thrower = self
            .last_thrower
            .and_then(|id| players.get(id))
            .filter(|player| player.is_alive());

        match thrower {
            Some(player) => {
                let thrower = player.id;
                self.assign_to_player(player);
                self.pause_countdown(now);
                self.events.push(BombEvent::ReturnedToThrower { thrower });
                info!("Bomb left the arena, returned to player {}", thrower);
            }
            None => {
                info!("Bomb left the arena with no thrower to return to, detonating");
                self.explode();
            }
        }
    }

    fn handle_floor_hit(&mut self, now: SimTime) {
        if self.phase != BombPhase::InFlight {
            return;
        }

        self.bounce_count += 1;
        self.events.push(BombEvent::Bounced {
            count: self.bounce_count,
        });

        if self.bounce_count >= self.config.max_bounces {
            self.phase = BombPhase::WaitingToExplode;
            self.waiting_to_explode = true;
            self.ground_hit_time = Some(now);
            self.cancel_detonation();
            self.detonation_timer = Some(self.timers.schedule(
                now + self.config.ground_explosion_delay as SimTime,
                BombTimer::GroundDetonation,
            ));
            self.events.push(BombEvent::WaitingToExplode);
            debug!("Bomb grounded after {} bounces", self.bounce_count);
        }
    }

    fn pause_countdown(&mut self, now: SimTime) {
        if let Some(token) = self.resume_timer.take() {
            self.timers.cancel(token);
        }
        self.countdown_paused = true;
        self.resume_timer = Some(self.timers.schedule(
            now + self.config.return_pause as SimTime,
            BombTimer::ResumeCountdown,
        ));
    }

    fn cancel_detonation(&mut self) {
        if let Some(token) = self.detonation_timer.take() {
            self.timers.cancel(token);
        }
    }

    fn explode(&mut self) {
        if self.phase == BombPhase::Exploded {
            return;
        }

        let holder = self.holder.take();
        self.phase = BombPhase::Exploded;
        self.held_state = false;
        self.attached = false;
        self.waiting_to_explode = false;
        self.collider_enabled = false;
        self.body.velocity = Vec3::ZERO;
        self.timers.clear();
        self.resume_timer = None;
        self.detonation_timer = None;

        info!("Bomb exploded at {:?}", self.body.position);
        self.events.push(BombEvent::Exploded {
            position: self.body.position,
            holder,
        });
    }

    pub fn snapshot(&self) -> BombSnapshot {
        BombSnapshot {
            position: self.body.position,
            velocity: self.body.velocity,
            phase: self.phase,
            holder: self.holder,
            hold_side: self.hold_side,
            countdown: self.countdown,
            countdown_paused: self.countdown_paused,
            throw_type: self.throw_type,
            bounce_count: self.bounce_count,
        }
    }
}

//! Client copy of the replicated world
//!
//! The server sends a full [`WorldSnapshot`] on join and every keyframe, and
//! lists of [`FieldChange`]s in between. [`ClientWorld`] applies both and
//! reports every change that matters to the HUD through [`ReplicaObserver`].

use log::{debug, info};
use shared::config::KnockbackConfig;
use shared::{
    calculate_arc, diff, BombSnapshot, EntityId, ExplosionRecord, FieldChange, HoldSide,
    KnockbackArcData, PlayerSnapshot, RoundPhase, WorldSnapshot,
};

/// Presentation hooks fired as replicated fields change.
///
/// Every method has an empty default so observers only implement what they show.
pub trait ReplicaObserver {
    fn on_round_phase(&mut self, _phase: RoundPhase) {}
    fn on_countdown(&mut self, _remaining: Option<u32>) {}
    fn on_winner(&mut self, _winner: Option<EntityId>) {}
    fn on_player_joined(&mut self, _player: &PlayerSnapshot) {}
    fn on_player_left(&mut self, _id: EntityId) {}
    fn on_lives_changed(&mut self, _id: EntityId, _old: u32, _new: u32) {}
    fn on_percentage_changed(&mut self, _id: EntityId, _old: f32, _new: f32) {}
    fn on_holder_changed(&mut self, _holder: Option<EntityId>, _side: HoldSide) {}
    /// Arcs are recomputed locally from the victims the server reported
    fn on_explosion(&mut self, _record: &ExplosionRecord, _arcs: &[(EntityId, KnockbackArcData)]) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl ReplicaObserver for NoopObserver {}

pub struct ClientWorld {
    snapshot: WorldSnapshot,
    synced: bool,
    local_player: Option<EntityId>,
    knockback: KnockbackConfig,
}

impl ClientWorld {
    pub fn new(knockback: KnockbackConfig) -> Self {
        Self {
            snapshot: WorldSnapshot::default(),
            synced: false,
            local_player: None,
            knockback,
        }
    }

    pub fn knockback(&self) -> &KnockbackConfig {
        &self.knockback
    }

    /// Switches the arc calculator to the server's knockback rules
    pub fn set_knockback(&mut self, knockback: KnockbackConfig) {
        self.knockback = knockback;
    }

    pub fn snapshot(&self) -> &WorldSnapshot {
        &self.snapshot
    }

    pub fn tick(&self) -> u32 {
        self.snapshot.tick
    }

    /// True once a keyframe arrived; deltas are ignored before that
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn local_player(&self) -> Option<EntityId> {
        self.local_player
    }

    pub fn set_local_player(&mut self, player: Option<EntityId>) {
        self.local_player = player;
    }

    pub fn local_snapshot(&self) -> Option<&PlayerSnapshot> {
        self.local_player.and_then(|id| self.snapshot.player(id))
    }

    pub fn bomb(&self) -> Option<&BombSnapshot> {
        self.snapshot.bomb.as_ref()
    }

    pub fn local_holds_bomb(&self) -> bool {
        match (self.local_player, self.bomb()) {
            (Some(id), Some(bomb)) => bomb.holder == Some(id),
            _ => false,
        }
    }

    /// Drops all state, e.g. after the server disconnected us
    pub fn reset(&mut self) {
        self.snapshot = WorldSnapshot::default();
        self.synced = false;
        self.local_player = None;
    }

    /// Replaces the world with a keyframe, firing hooks for what differs
    pub fn apply_snapshot(&mut self, snapshot: WorldSnapshot, observer: &mut impl ReplicaObserver) {
        let changes = diff(&self.snapshot, &snapshot);
        if !self.synced {
            info!("Synchronised at tick {}", snapshot.tick);
        }
        self.snapshot = snapshot;
        self.synced = true;

        for change in &changes {
            self.notify(change, observer);
        }
    }

    /// Applies a delta if it builds on our tick.
    ///
    /// Returns false when the delta was skipped; the next keyframe resyncs.
    pub fn apply_delta(
        &mut self,
        base_tick: u32,
        tick: u32,
        changes: &[FieldChange],
        observer: &mut impl ReplicaObserver,
    ) -> bool {
        if !self.synced || base_tick != self.snapshot.tick {
            debug!(
                "Skipping delta {}->{} (have tick {}, synced {})",
                base_tick, tick, self.snapshot.tick, self.synced
            );
            return false;
        }

        for change in changes {
            self.snapshot.apply(change);
            self.notify(change, observer);
        }
        self.snapshot.tick = tick;
        true
    }

    /// Knockback arcs for an explosion, rebuilt from replicated inputs
    pub fn explosion_arcs(&self, record: &ExplosionRecord) -> Vec<(EntityId, KnockbackArcData)> {
        record
            .victims
            .iter()
            .map(|victim| {
                let arc = calculate_arc(
                    &self.knockback,
                    record.position,
                    victim.position,
                    victim.knockback_percentage,
                    victim.was_holder,
                );
                (victim.id, arc)
            })
            .collect()
    }

    fn notify(&self, change: &FieldChange, observer: &mut impl ReplicaObserver) {
        match change {
            FieldChange::RoundPhase(phase) => observer.on_round_phase(*phase),
            FieldChange::RoundCountdown(remaining) => observer.on_countdown(*remaining),
            FieldChange::Winner(winner) => observer.on_winner(*winner),
            FieldChange::Explosion(record) => {
                let arcs = self.explosion_arcs(record);
                observer.on_explosion(record, &arcs);
            }
            FieldChange::PlayerJoined(player) => observer.on_player_joined(player),
            FieldChange::PlayerLeft(id) => observer.on_player_left(*id),
            FieldChange::PlayerLives { id, old, new } => observer.on_lives_changed(*id, *old, *new),
            FieldChange::PlayerPercentage { id, old, new } => {
                observer.on_percentage_changed(*id, *old, *new)
            }
            FieldChange::BombSpawned(bomb) => observer.on_holder_changed(bomb.holder, bomb.hold_side),
            FieldChange::BombRemoved => observer.on_holder_changed(None, HoldSide::default()),
            FieldChange::BombHolder { holder, side } => observer.on_holder_changed(*holder, *side),
            FieldChange::PlayerMoved { .. }
            | FieldChange::PlayerStatus { .. }
            | FieldChange::BombMoved { .. }
            | FieldChange::BombPhase(_)
            | FieldChange::BombCountdown { .. }
            | FieldChange::BombThrowType(_)
            | FieldChange::BombBounces(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use shared::{BombPhase, LifeStatus, ThrowType, VictimRecord};

    #[derive(Default)]
    struct Recorder {
        countdowns: Vec<Option<u32>>,
        lives: Vec<(EntityId, u32, u32)>,
        percentages: Vec<(EntityId, f32, f32)>,
        holders: Vec<Option<EntityId>>,
        winners: Vec<Option<EntityId>>,
        explosions: Vec<(u32, usize)>,
    }

    impl ReplicaObserver for Recorder {
        fn on_countdown(&mut self, remaining: Option<u32>) {
            self.countdowns.push(remaining);
        }
        fn on_winner(&mut self, winner: Option<EntityId>) {
            self.winners.push(winner);
        }
        fn on_lives_changed(&mut self, id: EntityId, old: u32, new: u32) {
            self.lives.push((id, old, new));
        }
        fn on_percentage_changed(&mut self, id: EntityId, old: f32, new: f32) {
            self.percentages.push((id, old, new));
        }
        fn on_holder_changed(&mut self, holder: Option<EntityId>, _side: HoldSide) {
            self.holders.push(holder);
        }
        fn on_explosion(&mut self, record: &ExplosionRecord, arcs: &[(EntityId, KnockbackArcData)]) {
            self.explosions.push((record.sequence, arcs.len()));
        }
    }

    fn id(index: u32) -> EntityId {
        EntityId {
            index,
            generation: 0,
        }
    }

    fn player(index: u32) -> PlayerSnapshot {
        PlayerSnapshot {
            id: id(index),
            player_number: index as u8 + 1,
            position: Vec3::new(index as f32 * 3.0, 0.0, 0.0),
            facing: 0.0,
            lives: 3,
            knockback_percentage: 0.0,
            status: LifeStatus::Alive,
            knocked_back: false,
            dazed: false,
        }
    }

    fn keyframe(tick: u32) -> WorldSnapshot {
        WorldSnapshot {
            tick,
            round_phase: RoundPhase::Active,
            players: vec![player(0), player(1)],
            ..WorldSnapshot::default()
        }
    }

    fn world() -> ClientWorld {
        ClientWorld::new(KnockbackConfig::default())
    }

    #[test]
    fn test_delta_before_keyframe_is_skipped() {
        let mut world = world();
        let mut recorder = Recorder::default();

        let applied = world.apply_delta(0, 1, &[FieldChange::RoundCountdown(Some(3))], &mut recorder);
        assert!(!applied);
        assert!(recorder.countdowns.is_empty());
    }

    #[test]
    fn test_delta_requires_matching_base_tick() {
        let mut world = world();
        let mut recorder = Recorder::default();
        world.apply_snapshot(keyframe(10), &mut recorder);

        assert!(!world.apply_delta(9, 11, &[], &mut recorder));
        assert_eq!(world.tick(), 10);

        assert!(world.apply_delta(10, 11, &[], &mut recorder));
        assert_eq!(world.tick(), 11);
    }

    #[test]
    fn test_lives_hook_receives_old_and_new() {
        let mut world = world();
        let mut recorder = Recorder::default();
        world.apply_snapshot(keyframe(1), &mut recorder);

        let changes = vec![
            FieldChange::PlayerLives {
                id: id(1),
                old: 3,
                new: 2,
            },
            FieldChange::PlayerPercentage {
                id: id(1),
                old: 0.0,
                new: 15.0,
            },
        ];
        assert!(world.apply_delta(1, 2, &changes, &mut recorder));

        assert_eq!(recorder.lives, vec![(id(1), 3, 2)]);
        assert_eq!(recorder.percentages, vec![(id(1), 0.0, 15.0)]);
        assert_eq!(world.snapshot().player(id(1)).unwrap().lives, 2);
    }

    #[test]
    fn test_keyframe_fires_hooks_for_differences() {
        let mut world = world();
        let mut recorder = Recorder::default();
        world.apply_snapshot(keyframe(1), &mut recorder);

        let mut next = keyframe(30);
        next.players[0].lives = 1;
        next.winner = Some(id(1));
        world.apply_snapshot(next, &mut recorder);

        assert_eq!(recorder.lives, vec![(id(0), 3, 1)]);
        assert_eq!(recorder.winners, vec![Some(id(1))]);
        assert_eq!(world.tick(), 30);
    }

    #[test]
    fn test_holder_hook_and_local_holder() {
        let mut world = world();
        let mut recorder = Recorder::default();
        world.apply_snapshot(keyframe(1), &mut recorder);
        world.set_local_player(Some(id(0)));

        let bomb = BombSnapshot {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            phase: BombPhase::Held,
            holder: Some(id(0)),
            hold_side: HoldSide::Right,
            countdown: 20.0,
            countdown_paused: false,
            throw_type: ThrowType::Normal,
            bounce_count: 0,
        };
        world.apply_delta(1, 2, &[FieldChange::BombSpawned(bomb)], &mut recorder);
        assert!(world.local_holds_bomb());

        world.apply_delta(2, 3, &[FieldChange::BombRemoved], &mut recorder);
        assert!(!world.local_holds_bomb());
        assert_eq!(recorder.holders, vec![Some(id(0)), None]);
    }

    #[test]
    fn test_explosion_arcs_match_server_inputs() {
        let mut world = world();
        let mut recorder = Recorder::default();
        world.apply_snapshot(keyframe(1), &mut recorder);

        let record = ExplosionRecord {
            sequence: 4,
            position: Vec3::ZERO,
            victims: vec![VictimRecord {
                id: id(1),
                position: Vec3::new(1.0, 0.0, 0.0),
                knockback_percentage: 50.0,
                was_holder: true,
                sector: 1,
            }],
        };
        world.apply_delta(1, 2, &[FieldChange::Explosion(record.clone())], &mut recorder);
        assert_eq!(recorder.explosions, vec![(4, 1)]);

        let arcs = world.explosion_arcs(&record);
        let expected = calculate_arc(
            &KnockbackConfig::default(),
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
            50.0,
            true,
        );
        assert_eq!(arcs[0].1, expected);
    }

    #[test]
    fn test_reset_drops_sync() {
        let mut world = world();
        world.apply_snapshot(keyframe(5), &mut NoopObserver);
        world.set_local_player(Some(id(0)));
        world.reset();

        assert!(!world.is_synced());
        assert!(world.local_player().is_none());
        assert!(world.snapshot().players.is_empty());
    }
}

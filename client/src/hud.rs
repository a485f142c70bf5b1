//! HUD state fed by replication hooks

use crate::replica::ReplicaObserver;
use shared::{EntityId, ExplosionRecord, HoldSide, KnockbackArcData, PlayerSnapshot, RoundPhase};
use std::collections::HashMap;

/// How long event lines and explosion arcs stay on screen, in seconds
const MESSAGE_TTL: f32 = 3.0;

#[derive(Debug, Clone)]
pub struct FadingArc {
    pub player: EntityId,
    pub arc: KnockbackArcData,
    pub age: f32,
}

#[derive(Debug, Default)]
pub struct HudState {
    pub phase: RoundPhase,
    pub countdown_text: Option<String>,
    pub banner: Option<String>,
    pub holder: Option<EntityId>,
    /// Player numbers for naming players in messages
    numbers: HashMap<EntityId, u8>,
    messages: Vec<(String, f32)>,
    arcs: Vec<FadingArc>,
}

impl HudState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(|(text, _)| text.as_str())
    }

    pub fn arcs(&self) -> &[FadingArc] {
        &self.arcs
    }

    /// Ages messages and arcs, dropping expired ones
    pub fn update(&mut self, dt: f32) {
        for (_, age) in self.messages.iter_mut() {
            *age += dt;
        }
        self.messages.retain(|(_, age)| *age < MESSAGE_TTL);

        for arc in self.arcs.iter_mut() {
            arc.age += dt;
        }
        self.arcs.retain(|arc| arc.age < MESSAGE_TTL.max(arc.arc.duration));
    }

    pub fn set_banner(&mut self, text: impl Into<String>) {
        self.banner = Some(text.into());
    }

    fn name(&self, id: EntityId) -> String {
        match self.numbers.get(&id) {
            Some(number) => format!("P{}", number),
            None => format!("Player {}", id),
        }
    }

    fn push_message(&mut self, text: String) {
        self.messages.push((text, 0.0));
    }
}

impl ReplicaObserver for HudState {
    fn on_round_phase(&mut self, phase: RoundPhase) {
        self.phase = phase;
        if phase == RoundPhase::Active {
            self.countdown_text = None;
            self.push_message("Go!".to_string());
        }
    }

    fn on_countdown(&mut self, remaining: Option<u32>) {
        self.countdown_text = remaining.map(|seconds| seconds.to_string());
    }

    fn on_winner(&mut self, winner: Option<EntityId>) {
        if let Some(id) = winner {
            self.banner = Some(format!("{} wins!", self.name(id)));
        }
    }

    fn on_player_joined(&mut self, player: &PlayerSnapshot) {
        self.numbers.insert(player.id, player.player_number);
    }

    fn on_player_left(&mut self, id: EntityId) {
        let text = format!("{} is out", self.name(id));
        self.push_message(text);
        self.numbers.remove(&id);
    }

    fn on_lives_changed(&mut self, id: EntityId, old: u32, new: u32) {
        if new < old {
            let text = format!("{} lost a life ({} left)", self.name(id), new);
            self.push_message(text);
        }
    }

    fn on_percentage_changed(&mut self, id: EntityId, old: f32, new: f32) {
        // Hold time nudges the value every tick; only report big jumps
        if new - old >= 10.0 {
            let text = format!("{} is at {:.0}%", self.name(id), new);
            self.push_message(text);
        }
    }

    fn on_holder_changed(&mut self, holder: Option<EntityId>, _side: HoldSide) {
        self.holder = holder;
    }

    fn on_explosion(&mut self, record: &ExplosionRecord, arcs: &[(EntityId, KnockbackArcData)]) {
        self.push_message(format!("Boom! {} hit", record.victims.len()));
        self.arcs.extend(arcs.iter().map(|(player, arc)| FadingArc {
            player: *player,
            arc: arc.clone(),
            age: 0.0,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use shared::LifeStatus;

    fn joined(hud: &mut HudState, index: u32, number: u8) -> EntityId {
        let id = EntityId {
            index,
            generation: 0,
        };
        hud.on_player_joined(&PlayerSnapshot {
            id,
            player_number: number,
            position: Vec3::ZERO,
            facing: 0.0,
            lives: 3,
            knockback_percentage: 0.0,
            status: LifeStatus::Alive,
            knocked_back: false,
            dazed: false,
        });
        id
    }

    #[test]
    fn test_countdown_and_start() {
        let mut hud = HudState::new();
        hud.on_countdown(Some(3));
        assert_eq!(hud.countdown_text.as_deref(), Some("3"));

        hud.on_round_phase(RoundPhase::Active);
        assert!(hud.countdown_text.is_none());
        assert_eq!(hud.messages().collect::<Vec<_>>(), vec!["Go!"]);
    }

    #[test]
    fn test_winner_banner_uses_player_number() {
        let mut hud = HudState::new();
        let id = joined(&mut hud, 2, 3);
        hud.on_winner(Some(id));
        assert_eq!(hud.banner.as_deref(), Some("P3 wins!"));
    }

    #[test]
    fn test_life_loss_message() {
        let mut hud = HudState::new();
        let id = joined(&mut hud, 0, 1);
        hud.on_lives_changed(id, 3, 2);
        assert_eq!(hud.messages().collect::<Vec<_>>(), vec!["P1 lost a life (2 left)"]);
    }

    #[test]
    fn test_messages_expire() {
        let mut hud = HudState::new();
        hud.on_round_phase(RoundPhase::Active);
        hud.update(MESSAGE_TTL + 0.1);
        assert_eq!(hud.messages().count(), 0);
    }
}

//! The client frame loop

use crate::hud::HudState;
use crate::input::{InputManager, KeySample};
use crate::network::{NetworkEvent, NetworkHandle};
use crate::rendering::{RenderConfig, Renderer};
use crate::replica::ClientWorld;
use crate::trajectory::{TrajectoryPrediction, TrajectoryPredictor};
use glam::Vec3;
use log::info;
use macroquad::input::{is_key_pressed, mouse_position, KeyCode};
use macroquad::time::get_frame_time;
use macroquad::window::next_frame;
use shared::config::GameConfig;
use shared::{rotate_by_yaw, ThrowType};

pub struct App {
    world: ClientWorld,
    hud: HudState,
    input: InputManager,
    predictor: TrajectoryPredictor,
    renderer: Renderer,
    connected: bool,
    show_preview: bool,
    fake_ping_ms: u64,
}

impl App {
    pub fn new(
        config: &GameConfig,
        width: usize,
        height: usize,
        fake_ping_ms: u64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let renderer = Renderer::new(
            config.arena.clone(),
            config.player.radius,
            config.bomb.radius,
            width,
            height,
        )?;

        Ok(Self {
            world: ClientWorld::new(config.knockback.clone()),
            hud: HudState::new(),
            input: InputManager::new(),
            predictor: TrajectoryPredictor::new(config.arena.clone(), config.bomb.clone()),
            renderer,
            connected: false,
            show_preview: true,
            fake_ping_ms,
        })
    }

    pub fn world(&self) -> &ClientWorld {
        &self.world
    }

    pub fn hud(&self) -> &HudState {
        &self.hud
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn handle_event(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::Connected { player, config, .. } => {
                self.connected = true;
                self.hud.banner = None;
                self.apply_rules(&config);
                self.world.set_local_player(Some(player));
            }
            NetworkEvent::Snapshot(snapshot) => self.world.apply_snapshot(snapshot, &mut self.hud),
            NetworkEvent::Delta {
                base_tick,
                tick,
                changes,
            } => {
                self.world
                    .apply_delta(base_tick, tick, &changes, &mut self.hud);
            }
            NetworkEvent::RoundOver { winner } => {
                if winner.is_none() {
                    self.hud.set_banner("No winner");
                }
                info!("Round over, winner {:?}", winner);
            }
            NetworkEvent::Disconnected { reason } => {
                self.connected = false;
                self.world.reset();
                self.hud.set_banner(format!("Disconnected: {}", reason));
            }
        }
    }

    /// Adopts the server's match rules for arcs, previews and the view
    fn apply_rules(&mut self, config: &GameConfig) {
        self.world.set_knockback(config.knockback.clone());
        self.predictor = TrajectoryPredictor::new(config.arena.clone(), config.bomb.clone());
        self.renderer
            .set_rules(config.arena.clone(), config.player.radius, config.bomb.radius);
    }

    /// Horizontal throw direction from the local player toward a ground point
    pub fn aim_towards(&self, target: Vec3) -> Vec3 {
        let Some(player) = self.world.local_snapshot() else {
            return Vec3::Z;
        };
        let flat = Vec3::new(target.x - player.position.x, 0.0, target.z - player.position.z);
        if flat.length_squared() > f32::EPSILON {
            flat.normalize()
        } else {
            rotate_by_yaw(Vec3::Z, player.facing)
        }
    }

    /// Aim preview, shown only while we hold the bomb
    pub fn preview(&self, aim: Vec3) -> Option<TrajectoryPrediction> {
        if !self.show_preview || !self.world.local_holds_bomb() {
            return None;
        }
        self.world
            .bomb()
            .map(|bomb| self.predictor.predict(bomb.position, aim, bomb.throw_type))
    }

    pub async fn run(mut self, mut network: NetworkHandle) {
        info!("Controls: WASD to move, Space to jump, click or F to throw");
        info!("Q toggles lob, E swaps hands, T toggles the aim preview");

        loop {
            if is_key_pressed(KeyCode::Escape) {
                break;
            }

            for event in network.poll() {
                self.handle_event(event);
            }

            let (mx, my) = mouse_position();
            let aim = self.aim_towards(self.renderer.projection().to_world(mx, my));
            let throw_type = self
                .world
                .bomb()
                .map(|bomb| bomb.throw_type)
                .unwrap_or(ThrowType::Normal);

            let frame = self.input.update(KeySample::capture(), aim, throw_type);
            if frame.toggle_preview {
                self.show_preview = !self.show_preview;
            }
            if self.connected {
                for command in frame.commands {
                    network.send_command(command);
                }
            }

            self.hud.update(get_frame_time());
            let preview = self.preview(aim);
            self.renderer.render(
                self.world.snapshot(),
                &self.hud,
                RenderConfig {
                    local_player: self.world.local_player(),
                    connected: self.connected,
                    fake_ping_ms: self.fake_ping_ms,
                    preview: preview.as_ref(),
                },
            );

            next_frame().await;
        }

        network.disconnect();
    }
}

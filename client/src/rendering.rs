use crate::hud::HudState;
use crate::trajectory::{FlightEnd, TrajectoryPrediction};
use glam::Vec3;
use macroquad::color::{Color, GREEN, ORANGE, RED, WHITE, YELLOW};
use macroquad::shapes::{draw_circle, draw_circle_lines, draw_line, draw_rectangle, draw_rectangle_lines};
use macroquad::text::draw_text;
use macroquad::window::clear_background;
use shared::config::ArenaConfig;
use shared::{BombPhase, BombSnapshot, EntityId, LifeStatus, PlayerSnapshot, RoundPhase, WorldSnapshot};

/// Top-down projection from the XZ plane to window pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    center_x: f32,
    center_y: f32,
    scale: f32,
}

impl Projection {
    /// Fits the platform plus its boundary margin into the window
    pub fn fit(arena: &ArenaConfig, width: f32, height: f32) -> Self {
        let world_w = 2.0 * (arena.half_extent_x + arena.boundary_margin);
        let world_h = 2.0 * (arena.half_extent_z + arena.boundary_margin);
        let scale = (width / world_w).min(height / world_h) * 0.9;
        Self {
            center_x: width / 2.0,
            center_y: height / 2.0,
            scale,
        }
    }

    pub fn to_screen(&self, world: Vec3) -> (f32, f32) {
        (
            self.center_x + world.x * self.scale,
            self.center_y + world.z * self.scale,
        )
    }

    /// Ground-plane point under a screen position
    pub fn to_world(&self, x: f32, y: f32) -> Vec3 {
        Vec3::new(
            (x - self.center_x) / self.scale,
            0.0,
            (y - self.center_y) / self.scale,
        )
    }

    pub fn length(&self, world: f32) -> f32 {
        world * self.scale
    }
}

pub struct RenderConfig<'a> {
    pub local_player: Option<EntityId>,
    pub connected: bool,
    pub fake_ping_ms: u64,
    pub preview: Option<&'a TrajectoryPrediction>,
}

pub struct Renderer {
    arena: ArenaConfig,
    projection: Projection,
    player_radius: f32,
    bomb_radius: f32,
}

fn player_color(player_number: u8) -> Color {
    match player_number {
        1 => Color::from_rgba(68, 136, 255, 255),
        2 => Color::from_rgba(255, 68, 68, 255),
        3 => Color::from_rgba(68, 222, 102, 255),
        _ => Color::from_rgba(242, 204, 51, 255),
    }
}

impl Renderer {
    pub fn new(
        arena: ArenaConfig,
        player_radius: f32,
        bomb_radius: f32,
        width: usize,
        height: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        if width == 0 || height == 0 {
            return Err("window size must be non-zero".into());
        }
        let projection = Projection::fit(&arena, width as f32, height as f32);
        Ok(Renderer {
            arena,
            projection,
            player_radius,
            bomb_radius,
        })
    }

    /// Refits the view to new arena rules, keeping the window size
    pub fn set_rules(&mut self, arena: ArenaConfig, player_radius: f32, bomb_radius: f32) {
        let width = self.projection.center_x * 2.0;
        let height = self.projection.center_y * 2.0;
        self.projection = Projection::fit(&arena, width, height);
        self.arena = arena;
        self.player_radius = player_radius;
        self.bomb_radius = bomb_radius;
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn render(&self, world: &WorldSnapshot, hud: &HudState, config: RenderConfig) {
        clear_background(Color::from_rgba(26, 26, 26, 255));

        self.draw_arena();
        for fading in hud.arcs() {
            self.draw_arc(&fading.arc.sampled_arc_points);
        }
        if let Some(preview) = config.preview {
            self.draw_preview(preview);
        }
        for player in &world.players {
            self.draw_player(player, Some(player.id) == config.local_player);
        }
        if let Some(bomb) = &world.bomb {
            self.draw_bomb(bomb);
        }

        self.draw_ui(world, hud, &config);
    }

    fn draw_arena(&self) {
        let margin = self.arena.boundary_margin;
        let (bx, by) = self.projection.to_screen(Vec3::new(
            -self.arena.half_extent_x - margin,
            0.0,
            -self.arena.half_extent_z - margin,
        ));
        let bw = self.projection.length(2.0 * (self.arena.half_extent_x + margin));
        let bh = self.projection.length(2.0 * (self.arena.half_extent_z + margin));
        draw_rectangle_lines(bx, by, bw, bh, 2.0, Color::from_rgba(120, 40, 40, 255));

        let (px, py) = self
            .projection
            .to_screen(Vec3::new(-self.arena.half_extent_x, 0.0, -self.arena.half_extent_z));
        let pw = self.projection.length(2.0 * self.arena.half_extent_x);
        let ph = self.projection.length(2.0 * self.arena.half_extent_z);
        draw_rectangle(px, py, pw, ph, Color::from_rgba(68, 68, 68, 255));
    }

    fn draw_player(&self, player: &PlayerSnapshot, is_local: bool) {
        if player.status != LifeStatus::Alive {
            return;
        }
        let (x, y) = self.projection.to_screen(player.position);
        let radius = self.projection.length(self.player_radius);
        let mut color = player_color(player.player_number);
        if player.dazed {
            color.a = 0.5;
        }

        draw_circle(x, y, radius, color);
        if is_local {
            draw_circle_lines(x, y, radius + 2.0, 2.0, WHITE);
        }

        // Facing tick
        let tip = player.position
            + Vec3::new(player.facing.sin(), 0.0, player.facing.cos()) * self.player_radius * 1.5;
        let (tx, ty) = self.projection.to_screen(tip);
        draw_line(x, y, tx, ty, 2.0, WHITE);

        let label = format!("P{} {:.0}%", player.player_number, player.knockback_percentage);
        draw_text(&label, x - radius, y - radius - 4.0, 14.0, WHITE);
    }

    fn draw_bomb(&self, bomb: &BombSnapshot) {
        let (x, y) = self.projection.to_screen(bomb.position);
        let radius = self.projection.length(self.bomb_radius).max(3.0);
        let color = match bomb.phase {
            BombPhase::Held => ORANGE,
            BombPhase::InFlight => YELLOW,
            BombPhase::WaitingToExplode | BombPhase::Exploded => RED,
        };
        draw_circle(x, y, radius, color);

        let fuse = if bomb.countdown_paused {
            format!("{:.1}s ||", bomb.countdown)
        } else {
            format!("{:.1}s", bomb.countdown)
        };
        draw_text(&fuse, x + radius + 2.0, y + 4.0, 14.0, color);
    }

    fn draw_arc(&self, points: &[Vec3]) {
        for pair in points.windows(2) {
            let (x0, y0) = self.projection.to_screen(pair[0]);
            let (x1, y1) = self.projection.to_screen(pair[1]);
            draw_line(x0, y0, x1, y1, 1.0, Color::from_rgba(255, 140, 0, 160));
        }
    }

    fn draw_preview(&self, preview: &TrajectoryPrediction) {
        for point in preview.points.iter().step_by(3) {
            let (x, y) = self.projection.to_screen(*point);
            draw_circle(x, y, 1.5, Color::from_rgba(200, 200, 200, 180));
        }

        for (i, landing) in preview.landings.iter().enumerate() {
            let (x, y) = self.projection.to_screen(*landing);
            // First landing is where the throw will come down, the rest are speculative bounces
            let color = if i == 0 {
                GREEN
            } else {
                Color::from_rgba(0, 228, 48, 120)
            };
            draw_circle_lines(x, y, 5.0, 1.5, color);
        }

        if preview.end == FlightEnd::OutOfBounds {
            if let Some(last) = preview.points.last() {
                let (x, y) = self.projection.to_screen(*last);
                draw_line(x - 5.0, y - 5.0, x + 5.0, y + 5.0, 2.0, RED);
                draw_line(x - 5.0, y + 5.0, x + 5.0, y - 5.0, 2.0, RED);
            }
        }
    }

    fn draw_ui(&self, world: &WorldSnapshot, hud: &HudState, config: &RenderConfig) {
        let connection_color = if config.connected { GREEN } else { RED };
        draw_rectangle(10.0, 10.0, 8.0, 8.0, connection_color);
        let status = match world.round_phase {
            RoundPhase::Lobby => "Waiting for players",
            RoundPhase::Countdown => "Get ready",
            RoundPhase::Active => "Pass the bomb!",
            RoundPhase::Ending => "Round over",
            RoundPhase::Terminated => "Match finished",
        };
        draw_text(status, 24.0, 18.0, 16.0, WHITE);
        if config.fake_ping_ms > 0 {
            draw_text(&format!("+{}ms", config.fake_ping_ms), 24.0, 34.0, 14.0, YELLOW);
        }

        let mut y = 56.0;
        for player in &world.players {
            let line = format!(
                "P{}  lives {}  {:.0}%{}",
                player.player_number,
                player.lives,
                player.knockback_percentage,
                if hud.holder == Some(player.id) { "  [bomb]" } else { "" }
            );
            draw_text(&line, 10.0, y, 16.0, WHITE);
            y += 18.0;
        }

        y += 8.0;
        for message in hud.messages() {
            draw_text(message, 10.0, y, 14.0, Color::from_rgba(190, 190, 190, 255));
            y += 16.0;
        }

        let (cx, cy) = self.projection.to_screen(Vec3::ZERO);
        if let Some(countdown) = &hud.countdown_text {
            draw_text(countdown, cx - 10.0, cy, 64.0, WHITE);
        }
        if let Some(banner) = &hud.banner {
            draw_text(banner, cx - 80.0, cy - 40.0, 40.0, YELLOW);
        }
    }
}

//! Client input management with sequencing and change detection

use glam::Vec3;
use macroquad::input::{is_key_down, is_mouse_button_down, KeyCode, MouseButton};
use shared::{CommandInput, PlayerCommand, ThrowType};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Raw key and button state for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KeySample {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    pub throw: bool,
    pub toggle_throw_type: bool,
    pub swap_hand: bool,
    pub toggle_preview: bool,
}

impl KeySample {
    /// Reads the keyboard and mouse (WASD or arrows, Space, left click or F, Q, E, T)
    pub fn capture() -> Self {
        Self {
            forward: is_key_down(KeyCode::W) || is_key_down(KeyCode::Up),
            back: is_key_down(KeyCode::S) || is_key_down(KeyCode::Down),
            left: is_key_down(KeyCode::A) || is_key_down(KeyCode::Left),
            right: is_key_down(KeyCode::D) || is_key_down(KeyCode::Right),
            jump: is_key_down(KeyCode::Space),
            throw: is_mouse_button_down(MouseButton::Left) || is_key_down(KeyCode::F),
            toggle_throw_type: is_key_down(KeyCode::Q),
            swap_hand: is_key_down(KeyCode::E),
            toggle_preview: is_key_down(KeyCode::T),
        }
    }

    /// Movement direction on the XZ plane; screen up is -Z
    fn move_axes(&self) -> (f32, f32) {
        let axis = |negative: bool, positive: bool| match (negative, positive) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        };
        (axis(self.left, self.right), axis(self.forward, self.back))
    }
}

/// What one frame of input produced
#[derive(Debug, Default)]
pub struct InputFrame {
    pub commands: Vec<CommandInput>,
    pub toggle_preview: bool,
}

/// Turns key samples into sequenced commands for the server
pub struct InputManager {
    next_sequence: u32,
    last_move: Option<PlayerCommand>,
    last_move_sent: Instant,
    keep_alive: Duration,

    // Previous frame key states for edge detection
    prev: KeySample,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            last_move: None,
            last_move_sent: Instant::now(),
            keep_alive: Duration::from_millis(16),
            prev: KeySample::default(),
        }
    }

    /// Builds this frame's commands from a key sample.
    ///
    /// `aim` is the horizontal throw direction and `throw_type` the bomb's
    /// current mode as replicated from the server.
    pub fn update(&mut self, keys: KeySample, aim: Vec3, throw_type: ThrowType) -> InputFrame {
        let mut frame = InputFrame::default();
        let pressed = |now: bool, before: bool| now && !before;

        let (x, z) = keys.move_axes();
        let movement = PlayerCommand::Move {
            x,
            z,
            jump: keys.jump,
        };
        // Resend periodically so the server keeps us alive
        if self.last_move != Some(movement) || self.last_move_sent.elapsed() >= self.keep_alive {
            self.push(&mut frame, movement);
            self.last_move = Some(movement);
            self.last_move_sent = Instant::now();
        }

        if pressed(keys.toggle_throw_type, self.prev.toggle_throw_type) {
            self.push(&mut frame, PlayerCommand::ToggleThrowType);
        }
        if pressed(keys.swap_hand, self.prev.swap_hand) {
            self.push(&mut frame, PlayerCommand::SwapHoldSide);
        }
        if pressed(keys.throw, self.prev.throw) {
            self.push(
                &mut frame,
                PlayerCommand::Throw {
                    direction: aim,
                    throw_type,
                },
            );
        }
        frame.toggle_preview = pressed(keys.toggle_preview, self.prev.toggle_preview);

        self.prev = keys;
        frame
    }

    fn push(&mut self, frame: &mut InputFrame, command: PlayerCommand) {
        frame.commands.push(CommandInput {
            sequence: self.next_sequence,
            timestamp: Self::get_timestamp(),
            command,
        });
        self.next_sequence += 1;
    }

    fn get_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_millis() as u64
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

//! Local aim preview for the bomb throw
//!
//! Runs the shared flight step forward from the bomb's replicated position,
//! so the preview follows the path the server will compute unless a player
//! catches the bomb on the way.

use glam::Vec3;
use shared::ballistics::required_substeps;
use shared::config::{ArenaConfig, BombConfig};
use shared::{launch_velocity, step_flight, Contact, FlightBody, ThrowType};

/// How a predicted flight ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightEnd {
    /// Landed `max_bounces` times and will sit until it goes off
    Grounded,
    /// Left the arena; the server returns it to the thrower
    OutOfBounds,
    /// Still flying when the preview horizon ran out
    Horizon,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryPrediction {
    /// One point per simulated frame, starting at the launch position
    pub points: Vec<Vec3>,
    /// Floor contacts in order; the first is the real landing, the rest speculative
    pub landings: Vec<Vec3>,
    pub end: FlightEnd,
}

pub struct TrajectoryPredictor {
    arena: ArenaConfig,
    bomb: BombConfig,
    step: f32,
    horizon: f32,
}

impl TrajectoryPredictor {
    pub fn new(arena: ArenaConfig, bomb: BombConfig) -> Self {
        Self {
            arena,
            bomb,
            step: 1.0 / 60.0,
            horizon: 4.0,
        }
    }

    /// Frame step and preview length in seconds
    pub fn with_timing(mut self, step: f32, horizon: f32) -> Self {
        self.step = step.max(1e-3);
        self.horizon = horizon.max(self.step);
        self
    }

    pub fn predict(&self, start: Vec3, direction: Vec3, throw_type: ThrowType) -> TrajectoryPrediction {
        let flat = Vec3::new(direction.x, 0.0, direction.z);
        let mut body = FlightBody {
            position: start,
            velocity: launch_velocity(flat, throw_type, &self.bomb),
            mass: self.bomb.base_mass * self.bomb.flight_mass_multiplier,
        };

        let mut points = vec![start];
        let mut landings = Vec::new();
        let frames = (self.horizon / self.step).ceil() as usize;

        for _ in 0..frames {
            let substeps = required_substeps(body.velocity.length(), self.step, self.bomb.radius);
            let dt = self.step / substeps as f32;

            for _ in 0..substeps {
                match step_flight(&mut body, &self.arena, &self.bomb, dt) {
                    Some(Contact::Boundary) => {
                        points.push(body.position);
                        return TrajectoryPrediction {
                            points,
                            landings,
                            end: FlightEnd::OutOfBounds,
                        };
                    }
                    Some(Contact::Floor) => {
                        landings.push(body.position);
                        if landings.len() as u32 >= self.bomb.max_bounces {
                            points.push(body.position);
                            return TrajectoryPrediction {
                                points,
                                landings,
                                end: FlightEnd::Grounded,
                            };
                        }
                    }
                    None => {}
                }
            }
            points.push(body.position);
        }

        TrajectoryPrediction {
            points,
            landings,
            end: FlightEnd::Horizon,
        }
    }
}

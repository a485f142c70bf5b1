//! Explosion knockback arcs
//!
//! [`calculate_arc`] is a pure function of the explosion position, the victim
//! position and the victim's knockback percentage. Server and clients run it on
//! the same inputs and get bit-identical arcs, so only positions and
//! percentages have to be replicated for clients to draw a knockback.

use crate::config::KnockbackConfig;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Launch arc for one player caught by one explosion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnockbackArcData {
    /// Victim was inside the explosion radius with a positive multiplier
    pub affected: bool,
    pub start_point: Vec3,
    pub end_point: Vec3,
    /// Horizontal launch distance after all bonuses
    pub distance: f32,
    pub arc_height: f32,
    pub duration: f32,
    /// 1 is the innermost band, 0 means unaffected
    pub sector: u8,
    pub sampled_arc_points: Vec<Vec3>,
    pub daze_time: f32,
}

impl KnockbackArcData {
    fn unaffected(victim: Vec3) -> Self {
        Self {
            affected: false,
            start_point: victim,
            end_point: victim,
            distance: 0.0,
            arc_height: 0.0,
            duration: 0.0,
            sector: 0,
            sampled_arc_points: Vec::new(),
            daze_time: 0.0,
        }
    }

    /// Position along the arc at `progress` in `[0, 1]`
    pub fn point_at(&self, progress: f32, landing_blend: f32) -> Vec3 {
        arc_point(
            self.start_point,
            self.end_point,
            self.arc_height,
            progress,
            landing_blend,
        )
    }
}

/// Which percentage-to-bonus table to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BonusCurve {
    Distance,
    Height,
    Duration,
}

pub fn calculate_arc(
    config: &KnockbackConfig,
    explosion_pos: Vec3,
    victim_pos: Vec3,
    knockback_percentage: f32,
    is_holder: bool,
) -> KnockbackArcData {
    let distance = (victim_pos - explosion_pos).length();
    let normalized_distance = distance / config.explosion_radius;

    let (sector, sector_multiplier) = sector_falloff(config, normalized_distance);
    if sector == 0 || sector_multiplier <= 0.0 {
        return KnockbackArcData::unaffected(victim_pos);
    }

    let distance_bonus = percentage_bonus(config, BonusCurve::Distance, knockback_percentage);
    let height_bonus = percentage_bonus(config, BonusCurve::Height, knockback_percentage);
    let duration_bonus = percentage_bonus(config, BonusCurve::Duration, knockback_percentage);

    let mut final_distance = config.base_distance * (1.0 + distance_bonus) * sector_multiplier;
    if is_holder {
        final_distance *= config.holder_bonus;
    }
    let final_height = config.base_height * (1.0 + height_bonus);
    let final_duration = config.base_duration * (1.0 + duration_bonus);

    let offset = victim_pos - explosion_pos;
    let flat = Vec3::new(offset.x, 0.0, offset.z);
    // Standing exactly on top of the blast gives no direction to push in
    let direction = if flat.length_squared() > f32::EPSILON {
        flat.normalize()
    } else {
        Vec3::Z
    };

    let start_point = victim_pos;
    let end_point = victim_pos + direction * final_distance;
    let sampled_arc_points = sample_arc(
        start_point,
        end_point,
        final_height,
        config.arc_sample_count,
        config.landing_blend,
    );

    KnockbackArcData {
        affected: true,
        start_point,
        end_point,
        distance: final_distance,
        arc_height: final_height,
        duration: final_duration,
        sector,
        sampled_arc_points,
        daze_time: config.base_daze_time * (1.0 + duration_bonus),
    }
}

/// Band lookup plus intra-band easing toward the next band's multiplier.
///
/// Returns `(sector, multiplier)`; sector 0 means outside every band.
pub fn sector_falloff(config: &KnockbackConfig, normalized_distance: f32) -> (u8, f32) {
    if normalized_distance > 1.0 {
        return (0, 0.0);
    }

    let mut inner = 0.0;
    for (index, &outer) in config.sector_bounds.iter().enumerate() {
        if normalized_distance <= outer {
            let width = outer - inner;
            let fraction = if width > 0.0 {
                (normalized_distance - inner) / width
            } else {
                1.0
            };
            let eased = falloff_ease(fraction, config.sector_blend_start);
            let current = config.sector_multipliers.get(index).copied().unwrap_or(0.0);
            let next = config
                .sector_multipliers
                .get(index + 1)
                .copied()
                .unwrap_or(0.0);
            return ((index + 1) as u8, current + (next - current) * eased);
        }
        inner = outer;
    }

    (0, 0.0)
}

/// Flat until `blend_start`, then smoothstep to 1 at the band edge
fn falloff_ease(fraction: f32, blend_start: f32) -> f32 {
    if fraction <= blend_start {
        return 0.0;
    }
    let u = ((fraction - blend_start) / (1.0 - blend_start)).clamp(0.0, 1.0);
    u * u * (3.0 - 2.0 * u)
}

/// Piecewise-linear bonus fraction for a knockback percentage
pub fn percentage_bonus(config: &KnockbackConfig, curve: BonusCurve, percentage: f32) -> f32 {
    let values = match curve {
        BonusCurve::Distance => &config.distance_bonus,
        BonusCurve::Height => &config.height_bonus,
        BonusCurve::Duration => &config.duration_bonus,
    };
    evaluate_curve(&config.percentage_breakpoints, values, percentage)
}

fn evaluate_curve(breakpoints: &[f32], values: &[f32], x: f32) -> f32 {
    let count = breakpoints.len().min(values.len());
    if count == 0 {
        return 0.0;
    }
    let x = if x.is_nan() { 0.0 } else { x };

    if x <= breakpoints[0] {
        return values[0];
    }
    if x >= breakpoints[count - 1] {
        return values[count - 1];
    }

    for i in 0..count - 1 {
        let (lo, hi) = (breakpoints[i], breakpoints[i + 1]);
        if x <= hi {
            let t = (x - lo) / (hi - lo);
            return values[i] + (values[i + 1] - values[i]) * t;
        }
    }

    values[count - 1]
}

/// Evenly spaced samples of the launch arc, first at `start`, last at `end`
pub fn sample_arc(
    start: Vec3,
    end: Vec3,
    height: f32,
    count: usize,
    landing_blend: f32,
) -> Vec<Vec3> {
    let count = count.max(2);
    (0..count)
        .map(|i| {
            let t = i as f32 / (count - 1) as f32;
            arc_point(start, end, height, t, landing_blend)
        })
        .collect()
}

/// Parabolic arc with a squared ease-out over the last stretch.
///
/// Before `landing_blend` the point follows a plain parabola peaking at
/// `height`. After it, horizontal progress eases out and the remaining lift
/// decays to zero, so touchdown has no vertical snap.
pub fn arc_point(start: Vec3, end: Vec3, height: f32, t: f32, landing_blend: f32) -> Vec3 {
    let t = t.clamp(0.0, 1.0);
    let lift = |p: f32| 4.0 * height * p * (1.0 - p);

    if t <= landing_blend {
        return start.lerp(end, t) + Vec3::Y * lift(t);
    }

    let u = (t - landing_blend) / (1.0 - landing_blend);
    let eased = 1.0 - (1.0 - u) * (1.0 - u);
    let progress = landing_blend + (1.0 - landing_blend) * eased;
    start.lerp(end, progress) + Vec3::Y * (lift(landing_blend) * (1.0 - eased))
}

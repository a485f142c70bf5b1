//! Spawn point selection
//!
//! Picks where players appear on join and respawn. Points used recently or
//! still cooling down are avoided; when every point is busy the allocator
//! falls back to the one idle the longest, so a spawn request never waits.

use glam::Vec3;
use log::{debug, error};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use shared::config::SpawnConfig;
use shared::SimTime;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct SpawnPoint {
    pub position: Vec3,
    pub last_used: Option<SimTime>,
}

pub struct SpawnAllocator {
    points: Vec<SpawnPoint>,
    /// Most recently handed out indices, oldest first
    recent: VecDeque<usize>,
    recent_capacity: usize,
    cooldown: f32,
    rng: StdRng,
}

impl SpawnAllocator {
    pub fn new(config: &SpawnConfig, rng: StdRng) -> Self {
        let points: Vec<SpawnPoint> = config
            .points
            .iter()
            .map(|&position| SpawnPoint {
                position,
                last_used: None,
            })
            .collect();
        let recent_capacity = (points.len() / 2).max(1);

        Self {
            points,
            recent: VecDeque::with_capacity(recent_capacity),
            recent_capacity,
            cooldown: config.cooldown,
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point(&self, index: usize) -> Option<&SpawnPoint> {
        self.points.get(index)
    }

    fn is_cooling_down(&self, index: usize, now: SimTime) -> bool {
        self.points[index]
            .last_used
            .is_some_and(|used| now - used < self.cooldown as SimTime)
    }

    /// Chooses a spawn index and marks it used at `now`.
    ///
    /// Returns `None` only for an empty pool, which is a configuration error.
    pub fn choose_spawn_index(&mut self, now: SimTime) -> Option<usize> {
        if self.points.is_empty() {
            error!("Spawn requested but the spawn pool is empty");
            return None;
        }

        let eligible: Vec<usize> = (0..self.points.len())
            .filter(|index| !self.recent.contains(index) && !self.is_cooling_down(*index, now))
            .collect();

        let index = match eligible.choose(&mut self.rng) {
            Some(&index) => index,
            None => {
                let fallback = self.longest_idle(now);
                debug!("No spawn point off cooldown, reusing idlest point {}", fallback);
                fallback
            }
        };

        self.mark_used(index, now);
        Some(index)
    }

    pub fn choose_spawn(&mut self, now: SimTime) -> Option<Vec3> {
        self.choose_spawn_index(now)
            .map(|index| self.points[index].position)
    }

    /// Index with the longest time since last use; never-used points win
    fn longest_idle(&self, now: SimTime) -> usize {
        let mut best = 0;
        let mut best_idle = SimTime::NEG_INFINITY;
        for (index, point) in self.points.iter().enumerate() {
            let idle = match point.last_used {
                Some(used) => now - used,
                None => SimTime::INFINITY,
            };
            if idle > best_idle {
                best = index;
                best_idle = idle;
            }
        }
        best
    }

    fn mark_used(&mut self, index: usize, now: SimTime) {
        self.points[index].last_used = Some(now);
        self.recent.retain(|&recent| recent != index);
        self.recent.push_back(index);
        while self.recent.len() > self.recent_capacity {
            self.recent.pop_front();
        }
    }
}

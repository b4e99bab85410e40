//! Sonar perception: a fixed fan of sampled arms around the agent.
//!
//! Each arm is a row of sample points walked outward from the agent. An arm's reading
//! is the 1-based index of the first sample that is off the arena or inside a body.
//! A reading of [`CRASH_READING`] means something is touching the agent and
//! [`CLEAR`] means nothing was found along the whole arm.

use rapier2d::prelude::*;

pub const ARM_COUNT: usize = 17;
pub const SAMPLES_PER_ARM: u32 = 39;

/// Angle of each arm relative to the heading, left-most first.
pub const ARM_OFFSETS: [f32; ARM_COUNT] = [
    1.8, 1.5, 1.2, 0.9, 0.7, 0.5, 0.3, 0.15, 0.0, -0.15, -0.3, -0.5, -0.7, -0.9, -1.2, -1.5,
    -1.8,
];

/// Gap between the agent's centre and sample zero.
pub const ARM_GAP: f32 = 20.0;
/// Distance between consecutive samples.
pub const ARM_SPREAD: f32 = 10.0;

pub const CRASH_READING: u32 = 1;
/// No obstruction within the arm's range. Not a distance.
pub const CLEAR: u32 = SAMPLES_PER_ARM;

pub type Readings = [u32; ARM_COUNT];
pub type State = [f32; ARM_COUNT];

#[derive(Debug, Clone, Copy)]
pub struct Sonar {
    width: f32,
    height: f32,
}

impl Sonar {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Radial distance of the 1-based sample `index`.
    pub fn sample_distance(index: u32) -> f32 {
        ARM_GAP + ARM_SPREAD * index as f32
    }

    /// Reads all arms for an agent at `(x, y)` facing `heading`.
    ///
    /// `obstructed` answers whether an in-bounds point lies inside a body.
    pub fn sense(
        &self,
        x: f32,
        y: f32,
        heading: f32,
        obstructed: impl Fn(&Point<f32>) -> bool,
    ) -> Readings {
        self.sense_with_probes(x, y, heading, obstructed, |_| {})
    }

    /// Like [`Sonar::sense`], but reports every clear sample that was walked.
    pub fn sense_with_probes(
        &self,
        x: f32,
        y: f32,
        heading: f32,
        obstructed: impl Fn(&Point<f32>) -> bool,
        mut probe: impl FnMut(Point<f32>),
    ) -> Readings {
        let mut readings = [CLEAR; ARM_COUNT];
        for (reading, offset) in readings.iter_mut().zip(ARM_OFFSETS) {
            *reading = self.arm_distance(x, y, heading + offset, &obstructed, &mut probe);
        }
        readings
    }

    fn arm_distance(
        &self,
        x: f32,
        y: f32,
        angle: f32,
        obstructed: &impl Fn(&Point<f32>) -> bool,
        probe: &mut impl FnMut(Point<f32>),
    ) -> u32 {
        let (sin, cos) = angle.sin_cos();
        for i in 1..=SAMPLES_PER_ARM {
            let r = Self::sample_distance(i);
            let p = point![x + r * cos, y + r * sin];
            if !self.in_bounds(&p) || obstructed(&p) {
                return i;
            }
            probe(p);
        }
        CLEAR
    }

    /// The arena is closed: points on the boundary lines are still inside.
    pub fn in_bounds(&self, p: &Point<f32>) -> bool {
        p.x >= 0.0 && p.y >= 0.0 && p.x <= self.width && p.y <= self.height
    }

    /// Flips a y-up arena point into top-left-origin screen space.
    pub fn to_screen(&self, p: Point<f32>) -> Point<f32> {
        point![p.x, self.height - p.y]
    }
}

pub fn is_crash(readings: &Readings) -> bool {
    readings.iter().any(|&r| r == CRASH_READING)
}

pub fn normalize(readings: &Readings) -> State {
    readings.map(|r| (r as f32 - 20.0) / 20.0)
}

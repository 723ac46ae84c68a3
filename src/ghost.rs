//! The ghost frame gate and pose jitter.
//!
//! Ghost mode runs the gait at a deliberately low, randomized frame rate.
//! Between gate openings the last computed poses are re-applied verbatim, so
//! the limbs hold still and then snap, like a stop-motion apparition.

use glam::{EulerRot, Quat, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Parameters, Pose};

/// Gate deciding when the ghost animation is allowed to compute a new frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GhostThrottle {
    /// Time at which the gate opens next.
    pub next_update: f32,
    /// Poses replayed while the gate is closed.
    pub cached: Option<[Pose; 2]>,
}

impl GhostThrottle {
    pub fn should_advance(&self, now: f32) -> bool {
        now >= self.next_update
    }

    /// Schedules the next gate opening a random ghost-frame interval away.
    pub fn rearm<R: Rng>(&mut self, now: f32, parameters: Parameters, rng: &mut R) {
        let shortest = 1. / parameters.ghost_fps_max;
        let longest = 1. / parameters.ghost_fps_min;
        let interval = if longest > shortest {
            rng.gen_range(shortest..longest)
        } else {
            shortest
        };
        self.next_update = now + interval;
    }
}

/// Uniform offset within a ball of the given radius.
pub(crate) fn position_jitter<R: Rng>(rng: &mut R, radius: f32) -> Vec3 {
    if radius <= 0. {
        return Vec3::ZERO;
    }
    loop {
        let v = Vec3::new(
            rng.gen_range(-1f32..1.),
            rng.gen_range(-1f32..1.),
            rng.gen_range(-1f32..1.),
        );
        if v.length_squared() <= 1. {
            return v * radius;
        }
    }
}

/// Small random tilt, independent per axis.
pub(crate) fn rotation_jitter<R: Rng>(rng: &mut R, degrees: f32) -> Quat {
    if degrees <= 0. {
        return Quat::IDENTITY;
    }
    let range = degrees.to_radians();
    Quat::from_euler(
        EulerRot::ZXY,
        rng.gen_range(-range..range),
        rng.gen_range(-range..range),
        rng.gen_range(-range..range),
    )
}

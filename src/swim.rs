//! Breaststroke generator.
//!
//! Both arms run the same four-phase stroke, mirrored across the travel
//! direction: reach forward, catch wide, pull back, recover. Targets hang off
//! the head so the stroke stays in front of the camera, and the hands chase
//! them with critical damping instead of snapping.

use std::f32::consts::TAU;

use glam::{Mat3, Quat, Vec3};

use crate::{damp, Basis, Frame, Parameters, Pose};

/// Arm target offsets for one point of the stroke cycle, in head space:
/// forward along travel, spread away from the midline, depth below the head.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StrokeEnvelope {
    pub forward: f32,
    pub spread: f32,
    pub depth: f32,
}

/// Evaluates the stroke at a normalized cycle position in `[0, 1)`.
///
/// Piecewise linear and continuous, including across the wrap.
pub(crate) fn stroke_envelope(cycle: f32) -> StrokeEnvelope {
    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let blend = |t, (a0, b0, c0): (f32, f32, f32), (a1, b1, c1)| StrokeEnvelope {
        forward: lerp(a0, a1, t),
        spread: lerp(b0, b1, t),
        depth: lerp(c0, c1, t),
    };

    // (forward, spread, depth) at the phase boundaries.
    const REACH: (f32, f32, f32) = (1., 3.5, -2.);
    const CATCH: (f32, f32, f32) = (3., 4., -1.);
    const PULL: (f32, f32, f32) = (2., 5.5, -1.5);
    const RECOVERY: (f32, f32, f32) = (-1.5, 4., -2.5);

    if cycle < 0.3 {
        blend(cycle / 0.3, REACH, CATCH)
    } else if cycle < 0.5 {
        blend((cycle - 0.3) / 0.2, CATCH, PULL)
    } else if cycle < 0.8 {
        blend((cycle - 0.5) / 0.3, PULL, RECOVERY)
    } else {
        blend((cycle - 0.8) / 0.2, RECOVERY, REACH)
    }
}

/// Advances the stroke and returns the next left/right hand poses.
#[allow(clippy::too_many_arguments)]
pub(crate) fn animate(
    parameters: Parameters,
    frame: Frame,
    basis: Basis,
    head: Vec3,
    speed: f32,
    swim_cycle: &mut f32,
    left_prev: Pose,
    right_prev: Pose,
) -> (Pose, Pose) {
    // The cycle never stops; idle strokes read as treading water.
    let rate = if speed > 0.1 {
        parameters.swim_cycle_moving
    } else {
        parameters.swim_cycle_idle
    };
    *swim_cycle += frame.dt * rate;

    let cycle = (*swim_cycle % TAU) / TAU;
    let envelope = stroke_envelope(cycle);

    let along = basis.forward * envelope.forward + Vec3::Z * envelope.depth;
    let left_target = head + along - basis.right * envelope.spread;
    let right_target = head + along + basis.right * envelope.spread;

    // Palms angle down while reaching, face backward while pulling.
    let palm_dir = if cycle < 0.5 {
        basis.forward - Vec3::Z * 0.5
    } else {
        -basis.forward - Vec3::Z * 0.3
    };
    let facing = look_rotation(palm_dir, Vec3::Z);
    let left_rot = facing * Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
    let right_rot = facing * Quat::from_rotation_z(-std::f32::consts::FRAC_PI_2);

    let smoothing = parameters.swim_smoothing;
    let blend = (smoothing * frame.dt).clamp(0., 1.);
    let left = Pose {
        pos: damp(left_prev.pos, left_target, smoothing, frame.dt),
        rot: left_prev.rot.slerp(left_rot, blend),
    };
    let right = Pose {
        pos: damp(right_prev.pos, right_target, smoothing, frame.dt),
        rot: right_prev.rot.slerp(right_rot, blend),
    };
    (left, right)
}

/// Orientation with local X pointing along `forward` and local Z near `up`.
fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
    let x = forward.normalize_or_zero();
    if x == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    let y = up.cross(x).normalize_or_zero();
    if y == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    let z = x.cross(y);
    Quat::from_mat3(&Mat3::from_cols(x, y, z))
}

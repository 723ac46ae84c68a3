//! Cyclic plant/swing gait shared by the floor-stepping modes.
//!
//! Each manipulator alternates between a swing half-cycle (airborne, arcing
//! toward the next landing point) and a plant half-cycle (anchored to a world
//! position that only moves when dragged past the allowed range). The two
//! limbs run the same cycle half a phase apart.

use std::f32::consts::PI;

use glam::Vec3;

use crate::{damp, Basis, CollisionMask, Manipulator, Parameters, Probe};

/// Horizontal speed below which the gait idles instead of cycling.
pub(crate) const IDLE_SPEED: f32 = 0.05;

/// Per-mode gait shape.
pub(crate) struct GaitTuning {
    /// Sideways offset of the resting footing from the body.
    pub lateral: f32,
    /// Forward offset of the resting footing from the body.
    pub forward_rest: f32,
    /// Sideways offset of the landing point.
    pub landing_lateral: f32,
    /// Forward offset of the landing point.
    pub landing_reach: f32,
    /// Peak height of the swing arc.
    pub step_height: f32,
    /// Extends the plant-drag range by the body lift.
    pub uses_lift: bool,
    /// Idle eases toward the resting footing instead of snapping to it.
    pub idle_settles: bool,
}

pub(crate) const GORILLA: GaitTuning = GaitTuning {
    lateral: 0.3,
    forward_rest: 0.4,
    landing_lateral: 0.35,
    landing_reach: 0.8,
    step_height: 0.35,
    uses_lift: true,
    idle_settles: true,
};

pub(crate) const GHOST: GaitTuning = GaitTuning {
    lateral: 0.25,
    forward_rest: 0.3,
    landing_lateral: 0.25,
    landing_reach: 0.6,
    step_height: 0.2,
    uses_lift: false,
    idle_settles: false,
};

/// Drops a planar offset point onto whatever surface is below it.
///
/// The probe starts a unit above the body's height so a footing slightly
/// uphill is still found; on a miss the point hangs at a fixed drop below
/// the body, as if the ground were just out of reach.
fn footing<P: Probe>(
    probe: &P,
    body_pos: Vec3,
    offset: Vec3,
    reach: f32,
    miss_drop: f32,
) -> Vec3 {
    let spot = body_pos + Vec3::new(offset.x, offset.y, 0.);
    let z = match probe.raycast(spot + Vec3::Z, -Vec3::Z, reach, CollisionMask::WALKABLE) {
        Some(hit) => hit.point.z,
        None => body_pos.z - miss_drop,
    };
    Vec3::new(spot.x, spot.y, z)
}

/// Advances one manipulator through its gait cycle and returns the position
/// it should be driven to this tick.
///
/// `side` is -1 for the left limb and 1 for the right; `phase` is the
/// normalized cycle position of this limb, swing in `[0, 0.5)` and plant in
/// `[0.5, 1)`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn limb_step<P: Probe>(
    probe: &P,
    parameters: Parameters,
    tuning: &GaitTuning,
    basis: Basis,
    body_pos: Vec3,
    side: f32,
    phase: f32,
    speed: f32,
    dt: f32,
    limb: &mut Manipulator,
) -> Vec3 {
    let lift = if tuning.uses_lift {
        parameters.body_lift
    } else {
        0.
    };
    let ideal = footing(
        probe,
        body_pos,
        basis.forward * tuning.forward_rest + basis.right * side * tuning.lateral,
        4. + lift,
        0.8 + lift,
    );

    let is_planting = phase >= 0.5;

    let pos = if speed < IDLE_SPEED {
        if tuning.idle_settles {
            let plant = limb.plant_pos.unwrap_or(ideal);
            let plant = damp(plant, ideal, parameters.idle_settle_rate, dt);
            limb.plant_pos = Some(plant);
            plant
        } else {
            ideal
        }
    } else if is_planting {
        // The landing point is sampled once on touchdown and then held.
        if !limb.was_planted {
            limb.plant_pos = Some(footing(
                probe,
                body_pos,
                basis.forward * tuning.landing_reach
                    + basis.right * side * tuning.landing_lateral,
                3. + lift,
                0.9 + lift,
            ));
        }

        let mut plant = limb.plant_pos.unwrap_or(ideal);
        if plant.distance(body_pos) > parameters.drag_limit + lift {
            // Dragged out of range; relax back toward the resting footing.
            plant = damp(plant, ideal, parameters.drag_relax_rate, dt);
            limb.plant_pos = Some(plant);
        }
        plant
    } else {
        // Swing: arc from the lift-off anchor toward the resting footing.
        let swing = phase / 0.5;
        let from = limb.plant_pos.unwrap_or(ideal);
        let mut pos = from.lerp(ideal, swing);
        pos.z += (swing * PI).sin() * tuning.step_height;

        // Never dip below the straight-line base, or the limb would clip
        // into rising terrain.
        let base = from.z + (ideal.z - from.z) * swing;
        pos.z = pos.z.max(base);
        pos
    };

    limb.was_planted = is_planting;
    pos
}

/// The Silly mode hand swing: a plain sine sway, no planting involved.
pub(crate) fn silly_poses(
    basis: Basis,
    body_pos: Vec3,
    body_rot: glam::Quat,
    cycle: f32,
    speed: f32,
) -> (crate::Pose, crate::Pose) {
    let swing = if speed > 0.1 { cycle.sin() * 0.3 } else { 0. };

    let base = body_pos - Vec3::Z * 0.3;
    let pitch = glam::Quat::from_rotation_y(swing * 30f32.to_radians());

    let left = crate::Pose {
        pos: base - basis.right * 0.3 + basis.forward * swing,
        rot: body_rot * pitch,
    };
    let right = crate::Pose {
        pos: base + basis.right * 0.3 - basis.forward * swing,
        rot: body_rot * pitch.inverse(),
    };
    (left, right)
}

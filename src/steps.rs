use std::f32::consts::{FRAC_PI_2, PI};

use glam::{EulerRot, Quat, Vec3, Vec3Swizzles};
use rand::Rng;
use tracing::{debug, info};

use super::*;
use crate::{gait, ghost, swim};

/// Height of the body pivot above the surface the feet stand on, before lift.
pub(crate) const BASE_STAND_HEIGHT: f32 = 0.35;
const CROUCH_DROP: f32 = 0.4;
const MIN_CLEARANCE: f32 = 0.2;
/// Fixed lower bound of the climb height window. A `max_climb_height` below
/// this disables climbing entirely.
const CLIMB_MIN_HEIGHT: f32 = 0.5;
/// Reach offsets scanned past the wall hit, catching thin and irregular tops.
const REACH_DEPTHS: [f32; 3] = [0.05, 0.15, 0.3];

/// One stage of the per-tick pipeline.
///
/// A wrapper simulates its own concern and then hands the state to the inner
/// stage, or short-circuits by not calling it (climb excludes movement and
/// gait within the same tick).
pub(crate) trait Step {
    fn advance<P: Probe, S: PoseSink, R: Rng>(
        &self,
        probe: &P,
        sink: &mut S,
        rng: &mut R,
        parameters: Parameters,
        input: &Input,
        frame: Frame,
        state: State,
    ) -> State;
}

/// Mode selection, the water autoswitch and the free-look pass-through.
pub(crate) struct ResolveMode<S>(pub S);

impl<S: Step> Step for ResolveMode<S> {
    fn advance<P: Probe, SK: PoseSink, R: Rng>(
        &self,
        probe: &P,
        sink: &mut SK,
        rng: &mut R,
        parameters: Parameters,
        input: &Input,
        frame: Frame,
        mut state: State,
    ) -> State {
        if let Some(mode) = input.select_mode {
            state.set_mode(mode);
        }

        if frame.submerged && !state.was_submerged {
            if state.mode != Mode::Swimming {
                state.mode_before_water = state.mode;
                state.mode = Mode::Swimming;
                info!("entered water, switching to Swimming");
            }
        } else if !frame.submerged && state.was_submerged && state.mode == Mode::Swimming {
            state.mode = state.mode_before_water;
            info!("left water, switching back to {:?}", state.mode);
        }
        state.was_submerged = frame.submerged;

        if let Some(look) = input.look {
            sink.set_head_rotation(look);
        }

        self.0
            .advance(probe, sink, rng, parameters, input, frame, state)
    }
}

/// The vault state machine. While a climb is active it owns both the body
/// and the manipulators and the tick ends here.
pub(crate) struct Climb<S>(pub S);

impl<S: Step> Step for Climb<S> {
    fn advance<P: Probe, SK: PoseSink, R: Rng>(
        &self,
        probe: &P,
        sink: &mut SK,
        rng: &mut R,
        parameters: Parameters,
        input: &Input,
        frame: Frame,
        mut state: State,
    ) -> State {
        let Some(climb) = state.climb else {
            return self
                .0
                .advance(probe, sink, rng, parameters, input, frame, state);
        };

        let elapsed = frame.now - climb.start_time;
        let t = elapsed / climb.duration;
        if t >= 1. {
            debug!("climb finished");
            state.climb = None;
            state.body_vel = Vec3::ZERO;
            sink.set_body_velocity(Vec3::ZERO);
            return state;
        }

        let mut path = climb.start_pos.lerp(climb.target_pos, smoothstep(t));
        path.z += (t * PI).sin() * parameters.climb_arc_height;

        // Drive via velocity for smoothness, clamped to avoid explosions.
        let vel = ((path - state.body_pos) / frame.dt).clamp_length_max(parameters.climb_max_speed);
        state.body_vel = vel;
        state.body_pos += vel * frame.dt;
        sink.set_body_velocity(vel);
        sink.set_body_position(state.body_pos);

        // Hands grapple the ledge quickly, then hold a fixed grip.
        let grip_t = (elapsed / parameters.grip_window).clamp(0., 1.);
        let grip = Quat::from_rotation_x(FRAC_PI_2);
        let left = Pose {
            pos: climb.hand_start_left.lerp(climb.hand_left, grip_t),
            rot: grip,
        };
        let right = Pose {
            pos: climb.hand_start_right.lerp(climb.hand_right, grip_t),
            rot: grip,
        };
        sink.set_manipulator_pose(Side::Left, left);
        sink.set_manipulator_pose(Side::Right, right);
        state.left.pose = left;
        state.right.pose = right;
        state.left.reset_plant();
        state.right.reset_plant();

        state
    }
}

/// Directional movement, the hover height-follow, jump, climb triggering and
/// body integration.
pub(crate) struct Move<S>(pub S);

impl<S: Step> Step for Move<S> {
    fn advance<P: Probe, SK: PoseSink, R: Rng>(
        &self,
        probe: &P,
        sink: &mut SK,
        rng: &mut R,
        parameters: Parameters,
        input: &Input,
        frame: Frame,
        mut state: State,
    ) -> State {
        let basis = Basis::from_camera(input);
        let mut target = Vec3::ZERO;
        let mut move_dir = Vec3::ZERO;

        if input.move_axes.length() > 0.1 {
            if let Some(basis) = basis {
                move_dir = (basis.forward * input.move_axes.y + basis.right * input.move_axes.x)
                    .normalize_or_zero();

                let mut speed = if input.crouch {
                    parameters.walk_speed * 0.5
                } else if input.sprint {
                    parameters.run_speed
                } else {
                    parameters.walk_speed
                };
                if frame.submerged {
                    // Water resistance.
                    speed *= parameters.water_speed_factor;
                }

                target = move_dir * speed;
            }
        }

        // Proportional hover toward the desired clearance. Ground below but
        // above the clearance means falling toward it; a full probe miss
        // preserves vertical velocity instead (nothing to stand on, nothing
        // to fall toward that we know of).
        let lift = parameters.body_lift - if input.crouch { CROUCH_DROP } else { 0. };
        let desired = (BASE_STAND_HEIGHT + lift).max(MIN_CLEARANCE);
        let mut falling = false;
        match probe.raycast(
            state.body_pos,
            -Vec3::Z,
            desired + 2.,
            CollisionMask::WALKABLE,
        ) {
            Some(hit) if hit.distance < desired => {
                target.z = (desired - hit.distance) * parameters.hover_gain;
            }
            Some(_) => {
                target.z = state.body_vel.z;
                falling = true;
            }
            None => target.z = state.body_vel.z,
        }

        if move_dir != Vec3::ZERO {
            if let Some(basis) = basis {
                try_start_climb(probe, parameters, &mut state, frame, move_dir, basis.right);
                if state.climb.is_some() {
                    // The vault owns the body from here on.
                    state.body_vel = Vec3::ZERO;
                    sink.set_body_velocity(Vec3::ZERO);
                    return state;
                }
            }
        }

        state.body_vel = damp(state.body_vel, target, parameters.velocity_smoothing, frame.dt);
        if falling {
            state.body_vel.z -= parameters.gravity * frame.dt;
        }

        if input.jump
            && probe
                .raycast(state.body_pos, -Vec3::Z, 0.5, CollisionMask::WALKABLE)
                .is_some()
        {
            state.body_vel.z = parameters.jump_speed;
        }

        state.body_pos += state.body_vel * frame.dt;
        sink.set_body_velocity(state.body_vel);

        self.0
            .advance(probe, sink, rng, parameters, input, frame, state)
    }
}

fn try_start_climb<P: Probe>(
    probe: &P,
    parameters: Parameters,
    state: &mut State,
    frame: Frame,
    dir: Vec3,
    right: Vec3,
) {
    state.climb_scan.clear();

    // Wall ahead, probed at waist height.
    let origin = state.body_pos + Vec3::Z * 0.5;
    let Some(wall) = probe.raycast(origin, dir, 1., CollisionMask::WALKABLE) else {
        return;
    };

    for depth in REACH_DEPTHS {
        let reach = wall.point + dir * depth + Vec3::Z * 1.5;
        let Some(top) = probe.raycast(reach, -Vec3::Z, 2., CollisionMask::WALKABLE) else {
            continue;
        };
        state.climb_scan.push(top);

        let height = top.point.z - state.body_pos.z;
        if height > CLIMB_MIN_HEIGHT && height <= parameters.max_climb_height {
            // First matching depth wins.
            let blocked = probe
                .raycast(top.point + Vec3::Z * 0.2, dir, 0.5, CollisionMask::WALKABLE)
                .is_some();
            let forward_offset = if blocked { 0. } else { 0.3 };

            info!(ledge = ?top.point, "starting climb");
            state.left.reset_plant();
            state.right.reset_plant();
            state.climb = Some(ClimbState {
                start_pos: state.body_pos,
                target_pos: top.point
                    + Vec3::Z * (BASE_STAND_HEIGHT + parameters.body_lift)
                    + dir * forward_offset,
                start_time: frame.now,
                duration: parameters.climb_duration,
                hand_left: top.point - right * 0.2,
                hand_right: top.point + right * 0.2,
                hand_start_left: state.left.pose.pos,
                hand_start_right: state.right.pose.pos,
            });
            return;
        }
    }
}

/// Advances the cycle clock and dispatches limb animation for the active mode.
pub(crate) struct Animate;

impl Step for Animate {
    fn advance<P: Probe, SK: PoseSink, R: Rng>(
        &self,
        probe: &P,
        sink: &mut SK,
        rng: &mut R,
        parameters: Parameters,
        input: &Input,
        frame: Frame,
        mut state: State,
    ) -> State {
        let speed = state.body_vel.xy().length();
        // The cycle clock stalls a bit earlier than the gait does, so a
        // crawl still plants without the stride churning.
        if speed > 0.1 {
            state.cycle += frame.dt * speed * parameters.cycle_gain;
        } else {
            state.cycle = damp_f(state.cycle, 0., parameters.idle_cycle_decay, frame.dt);
        }

        let Some(basis) = Basis::from_camera(input) else {
            // No usable camera basis; skip animation for this tick.
            return state;
        };
        let body_rot = basis.yaw_rotation();

        match state.mode {
            Mode::Gorilla => {
                let left_pos = gait::limb_step(
                    probe,
                    parameters,
                    &gait::GORILLA,
                    basis,
                    state.body_pos,
                    -1.,
                    normalized_phase(state.cycle, 0.),
                    speed,
                    frame.dt,
                    &mut state.left,
                );
                let right_pos = gait::limb_step(
                    probe,
                    parameters,
                    &gait::GORILLA,
                    basis,
                    state.body_pos,
                    1.,
                    normalized_phase(state.cycle, PI),
                    speed,
                    frame.dt,
                    &mut state.right,
                );

                let left = Pose {
                    pos: left_pos,
                    rot: hand_rotation(body_rot, Side::Left),
                };
                let right = Pose {
                    pos: right_pos,
                    rot: hand_rotation(body_rot, Side::Right),
                };
                apply_poses(sink, &mut state, left, right);
            }
            Mode::Silly => {
                state.left.reset_plant();
                state.right.reset_plant();
                let (left, right) =
                    gait::silly_poses(basis, state.body_pos, body_rot, state.cycle, speed);
                apply_poses(sink, &mut state, left, right);
            }
            Mode::Ghost => {
                if !state.throttle.should_advance(frame.now) {
                    // Between frames the cached poses are re-applied verbatim.
                    if let Some([left, right]) = state.throttle.cached {
                        apply_poses(sink, &mut state, left, right);
                    }
                } else {
                    state.throttle.rearm(frame.now, parameters, rng);

                    let left_pos = gait::limb_step(
                        probe,
                        parameters,
                        &gait::GHOST,
                        basis,
                        state.body_pos,
                        -1.,
                        normalized_phase(state.cycle, 0.),
                        speed,
                        frame.dt,
                        &mut state.left,
                    );
                    let right_pos = gait::limb_step(
                        probe,
                        parameters,
                        &gait::GHOST,
                        basis,
                        state.body_pos,
                        1.,
                        normalized_phase(state.cycle, PI),
                        speed,
                        frame.dt,
                        &mut state.right,
                    );

                    let left = Pose {
                        pos: left_pos + ghost::position_jitter(rng, parameters.ghost_jitter_pos),
                        rot: hand_rotation(body_rot, Side::Left)
                            * ghost::rotation_jitter(rng, parameters.ghost_jitter_rot_deg),
                    };
                    let right = Pose {
                        pos: right_pos + ghost::position_jitter(rng, parameters.ghost_jitter_pos),
                        rot: hand_rotation(body_rot, Side::Right)
                            * ghost::rotation_jitter(rng, parameters.ghost_jitter_rot_deg),
                    };

                    state.throttle.cached = Some([left, right]);
                    apply_poses(sink, &mut state, left, right);
                }
            }
            Mode::Swimming => {
                state.left.reset_plant();
                state.right.reset_plant();

                let head = input.head_pos.unwrap_or(state.body_pos);
                let (left, right) = swim::animate(
                    parameters,
                    frame,
                    basis,
                    head,
                    speed,
                    &mut state.swim_cycle,
                    state.left.pose,
                    state.right.pose,
                );
                apply_poses(sink, &mut state, left, right);
            }
        }

        state
    }
}

fn apply_poses<S: PoseSink>(sink: &mut S, state: &mut State, left: Pose, right: Pose) {
    sink.set_manipulator_pose(Side::Left, left);
    sink.set_manipulator_pose(Side::Right, right);
    state.left.pose = left;
    state.right.pose = right;
}

/// Fixed manipulator orientation relative to the body: knuckles down,
/// fingers turned outward per side.
fn hand_rotation(body_rot: Quat, side: Side) -> Quat {
    let yaw = match side {
        Side::Left => FRAC_PI_2,
        Side::Right => -FRAC_PI_2,
    };
    body_rot * Quat::from_euler(EulerRot::ZXY, yaw, PI, 0.)
}

//! Procedural, raycast-probed locomotion for a two-limb avatar.
//!
//! The avatar has no skeletal walk animations; hand-planting gait, ledge
//! climbing, a low-framerate "ghost" style and a swim stroke are synthesized
//! every simulation tick from probe queries and time-based interpolation.
//!
//! To simulate, call [`State::advance()`] once per host tick with the world's
//! [`Probe`], a [`PoseSink`] receiving the resulting transforms, and an `Rng`
//! (seed it for reproducible ghost timing).

use std::f32::consts::TAU;

use arrayvec::ArrayVec;
use bitflags::bitflags;
use glam::{Quat, Vec2, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod audio;
mod gait;
mod ghost;
mod steps;
mod swim;

pub use ghost::GhostThrottle;
use steps::*;

bitflags! {
    /// Collision layers a probe is allowed to hit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CollisionMask: u32 {
        const DEFAULT = 1;
        const TERRAIN = 1 << 9;
    }
}

impl CollisionMask {
    /// Layers the locomotion probes consider walkable.
    pub const WALKABLE: CollisionMask = CollisionMask::DEFAULT.union(CollisionMask::TERRAIN);
}

/// Result of a successful probe query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RaycastHit {
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

/// The game world's ray-casting query service.
///
/// A miss is a normal, expected outcome; every caller has a fallback.
pub trait Probe {
    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: CollisionMask,
    ) -> Option<RaycastHit>;
}

/// A probe that operates as if in an empty world.
pub struct DummyProbe;

impl Probe for DummyProbe {
    fn raycast(&self, _: Vec3, _: Vec3, _: f32, _: CollisionMask) -> Option<RaycastHit> {
        None
    }
}

/// One of the avatar's two hand-equivalent end effectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// A position/rotation pair for one manipulator.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub pos: Vec3,
    pub rot: Quat,
}

/// Write targets for the body and the rig transforms.
pub trait PoseSink {
    fn set_body_velocity(&mut self, velocity: Vec3);
    /// Only driven while a climb is active.
    fn set_body_position(&mut self, position: Vec3);
    fn set_manipulator_pose(&mut self, side: Side, pose: Pose);
    fn set_head_rotation(&mut self, rotation: Quat);
}

/// A sink that discards every write.
pub struct NullSink;

impl PoseSink for NullSink {
    fn set_body_velocity(&mut self, _: Vec3) {}
    fn set_body_position(&mut self, _: Vec3) {}
    fn set_manipulator_pose(&mut self, _: Side, _: Pose) {}
    fn set_head_rotation(&mut self, _: Quat) {}
}

/// Locomotion style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    /// Floor-based hand stepping.
    #[default]
    Gorilla,
    /// Simple hand swinging.
    Silly,
    /// Low-framerate, jittering hand stepping.
    Ghost,
    /// Breaststroke; forced while submerged.
    Swimming,
}

/// Movement parameters.
///
/// The relaxation rates and jitter amplitudes are exposed here rather than
/// hard-coded, but changing them from the defaults changes the feel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    pub walk_speed: f32,
    pub run_speed: f32,
    /// Extra float height above the ground.
    pub body_lift: f32,
    /// Tallest ledge the climb detector accepts. The lower bound is fixed at
    /// 0.5, so values below that disable climbing entirely.
    pub max_climb_height: f32,
    pub climb_duration: f32,
    pub climb_max_speed: f32,
    pub climb_arc_height: f32,
    /// Time the manipulators take to reach their grip targets.
    pub grip_window: f32,
    pub jump_speed: f32,
    pub gravity: f32,
    /// Proportional gain of the hover height controller.
    pub hover_gain: f32,
    /// Low-pass rate for body velocity, per second.
    pub velocity_smoothing: f32,
    pub water_speed_factor: f32,
    /// Cycle phase advance per unit of horizontal speed, per second.
    pub cycle_gain: f32,
    pub idle_cycle_decay: f32,
    pub idle_settle_rate: f32,
    /// Relaxation rate for a plant point dragged past the limit.
    pub drag_relax_rate: f32,
    /// Base plant-drag limit; Gorilla mode adds `body_lift` on top.
    pub drag_limit: f32,
    pub ghost_fps_min: f32,
    pub ghost_fps_max: f32,
    pub ghost_jitter_pos: f32,
    pub ghost_jitter_rot_deg: f32,
    pub swim_smoothing: f32,
    pub swim_cycle_moving: f32,
    pub swim_cycle_idle: f32,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            walk_speed: 5.,
            run_speed: 10.,
            body_lift: 0.56,
            max_climb_height: 0.,
            climb_duration: 0.6,
            climb_max_speed: 20.,
            climb_arc_height: 0.2,
            grip_window: 0.15,
            jump_speed: 7.,
            gravity: 9.81,
            hover_gain: 20.,
            velocity_smoothing: 10.,
            water_speed_factor: 0.6,
            cycle_gain: 3.,
            idle_cycle_decay: 5.,
            idle_settle_rate: 10.,
            drag_relax_rate: 30.,
            drag_limit: 0.85,
            ghost_fps_min: 4.,
            ghost_fps_max: 12.,
            ghost_jitter_pos: 0.04,
            ghost_jitter_rot_deg: 5.,
            swim_smoothing: 15.,
            swim_cycle_moving: 3.,
            swim_cycle_idle: 1.5,
        }
    }
}

/// Invalid [`Parameters`] value.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ConfigError {
    #[error("walk_speed must be positive (got {0})")]
    WalkSpeed(f32),
    #[error("run_speed must be positive (got {0})")]
    RunSpeed(f32),
    #[error("climb_duration must be positive (got {0})")]
    ClimbDuration(f32),
    #[error("grip_window must be positive (got {0})")]
    GripWindow(f32),
    #[error("ghost frame-rate range {min}..{max} is empty")]
    GhostFrameRate { min: f32, max: f32 },
}

impl Parameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.walk_speed > 0.) {
            return Err(ConfigError::WalkSpeed(self.walk_speed));
        }
        if !(self.run_speed > 0.) {
            return Err(ConfigError::RunSpeed(self.run_speed));
        }
        if !(self.climb_duration > 0.) {
            return Err(ConfigError::ClimbDuration(self.climb_duration));
        }
        if !(self.grip_window > 0.) {
            return Err(ConfigError::GripWindow(self.grip_window));
        }
        if !(self.ghost_fps_min > 0. && self.ghost_fps_max > self.ghost_fps_min) {
            return Err(ConfigError::GhostFrameRate {
                min: self.ghost_fps_min,
                max: self.ghost_fps_max,
            });
        }
        Ok(())
    }
}

/// Input that the controller receives for one tick.
///
/// Button fields are expected to be edge-triggered by the host where the
/// behavior calls for it (`jump`, `select_mode`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Input {
    /// `x` strafes right, `y` moves forward, both in `[-1, 1]`.
    pub move_axes: Vec2,
    pub sprint: bool,
    pub crouch: bool,
    pub jump: bool,
    pub select_mode: Option<Mode>,
    pub cam_forward: Vec3,
    pub cam_right: Vec3,
    /// Head rig position; falls back to the body position when the rig is
    /// not ready.
    pub head_pos: Option<Vec3>,
    /// Free-look rotation, forwarded to the head rig.
    pub look: Option<Quat>,
}

impl Default for Input {
    fn default() -> Self {
        Self {
            move_axes: Vec2::ZERO,
            sprint: false,
            crouch: false,
            jump: false,
            select_mode: None,
            cam_forward: Vec3::X,
            cam_right: -Vec3::Y,
            head_pos: None,
            look: None,
        }
    }
}

/// Per-tick environment readings.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    pub now: f32,
    pub dt: f32,
    pub submerged: bool,
}

/// Planting state of one manipulator.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Manipulator {
    pub plant_pos: Option<Vec3>,
    pub was_planted: bool,
    /// The pose written to the sink on the last tick this limb was driven.
    pub pose: Pose,
}

impl Manipulator {
    pub(crate) fn reset_plant(&mut self) {
        self.plant_pos = None;
        self.was_planted = false;
    }
}

/// A vault in progress. Mutually exclusive with gait activity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimbState {
    pub start_pos: Vec3,
    pub target_pos: Vec3,
    pub start_time: f32,
    pub duration: f32,
    pub hand_left: Vec3,
    pub hand_right: Vec3,
    pub hand_start_left: Vec3,
    pub hand_start_right: Vec3,
}

/// The state updated and acted upon by the simulation.
///
/// To simulate the next tick, call [`State::advance()`] on the previous state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub mode: Mode,
    /// Last mode selected explicitly, restored when leaving water.
    pub mode_before_water: Mode,
    pub was_submerged: bool,
    pub body_pos: Vec3,
    pub body_vel: Vec3,
    /// Gait phase accumulator, radians.
    pub cycle: f32,
    pub swim_cycle: f32,
    pub left: Manipulator,
    pub right: Manipulator,
    pub climb: Option<ClimbState>,
    pub throttle: GhostThrottle,
    /// Downward hits of the last ledge scan, at most one per reach depth.
    pub climb_scan: ArrayVec<RaycastHit, 3>,
}

impl State {
    pub fn new(body_pos: Vec3) -> Self {
        Self {
            mode: Mode::default(),
            mode_before_water: Mode::default(),
            was_submerged: false,
            body_pos,
            body_vel: Vec3::ZERO,
            cycle: 0.,
            swim_cycle: 0.,
            left: Manipulator::default(),
            right: Manipulator::default(),
            climb: None,
            throttle: GhostThrottle::default(),
            climb_scan: ArrayVec::new(),
        }
    }

    /// Stores an explicit mode selection.
    ///
    /// Any selection other than Swimming also becomes the mode to restore
    /// when leaving water.
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        if mode != Mode::Swimming {
            self.mode_before_water = mode;
        }
    }

    /// Simulates one tick and returns the next `State`.
    pub fn advance<P: Probe, S: PoseSink, R: Rng>(
        self,
        probe: &P,
        sink: &mut S,
        rng: &mut R,
        parameters: Parameters,
        input: &Input,
        frame: Frame,
    ) -> Self {
        if !(frame.dt > 0.) || !frame.dt.is_finite() {
            return self;
        }

        let chain = ResolveMode(Climb(Move(Animate)));
        chain.advance(probe, sink, rng, parameters, input, frame, self)
    }
}

/// Normalized gait phase in `[0, 1)` for the given cycle and phase offset.
///
/// The right manipulator leads the left by half a cycle (`offset = PI`).
pub fn normalized_phase(cycle: f32, offset: f32) -> f32 {
    ((cycle + offset) % TAU) / TAU
}

/// Camera-flattened forward/right directions.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Basis {
    pub forward: Vec3,
    pub right: Vec3,
}

impl Basis {
    /// Returns `None` when the camera looks straight along the vertical axis.
    pub(crate) fn from_camera(input: &Input) -> Option<Basis> {
        Some(Basis {
            forward: flatten(input.cam_forward)?,
            right: flatten(input.cam_right)?,
        })
    }

    pub(crate) fn yaw_rotation(&self) -> Quat {
        Quat::from_rotation_z(self.forward.y.atan2(self.forward.x))
    }
}

fn flatten(v: Vec3) -> Option<Vec3> {
    let flat = Vec3::new(v.x, v.y, 0.);
    (flat.length_squared() > 1e-8).then(|| flat.normalize())
}

/// Frame-rate independent exponential approach. The factor is clamped so a
/// high rate at a low frame rate never overshoots the target.
pub(crate) fn damp(from: Vec3, to: Vec3, rate: f32, dt: f32) -> Vec3 {
    from.lerp(to, (rate * dt).clamp(0., 1.))
}

pub(crate) fn damp_f(from: f32, to: f32, rate: f32, dt: f32) -> f32 {
    from + (to - from) * (rate * dt).clamp(0., 1.)
}

pub(crate) fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0., 1.);
    t * t * (3. - 2. * t)
}

//! Bike state and core simulation types
//!
//! `BikeState` is the per-tick pose of one bike + rider. The rider is kept
//! twice, once per facing side, so a direction flip only changes `dir`.

use glam::{Mat2, Vec2};
use serde::{Deserialize, Serialize};

use super::rig::BikeRig;
use crate::rotate_point;

/// Which way the rider faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DriveDir {
    Left,
    #[default]
    Right,
}

impl DriveDir {
    /// The rider half animated for this direction
    pub fn side(self) -> Side {
        match self {
            DriveDir::Right => Side::Primary,
            DriveDir::Left => Side::Mirrored,
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            DriveDir::Right => DriveDir::Left,
            DriveDir::Left => DriveDir::Right,
        }
    }
}

/// Half of the mirrored rider rig
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// Facing right
    Primary,
    /// Facing left, x negated
    Mirrored,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Primary, Side::Mirrored];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Side::Primary => 0,
            Side::Mirrored => 1,
        }
    }

    /// Map a right-facing offset onto this side
    #[inline]
    pub fn mirror(self, v: Vec2) -> Vec2 {
        match self {
            Side::Primary => v,
            Side::Mirrored => Vec2::new(-v.x, v.y),
        }
    }
}

/// Which wheel an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Wheel {
    Front,
    Rear,
}

/// Rider pose on one side of the rig
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiderPose {
    pub head: Vec2,
    pub hand: Vec2,
    pub elbow: Vec2,
    pub shoulder: Vec2,
    pub lower_body: Vec2,
    pub knee: Vec2,
    pub foot: Vec2,
    /// Hand target derived from the frame
    pub wanted_hand: Vec2,
    /// Foot target derived from the frame
    pub wanted_foot: Vec2,
    pub swing_anchor: Vec2,
    pub front_anchor: Vec2,
    /// Foot spring offset of the previous tick
    pub prev_foot_delta: Vec2,
    /// Hand spring offset of the previous tick
    pub prev_hand_delta: Vec2,
}

impl RiderPose {
    /// Place the head along the lower body -> shoulder axis.
    /// Collapses onto the shoulder when the axis is degenerate.
    pub fn update_head(&mut self, neck_length: f32) {
        self.head = head_position(self.shoulder, self.lower_body, neck_length);
    }
}

pub fn head_position(shoulder: Vec2, lower_body: Vec2, neck_length: f32) -> Vec2 {
    match (shoulder - lower_body).try_normalize() {
        Some(axis) => shoulder + axis * neck_length,
        None => shoulder,
    }
}

/// Time-varying pose of one bike + rider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BikeState {
    pub dir: DriveDir,
    /// Frame center
    pub center: Vec2,
    pub frame_rot: Mat2,
    pub front_wheel_rot: Mat2,
    pub rear_wheel_rot: Mat2,
    pub front_wheel: Vec2,
    pub rear_wheel: Vec2,
    /// Where the front wheel would be with a relaxed suspension
    pub relaxed_front_wheel: Vec2,
    /// Where the rear wheel would be with a relaxed suspension
    pub relaxed_rear_wheel: Vec2,
    pub sides: [RiderPose; 2],
    pub engine_rpm: f32,
    /// Hundredths of a second
    pub game_time: i32,
    /// Suspension offsets of the previous tick
    pub prev_front_delta: Vec2,
    pub prev_rear_delta: Vec2,
}

impl Default for BikeState {
    fn default() -> Self {
        Self {
            dir: DriveDir::Right,
            center: Vec2::ZERO,
            frame_rot: Mat2::IDENTITY,
            front_wheel_rot: Mat2::IDENTITY,
            rear_wheel_rot: Mat2::IDENTITY,
            front_wheel: Vec2::ZERO,
            rear_wheel: Vec2::ZERO,
            relaxed_front_wheel: Vec2::ZERO,
            relaxed_rear_wheel: Vec2::ZERO,
            sides: [RiderPose::default(); 2],
            engine_rpm: 0.0,
            game_time: 0,
            prev_front_delta: Vec2::ZERO,
            prev_rear_delta: Vec2::ZERO,
        }
    }
}

impl BikeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset every position to the origin, facing right, RPM zero
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn active_side(&self) -> Side {
        self.dir.side()
    }

    pub fn side(&self, side: Side) -> &RiderPose {
        &self.sides[side.index()]
    }

    pub fn side_mut(&mut self, side: Side) -> &mut RiderPose {
        &mut self.sides[side.index()]
    }

    /// Rider pose for the current facing direction
    pub fn active(&self) -> &RiderPose {
        self.side(self.active_side())
    }

    pub fn active_mut(&mut self) -> &mut RiderPose {
        let side = self.active_side();
        self.side_mut(side)
    }

    /// Frame-local point to world space
    #[inline]
    pub fn to_world(&self, local: Vec2) -> Vec2 {
        rotate_point(&self.frame_rot, local, self.center)
    }

    /// Recompute suspension anchors, hand/foot targets and relaxed wheel
    /// positions of both sides from the frame center and rotation
    pub fn update_frame_anchors(&mut self, rig: &BikeRig) {
        let anchors = &rig.anchors;
        for side in Side::ALL {
            let i = side.index();
            let swing = self.to_world(anchors.swing[i]);
            let front = self.to_world(anchors.front[i]);
            let hand = self.to_world(anchors.rider[i].hand);
            let foot = self.to_world(anchors.rider[i].foot);
            let pose = &mut self.sides[i];
            pose.swing_anchor = swing;
            pose.front_anchor = front;
            pose.wanted_hand = hand;
            pose.wanted_foot = foot;
        }
        self.relaxed_front_wheel = self.to_world(anchors.front_wheel);
        self.relaxed_rear_wheel = self.to_world(anchors.rear_wheel);
    }

    /// Frame angle in [0, 2π), measured from the first matrix column
    pub fn frame_angle(&self) -> f32 {
        let c = self.frame_rot.x_axis.x.clamp(-1.0, 1.0);
        let angle = c.acos();
        if self.frame_rot.x_axis.y < 0.0 {
            std::f32::consts::TAU - angle
        } else {
            angle
        }
    }
}

/// Something the physics tick reports to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BikerEvent {
    /// A wheel started or stopped touching the level
    WheelTouched { wheel: Wheel, touching: bool },
    /// The head hit the level
    HeadTouched,
    /// The driven wheel spins on the ground
    WheelSpinning { position: Vec2, direction: Vec2 },
    /// The suspension squeeks, amount in (0, 1]
    Squeeking(f32),
    SomersaultCompleted { counter_clockwise: bool },
    /// The rider was marked dead
    Died,
}

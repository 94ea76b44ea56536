//! Static bike + rider geometry
//!
//! `BikeParameters` holds the per-session constants; `BikeAnchors` derives
//! rest positions (relative to the frame center) from them. Nothing here
//! depends on time.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::state::Side;
use crate::settings::PhysicsSettings;

/// Rider joint offsets, relative to the frame center
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiderJoints {
    pub elbow: Vec2,
    pub hand: Vec2,
    pub shoulder: Vec2,
    pub lower_body: Vec2,
    pub knee: Vec2,
    pub foot: Vec2,
}

impl RiderJoints {
    /// The same joints for the given side (x negated on the mirrored side)
    pub fn for_side(&self, side: Side) -> Self {
        Self {
            elbow: side.mirror(self.elbow),
            hand: side.mirror(self.hand),
            shoulder: side.mirror(self.shoulder),
            lower_body: side.mirror(self.lower_body),
            knee: side.mirror(self.knee),
            foot: side.mirror(self.foot),
        }
    }
}

/// Geometry and mass constants of one bike
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BikeParameters {
    pub wheel_radius: f32,
    pub wheel_base: f32,
    pub mass_elevation: f32,
    pub rear_suspension_anchor: Vec2,
    pub front_suspension_anchor: Vec2,
    pub joints: RiderJoints,
    pub head_size: f32,
    pub neck_length: f32,

    pub wheel_mass: f32,
    pub frame_mass: f32,
    pub torso_mass: f32,
    pub upper_leg_mass: f32,
    pub lower_leg_mass: f32,
    pub upper_arm_mass: f32,
    pub lower_arm_mass: f32,
    pub hand_mass: f32,
    pub foot_mass: f32,

    pub engine_power_max: f32,
    pub engine_rpm_min: f32,
    pub engine_rpm_max: f32,
}

impl BikeParameters {
    pub fn from_settings(settings: &PhysicsSettings) -> Self {
        Self {
            wheel_radius: settings.wheel_radius,
            wheel_base: settings.wheel_base,
            mass_elevation: settings.mass_elevation,
            rear_suspension_anchor: settings.rear_suspension_anchor,
            front_suspension_anchor: settings.front_suspension_anchor,
            joints: RiderJoints {
                elbow: settings.rider_elbow,
                hand: settings.rider_hand,
                shoulder: settings.rider_shoulder,
                lower_body: settings.rider_lower_body,
                knee: settings.rider_knee,
                foot: settings.rider_foot,
            },
            head_size: settings.rider_head_size,
            neck_length: settings.rider_neck_length,

            wheel_mass: settings.wheel_mass,
            frame_mass: settings.frame_mass,
            torso_mass: settings.torso_mass,
            upper_leg_mass: settings.upper_leg_mass,
            lower_leg_mass: settings.lower_leg_mass,
            upper_arm_mass: settings.upper_arm_mass,
            lower_arm_mass: settings.lower_arm_mass,
            hand_mass: settings.hand_mass,
            foot_mass: settings.foot_mass,

            engine_power_max: settings.engine_power_max,
            engine_rpm_min: settings.engine_rpm_min,
            engine_rpm_max: settings.engine_rpm_max,
        }
    }

    /// Reset to the stock values
    pub fn set_defaults(&mut self) {
        *self = Self::from_settings(&PhysicsSettings::default());
    }
}

impl Default for BikeParameters {
    fn default() -> Self {
        Self::from_settings(&PhysicsSettings::default())
    }
}

/// Rest positions of the rider's body parts on one side
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiderAnchors {
    pub lower_arm: Vec2,
    pub upper_arm: Vec2,
    pub lower_leg: Vec2,
    pub upper_leg: Vec2,
    pub torso: Vec2,
    /// Where the hand wants to be
    pub hand: Vec2,
    /// Where the foot wants to be
    pub foot: Vec2,
}

/// Derived anchor points, relative to the frame center
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BikeAnchors {
    pub ground_point: Vec2,
    /// Relaxed rear wheel center
    pub rear_wheel: Vec2,
    /// Relaxed front wheel center
    pub front_wheel: Vec2,
    /// Swing arm anchor per side
    pub swing: [Vec2; 2],
    /// Front fork anchor per side
    pub front: [Vec2; 2],
    pub rider: [RiderAnchors; 2],
}

impl BikeAnchors {
    pub fn new(params: &BikeParameters) -> Self {
        let mut anchors = Self::default();
        anchors.update(params);
        anchors
    }

    /// Recompute every anchor from `params`
    pub fn update(&mut self, params: &BikeParameters) {
        let ground = Vec2::new(0.0, -params.mass_elevation);
        self.ground_point = ground;
        self.rear_wheel = ground + Vec2::new(-0.5 * params.wheel_base, params.wheel_radius);
        self.front_wheel = ground + Vec2::new(0.5 * params.wheel_base, params.wheel_radius);

        for side in Side::ALL {
            let i = side.index();
            let j = params.joints.for_side(side);
            self.swing[i] = side.mirror(params.rear_suspension_anchor);
            self.front[i] = side.mirror(params.front_suspension_anchor);
            self.rider[i] = RiderAnchors {
                lower_arm: (j.elbow + j.hand) * 0.5,
                upper_arm: (j.elbow + j.shoulder) * 0.5,
                lower_leg: (j.foot + j.knee) * 0.5,
                upper_leg: (j.lower_body + j.knee) * 0.5,
                torso: (j.lower_body + j.shoulder) * 0.5,
                hand: j.hand,
                foot: j.foot,
            };
        }
    }
}

/// Parameters and their derived anchors, owned by one biker
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BikeRig {
    pub params: BikeParameters,
    pub anchors: BikeAnchors,
}

impl BikeRig {
    pub fn from_settings(settings: &PhysicsSettings) -> Self {
        let params = BikeParameters::from_settings(settings);
        let anchors = BikeAnchors::new(&params);
        Self { params, anchors }
    }

    /// Recompute anchors after a parameter change
    pub fn reinitialize_anchors(&mut self) {
        self.anchors.update(&self.params);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wheel_anchors() {
        let rig = BikeRig::from_settings(&PhysicsSettings::default());
        let a = &rig.anchors;
        assert_eq!(a.ground_point, Vec2::new(0.0, -0.9));
        assert!((a.rear_wheel - Vec2::new(-0.7, -0.55)).length() < 1e-6);
        assert!((a.front_wheel - Vec2::new(0.7, -0.55)).length() < 1e-6);
    }

    #[test]
    fn test_mirrored_side_negates_x() {
        let rig = BikeRig::from_settings(&PhysicsSettings::default());
        let primary = rig.anchors.rider[Side::Primary.index()];
        let mirrored = rig.anchors.rider[Side::Mirrored.index()];
        assert_eq!(mirrored.torso, Vec2::new(-primary.torso.x, primary.torso.y));
        assert_eq!(mirrored.hand, Vec2::new(-primary.hand.x, primary.hand.y));
        assert_eq!(rig.anchors.swing[1].x, -rig.anchors.swing[0].x);
    }

    #[test]
    fn test_limb_midpoints() {
        let rig = BikeRig::from_settings(&PhysicsSettings::default());
        let r = rig.anchors.rider[0];
        assert!((r.torso - Vec2::new(-0.25, 0.75)).length() < 1e-6);
        assert!((r.lower_leg - Vec2::new(0.15, -0.085)).length() < 1e-6);
    }

    #[test]
    fn test_set_defaults() {
        let mut params = BikeParameters::default();
        params.wheel_radius = 1.0;
        params.set_defaults();
        assert_eq!(params.wheel_radius, 0.35);
    }
}

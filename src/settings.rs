//! Physics settings
//!
//! Every tunable constant of the bike + rider rig. Loaded from a JSON file
//! where every field is required; `Default` gives the stock values.

use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunable physics constants for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsSettings {
    // === World ===
    /// Softness of contacts that carry no settings of their own
    pub world_erp: f32,
    pub world_cfm: f32,
    /// Vertical gravity (negative is down)
    pub world_gravity: f32,

    // === Simulation ===
    /// Scales the integration step relative to real time
    pub sim_speed_factor: f32,
    /// Constraint solver iterations per step
    pub sim_iterations: u32,

    // === Wheels ===
    pub wheel_radius: f32,
    /// Distance between wheel centers
    pub wheel_base: f32,
    pub wheel_mass: f32,
    pub wheel_roll_resistance: f32,
    /// Roll resistance used above `wheel_roll_velocity_max`
    pub wheel_roll_resistance_max: f32,
    pub wheel_roll_velocity_max: f32,
    pub wheel_erp: f32,
    pub wheel_cfm: f32,
    /// Friction coefficient of wheel contacts
    pub wheel_grip: f32,

    // === Rider geometry (relative to the frame, facing right) ===
    pub rider_elbow: Vec2,
    pub rider_hand: Vec2,
    pub rider_shoulder: Vec2,
    pub rider_lower_body: Vec2,
    pub rider_knee: Vec2,
    pub rider_foot: Vec2,
    pub rider_head_size: f32,
    pub rider_neck_length: f32,
    pub rider_anchors_erp: f32,
    pub rider_anchors_cfm: f32,

    // === Suspension ===
    /// Rear swing arm anchor
    pub rear_suspension_anchor: Vec2,
    /// Front fork anchor
    pub front_suspension_anchor: Vec2,
    pub suspension_spring: f32,
    pub suspension_damp: f32,
    pub rider_spring: f32,
    pub rider_damp: f32,

    // === Attitude ===
    pub attitude_torque: f32,
    /// Per-tick decay of the attitude torque
    pub attitude_defactor: f32,

    // === Frame ===
    pub frame_inertial_length: f32,
    pub frame_inertial_height: f32,
    pub frame_mass: f32,
    /// Height of the center of mass above the ground point
    pub mass_elevation: f32,

    // === Engine ===
    pub engine_power_max: f32,
    pub brake_factor: f32,
    pub engine_damp: f32,
    pub engine_rpm_min: f32,
    pub engine_rpm_max: f32,

    // === Body part masses ===
    pub torso_mass: f32,
    pub upper_leg_mass: f32,
    pub lower_leg_mass: f32,
    pub upper_arm_mass: f32,
    pub lower_arm_mass: f32,
    pub hand_mass: f32,
    pub foot_mass: f32,

    /// A dead rider's wheels detach when hitting the ground faster than this (km/h)
    pub dead_wheel_detach_speed: f32,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            world_erp: 0.3,
            world_cfm: 1e-6,
            world_gravity: -9.81,

            sim_speed_factor: 0.6,
            sim_iterations: 10,

            wheel_radius: 0.35,
            wheel_base: 1.4,
            wheel_mass: 10.0,
            wheel_roll_resistance: 1.0,
            wheel_roll_resistance_max: 20.0,
            wheel_roll_velocity_max: 60.0,
            wheel_erp: 0.8,
            wheel_cfm: 1e-5,
            wheel_grip: 20.0,

            rider_elbow: Vec2::new(-0.1, 0.6),
            rider_hand: Vec2::new(0.3, 0.45),
            rider_shoulder: Vec2::new(-0.2, 1.1),
            rider_lower_body: Vec2::new(-0.3, 0.4),
            rider_knee: Vec2::new(0.3, 0.2),
            rider_foot: Vec2::new(0.0, -0.37),
            rider_head_size: 0.18,
            rider_neck_length: 0.22,
            rider_anchors_erp: 0.3,
            rider_anchors_cfm: 1e-4,

            rear_suspension_anchor: Vec2::new(-0.11, -0.3),
            front_suspension_anchor: Vec2::new(0.4, 0.4),
            suspension_spring: 21000.0,
            suspension_damp: 205000.0,
            rider_spring: 100000.0,
            rider_damp: 300000.0,

            attitude_torque: 10000.0,
            attitude_defactor: 0.75,

            frame_inertial_length: 1.2,
            frame_inertial_height: 1.8,
            frame_mass: 90.0,
            mass_elevation: 0.9,

            engine_power_max: 1400.0,
            brake_factor: 80.0,
            engine_damp: 0.4,
            engine_rpm_min: 700.0,
            engine_rpm_max: 8000.0,

            torso_mass: 5.0,
            upper_leg_mass: 5.0,
            lower_leg_mass: 5.0,
            upper_arm_mass: 5.0,
            lower_arm_mass: 5.0,
            hand_mass: 5.0,
            foot_mass: 5.0,

            dead_wheel_detach_speed: 30.0,
        }
    }
}

impl PhysicsSettings {
    /// Parse settings from JSON. Every field must be present.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let settings = Self::from_json_str(&json)?;
        log::info!("Loaded physics settings from {}", path.display());
        Ok(settings)
    }

    /// Save settings as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::info!("Physics settings saved to {}", path.display());
        Ok(())
    }

    /// Engine RPM span, never zero
    pub fn engine_rpm_span(&self) -> f32 {
        let span = self.engine_rpm_max - self.engine_rpm_min;
        if span.abs() < f32::EPSILON { 1.0 } else { span }
    }
}

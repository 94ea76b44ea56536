//! X-Moto simulation core
//!
//! Core modules:
//! - `buffer`: Chunked little-endian byte buffer (`DBuffer`)
//! - `sim`: Deterministic bike + rider physics, state serialization, interpolation
//! - `replay`: Chunked replay buffer and replay files
//! - `ghost`: Replay playback driver
//! - `settings`: Physics settings

pub mod buffer;
pub mod error;
pub mod ghost;
pub mod replay;
pub mod settings;
pub mod sim;

pub use buffer::DBuffer;
pub use error::{Error, Result};
pub use settings::PhysicsSettings;

use std::ops::{Add, Mul, Sub};

use glam::{Mat2, Vec2};

/// Simulation configuration constants
pub mod consts {
    /// Physics step, in hundredths of a second (100 Hz)
    pub const PHYS_STEP_SIZE: i32 = 1;

    /// Serialized states per replay chunk
    pub const STATES_PER_CHUNK: usize = 512;
    /// Size of one serialized bike state on the wire
    pub const SERIALIZED_STATE_SIZE: usize = 40;
    /// Default replay sampling rate (states per second)
    pub const DEFAULT_REPLAY_FRAME_RATE: f32 = 25.0;
    /// Step of `faster()` / `slower()`
    pub const REPLAY_SPEED_INCREMENT: f32 = 0.25;

    /// Velocity component below which a body counts as still
    pub const SLEEP_EPS: f32 = 0.02;
    /// Consecutive still ticks before the bike goes to sleep
    pub const SLEEP_FRAMES: u32 = 20;

    /// Spring velocity above which the suspension squeeks
    pub const SQUEEK_POINT: f32 = 0.01;
    /// Spring velocity span mapped to full squeek
    pub const SQUEEK_RANGE: f32 = 0.11;

    /// Network frames are not extrapolated further than this
    pub const MAX_EXTRAPOLATION_T: f32 = 3.0;

    /// Linear speeds above this (km/h) are treated as glitches
    pub const MAX_REPORTED_SPEED: f32 = 500.0;

    /// Radius of the limb circles tested once the body is detached
    pub const MEMBER_RADIUS: f32 = 0.1;
    /// Friction of detached limb contacts
    pub const DETACH_GRIP: f32 = 0.8;
}

/// Game time (hundredths) to seconds
#[inline]
pub fn time_to_float(time: i32) -> f32 {
    time as f32 / 100.0
}

/// Seconds to game time (hundredths), rounded to the nearest tick
#[inline]
pub fn float_to_time(seconds: f32) -> i32 {
    (seconds * 100.0).round() as i32
}

/// Rotate a frame-local point by `rot` and translate it by `origin`
#[inline]
pub fn rotate_point(rot: &Mat2, local: Vec2, origin: Vec2) -> Vec2 {
    *rot * local + origin
}

/// Cubic through four samples: `b` at `t = 0`, `c` at `t = 1`
#[inline]
pub fn interpolation_cubic<T>(a: T, b: T, c: T, d: T, t: f32) -> T
where
    T: Copy + Add<Output = T> + Sub<Output = T> + Mul<f32, Output = T>,
{
    let x0 = d - c - a + b;
    let x1 = a - b - x0;
    let x2 = c - a;
    let x3 = b;
    x0 * (t * t * t) + x1 * (t * t) + x2 * t + x3
}

/// Linear interpolation usable for both `f32` and `Vec2`
#[inline]
pub fn interpolation_linear<T>(a: T, b: T, t: f32) -> T
where
    T: Copy + Add<Output = T> + Sub<Output = T> + Mul<f32, Output = T>,
{
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cubic_endpoints() {
        let (a, b, c, d) = (1.0f32, 2.0, 5.0, 3.0);
        assert_eq!(interpolation_cubic(a, b, c, d, 0.0), b);
        assert!((interpolation_cubic(a, b, c, d, 1.0) - c).abs() < 1e-5);

        let v = interpolation_cubic(Vec2::ZERO, Vec2::ONE, Vec2::new(2.0, 4.0), Vec2::X, 0.0);
        assert_eq!(v, Vec2::ONE);
    }

    #[test]
    fn test_time_conversions() {
        assert_eq!(float_to_time(time_to_float(2913)), 2913);
        assert_eq!(float_to_time(0.29), 29);
        assert_eq!(time_to_float(150), 1.5);
    }

    #[test]
    fn test_rotate_point() {
        let rot = Mat2::from_angle(std::f32::consts::FRAC_PI_2);
        let p = rotate_point(&rot, Vec2::X, Vec2::new(10.0, 0.0));
        assert!((p - Vec2::new(10.0, 1.0)).length() < 1e-6);
    }
}

//! Interpolation between recorded bike states
//!
//! A window holds consecutive states with the display instant between the
//! two middle ones. Cubic interpolation needs four states sharing one
//! facing direction; anything else falls back to linear.

use super::state::{BikeState, RiderPose};
use crate::{interpolation_cubic, interpolation_linear};

/// Interpolation scheme picked for a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMode {
    Linear,
    Cubic,
}

/// Pick the scheme `interpolate_game_state` will use for `window`
pub fn choose_interpolation(window: &[BikeState]) -> InterpolationMode {
    let n = window.len();
    if n < 4 {
        return InterpolationMode::Linear;
    }
    let quad = &window[n / 2 - 2..=n / 2 + 1];
    if quad.iter().all(|s| s.dir == quad[0].dir) {
        InterpolationMode::Cubic
    } else {
        InterpolationMode::Linear
    }
}

/// Interpolate the display pose at `t` (0 at the earlier middle state,
/// 1 at the later one). `None` when the window has fewer than two states.
pub fn interpolate_game_state(window: &[BikeState], t: f32) -> Option<BikeState> {
    match choose_interpolation(window) {
        InterpolationMode::Cubic => interpolate_game_state_cubic(window, t),
        InterpolationMode::Linear => interpolate_game_state_linear(window, t),
    }
}

fn lerp_pose(out: &mut RiderPose, a: &RiderPose, b: &RiderPose, t: f32) {
    out.head = interpolation_linear(a.head, b.head, t);
    out.hand = interpolation_linear(a.hand, b.hand, t);
    out.elbow = interpolation_linear(a.elbow, b.elbow, t);
    out.shoulder = interpolation_linear(a.shoulder, b.shoulder, t);
    out.lower_body = interpolation_linear(a.lower_body, b.lower_body, t);
    out.knee = interpolation_linear(a.knee, b.knee, t);
    out.foot = interpolation_linear(a.foot, b.foot, t);
    out.swing_anchor = interpolation_linear(a.swing_anchor, b.swing_anchor, t);
    out.front_anchor = interpolation_linear(a.front_anchor, b.front_anchor, t);
}

fn cubic_pose(out: &mut RiderPose, p: [&RiderPose; 4], t: f32) {
    let [a, b, c, d] = p;
    out.head = interpolation_cubic(a.head, b.head, c.head, d.head, t);
    out.hand = interpolation_cubic(a.hand, b.hand, c.hand, d.hand, t);
    out.elbow = interpolation_cubic(a.elbow, b.elbow, c.elbow, d.elbow, t);
    out.shoulder = interpolation_cubic(a.shoulder, b.shoulder, c.shoulder, d.shoulder, t);
    out.lower_body = interpolation_cubic(a.lower_body, b.lower_body, c.lower_body, d.lower_body, t);
    out.knee = interpolation_cubic(a.knee, b.knee, c.knee, d.knee, t);
    out.foot = interpolation_cubic(a.foot, b.foot, c.foot, d.foot, t);
    out.swing_anchor = interpolation_cubic(
        a.swing_anchor,
        b.swing_anchor,
        c.swing_anchor,
        d.swing_anchor,
        t,
    );
    out.front_anchor = interpolation_cubic(
        a.front_anchor,
        b.front_anchor,
        c.front_anchor,
        d.front_anchor,
        t,
    );
}

/// Two-point interpolation between the middle states of `window`.
/// Across a direction flip the earlier state is returned unchanged.
pub fn interpolate_game_state_linear(window: &[BikeState], t: f32) -> Option<BikeState> {
    let n = window.len();
    if n < 2 {
        return None;
    }
    let a = &window[n / 2 - 1];
    let b = &window[n / 2];
    let mut out = a.clone();
    if a.dir != b.dir {
        return Some(out);
    }

    out.center = interpolation_linear(a.center, b.center, t);
    out.front_wheel = interpolation_linear(a.front_wheel, b.front_wheel, t);
    out.rear_wheel = interpolation_linear(a.rear_wheel, b.rear_wheel, t);
    if t <= 1.0 {
        out.engine_rpm = interpolation_linear(a.engine_rpm, b.engine_rpm, t);
    }
    out.frame_rot = interpolation_linear(a.frame_rot, b.frame_rot, t);
    // Interpolated wheel spin looks wrong, take the later one
    out.front_wheel_rot = b.front_wheel_rot;
    out.rear_wheel_rot = b.rear_wheel_rot;

    let side = a.active_side().index();
    lerp_pose(&mut out.sides[side], &a.sides[side], &b.sides[side], t);

    out.game_time = a.game_time + ((b.game_time - a.game_time) as f32 * t) as i32;
    Some(out)
}

/// Four-point interpolation around the middle of `window`. If the four
/// states disagree on direction the earlier middle state is returned.
pub fn interpolate_game_state_cubic(window: &[BikeState], t: f32) -> Option<BikeState> {
    let n = window.len();
    if n < 4 {
        return interpolate_game_state_linear(window, t);
    }
    let [a, b, c, d] = [
        &window[n / 2 - 2],
        &window[n / 2 - 1],
        &window[n / 2],
        &window[n / 2 + 1],
    ];
    let mut out = b.clone();
    if !(a.dir == b.dir && b.dir == c.dir && c.dir == d.dir) {
        return Some(out);
    }

    out.center = interpolation_cubic(a.center, b.center, c.center, d.center, t);
    out.front_wheel = interpolation_cubic(a.front_wheel, b.front_wheel, c.front_wheel, d.front_wheel, t);
    out.rear_wheel = interpolation_cubic(a.rear_wheel, b.rear_wheel, c.rear_wheel, d.rear_wheel, t);
    out.engine_rpm = interpolation_cubic(a.engine_rpm, b.engine_rpm, c.engine_rpm, d.engine_rpm, t);
    out.frame_rot = interpolation_cubic(a.frame_rot, b.frame_rot, c.frame_rot, d.frame_rot, t);
    out.front_wheel_rot = c.front_wheel_rot;
    out.rear_wheel_rot = c.rear_wheel_rot;

    let side = b.active_side().index();
    cubic_pose(
        &mut out.sides[side],
        [&a.sides[side], &b.sides[side], &c.sides[side], &d.sides[side]],
        t,
    );

    out.game_time = b.game_time + ((c.game_time - b.game_time) as f32 * t) as i32;
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::state::DriveDir;
    use glam::{Mat2, Vec2};

    fn state_at(i: i32, dir: DriveDir) -> BikeState {
        let mut s = BikeState::new();
        let f = i as f32;
        s.dir = dir;
        s.game_time = i * 4;
        s.center = Vec2::new(f, f * f * 0.5);
        s.front_wheel = s.center + Vec2::new(0.7, -0.5);
        s.rear_wheel = s.center + Vec2::new(-0.7, -0.5);
        s.frame_rot = Mat2::from_angle(f * 0.1);
        s.front_wheel_rot = Mat2::from_angle(f);
        s.engine_rpm = 1000.0 + f * 100.0;
        let side = s.active_side();
        let pose = s.side_mut(side);
        pose.knee = Vec2::new(f + 0.3, 1.0);
        pose.head = Vec2::new(f, 2.0 + f);
        s
    }

    fn window(dirs: [DriveDir; 4]) -> Vec<BikeState> {
        dirs.iter()
            .enumerate()
            .map(|(i, d)| state_at(i as i32, *d))
            .collect()
    }

    #[test]
    fn test_cubic_at_zero_reproduces_earlier_state() {
        let w = window([DriveDir::Right; 4]);
        assert_eq!(choose_interpolation(&w), InterpolationMode::Cubic);
        let out = interpolate_game_state(&w, 0.0).unwrap();
        assert_eq!(out.center, w[1].center);
        assert_eq!(out.front_wheel, w[1].front_wheel);
        assert_eq!(out.active().knee, w[1].active().knee);
        assert_eq!(out.game_time, w[1].game_time);
    }

    #[test]
    fn test_linear_at_zero_reproduces_earlier_state() {
        let w = window([DriveDir::Right; 4]);
        let out = interpolate_game_state_linear(&w, 0.0).unwrap();
        assert_eq!(out.center, w[1].center);
        assert_eq!(out.active().head, w[1].active().head);
    }

    #[test]
    fn test_direction_flip_falls_back_to_linear() {
        let w = window([DriveDir::Right, DriveDir::Right, DriveDir::Left, DriveDir::Left]);
        assert_eq!(choose_interpolation(&w), InterpolationMode::Linear);
        // Linear across the flip keeps the earlier middle state
        let out = interpolate_game_state(&w, 0.5).unwrap();
        assert_eq!(out, w[1]);
    }

    #[test]
    fn test_flip_outside_middle_pair_still_linear() {
        let w = window([DriveDir::Left, DriveDir::Right, DriveDir::Right, DriveDir::Right]);
        assert_eq!(choose_interpolation(&w), InterpolationMode::Linear);
        let out = interpolate_game_state(&w, 0.5).unwrap();
        assert!((out.center.x - 1.5).abs() < 1e-6);
        assert_eq!(out.game_time, 6);
    }

    #[test]
    fn test_wheel_rotation_taken_from_later_state() {
        let w = window([DriveDir::Right; 4]);
        let out = interpolate_game_state(&w, 0.3).unwrap();
        assert_eq!(out.front_wheel_rot, w[2].front_wheel_rot);
        let out = interpolate_game_state_linear(&w, 0.3).unwrap();
        assert_eq!(out.front_wheel_rot, w[2].front_wheel_rot);
    }

    #[test]
    fn test_linear_rpm_frozen_when_extrapolating() {
        let w = window([DriveDir::Right; 4]);
        let out = interpolate_game_state_linear(&w, 1.5).unwrap();
        assert_eq!(out.engine_rpm, w[1].engine_rpm);
    }

    #[test]
    fn test_short_window() {
        assert!(interpolate_game_state(&[], 0.5).is_none());
        assert!(interpolate_game_state(&[BikeState::new()], 0.5).is_none());
        let w = [state_at(0, DriveDir::Right), state_at(1, DriveDir::Right)];
        let out = interpolate_game_state(&w, 1.0).unwrap();
        assert_eq!(out.center, w[1].center);
    }
}

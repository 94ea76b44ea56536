//! Compact wire form of a bike state
//!
//! 40 bytes, little-endian, packed:
//!
//! | field | type |
//! |---|---|
//! | game time (s) | f32 |
//! | flags (bit0 left, bit1 right) | u8 |
//! | frame x, y | f32 ×2 |
//! | max x/y offset | f32 ×2 |
//! | engine RPM | u8 |
//! | front wheel, rear wheel, elbow, shoulder, lower body, knee (x, y) | i8 ×12 |
//! | frame, front wheel, rear wheel rotation | u16 ×3 |
//!
//! Offsets are quantized against the largest offset of the active side, so
//! the scale changes from one state to the next. Hands, feet, heads and
//! suspension anchors are not stored; they are rebuilt from the frame.

use glam::{Mat2, Vec2};

use super::rig::BikeRig;
use super::state::{BikeState, DriveDir, Side};
use crate::buffer::DBuffer;
use crate::consts::SERIALIZED_STATE_SIZE;
use crate::error::{Error, Result};
use crate::{float_to_time, time_to_float};

pub const FLAG_DIR_LEFT: u8 = 0x01;
pub const FLAG_DIR_RIGHT: u8 = 0x02;

/// Packed bike state, as stored in replays and sent over the network
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SerializedBikeState {
    pub game_time: f32,
    pub flags: u8,
    pub frame_x: f32,
    pub frame_y: f32,
    pub max_x_diff: f32,
    pub max_y_diff: f32,
    pub engine_rpm: u8,
    pub front_wheel_x: i8,
    pub front_wheel_y: i8,
    pub rear_wheel_x: i8,
    pub rear_wheel_y: i8,
    pub elbow_x: i8,
    pub elbow_y: i8,
    pub shoulder_x: i8,
    pub shoulder_y: i8,
    pub lower_body_x: i8,
    pub lower_body_y: i8,
    pub knee_x: i8,
    pub knee_y: i8,
    pub frame_rot: u16,
    pub front_wheel_rot: u16,
    pub rear_wheel_rot: u16,
}

/// Quantize `coord` relative to `reference` into [-127, 127]
pub fn map_coord_to_8bits(reference: f32, max_diff: f32, coord: f32) -> i8 {
    if !(max_diff > 0.0) || !max_diff.is_finite() {
        return 0;
    }
    let n = (127.0 * (coord - reference) / max_diff).round();
    if n.is_nan() {
        return 0;
    }
    n.clamp(-127.0, 127.0) as i8
}

pub fn map_8bits_to_coord(reference: f32, max_diff: f32, c: i8) -> f32 {
    reference + (c as f32 / 127.0) * max_diff
}

/// Keep the first column, 8 bits per component; the second column is
/// its perpendicular
pub fn matrix_to_16bits(m: &Mat2) -> u16 {
    let encode = |v: f32| -> u16 {
        let n = (v * 127.0 + 127.0).round();
        if n.is_nan() { 127 } else { n.clamp(0.0, 255.0) as u16 }
    };
    (encode(m.x_axis.x) << 8) | encode(m.x_axis.y)
}

/// Decode and renormalize; a null column decodes to the identity
pub fn bits16_to_matrix(n: u16) -> Mat2 {
    let c = ((n >> 8) & 0xff) as f32;
    let s = (n & 0xff) as f32;
    let column = Vec2::new((c - 127.0) / 127.0, (s - 127.0) / 127.0);
    match column.try_normalize() {
        Some(col) => Mat2::from_cols(col, Vec2::new(-col.y, col.x)),
        None => Mat2::IDENTITY,
    }
}

/// Largest |offset| of `points` from `center`, per axis
fn max_offsets(center: Vec2, points: &[Vec2]) -> Vec2 {
    points
        .iter()
        .fold(Vec2::ZERO, |acc, p| acc.max((*p - center).abs()))
}

impl SerializedBikeState {
    /// Pack `state` at game time `time` (hundredths)
    pub fn from_state(state: &BikeState, time: i32, rig: &BikeRig) -> Self {
        let pose = state.active();
        let center = state.center;
        let tracked = [
            state.front_wheel,
            state.rear_wheel,
            pose.elbow,
            pose.shoulder,
            pose.lower_body,
            pose.knee,
        ];
        let max = max_offsets(center, &tracked);
        let qx = |p: Vec2| map_coord_to_8bits(center.x, max.x, p.x);
        let qy = |p: Vec2| map_coord_to_8bits(center.y, max.y, p.y);

        let params = &rig.params;
        let span = params.engine_rpm_max - params.engine_rpm_min;
        let rpm = if span.abs() < f32::EPSILON {
            0
        } else {
            let n = ((state.engine_rpm - params.engine_rpm_min) / span * 255.0).round();
            if n.is_nan() { 0 } else { n.clamp(0.0, 255.0) as u8 }
        };

        Self {
            game_time: time_to_float(time),
            flags: match state.dir {
                DriveDir::Left => FLAG_DIR_LEFT,
                DriveDir::Right => FLAG_DIR_RIGHT,
            },
            frame_x: center.x,
            frame_y: center.y,
            max_x_diff: max.x,
            max_y_diff: max.y,
            engine_rpm: rpm,
            front_wheel_x: qx(state.front_wheel),
            front_wheel_y: qy(state.front_wheel),
            rear_wheel_x: qx(state.rear_wheel),
            rear_wheel_y: qy(state.rear_wheel),
            elbow_x: qx(pose.elbow),
            elbow_y: qy(pose.elbow),
            shoulder_x: qx(pose.shoulder),
            shoulder_y: qy(pose.shoulder),
            lower_body_x: qx(pose.lower_body),
            lower_body_y: qy(pose.lower_body),
            knee_x: qx(pose.knee),
            knee_y: qy(pose.knee),
            frame_rot: matrix_to_16bits(&state.frame_rot),
            front_wheel_rot: matrix_to_16bits(&state.front_wheel_rot),
            rear_wheel_rot: matrix_to_16bits(&state.rear_wheel_rot),
        }
    }

    fn point(&self, x: i8, y: i8) -> Vec2 {
        Vec2::new(
            map_8bits_to_coord(self.frame_x, self.max_x_diff, x),
            map_8bits_to_coord(self.frame_y, self.max_y_diff, y),
        )
    }

    /// Unpack into `state`, rebuilding everything that is not stored
    pub fn apply_to(&self, state: &mut BikeState, rig: &BikeRig) {
        state.rear_wheel = self.point(self.rear_wheel_x, self.rear_wheel_y);
        state.front_wheel = self.point(self.front_wheel_x, self.front_wheel_y);
        state.center = Vec2::new(self.frame_x, self.frame_y);

        state.frame_rot = bits16_to_matrix(self.frame_rot);
        state.front_wheel_rot = bits16_to_matrix(self.front_wheel_rot);
        state.rear_wheel_rot = bits16_to_matrix(self.rear_wheel_rot);

        let params = &rig.params;
        state.engine_rpm = params.engine_rpm_min
            + (params.engine_rpm_max - params.engine_rpm_min) * (self.engine_rpm as f32 / 255.0);

        state.update_frame_anchors(rig);

        let decoded = if self.flags & FLAG_DIR_RIGHT != 0 {
            Some((Side::Primary, DriveDir::Right))
        } else if self.flags & FLAG_DIR_LEFT != 0 {
            Some((Side::Mirrored, DriveDir::Left))
        } else {
            None
        };

        let neck = params.neck_length;
        match decoded {
            Some((side, dir)) => {
                let elbow = self.point(self.elbow_x, self.elbow_y);
                let shoulder = self.point(self.shoulder_x, self.shoulder_y);
                let lower_body = self.point(self.lower_body_x, self.lower_body_y);
                let knee = self.point(self.knee_x, self.knee_y);
                let pose = state.side_mut(side);
                pose.hand = pose.wanted_hand;
                pose.elbow = elbow;
                pose.shoulder = shoulder;
                pose.lower_body = lower_body;
                pose.knee = knee;
                pose.foot = pose.wanted_foot;
                pose.update_head(neck);
                state.dir = dir;
            }
            None => {
                for pose in state.sides.iter_mut() {
                    pose.update_head(neck);
                }
            }
        }

        state.game_time = float_to_time(self.game_time);
    }

    /// Decode straight into a fresh state
    pub fn to_state(&self, rig: &BikeRig) -> BikeState {
        let mut state = BikeState::new();
        self.apply_to(&mut state, rig);
        state
    }

    pub fn write_to(&self, buf: &mut DBuffer) {
        buf.write_buf(&self.to_bytes());
    }

    pub fn read_from(buf: &mut DBuffer) -> Result<Self> {
        let game_time = buf.read_f32()?;
        let flags = buf.read_u8()?;
        let frame_x = buf.read_f32()?;
        let frame_y = buf.read_f32()?;
        let max_x_diff = buf.read_f32()?;
        let max_y_diff = buf.read_f32()?;
        let engine_rpm = buf.read_u8()?;
        let mut c = [0i8; 12];
        for v in c.iter_mut() {
            *v = buf.read_u8()? as i8;
        }
        let mut rot = [0u16; 3];
        for r in rot.iter_mut() {
            *r = buf.read_u16()?;
        }
        Ok(Self {
            game_time,
            flags,
            frame_x,
            frame_y,
            max_x_diff,
            max_y_diff,
            engine_rpm,
            front_wheel_x: c[0],
            front_wheel_y: c[1],
            rear_wheel_x: c[2],
            rear_wheel_y: c[3],
            elbow_x: c[4],
            elbow_y: c[5],
            shoulder_x: c[6],
            shoulder_y: c[7],
            lower_body_x: c[8],
            lower_body_y: c[9],
            knee_x: c[10],
            knee_y: c[11],
            frame_rot: rot[0],
            front_wheel_rot: rot[1],
            rear_wheel_rot: rot[2],
        })
    }

    pub fn to_bytes(&self) -> [u8; SERIALIZED_STATE_SIZE] {
        let mut out = [0u8; SERIALIZED_STATE_SIZE];
        let mut at = 0;
        let mut put = |bytes: &[u8]| {
            out[at..at + bytes.len()].copy_from_slice(bytes);
            at += bytes.len();
        };
        put(&self.game_time.to_le_bytes());
        put(&[self.flags]);
        put(&self.frame_x.to_le_bytes());
        put(&self.frame_y.to_le_bytes());
        put(&self.max_x_diff.to_le_bytes());
        put(&self.max_y_diff.to_le_bytes());
        put(&[self.engine_rpm]);
        for c in [
            self.front_wheel_x,
            self.front_wheel_y,
            self.rear_wheel_x,
            self.rear_wheel_y,
            self.elbow_x,
            self.elbow_y,
            self.shoulder_x,
            self.shoulder_y,
            self.lower_body_x,
            self.lower_body_y,
            self.knee_x,
            self.knee_y,
        ] {
            put(&c.to_le_bytes());
        }
        for r in [self.frame_rot, self.front_wheel_rot, self.rear_wheel_rot] {
            put(&r.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SERIALIZED_STATE_SIZE {
            return Err(Error::BufferUnderrun {
                requested: SERIALIZED_STATE_SIZE,
                remaining: bytes.len(),
            });
        }
        let mut buf = DBuffer::input(bytes[..SERIALIZED_STATE_SIZE].to_vec());
        Self::read_from(&mut buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::PhysicsSettings;
    use proptest::prelude::*;

    fn rig() -> BikeRig {
        BikeRig::from_settings(&PhysicsSettings::default())
    }

    fn sample_state(dir: DriveDir) -> BikeState {
        let rig = rig();
        let mut state = BikeState::new();
        state.dir = dir;
        state.center = Vec2::new(12.5, 3.25);
        state.frame_rot = Mat2::from_angle(0.3);
        state.front_wheel_rot = Mat2::from_angle(2.0);
        state.rear_wheel_rot = Mat2::from_angle(-1.2);
        state.front_wheel = state.center + Vec2::new(0.72, -0.6);
        state.rear_wheel = state.center + Vec2::new(-0.68, -0.5);
        state.engine_rpm = 4000.0;
        state.update_frame_anchors(&rig);
        let side = dir.side();
        let pose = state.side_mut(side);
        pose.elbow = Vec2::new(12.4, 3.9);
        pose.shoulder = Vec2::new(12.2, 4.3);
        pose.lower_body = Vec2::new(12.1, 3.6);
        pose.knee = Vec2::new(12.8, 3.4);
        state
    }

    #[test]
    fn test_wire_size_and_order() {
        let s = SerializedBikeState::from_state(&sample_state(DriveDir::Right), 250, &rig());
        let bytes = s.to_bytes();
        assert_eq!(bytes.len(), 40);
        assert_eq!(&bytes[0..4], &2.5f32.to_le_bytes());
        assert_eq!(bytes[4], FLAG_DIR_RIGHT);
        assert_eq!(&bytes[5..9], &12.5f32.to_le_bytes());
        assert_eq!(&bytes[34..36], &s.frame_rot.to_le_bytes());
        assert_eq!(&bytes[38..40], &s.rear_wheel_rot.to_le_bytes());
        assert_eq!(SerializedBikeState::from_bytes(&bytes).unwrap(), s);
    }

    #[test]
    fn test_write_to_matches_to_bytes() {
        let s = SerializedBikeState::from_state(&sample_state(DriveDir::Left), 77, &rig());
        let mut buf = DBuffer::output(7);
        s.write_to(&mut buf);
        buf.write_u8(0xee);
        let written = buf.to_vec();
        assert_eq!(written.len(), SERIALIZED_STATE_SIZE + 1);
        assert_eq!(&written[..SERIALIZED_STATE_SIZE], &s.to_bytes()[..]);

        buf.convert_output_to_input();
        assert_eq!(SerializedBikeState::read_from(&mut buf).unwrap(), s);
        assert_eq!(buf.read_u8().unwrap(), 0xee);
    }

    #[test]
    fn test_round_trip_within_quantization() {
        let rig = rig();
        for dir in [DriveDir::Right, DriveDir::Left] {
            let original = sample_state(dir);
            let packed = SerializedBikeState::from_state(&original, 1234, &rig);
            let decoded = packed.to_state(&rig);

            let tol = packed.max_x_diff.max(packed.max_y_diff) / 127.0 + 1e-5;
            let a = original.active();
            let b = decoded.active();
            for (x, y) in [
                (original.front_wheel, decoded.front_wheel),
                (original.rear_wheel, decoded.rear_wheel),
                (a.elbow, b.elbow),
                (a.shoulder, b.shoulder),
                (a.lower_body, b.lower_body),
                (a.knee, b.knee),
            ] {
                assert!((x - y).abs().max_element() <= tol, "{x} vs {y}");
            }
            assert_eq!(decoded.dir, dir);
            assert_eq!(decoded.game_time, 1234);
            assert_eq!(decoded.center, original.center);
            assert!((decoded.engine_rpm - 4000.0).abs() < 7300.0 / 255.0);
            for (m, n) in [
                (original.frame_rot, decoded.frame_rot),
                (original.front_wheel_rot, decoded.front_wheel_rot),
                (original.rear_wheel_rot, decoded.rear_wheel_rot),
            ] {
                assert!((m.x_axis - n.x_axis).length() < 2.0 / 127.0);
            }
        }
    }

    #[test]
    fn test_hand_and_foot_come_from_frame() {
        let rig = rig();
        let mut original = sample_state(DriveDir::Right);
        original.sides[0].hand = Vec2::new(99.0, 99.0);
        let decoded = SerializedBikeState::from_state(&original, 0, &rig).to_state(&rig);
        let mut expected = decoded.clone();
        expected.update_frame_anchors(&rig);
        assert_eq!(decoded.sides[0].hand, expected.sides[0].wanted_hand);
        assert_eq!(decoded.sides[0].foot, expected.sides[0].wanted_foot);
        assert_eq!(
            decoded.sides[0].hand,
            decoded.to_world(rig.anchors.rider[0].hand)
        );
    }

    #[test]
    fn test_degenerate_state_has_no_nan() {
        let mut state = BikeState::new();
        state.center = Vec2::new(1.0, 1.0);
        state.front_wheel = state.center;
        state.rear_wheel = state.center;
        for pose in state.sides.iter_mut() {
            pose.elbow = Vec2::ONE;
            pose.shoulder = Vec2::ONE;
            pose.lower_body = Vec2::ONE;
            pose.knee = Vec2::ONE;
        }
        let rig = rig();
        let packed = SerializedBikeState::from_state(&state, 0, &rig);
        assert_eq!(packed.max_x_diff, 0.0);
        assert_eq!(packed.knee_x, 0);
        let decoded = packed.to_state(&rig);
        assert!(decoded.center.is_finite());
        assert!(decoded.active().head.is_finite());
        assert_eq!(decoded.active().head, decoded.active().shoulder);
    }

    #[test]
    fn test_null_matrix_decodes_to_identity() {
        assert_eq!(bits16_to_matrix((127 << 8) | 127), Mat2::IDENTITY);
    }

    #[test]
    fn test_no_direction_flag_keeps_direction() {
        let rig = rig();
        let mut packed = SerializedBikeState::from_state(&sample_state(DriveDir::Left), 0, &rig);
        packed.flags = 0;
        let mut state = BikeState::new();
        state.dir = DriveDir::Left;
        packed.apply_to(&mut state, &rig);
        assert_eq!(state.dir, DriveDir::Left);
    }

    #[test]
    fn test_truncated_bytes_fail() {
        assert!(matches!(
            SerializedBikeState::from_bytes(&[0u8; 39]),
            Err(Error::BufferUnderrun { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_coord_quantization_bounded(
            reference in -1000.0f32..1000.0,
            max in 0.01f32..10.0,
            offset in -1.0f32..1.0,
        ) {
            let coord = reference + offset * max;
            let c = map_coord_to_8bits(reference, max, coord);
            let back = map_8bits_to_coord(reference, max, c);
            prop_assert!((back - coord).abs() <= max / 127.0 + 1e-3);
        }

        #[test]
        fn prop_matrix_stays_orthonormal(angle in -10.0f32..10.0) {
            let m = bits16_to_matrix(matrix_to_16bits(&Mat2::from_angle(angle)));
            prop_assert!((m.x_axis.length() - 1.0).abs() < 1e-5);
            prop_assert!(m.x_axis.dot(m.y_axis).abs() < 1e-5);
            prop_assert!((m.x_axis - Mat2::from_angle(angle).x_axis).length() < 2.0 / 127.0);
        }
    }
}

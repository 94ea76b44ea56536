//! Controller sources feeding the physics tick

use serde::{Deserialize, Serialize};

/// Input commands for a single tick (deterministic)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BikeInput {
    /// Throttle (> 0) or brake (< 0), in [-1, 1]
    pub drive: f32,
    /// Pull back (> 0) or push forward (< 0), in [-1, 1]
    pub pull: f32,
    /// Turn around
    pub change_dir: bool,
}

impl BikeInput {
    /// Combine digital controls the way a keyboard would
    pub fn from_keys(throttle: bool, brake: bool, pull_back: bool, push_forward: bool) -> Self {
        let axis = |pos: bool, neg: bool| f32::from(u8::from(pos)) - f32::from(u8::from(neg));
        Self {
            drive: axis(throttle, brake),
            pull: axis(pull_back, push_forward),
            change_dir: false,
        }
    }

    pub fn clamped(self) -> Self {
        Self {
            drive: self.drive.clamp(-1.0, 1.0),
            pull: self.pull.clamp(-1.0, 1.0),
            change_dir: self.change_dir,
        }
    }
}

/// Where a biker's commands come from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Controller {
    /// Keyboard/joystick of the local player
    LocalInput(BikeInput),
    /// Driven by received network frames; never commands the physics
    NetworkPuppet,
}

impl Default for Controller {
    fn default() -> Self {
        Controller::LocalInput(BikeInput::default())
    }
}

impl Controller {
    /// Commands for this tick, clamped to their ranges
    pub fn input(&self) -> BikeInput {
        match self {
            Controller::LocalInput(input) => input.clamped(),
            Controller::NetworkPuppet => BikeInput::default(),
        }
    }

    pub fn drive(&self) -> f32 {
        self.input().drive
    }

    pub fn pull(&self) -> f32 {
        self.input().pull
    }

    pub fn change_dir(&self) -> bool {
        self.input().change_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_to_axes() {
        let input = BikeInput::from_keys(true, false, false, true);
        assert_eq!(input.drive, 1.0);
        assert_eq!(input.pull, -1.0);
        assert_eq!(BikeInput::from_keys(true, true, false, false).drive, 0.0);
    }

    #[test]
    fn test_puppet_commands_nothing() {
        let c = Controller::NetworkPuppet;
        assert_eq!(c.input(), BikeInput::default());
    }

    #[test]
    fn test_local_input_is_clamped() {
        let c = Controller::LocalInput(BikeInput {
            drive: 3.0,
            pull: -2.0,
            change_dir: true,
        });
        assert_eq!(c.drive(), 1.0);
        assert_eq!(c.pull(), -1.0);
        assert!(c.change_dir());
        assert_eq!(
            c.input(),
            BikeInput {
                drive: 1.0,
                pull: -1.0,
                change_dir: true
            }
        );
    }
}

//! Network-driven biker
//!
//! A puppet never runs physics. It shows whatever pose the last received
//! frame described, optionally extrapolated along the two latest frames.

use super::controller::Controller;
use super::interpolate::interpolate_game_state_linear;
use super::rig::BikeRig;
use super::serialize::SerializedBikeState;
use super::state::BikeState;
use crate::consts::MAX_EXTRAPOLATION_T;
use crate::settings::PhysicsSettings;

#[derive(Debug, Clone)]
pub struct NetPuppet {
    rig: BikeRig,
    state: BikeState,
    /// Two latest decoded frames, oldest first
    previous: [Option<BikeState>; 2],
    /// Display delay in hundredths, applied when extrapolating
    pub delay: i32,
    pub extrapolate: bool,
    frames_received: u32,
    frames_dropped: u32,
}

impl NetPuppet {
    pub fn new(settings: &PhysicsSettings) -> Self {
        Self {
            rig: BikeRig::from_settings(settings),
            state: BikeState::new(),
            previous: [None, None],
            delay: 0,
            extrapolate: false,
            frames_received: 0,
            frames_dropped: 0,
        }
    }

    pub fn controller(&self) -> Controller {
        Controller::NetworkPuppet
    }

    pub fn state(&self) -> &BikeState {
        &self.state
    }

    pub fn frames_received(&self) -> u32 {
        self.frames_received
    }

    pub fn frames_dropped(&self) -> u32 {
        self.frames_dropped
    }

    /// Apply an already decoded frame
    pub fn receive_state(&mut self, frame: &SerializedBikeState) {
        frame.apply_to(&mut self.state, &self.rig);
        self.previous = [self.previous[1].take(), Some(self.state.clone())];
        self.frames_received += 1;
    }

    /// Decode and apply a raw frame. Frames that fail to decode are dropped
    /// and the pose stays where it was.
    pub fn receive_frame(&mut self, bytes: &[u8]) -> bool {
        match SerializedBikeState::from_bytes(bytes) {
            Ok(frame) => {
                self.receive_state(&frame);
                true
            }
            Err(e) => {
                log::warn!("Dropping network frame: {e}");
                self.frames_dropped += 1;
                false
            }
        }
    }

    /// Move the displayed pose to `now` (hundredths)
    pub fn update_to_time(&mut self, now: i32) {
        if !self.extrapolate {
            return;
        }
        let [Some(p0), Some(p1)] = &self.previous else {
            return;
        };
        let span = p1.game_time - p0.game_time;
        if span <= 0 {
            return;
        }
        let t = ((now - self.delay) - p1.game_time) as f32 / span as f32 + 1.0;
        if t < MAX_EXTRAPOLATION_T
            && let Some(pose) = interpolate_game_state_linear(&[p0.clone(), p1.clone()], t)
        {
            self.state = pose;
        }
    }
}

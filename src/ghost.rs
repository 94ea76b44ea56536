//! Replay ghost
//!
//! Plays a recorded `Replay` back against the game clock. The ghost keeps
//! four consecutive states around the requested time and interpolates
//! between the middle two.

use crate::error::Result;
use crate::replay::{Replay, ReplayConfig};
use crate::settings::PhysicsSettings;
use crate::sim::interpolate::interpolate_game_state;
use crate::sim::rig::BikeRig;
use crate::sim::state::BikeState;

#[derive(Debug, Clone)]
pub struct ReplayGhost {
    replay: Replay,
    rig: BikeRig,
    /// Consecutive states; the requested time sits between [1] and [2]
    window: [BikeState; 4],
    /// Trailing window entries that only repeat the last recorded state
    padding: usize,
    state: BikeState,
    finished: bool,
    dead: bool,
    pub interpolate: bool,
}

impl ReplayGhost {
    pub fn new(replay: Replay, settings: &PhysicsSettings) -> Result<Self> {
        let rig = BikeRig::from_settings(settings);
        let first = replay.peek_state(&rig)?;
        let mut ghost = Self {
            replay,
            rig,
            window: std::array::from_fn(|_| first.clone()),
            padding: 0,
            state: first,
            finished: false,
            dead: false,
            interpolate: true,
        };
        ghost.restart()?;
        Ok(ghost)
    }

    /// Open the replay `name` as a ghost
    pub fn open(config: ReplayConfig, name: &str, settings: &PhysicsSettings) -> Result<Self> {
        Self::new(Replay::open(config, name)?, settings)
    }

    pub fn replay(&self) -> &Replay {
        &self.replay
    }

    pub fn state(&self) -> &BikeState {
        &self.state
    }

    pub fn player_name(&self) -> &str {
        self.replay.player_name()
    }

    pub fn level_id(&self) -> &str {
        self.replay.level_id()
    }

    pub fn finish_time(&self) -> i32 {
        self.replay.finish_time()
    }

    /// Ran out of data on a finished run
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Ran out of data on an unfinished run
    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Next recorded state, or a copy of the last one once data runs out
    fn next_recorded(&mut self, last: &BikeState) -> Result<BikeState> {
        if self.replay.end_of_file() {
            self.padding += 1;
            return Ok(last.clone());
        }
        self.replay.load_state(&self.rig)
    }

    fn restart(&mut self) -> Result<()> {
        self.replay.rewind_at_beginning();
        self.padding = 0;
        self.finished = false;
        self.dead = false;

        let a = self.replay.load_state(&self.rig)?;
        let c = self.next_recorded(&a)?;
        let d = self.next_recorded(&c)?;
        self.state = a.clone();
        self.window = [a.clone(), a, c, d];
        Ok(())
    }

    fn shift(&mut self) -> Result<()> {
        self.window.rotate_left(1);
        let last = self.window[2].clone();
        self.window[3] = self.next_recorded(&last)?;
        Ok(())
    }

    /// Move the ghost to `time` (hundredths)
    pub fn update_to_time(&mut self, time: i32) -> Result<()> {
        if time < self.window[1].game_time {
            self.restart()?;
        }
        while self.window[2].game_time < time && self.padding < 2 {
            self.shift()?;
        }

        let (b, c) = (&self.window[1], &self.window[2]);
        if self.padding >= 2 && time >= b.game_time {
            self.state = b.clone();
            self.state.engine_rpm = 0.0;
            if self.replay.did_finish() {
                self.finished = true;
            } else {
                self.dead = true;
            }
            return Ok(());
        }

        let span = c.game_time - b.game_time;
        let t = if span > 0 { (time - b.game_time) as f32 / span as f32 } else { 0.0 };
        self.state = if self.interpolate {
            interpolate_game_state(&self.window, t).unwrap_or_else(|| b.clone())
        } else {
            b.clone()
        };
        Ok(())
    }
}

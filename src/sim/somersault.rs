//! Somersault detection
//!
//! Unwraps the frame angle tick by tick; every full turn accumulated in one
//! direction counts as a somersault and restarts the count.

use std::f32::consts::{PI, TAU};

#[derive(Debug, Clone, Default)]
pub struct SomersaultCounter {
    last_angle: Option<f32>,
    accumulated: f32,
    count: u32,
}

impl SomersaultCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the current rotation but keep the count (direction change)
    pub fn reset(&mut self) {
        self.last_angle = None;
        self.accumulated = 0.0;
    }

    /// Feed the frame angle in [0, 2π). Returns `Some(counter_clockwise)`
    /// when a full turn completes.
    pub fn update(&mut self, angle: f32) -> Option<bool> {
        let last = self.last_angle.replace(angle)?;
        let mut delta = angle - last;
        if delta > PI {
            delta -= TAU;
        } else if delta < -PI {
            delta += TAU;
        }
        self.accumulated += delta;

        if self.accumulated >= TAU {
            self.accumulated -= TAU;
            self.count += 1;
            Some(true)
        } else if self.accumulated <= -TAU {
            self.accumulated += TAU;
            self.count += 1;
            Some(false)
        } else {
            None
        }
    }

    /// Somersaults completed since creation
    pub fn count(&self) -> u32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(a: f32) -> f32 {
        a.rem_euclid(TAU)
    }

    #[test]
    fn test_full_turn_counts_once() {
        let mut counter = SomersaultCounter::new();
        let mut hits = Vec::new();
        for i in 0..=110 {
            if let Some(ccw) = counter.update(wrap(i as f32 * 0.06)) {
                hits.push(ccw);
            }
        }
        assert_eq!(hits, vec![true]);
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_reset_keeps_count() {
        let mut counter = SomersaultCounter::new();
        for i in 0..=110 {
            counter.update(wrap(i as f32 * 0.06));
        }
        counter.reset();
        assert_eq!(counter.count(), 1);
        // Half a turn after the reset does not complete a new one
        for i in 0..=55 {
            assert_eq!(counter.update(wrap(i as f32 * 0.06)), None);
        }
    }

    #[test]
    fn test_clockwise_turn() {
        let mut counter = SomersaultCounter::new();
        let hit = (0..=110).find_map(|i| counter.update(wrap(-(i as f32) * 0.06)));
        assert_eq!(hit, Some(false));
    }

    #[test]
    fn test_wobble_does_not_count() {
        let mut counter = SomersaultCounter::new();
        for i in 0..1000 {
            let a = wrap((i as f32 * 0.1).sin() * 1.5);
            assert!(counter.update(a).is_none());
        }
    }

    #[test]
    fn test_reset_drops_progress() {
        let mut counter = SomersaultCounter::new();
        for i in 0..=100 {
            counter.update(wrap(i as f32 * 0.06));
        }
        counter.reset();
        assert!((0..=20).all(|i| counter.update(wrap(6.0 + i as f32 * 0.06)).is_none()));
    }
}

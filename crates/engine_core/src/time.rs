//! Frame timing for the game loop.

use std::time::Instant;

/// Largest simulation step handed to a tick, in seconds.
pub const DEFAULT_MAX_STEP: f32 = 1.0 / 30.0;

/// Wall-clock frame timer with a clamped delta.
///
/// A long stall (window drag, debugger break, slow frame) never produces a
/// delta larger than `max_step`, which bounds how far bullets and enemies
/// can jump in a single tick.
#[derive(Debug)]
pub struct FrameClock {
    /// Time of the last tick.
    last_frame: Instant,
    /// Clamped delta of the last tick.
    delta: f32,
    /// Sum of clamped deltas since the last reset.
    elapsed: f32,
    /// Ticks since the last reset.
    frame_count: u64,
    max_step: f32,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta: 0.0,
            elapsed: 0.0,
            frame_count: 0,
            max_step: DEFAULT_MAX_STEP,
        }
    }

    /// Set the maximum step in seconds. Non-positive values are ignored.
    pub fn set_max_step(&mut self, seconds: f32) {
        if seconds > 0.0 {
            self.max_step = seconds;
        } else {
            log::warn!("Ignoring non-positive max frame step {}", seconds);
        }
    }

    pub fn max_step(&self) -> f32 {
        self.max_step
    }

    /// Restart timing from now. The next tick measures from this instant.
    pub fn reset(&mut self) {
        self.reset_at(Instant::now());
    }

    pub fn reset_at(&mut self, now: Instant) {
        self.last_frame = now;
        self.delta = 0.0;
        self.elapsed = 0.0;
        self.frame_count = 0;
    }

    /// Advance to now and return the clamped delta in seconds.
    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    /// Advance to `now` and return the clamped delta in seconds.
    pub fn tick_at(&mut self, now: Instant) -> f32 {
        let raw = now.saturating_duration_since(self.last_frame);
        self.last_frame = now;
        self.advance(raw.as_secs_f32())
    }

    /// Advance by an explicit step (clamped to `[0, max_step]`) without
    /// reading the wall clock.
    pub fn advance(&mut self, seconds: f32) -> f32 {
        self.delta = seconds.clamp(0.0, self.max_step);
        self.elapsed += self.delta;
        self.frame_count += 1;
        self.delta
    }

    /// Clamped delta of the last tick in seconds.
    pub fn delta_seconds(&self) -> f32 {
        self.delta
    }

    /// Simulated seconds since the last reset.
    pub fn elapsed_seconds(&self) -> f32 {
        self.elapsed
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn short_frames_pass_through() {
        let start = Instant::now();
        let mut clock = FrameClock::new();
        clock.reset_at(start);
        let dt = clock.tick_at(start + Duration::from_millis(10));
        assert!((dt - 0.010).abs() < 1e-6);
        assert_eq!(clock.frame_count(), 1);
    }

    #[test]
    fn stalls_are_clamped_to_max_step() {
        let start = Instant::now();
        let mut clock = FrameClock::new();
        clock.reset_at(start);
        let dt = clock.tick_at(start + Duration::from_secs(2));
        assert!((dt - DEFAULT_MAX_STEP).abs() < 1e-6);
        assert!((clock.elapsed_seconds() - DEFAULT_MAX_STEP).abs() < 1e-6);
    }

    #[test]
    fn custom_max_step_is_respected() {
        let start = Instant::now();
        let mut clock = FrameClock::new();
        clock.set_max_step(0.1);
        clock.set_max_step(-1.0);
        clock.reset_at(start);
        let dt = clock.tick_at(start + Duration::from_millis(500));
        assert!((dt - 0.1).abs() < 1e-6);
    }

    #[test]
    fn advance_counts_frames_without_wall_clock() {
        let mut clock = FrameClock::new();
        clock.advance(0.01);
        clock.advance(0.01);
        assert_eq!(clock.frame_count(), 2);
        assert!((clock.elapsed_seconds() - 0.02).abs() < 1e-6);
    }

    #[test]
    fn time_going_backwards_yields_zero() {
        let start = Instant::now() + Duration::from_secs(1);
        let mut clock = FrameClock::new();
        clock.reset_at(start);
        assert_eq!(clock.tick_at(start - Duration::from_millis(5)), 0.0);
    }
}

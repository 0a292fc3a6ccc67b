//! Frame clock.

use std::time::Instant;

/// Longest step fed to tweens, so a stalled window does not skip transitions.
pub const MAX_DELTA: f32 = 0.25;

/// Elapsed and per-frame time, in seconds.
#[derive(Clone, Copy, Debug)]
pub struct Clock {
    start: Instant,
    last: Option<Instant>,
    elapsed: f32,
    delta: f32,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            last: None,
            elapsed: 0.0,
            delta: 0.0,
        }
    }

    /// Advance to `now`. The first tick has a zero delta.
    pub fn tick(&mut self, now: Instant) {
        let delta = match self.last {
            Some(last) => now.saturating_duration_since(last).as_secs_f32(),
            None => 0.0,
        };
        self.advance(delta);
        self.elapsed = now.saturating_duration_since(self.start).as_secs_f32();
        self.last = Some(now);
    }

    /// Advance by a fixed step, for tests and offline rendering.
    pub fn advance(&mut self, delta: f32) {
        self.delta = delta.clamp(0.0, MAX_DELTA);
        self.elapsed += self.delta;
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn delta(&self) -> f32 {
        self.delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_tick_has_no_delta() {
        let mut clock = Clock::new();
        clock.tick(Instant::now());
        assert_eq!(clock.delta(), 0.0);
    }

    #[test]
    fn delta_is_clamped() {
        let mut clock = Clock::new();
        let t0 = Instant::now();
        clock.tick(t0);
        clock.tick(t0 + Duration::from_secs(3));
        assert_eq!(clock.delta(), MAX_DELTA);
    }

    #[test]
    fn advance_accumulates() {
        let mut clock = Clock::new();
        clock.advance(0.1);
        clock.advance(0.1);
        assert!((clock.elapsed() - 0.2).abs() < 1e-6);
    }
}

//! Frame pacing.
//!
//! The host calls [`FrameScheduler::tick`] once per display refresh with its
//! clock reading; the scheduler turns that into a clamped delta and says
//! whether a frame should run at all.

#[cfg(not(target_arch = "wasm32"))]
pub use std::time::Instant;
#[cfg(target_arch = "wasm32")]
pub use web_time::Instant;

use std::time::Duration;

/// Longest step handed to the animation. Longer gaps (tab hidden, debugger)
/// are treated as this much time.
pub const MAX_FRAME_DELTA: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Stopped,
    Running,
    Paused,
    /// Terminal; nothing restarts it.
    Finished,
}

#[derive(Debug, Clone, Default)]
pub struct FrameScheduler {
    state: SchedulerState,
    last: Option<Instant>,
    ticks: u64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }

    /// Frames produced so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn start(&mut self) {
        if self.state == SchedulerState::Stopped {
            self.state = SchedulerState::Running;
            self.last = None;
        }
    }

    pub fn pause(&mut self) {
        if self.state == SchedulerState::Running {
            self.state = SchedulerState::Paused;
        }
    }

    /// Resume without replaying the paused interval.
    pub fn resume(&mut self) {
        if self.state == SchedulerState::Paused {
            self.state = SchedulerState::Running;
            self.last = None;
        }
    }

    pub fn stop(&mut self) {
        self.state = SchedulerState::Finished;
        self.last = None;
    }

    /// Seconds since the previous tick, or `None` when no frame should run.
    ///
    /// The first tick after start or resume yields `0.0`.
    pub fn tick(&mut self, now: Instant) -> Option<f32> {
        if self.state != SchedulerState::Running {
            return None;
        }
        let dt = match self.last {
            Some(prev) => now
                .checked_duration_since(prev)
                .unwrap_or(Duration::ZERO)
                .as_secs_f32()
                .min(MAX_FRAME_DELTA),
            None => 0.0,
        };
        self.last = Some(now);
        self.ticks += 1;
        Some(dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_until_started() {
        let mut s = FrameScheduler::new();
        assert!(s.tick(Instant::now()).is_none());
        s.start();
        assert_eq!(s.tick(Instant::now()), Some(0.0));
        assert_eq!(s.ticks(), 1);
    }

    #[test]
    fn delta_is_measured_and_clamped() {
        let t0 = Instant::now();
        let mut s = FrameScheduler::new();
        s.start();
        s.tick(t0);
        let dt = s.tick(t0 + Duration::from_millis(16)).unwrap();
        assert!((dt - 0.016).abs() < 1e-4);
        let long = s.tick(t0 + Duration::from_secs(5)).unwrap();
        assert_eq!(long, MAX_FRAME_DELTA);
    }

    #[test]
    fn clock_going_backwards_is_zero() {
        let t0 = Instant::now() + Duration::from_secs(1);
        let mut s = FrameScheduler::new();
        s.start();
        s.tick(t0);
        assert_eq!(s.tick(t0 - Duration::from_millis(500)), Some(0.0));
    }

    #[test]
    fn resume_does_not_replay_the_pause() {
        let t0 = Instant::now();
        let mut s = FrameScheduler::new();
        s.start();
        s.tick(t0);
        s.pause();
        assert!(s.tick(t0 + Duration::from_millis(50)).is_none());
        s.resume();
        assert_eq!(s.tick(t0 + Duration::from_secs(30)), Some(0.0));
        let dt = s.tick(t0 + Duration::from_secs(30) + Duration::from_millis(20)).unwrap();
        assert!((dt - 0.02).abs() < 1e-4);
    }

    #[test]
    fn stop_is_terminal() {
        let mut s = FrameScheduler::new();
        s.start();
        s.stop();
        s.start();
        s.resume();
        assert_eq!(s.state(), SchedulerState::Finished);
        assert!(s.tick(Instant::now()).is_none());
    }
}

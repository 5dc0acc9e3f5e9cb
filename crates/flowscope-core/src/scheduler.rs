//! Cooperative frame scheduling.
//!
//! The host drives everything from its presentation callback. These types
//! decide whether a callback becomes a frame and how much time it covers.

use std::time::{Duration, Instant};

/// Largest delta a single tick may integrate.
pub const MAX_FRAME_DELTA: Duration = Duration::from_millis(250);

/// Drops draw work that arrives before the minimum interval has elapsed.
#[derive(Debug, Clone)]
pub struct FrameLimiter {
    min_interval: Duration,
    last_admitted: Option<Instant>,
    dropped: u64,
}

impl FrameLimiter {
    /// Limit to `fps` frames per second. Zero disables limiting.
    pub fn new(fps: u32) -> Self {
        Self {
            min_interval: interval_for(fps),
            last_admitted: None,
            dropped: 0,
        }
    }

    pub fn set_frame_rate(&mut self, fps: u32) {
        self.min_interval = interval_for(fps);
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Admit a callback at `now`, or drop it.
    pub fn admit(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_admitted {
            if now.saturating_duration_since(last) < self.min_interval {
                self.dropped += 1;
                return false;
            }
        }
        self.last_admitted = Some(now);
        true
    }

    /// Callbacks dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn reset(&mut self) {
        self.last_admitted = None;
    }
}

fn interval_for(fps: u32) -> Duration {
    if fps == 0 {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(1.0 / fps as f64)
    }
}

/// One admitted tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTick {
    /// Seconds since the previous tick of the same run, clamped
    pub dt: f32,
    /// Run the tick belongs to
    pub generation: u64,
    pub now: Instant,
}

/// Start/stop state of a self-rescheduling loop.
///
/// `stop()` takes effect at the top of the next tick. Every `start()` opens a
/// new generation so a tick scheduled by an older run can be told apart.
#[derive(Debug, Clone, Default)]
pub struct RenderLoop {
    running: bool,
    generation: u64,
    last_tick: Option<Instant>,
}

impl RenderLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the loop. Starting a running loop is a no-op.
    pub fn start(&mut self) -> u64 {
        if !self.running {
            self.running = true;
            self.generation += 1;
            self.last_tick = None;
        }
        self.generation
    }

    /// Stop the loop. Repeated calls are no-ops.
    pub fn stop(&mut self) {
        self.running = false;
        self.last_tick = None;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a tick scheduled by run `generation` should still execute.
    pub fn is_current(&self, generation: u64) -> bool {
        self.running && generation == self.generation
    }

    /// Advance to `now`. Returns `None` while stopped.
    ///
    /// The first tick after `start()` has a zero delta.
    pub fn tick(&mut self, now: Instant) -> Option<FrameTick> {
        if !self.running {
            return None;
        }
        let dt = match self.last_tick {
            Some(last) => now.saturating_duration_since(last).min(MAX_FRAME_DELTA),
            None => Duration::ZERO,
        };
        self.last_tick = Some(now);
        Some(FrameTick {
            dt: dt.as_secs_f32(),
            generation: self.generation,
            now,
        })
    }
}

/// Gates the render pipeline to the configured frame-rate cap.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    render_loop: RenderLoop,
    limiter: FrameLimiter,
}

impl FrameScheduler {
    pub fn new(frame_rate_limit: u32) -> Self {
        Self {
            render_loop: RenderLoop::new(),
            limiter: FrameLimiter::new(frame_rate_limit),
        }
    }

    pub fn start(&mut self) -> u64 {
        self.limiter.reset();
        self.render_loop.start()
    }

    pub fn stop(&mut self) {
        self.render_loop.stop();
    }

    pub fn is_running(&self) -> bool {
        self.render_loop.is_running()
    }

    pub fn set_frame_rate(&mut self, fps: u32) {
        self.limiter.set_frame_rate(fps);
    }

    /// Turn a presentation callback into a frame, if running and admitted.
    pub fn tick(&mut self, now: Instant) -> Option<FrameTick> {
        if !self.render_loop.is_running() || !self.limiter.admit(now) {
            return None;
        }
        self.render_loop.tick(now)
    }

    pub fn dropped_ticks(&self) -> u64 {
        self.limiter.dropped()
    }

    pub fn generation(&self) -> u64 {
        self.render_loop.generation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_drops_early_callbacks() {
        let mut limiter = FrameLimiter::new(50); // 20ms
        let t0 = Instant::now();
        assert!(limiter.admit(t0));
        assert!(!limiter.admit(t0 + Duration::from_millis(5)));
        assert!(!limiter.admit(t0 + Duration::from_millis(19)));
        assert!(limiter.admit(t0 + Duration::from_millis(20)));
        assert_eq!(limiter.dropped(), 2);
    }

    #[test]
    fn zero_limit_admits_everything() {
        let mut limiter = FrameLimiter::new(0);
        let t0 = Instant::now();
        assert!(limiter.admit(t0));
        assert!(limiter.admit(t0));
    }

    #[test]
    fn stopped_loop_yields_nothing() {
        let mut lp = RenderLoop::new();
        assert!(lp.tick(Instant::now()).is_none());
        lp.start();
        assert!(lp.tick(Instant::now()).is_some());
        lp.stop();
        lp.stop();
        assert!(lp.tick(Instant::now()).is_none());
    }

    #[test]
    fn delta_is_measured_and_clamped() {
        let mut lp = RenderLoop::new();
        lp.start();
        let t0 = Instant::now();
        assert_eq!(lp.tick(t0).unwrap().dt, 0.0);
        let dt = lp.tick(t0 + Duration::from_millis(16)).unwrap().dt;
        assert!((dt - 0.016).abs() < 1e-6);
        let dt = lp.tick(t0 + Duration::from_secs(10)).unwrap().dt;
        assert!((dt - MAX_FRAME_DELTA.as_secs_f32()).abs() < 1e-6);
    }

    #[test]
    fn restart_opens_new_generation() {
        let mut lp = RenderLoop::new();
        let first = lp.start();
        assert_eq!(lp.start(), first);
        lp.stop();
        let second = lp.start();
        assert_ne!(first, second);
        assert!(!lp.is_current(first));
        assert!(lp.is_current(second));
    }

    #[test]
    fn scheduler_requires_start_and_admission() {
        let mut scheduler = FrameScheduler::new(60);
        let t0 = Instant::now();
        assert!(scheduler.tick(t0).is_none());
        scheduler.start();
        assert!(scheduler.tick(t0).is_some());
        assert!(scheduler.tick(t0 + Duration::from_millis(1)).is_none());
        assert_eq!(scheduler.dropped_ticks(), 1);
        assert!(scheduler.tick(t0 + Duration::from_millis(17)).is_some());
    }
}

//! Frame timing, memory sampling and quality degradation.
//!
//! Breaching a budget is never an error. The monitor reports
//! [`PerformanceAlert`]s and flips into a sticky degraded mode that the
//! compositor and particle system read through [`QualitySettings`].

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Budget for one frame at 60 fps.
pub const DEFAULT_FRAME_BUDGET: Duration = Duration::from_micros(16_670);

/// Frame time that switches on performance mode (30 fps).
pub const DEFAULT_DEGRADE_THRESHOLD: Duration = Duration::from_micros(33_330);

/// Non-fatal performance signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PerformanceAlert {
    /// A frame took longer than the frame budget
    FrameBudgetExceeded {
        render_time: Duration,
        budget: Duration,
        frame: u64,
    },
    /// Performance mode switched on after a frame crossed the degrade threshold
    PerformanceModeActivated { render_time: Duration, frame: u64 },
    /// Sampled memory usage is above the configured threshold
    MemoryThresholdExceeded { used: u64, threshold: u64 },
}

/// Running frame statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub frame_count: u64,
    /// Running mean of render times
    pub average_frame_time: Duration,
    /// Last sampled memory usage in bytes
    pub memory_usage: u64,
    pub last_render_time: Duration,
}

impl FrameMetrics {
    /// Frames per second implied by the running average.
    pub fn fps(&self) -> f32 {
        let secs = self.average_frame_time.as_secs_f32();
        if secs > 0.0 {
            1.0 / secs
        } else {
            0.0
        }
    }
}

/// Render quality derived from the monitor's mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualitySettings {
    pub antialiasing: bool,
    /// Render surface resolution relative to logical size
    pub resolution_scale: f32,
    /// Maximum number of edges drawn
    pub max_edges: usize,
    /// Multiplier applied to continuous particle emission
    pub emission_scale: f32,
}

/// Thresholds the monitor checks against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceBudget {
    pub frame_budget: Duration,
    pub degrade_threshold: Duration,
    /// Bytes; a sample above this raises an alert
    pub memory_warning_threshold: u64,
    pub max_edges: usize,
    pub degraded_max_edges: usize,
}

type AlertCallback = Box<dyn FnMut(&PerformanceAlert)>;

/// Observes per-frame timing and memory.
pub struct PerformanceMonitor {
    budget: PerformanceBudget,
    metrics: FrameMetrics,
    frame_start: Option<Instant>,
    performance_mode: bool,
    device_pixel_ratio: f32,
    on_alert: Option<AlertCallback>,
}

impl std::fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("budget", &self.budget)
            .field("metrics", &self.metrics)
            .field("performance_mode", &self.performance_mode)
            .finish_non_exhaustive()
    }
}

impl PerformanceMonitor {
    pub fn new(budget: PerformanceBudget) -> Self {
        Self {
            budget,
            metrics: FrameMetrics::default(),
            frame_start: None,
            performance_mode: false,
            device_pixel_ratio: 1.0,
            on_alert: None,
        }
    }

    /// Register a callback invoked for every alert.
    pub fn on_alert(&mut self, callback: impl FnMut(&PerformanceAlert) + 'static) {
        self.on_alert = Some(Box::new(callback));
    }

    pub fn set_budget(&mut self, budget: PerformanceBudget) {
        self.budget = budget;
    }

    pub fn budget(&self) -> &PerformanceBudget {
        &self.budget
    }

    /// Mark the start of the draw work.
    pub fn begin_frame(&mut self, now: Instant) {
        self.frame_start = Some(now);
    }

    /// Mark the end of the draw work and record its duration.
    ///
    /// Without a matching [`begin_frame`](Self::begin_frame) nothing is recorded.
    pub fn end_frame(&mut self, now: Instant) -> Vec<PerformanceAlert> {
        match self.frame_start.take() {
            Some(start) => self.record_frame(now.saturating_duration_since(start)),
            None => Vec::new(),
        }
    }

    /// Record one frame's render time.
    pub fn record_frame(&mut self, render_time: Duration) -> Vec<PerformanceAlert> {
        let m = &mut self.metrics;
        m.frame_count += 1;
        let n = m.frame_count as f64;
        let avg = (m.average_frame_time.as_secs_f64() * (n - 1.0) + render_time.as_secs_f64()) / n;
        m.average_frame_time = Duration::from_secs_f64(avg);
        m.last_render_time = render_time;
        let frame = m.frame_count;

        let mut alerts = Vec::new();
        if render_time > self.budget.frame_budget {
            alerts.push(PerformanceAlert::FrameBudgetExceeded {
                render_time,
                budget: self.budget.frame_budget,
                frame,
            });
        }
        if render_time > self.budget.degrade_threshold && !self.performance_mode {
            self.performance_mode = true;
            tracing::warn!(?render_time, frame, "Performance mode activated");
            alerts.push(PerformanceAlert::PerformanceModeActivated { render_time, frame });
        }

        self.dispatch(&alerts);
        alerts
    }

    /// Record a memory sample in bytes.
    pub fn sample_memory(&mut self, used: u64) -> Option<PerformanceAlert> {
        self.metrics.memory_usage = used;
        if used <= self.budget.memory_warning_threshold {
            return None;
        }
        let alert = PerformanceAlert::MemoryThresholdExceeded {
            used,
            threshold: self.budget.memory_warning_threshold,
        };
        tracing::warn!(used, threshold = self.budget.memory_warning_threshold, "Memory threshold exceeded");
        self.dispatch(std::slice::from_ref(&alert));
        Some(alert)
    }

    fn dispatch(&mut self, alerts: &[PerformanceAlert]) {
        if let Some(callback) = self.on_alert.as_mut() {
            for alert in alerts {
                callback(alert);
            }
        }
    }

    pub fn performance_mode(&self) -> bool {
        self.performance_mode
    }

    /// Explicitly switch performance mode on or off.
    pub fn set_performance_mode(&mut self, enabled: bool) {
        if self.performance_mode != enabled {
            tracing::info!(enabled, "Performance mode toggled");
        }
        self.performance_mode = enabled;
    }

    /// Resolution scale used outside performance mode.
    pub fn set_device_pixel_ratio(&mut self, ratio: f32) {
        self.device_pixel_ratio = ratio.max(0.1);
    }

    /// Quality the renderers should use right now.
    pub fn quality(&self) -> QualitySettings {
        if self.performance_mode {
            QualitySettings {
                antialiasing: false,
                resolution_scale: 1.0,
                max_edges: self.budget.degraded_max_edges,
                emission_scale: 0.5,
            }
        } else {
            QualitySettings {
                antialiasing: true,
                resolution_scale: self.device_pixel_ratio,
                max_edges: self.budget.max_edges,
                emission_scale: 1.0,
            }
        }
    }

    pub fn metrics(&self) -> FrameMetrics {
        self.metrics
    }

    pub fn fps(&self) -> f32 {
        self.metrics.fps()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn budget() -> PerformanceBudget {
        PerformanceBudget {
            frame_budget: DEFAULT_FRAME_BUDGET,
            degrade_threshold: DEFAULT_DEGRADE_THRESHOLD,
            memory_warning_threshold: 1_000,
            max_edges: 2000,
            degraded_max_edges: 500,
        }
    }

    #[test]
    fn running_average_is_incremental_mean() {
        let mut monitor = PerformanceMonitor::new(budget());
        for ms in [10, 20, 30] {
            monitor.record_frame(Duration::from_millis(ms));
        }
        let m = monitor.metrics();
        assert_eq!(m.frame_count, 3);
        assert!((m.average_frame_time.as_secs_f64() - 0.020).abs() < 1e-9);
        assert_eq!(m.last_render_time, Duration::from_millis(30));
    }

    #[test]
    fn fast_frames_raise_nothing() {
        let mut monitor = PerformanceMonitor::new(budget());
        assert!(monitor.record_frame(Duration::from_millis(5)).is_empty());
        assert!(!monitor.performance_mode());
    }

    #[test]
    fn degrade_is_sticky_and_reported_once() {
        let mut monitor = PerformanceMonitor::new(budget());
        let alerts = monitor.record_frame(Duration::from_millis(40));
        assert!(alerts.iter().any(|a| matches!(a, PerformanceAlert::PerformanceModeActivated { .. })));

        let alerts = monitor.record_frame(Duration::from_millis(40));
        assert!(!alerts.iter().any(|a| matches!(a, PerformanceAlert::PerformanceModeActivated { .. })));

        monitor.record_frame(Duration::from_millis(1));
        assert!(monitor.performance_mode());

        monitor.set_performance_mode(false);
        assert!(!monitor.performance_mode());
    }

    #[test]
    fn quality_follows_mode() {
        let mut monitor = PerformanceMonitor::new(budget());
        monitor.set_device_pixel_ratio(2.0);
        let q = monitor.quality();
        assert!(q.antialiasing);
        assert_eq!(q.resolution_scale, 2.0);
        assert_eq!(q.max_edges, 2000);

        monitor.set_performance_mode(true);
        let q = monitor.quality();
        assert!(!q.antialiasing);
        assert_eq!(q.resolution_scale, 1.0);
        assert_eq!(q.max_edges, 500);
    }

    #[test]
    fn memory_alert_above_threshold() {
        let mut monitor = PerformanceMonitor::new(budget());
        assert!(monitor.sample_memory(500).is_none());
        assert!(matches!(
            monitor.sample_memory(5_000),
            Some(PerformanceAlert::MemoryThresholdExceeded { used: 5_000, threshold: 1_000 })
        ));
        assert_eq!(monitor.metrics().memory_usage, 5_000);
    }

    #[test]
    fn callback_receives_alerts() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut monitor = PerformanceMonitor::new(budget());
        monitor.on_alert(move |alert| sink.borrow_mut().push(alert.clone()));

        monitor.record_frame(Duration::from_millis(20));
        monitor.sample_memory(2_000);
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn begin_end_measures_elapsed() {
        let mut monitor = PerformanceMonitor::new(budget());
        let t0 = Instant::now();
        monitor.begin_frame(t0);
        monitor.end_frame(t0 + Duration::from_millis(20));
        assert_eq!(monitor.metrics().last_render_time, Duration::from_millis(20));
        // Unpaired end is ignored
        assert!(monitor.end_frame(t0).is_empty());
        assert_eq!(monitor.metrics().frame_count, 1);
    }
}

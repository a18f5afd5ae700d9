use crate::error::ProcessError;
use std::time::{Duration, Instant};

/// Progress reporting and cancellation, consulted between whole features.
pub trait ProcessMonitor {
    fn started(&mut self) {}

    /// `fraction` runs from 0.0 to 1.0.
    fn progress(&mut self, _fraction: f32) {}

    fn complete(&mut self) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl ProcessMonitor for NoopMonitor {}

pub(crate) fn check_cancelled(monitor: &dyn ProcessMonitor) -> Result<(), ProcessError> {
    if monitor.is_cancelled() {
        Err(ProcessError::Cancelled)
    } else {
        Ok(())
    }
}

/// Accumulates time across repeated start/stop pairs. Does nothing unless
/// enabled, so callers can leave the calls in place.
#[derive(Debug, Default)]
pub struct Stopwatch {
    enabled: bool,
    spent: Duration,
    started_at: Option<Instant>,
}

impl Stopwatch {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Default::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn start(&mut self) {
        if self.enabled {
            self.started_at = Some(Instant::now());
        }
    }

    pub fn stop(&mut self) {
        if let Some(started_at) = self.started_at.take() {
            self.spent += started_at.elapsed();
        }
    }

    /// Runs `f` inside a start/stop pair.
    pub fn measure<T>(&mut self, f: impl FnOnce() -> T) -> T {
        self.start();
        let result = f();
        self.stop();
        result
    }

    pub fn seconds(&self) -> f64 {
        self.spent.as_secs_f64()
    }
}

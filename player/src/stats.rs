//! Pump statistics tracking
//!
//! Counts engine ticks, frames pulled into the texture and engine errors,
//! and logs a summary at a fixed interval.

use std::time::{Duration, Instant};

/// Tracks pump activity for one controller
pub struct PumpStats {
    /// Number of `process` calls
    pub(crate) ticks: u64,

    /// Number of texture updates that produced a new frame
    pub(crate) frames_updated: u64,

    /// Number of engine task calls that failed
    pub(crate) task_errors: u64,

    /// When counting started
    pub(crate) started: Instant,

    /// Last time stats were logged
    pub(crate) last_stats_log: Instant,

    /// Time spent inside the engine task call (profiling only)
    #[cfg(feature = "profiling")]
    pub(crate) task_time: Duration,
}

impl PumpStats {
    /// Create new statistics tracker
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            ticks: 0,
            frames_updated: 0,
            task_errors: 0,
            started: now,
            last_stats_log: now,
            #[cfg(feature = "profiling")]
            task_time: Duration::ZERO,
        }
    }

    pub fn record_tick(&mut self) {
        self.ticks += 1;
    }

    pub fn record_frame(&mut self) {
        self.frames_updated += 1;
    }

    pub fn record_task_error(&mut self) {
        self.task_errors += 1;
    }

    /// Record time spent in one engine task call (profiling only)
    #[cfg(feature = "profiling")]
    pub fn record_task_time(&mut self, elapsed: Duration) {
        self.task_time += elapsed;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn frames_updated(&self) -> u64 {
        self.frames_updated
    }

    pub fn task_errors(&self) -> u64 {
        self.task_errors
    }

    /// Frames per second since counting started
    pub fn frame_rate(&self) -> f64 {
        let secs = self.started.elapsed().as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.frames_updated as f64 / secs
        }
    }

    /// Share of ticks that produced a new frame, as a percentage
    pub fn update_ratio(&self) -> f64 {
        if self.ticks == 0 {
            0.0
        } else {
            (self.frames_updated as f64 / self.ticks as f64) * 100.0
        }
    }

    /// Log statistics if interval has elapsed
    pub fn maybe_log_stats(&mut self, interval: Duration) {
        if self.last_stats_log.elapsed() < interval {
            return;
        }

        log::info!(
            "Pump stats ({:.2} fps): {} ticks, {} frames ({:.1}% of ticks), {} task errors",
            self.frame_rate(),
            self.ticks,
            self.frames_updated,
            self.update_ratio(),
            self.task_errors
        );

        #[cfg(feature = "profiling")]
        {
            let avg = if self.ticks > 0 {
                self.task_time.as_secs_f64() * 1000.0 / self.ticks as f64
            } else {
                0.0
            };
            log::debug!("Engine task time: {:.3} ms per tick on average", avg);
        }

        self.last_stats_log = Instant::now();
    }

    /// Reset statistics counters
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for PumpStats {
    fn default() -> Self {
        Self::new()
    }
}

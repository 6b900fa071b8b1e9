//! Cooperative animation-frame loop.
//!
//! The driver is a restartable state machine: `Idle` until the first lane
//! unit arrives, then `Scheduled`, performing one draw per tick and
//! re-arming itself until a stop request is observed. The stop flag is
//! checked only at tick boundaries, never preempting an in-progress draw.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::{self, Interval, MissedTickBehavior};

/// Scheduling state of the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Scheduled,
}

/// Draw-loop counters reported in the session summary.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DriverStats {
    pub frames_drawn: u64,
    pub frames_skipped: u64,
    pub average_fps: f64,
}

pub struct AnimationDriver {
    state: DriverState,
    interval: Interval,
    stop_requested: bool,
    frames_drawn: u64,
    frames_skipped: u64,
    armed_at: Option<Instant>,
}

impl AnimationDriver {
    /// A driver ticking at `frame_rate` frames per second, initially idle.
    pub fn new(frame_rate: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / f64::from(frame_rate.max(1)));
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            state: DriverState::Idle,
            interval,
            stop_requested: false,
            frames_drawn: 0,
            frames_skipped: 0,
            armed_at: None,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn is_scheduled(&self) -> bool {
        self.state == DriverState::Scheduled
    }

    /// `Idle -> Scheduled`, on the first lane unit after startup or a
    /// restart. No-op while already scheduled.
    pub fn arm(&mut self) {
        if self.state == DriverState::Idle && !self.stop_requested {
            self.state = DriverState::Scheduled;
            if self.armed_at.is_none() {
                self.armed_at = Some(Instant::now());
            }
            self.interval.reset();
        }
    }

    /// Mark the driver for cooperative cancellation; takes effect at the
    /// next tick boundary.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// Observe the stop flag at a tick boundary. Returns true (and goes
    /// `Scheduled -> Idle`) when a stop was requested.
    pub fn observe_stop(&mut self) -> bool {
        if self.stop_requested {
            self.state = DriverState::Idle;
            self.stop_requested = false;
            return true;
        }
        false
    }

    /// Await the next frame tick. Only meaningful while `Scheduled`.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }

    pub fn record_drawn(&mut self) {
        self.frames_drawn += 1;
    }

    pub fn record_skipped(&mut self) {
        self.frames_skipped += 1;
    }

    pub fn stats(&self) -> DriverStats {
        let average_fps = match self.armed_at {
            Some(armed_at) => {
                let elapsed = armed_at.elapsed().as_secs_f64();
                if elapsed > 0.0 {
                    self.frames_drawn as f64 / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        DriverStats {
            frames_drawn: self.frames_drawn,
            frames_skipped: self.frames_skipped,
            average_fps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_driver_starts_idle() {
        let driver = AnimationDriver::new(60);
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[tokio::test]
    async fn test_arm_schedules_once() {
        let mut driver = AnimationDriver::new(60);
        driver.arm();
        assert_eq!(driver.state(), DriverState::Scheduled);
        // A second unit arriving does not restart anything.
        driver.arm();
        assert_eq!(driver.state(), DriverState::Scheduled);
    }

    #[tokio::test]
    async fn test_stop_observed_at_tick_boundary() {
        let mut driver = AnimationDriver::new(60);
        driver.arm();
        driver.request_stop();
        // Still scheduled until the flag is observed.
        assert_eq!(driver.state(), DriverState::Scheduled);
        assert!(driver.observe_stop());
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let mut driver = AnimationDriver::new(60);
        driver.arm();
        driver.request_stop();
        assert!(driver.observe_stop());
        // A new unit re-arms the loop.
        driver.arm();
        assert_eq!(driver.state(), DriverState::Scheduled);
        assert!(!driver.observe_stop());
    }

    #[tokio::test]
    async fn test_arm_ignored_with_pending_stop() {
        let mut driver = AnimationDriver::new(60);
        driver.request_stop();
        driver.arm();
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_advances_with_time() {
        let mut driver = AnimationDriver::new(50);
        driver.arm();
        // First tick completes immediately; the next one needs the period
        // to elapse (auto-advanced under paused time).
        driver.tick().await;
        driver.tick().await;
        driver.record_drawn();
        driver.record_drawn();
        assert_eq!(driver.stats().frames_drawn, 2);
    }
}

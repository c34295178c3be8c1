//! System clock adapter.
//!
//! Implements [`ClockPort`]:
//!
//! - **`espidf` feature**: monotonic time from `esp_timer_get_time()`,
//!   wall clock from `gettimeofday` (synced over SNTP once a session is
//!   up, restored from the external RTC across deep sleep).
//! - **host**: `std::time::Instant` for monotonic time plus a settable
//!   simulated epoch, so tests control the wall clock.

use crate::app::ports::ClockPort;

/// Anything before 2020-01-01 means the wall clock was never synced.
const EPOCH_2020: u64 = 1_577_836_800;

pub struct SystemClock {
    #[cfg(not(feature = "espidf"))]
    start: std::time::Instant,
    #[cfg(not(feature = "espidf"))]
    sim_epoch: core::cell::Cell<u64>,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(feature = "espidf"))]
            start: std::time::Instant::now(),
            #[cfg(not(feature = "espidf"))]
            sim_epoch: core::cell::Cell::new(0),
        }
    }

    /// Set the simulated wall clock (host only).
    #[cfg(not(feature = "espidf"))]
    pub fn sim_set_epoch(&self, epoch: u64) {
        self.sim_epoch.set(epoch);
    }

    #[cfg(feature = "espidf")]
    fn wall_clock(&self) -> u64 {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return 0;
        }
        if tv.tv_sec < 0 { 0 } else { tv.tv_sec as u64 }
    }
}

impl ClockPort for SystemClock {
    #[cfg(feature = "espidf")]
    fn now_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    #[cfg(not(feature = "espidf"))]
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    #[cfg(feature = "espidf")]
    fn now_epoch(&self) -> u64 {
        self.wall_clock()
    }

    #[cfg(not(feature = "espidf"))]
    fn now_epoch(&self) -> u64 {
        self.sim_epoch.get()
    }

    fn time_valid(&self) -> bool {
        self.now_epoch() >= EPOCH_2020
    }
}

#[cfg(all(test, not(feature = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn unsynced_clock_is_invalid() {
        let clock = SystemClock::new();
        assert!(!clock.time_valid());
        clock.sim_set_epoch(1_700_000_000);
        assert!(clock.time_valid());
    }
}

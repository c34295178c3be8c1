//! Sleep adapter.
//!
//! Implements [`SleepPort`].  Both deep and nap requests use light sleep
//! on this part: the domain layer has already powered the modem down for
//! a "deep" request, and light sleep keeps RAM (and therefore the FSM)
//! alive so a wake resumes the loop instead of rebooting.
//!
//! Wake sources armed for every sleep: the timer, the user button, and
//! the accelerometer motion interrupt.

use crate::app::ports::SleepPort;
use crate::fsm::context::{SleepRequest, WakeSource};
#[cfg(feature = "espidf")]
use crate::pins;

pub struct Sleeper {
    #[cfg(not(feature = "espidf"))]
    sim_wake: WakeSource,
    #[cfg(not(feature = "espidf"))]
    sim_slept: Vec<SleepRequest>,
}

impl Default for Sleeper {
    fn default() -> Self {
        Self::new()
    }
}

impl Sleeper {
    pub fn new() -> Self {
        Self {
            #[cfg(not(feature = "espidf"))]
            sim_wake: WakeSource::Timer,
            #[cfg(not(feature = "espidf"))]
            sim_slept: Vec::new(),
        }
    }

    /// Script the next wake cause (host only).
    #[cfg(not(feature = "espidf"))]
    pub fn sim_set_wake(&mut self, wake: WakeSource) {
        self.sim_wake = wake;
    }

    /// Sleep requests executed so far (host only).
    #[cfg(not(feature = "espidf"))]
    pub fn sim_slept(&self) -> &[SleepRequest] {
        &self.sim_slept
    }
}

impl SleepPort for Sleeper {
    #[cfg(feature = "espidf")]
    fn sleep(&mut self, request: SleepRequest) -> WakeSource {
        use esp_idf_svc::sys::*;

        log::info!(
            "sleeping {}s ({})",
            request.duration_secs,
            if request.deep { "deep" } else { "nap" }
        );

        unsafe {
            esp_sleep_enable_timer_wakeup(u64::from(request.duration_secs) * 1_000_000);
            // Button and motion interrupt are both active low.
            gpio_wakeup_enable(pins::BUTTON_GPIO, gpio_int_type_t_GPIO_INTR_LOW_LEVEL);
            gpio_wakeup_enable(pins::ACCEL_INT_GPIO, gpio_int_type_t_GPIO_INTR_LOW_LEVEL);
            esp_sleep_enable_gpio_wakeup();
            esp_light_sleep_start();
        }

        let cause = unsafe { esp_sleep_get_wakeup_cause() };
        if cause == esp_sleep_source_t_ESP_SLEEP_WAKEUP_GPIO {
            // Disambiguate by reading the lines: the button wins.
            if unsafe { gpio_get_level(pins::BUTTON_GPIO) } == 0 {
                WakeSource::Button
            } else {
                WakeSource::Motion
            }
        } else {
            WakeSource::Timer
        }
    }

    #[cfg(not(feature = "espidf"))]
    fn sleep(&mut self, request: SleepRequest) -> WakeSource {
        log::info!(
            "sleep(sim): {}s ({})",
            request.duration_secs,
            if request.deep { "deep" } else { "nap" }
        );
        self.sim_slept.push(request);
        self.sim_wake
    }
}

//! Task Watchdog Timer (TWDT) driver.
//!
//! Resets the device if the control loop stalls.  The timeout is 60 s:
//! long enough to ride out a full connect attempt poll plus a webhook
//! round trip, short enough that a wedged loop never drains the battery
//! overnight.
//!
//! The main loop must call `feed()` on every control pass, and `pause()`
//! around sleep (the loop is intentionally not running then).

#[cfg(feature = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(feature = "espidf")]
use log::info;

pub struct Watchdog {
    #[cfg(feature = "espidf")]
    subscribed: bool,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Watchdog {
    /// Initialise and subscribe the current task to the TWDT.
    pub fn new() -> Self {
        #[cfg(feature = "espidf")]
        {
            unsafe {
                let cfg = esp_task_wdt_config_t {
                    timeout_ms: 60_000,
                    idle_core_mask: 0,
                    trigger_panic: true,
                };
                let ret = esp_task_wdt_reconfigure(&cfg);
                if ret != ESP_OK {
                    log::warn!(
                        "TWDT reconfigure returned {} (may already be configured)",
                        ret
                    );
                }

                let ret = esp_task_wdt_add(core::ptr::null_mut());
                let subscribed = ret == ESP_OK;
                if subscribed {
                    info!("Watchdog: subscribed (60s timeout, panic on trigger)");
                } else {
                    log::warn!("Watchdog: failed to subscribe ({})", ret);
                }

                Self { subscribed }
            }
        }

        #[cfg(not(feature = "espidf"))]
        {
            log::info!("Watchdog(sim): no-op");
            Self {}
        }
    }

    /// Feed the watchdog.  Must be called at least every 60 seconds.
    pub fn feed(&self) {
        #[cfg(feature = "espidf")]
        {
            if self.subscribed {
                unsafe {
                    esp_task_wdt_reset();
                }
            }
        }
    }

    /// Unsubscribe before sleeping; sleep legitimately stalls the loop.
    pub fn pause(&mut self) {
        #[cfg(feature = "espidf")]
        {
            if self.subscribed {
                unsafe {
                    esp_task_wdt_delete(core::ptr::null_mut());
                }
                self.subscribed = false;
            }
        }
    }

    /// Re-subscribe after waking.
    pub fn resume(&mut self) {
        #[cfg(feature = "espidf")]
        {
            if !self.subscribed {
                let ret = unsafe { esp_task_wdt_add(core::ptr::null_mut()) };
                self.subscribed = ret == ESP_OK;
            }
        }
    }
}

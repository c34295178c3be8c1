//! System configuration parameters
//!
//! All tunable timing and threshold parameters for the BinWatch control
//! core.  The fleet runs two hardware generations with near-identical logic
//! but different constants (connect timeout, battery throttling); those
//! differences live here as data rather than as a forked state machine.
//! Values can be overridden at provisioning time.

use serde::{Deserialize, Serialize};

/// Core system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Scheduling ---
    /// Wake/report alignment grid in seconds (default one hour).
    pub wake_boundary_secs: u32,
    /// How long to stay awake after a report cycle (milliseconds).
    pub stay_awake_long_ms: u32,
    /// How long to stay awake when waking without a report due (milliseconds).
    pub stay_awake_short_ms: u32,

    // --- Connectivity ---
    /// Give up on a connect attempt after this many seconds.
    pub connect_timeout_secs: u16,
    /// Hours without a successful connection before a connectivity alert
    /// escalates from back-off to a hard recovery action.
    pub connect_escalation_hours: u32,
    /// How long to wait for a webhook response before alerting (seconds).
    pub webhook_wait_secs: u16,
    /// Hours without a good webhook ack before an ack timeout escalates.
    pub ack_escalation_hours: u32,
    /// Skip connecting when state-of-charge is below this floor (gen-2 LiPo
    /// boards only; primary-cell boards carry `None`).
    pub soc_connect_floor: Option<u8>,

    // --- Recovery ---
    /// Cooldown after entering the error state before a destructive recovery
    /// action executes (milliseconds).
    pub error_cooldown_ms: u32,
    /// Reset count past which alert 13 (excessive resets) is raised.
    pub max_resets_per_day: u8,

    // --- Firmware update ---
    /// Abandon an in-progress firmware update after this many seconds.
    pub update_timeout_secs: u16,
    /// Update attempts allowed per operating day.
    pub max_update_attempts: u8,

    // --- Persistence ---
    /// Debounce window for system-record flushes (milliseconds).
    pub system_save_delay_ms: u32,
    /// Debounce window for current-record flushes (milliseconds).
    pub current_save_delay_ms: u32,

    // --- Power ---
    /// Battery voltage below which the device enters low-battery mode.
    pub low_battery_cutoff_v: f32,
}

impl SystemConfig {
    /// Third-generation board (lithium thionyl chloride primary cell,
    /// no charge circuit, 600 s connect budget).  Fleet default.
    pub fn gen3() -> Self {
        Self {
            wake_boundary_secs: 3600,
            stay_awake_long_ms: 90_000,
            stay_awake_short_ms: 1_000,
            connect_timeout_secs: 600,
            connect_escalation_hours: 2,
            webhook_wait_secs: 45,
            ack_escalation_hours: 2,
            soc_connect_floor: None,
            error_cooldown_ms: 30_000,
            max_resets_per_day: 3,
            update_timeout_secs: 600,
            max_update_attempts: 3,
            system_save_delay_ms: 100,
            current_save_delay_ms: 250,
            low_battery_cutoff_v: 3.4,
        }
    }

    /// Second-generation board (solar + LiPo).  Longer connect budget and a
    /// state-of-charge floor below which hourly connects are skipped.
    pub fn gen2() -> Self {
        Self {
            connect_timeout_secs: 660,
            soc_connect_floor: Some(65),
            ..Self::gen3()
        }
    }

    /// Range-check every field.  Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !(60..=86_400).contains(&self.wake_boundary_secs) {
            return Err("wake_boundary_secs must be 60-86400");
        }
        if self.stay_awake_short_ms > self.stay_awake_long_ms {
            return Err("stay_awake_short_ms must not exceed stay_awake_long_ms");
        }
        if !(30..=900).contains(&self.connect_timeout_secs) {
            return Err("connect_timeout_secs must be 30-900");
        }
        if self.connect_escalation_hours == 0 {
            return Err("connect_escalation_hours must be nonzero");
        }
        if !(5..=600).contains(&self.webhook_wait_secs) {
            return Err("webhook_wait_secs must be 5-600");
        }
        if let Some(floor) = self.soc_connect_floor {
            if floor > 100 {
                return Err("soc_connect_floor must be 0-100");
            }
        }
        if self.error_cooldown_ms < 1_000 {
            return Err("error_cooldown_ms must be at least 1000");
        }
        if self.max_update_attempts == 0 {
            return Err("max_update_attempts must be nonzero");
        }
        if !(1.0..=5.0).contains(&self.low_battery_cutoff_v) {
            return Err("low_battery_cutoff_v must be 1.0-5.0");
        }
        Ok(())
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self::gen3()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = SystemConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.wake_boundary_secs, 3600);
        assert_eq!(c.connect_timeout_secs, 600);
        assert!(c.soc_connect_floor.is_none());
    }

    #[test]
    fn gen2_differs_only_in_generation_constants() {
        let g2 = SystemConfig::gen2();
        let g3 = SystemConfig::gen3();
        assert!(g2.validate().is_ok());
        assert_eq!(g2.connect_timeout_secs, 660);
        assert_eq!(g2.soc_connect_floor, Some(65));
        assert_eq!(g2.wake_boundary_secs, g3.wake_boundary_secs);
        assert_eq!(g2.webhook_wait_secs, g3.webhook_wait_secs);
    }

    #[test]
    fn rejects_connect_timeout_outside_range() {
        let c = SystemConfig {
            connect_timeout_secs: 10,
            ..Default::default()
        };
        assert!(c.validate().is_err());
        let c = SystemConfig {
            connect_timeout_secs: 1200,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_inverted_stay_awake_budget() {
        let c = SystemConfig {
            stay_awake_short_ms: 100_000,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let c = SystemConfig::gen2();
        let json = serde_json::to_string(&c).unwrap();
        let c2: SystemConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c.connect_timeout_secs, c2.connect_timeout_secs);
        assert_eq!(c.soc_connect_floor, c2.soc_connect_floor);
        assert!((c.low_battery_cutoff_v - c2.low_battery_cutoff_v).abs() < 0.001);
    }

    #[test]
    fn postcard_roundtrip() {
        let c = SystemConfig::default();
        let bytes = postcard::to_allocvec(&c).unwrap();
        let c2: SystemConfig = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(c.wake_boundary_secs, c2.wake_boundary_secs);
        assert_eq!(c.error_cooldown_ms, c2.error_cooldown_ms);
    }
}

//! The two persistent record types.
//!
//! [`SystemRecord`] holds slow-changing configuration and connection
//! bookkeeping; [`CurrentRecord`] holds the latest measurement cycle.  They
//! live at separate FRAM offsets with distinct magics so a misaligned read
//! can never pass validation.  Field order is append-only: never insert,
//! remove, or resize a field without bumping the record VERSION.

use serde::{Deserialize, Serialize};

use super::durable::Record;

/// Calibration default: sensor-to-trash distance when the bin is full.
pub const DEFAULT_BIN_FULL_IN: f32 = 9.0;
/// Calibration default: sensor-to-trash distance when the bin is empty.
pub const DEFAULT_BIN_EMPTY_IN: f32 = 38.0;

// ---------------------------------------------------------------------------
// System record
// ---------------------------------------------------------------------------

/// Boot-scoped device state: operating modes, facility hours, calibration,
/// and connection bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemRecord {
    /// Extra cloud messaging for commissioning and debug.
    pub verbose_mode: bool,
    /// Run disconnected between reports to save battery.
    pub low_power_mode: bool,
    /// Battery too low to connect at all.
    pub low_battery_mode: bool,
    /// Resets since the last daily cleanup.
    pub reset_count: u8,
    /// Hour the facility opens (0-12).
    pub open_hour: u8,
    /// Hour the facility closes (12-24).
    pub close_hour: u8,
    /// Last webhook report (epoch seconds).
    pub last_report_epoch: u64,
    /// Last successful cloud connection (epoch seconds).
    pub last_connection_epoch: u64,
    /// Last valid webhook acknowledgement (epoch seconds).
    pub last_hook_response_epoch: u64,
    /// Duration of the last connect attempt, seconds (capped at 900).
    pub last_connection_duration_secs: u16,
    /// Running firmware point release.
    pub firmware_version: u16,
    /// Sensor reading at "full" calibration, inches.
    pub bin_full_in: f32,
    /// Sensor reading at "empty" calibration, inches.
    pub bin_empty_in: f32,
    /// Cellular signal strength at the last successful connection, percent
    /// (0 = never connected or unknown).
    pub signal_strength: u8,
    /// Firmware update attempts since the last daily cleanup.
    pub update_attempts: u8,
}

impl SystemRecord {
    /// Semantic validation run after a structurally-valid load.  A record
    /// whose fields have drifted out of range (a partial write that still
    /// hashed, a bug in older firmware) must not feed garbage into the
    /// schedule, so it reinitializes the same way corruption does.
    pub fn validate(&self) -> bool {
        crate::schedule::is_valid_open_hour(self.open_hour)
            && crate::schedule::is_valid_close_hour(self.close_hour)
            && self.last_connection_duration_secs <= 900
            && self.signal_strength <= 100
            // Calibration is fixed per hardware revision; anything else
            // means the record was written by foreign firmware.
            && self.bin_full_in == DEFAULT_BIN_FULL_IN
            && self.bin_empty_in == DEFAULT_BIN_EMPTY_IN
    }
}

impl Record for SystemRecord {
    const MAGIC: u32 = 0x20a9_9e75;
    const VERSION: u16 = 3;

    fn factory() -> Self {
        Self {
            verbose_mode: true,
            low_power_mode: false,
            low_battery_mode: false,
            reset_count: 0,
            open_hour: 0,
            close_hour: 24,
            last_report_epoch: 0,
            last_connection_epoch: 0,
            last_hook_response_epoch: 0,
            last_connection_duration_secs: 0,
            firmware_version: 0,
            bin_full_in: DEFAULT_BIN_FULL_IN,
            bin_empty_in: DEFAULT_BIN_EMPTY_IN,
            signal_strength: 0,
            update_attempts: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Current-cycle record
// ---------------------------------------------------------------------------

/// Orientation of the bin lid, derived from the accelerometer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LidPosition {
    /// No sample yet or ambiguous reading.
    Unknown,
    /// Lid on its side (bin likely tipped during service).
    Side,
    /// Normal orientation.
    RightsideUp,
    /// Inverted (bin being emptied).
    UpsideDown,
}

impl LidPosition {
    /// Wire code shared with the fleet dashboard.
    pub const fn code(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Side => 1,
            Self::RightsideUp => 5,
            Self::UpsideDown => 6,
        }
    }
}

/// Latest measurement cycle: fill level, environment, and the alert channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentRecord {
    /// Raw sensor distance to the trash surface, inches.
    pub trash_height_in: f32,
    /// Derived fill level, 0-100.
    pub percent_full: f32,
    /// When the measurement was taken (epoch seconds).
    pub last_measure_epoch: u64,
    /// Fill dropped sharply since the previous cycle.
    pub emptied: bool,
    /// Enclosure temperature, degrees C.
    pub internal_temp_c: f32,
    pub lid_position: LidPosition,
    /// Raw alert code (see [`crate::error::AlertCode`]); 0 means none.
    pub alert_code: u8,
    /// When the current alert was raised (epoch seconds).
    pub last_alert_epoch: u64,
    pub battery_voltage: f32,
    /// State of charge, when the board has a fuel gauge.
    pub battery_soc: Option<u8>,
}

impl CurrentRecord {
    /// Semantic validation against the calibration in the system record:
    /// a height outside the calibrated span or an impossible percentage
    /// cannot have come from a healthy measurement path.
    pub fn validate(&self, sys: &SystemRecord) -> bool {
        (sys.bin_full_in..=sys.bin_empty_in).contains(&self.trash_height_in)
            && (0.0..=100.0).contains(&self.percent_full)
            && (-40.0..=85.0).contains(&self.internal_temp_c)
    }
}

impl Record for CurrentRecord {
    const MAGIC: u32 = 0x20a9_9e74;
    const VERSION: u16 = 2;

    fn factory() -> Self {
        Self {
            trash_height_in: DEFAULT_BIN_EMPTY_IN,
            percent_full: 0.0,
            last_measure_epoch: 0,
            emptied: false,
            internal_temp_c: 20.0,
            lid_position: LidPosition::Unknown,
            alert_code: 0,
            last_alert_epoch: 0,
            battery_voltage: 0.0,
            battery_soc: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magics_are_distinct() {
        assert_ne!(SystemRecord::MAGIC, CurrentRecord::MAGIC);
    }

    #[test]
    fn factory_calibration_matches_fleet_defaults() {
        let sys = SystemRecord::factory();
        assert_eq!(sys.bin_full_in, 9.0);
        assert_eq!(sys.bin_empty_in, 38.0);
        assert_eq!(sys.open_hour, 0);
        assert_eq!(sys.close_hour, 24);
        assert!(sys.verbose_mode);
        assert!(!sys.low_power_mode);
    }

    #[test]
    fn factory_current_record_is_alert_free() {
        let cur = CurrentRecord::factory();
        assert_eq!(cur.alert_code, 0);
        assert_eq!(cur.lid_position, LidPosition::Unknown);
        assert!(!cur.emptied);
    }

    #[test]
    fn system_record_semantic_validation() {
        let mut sys = SystemRecord::factory();
        assert!(sys.validate());
        sys.open_hour = 20;
        assert!(!sys.validate());
        sys = SystemRecord::factory();
        sys.last_connection_duration_secs = 5_000;
        assert!(!sys.validate());
        sys = SystemRecord::factory();
        sys.bin_full_in = 2.0;
        assert!(!sys.validate());
    }

    #[test]
    fn current_record_validates_against_calibration() {
        let sys = SystemRecord::factory();
        let mut cur = CurrentRecord::factory();
        assert!(cur.validate(&sys));
        // Height below the "full" calibration point is impossible.
        cur.trash_height_in = 2.0;
        assert!(!cur.validate(&sys));
        cur = CurrentRecord::factory();
        cur.percent_full = 250.0;
        assert!(!cur.validate(&sys));
    }

    #[test]
    fn lid_position_wire_codes() {
        assert_eq!(LidPosition::Unknown.code(), 0);
        assert_eq!(LidPosition::Side.code(), 1);
        assert_eq!(LidPosition::RightsideUp.code(), 5);
        assert_eq!(LidPosition::UpsideDown.code(), 6);
    }
}

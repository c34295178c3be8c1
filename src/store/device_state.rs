//! Typed facade over the two FRAM-backed records.
//!
//! Owns the media plus both durable stores and exposes range-checked
//! setters, so the rest of the firmware never touches raw offsets or
//! unvalidated values.  One instance is built at boot and threaded through
//! the device context.

use log::info;

use crate::error::{AlertCode, StoreError};
use crate::schedule;

use super::durable::{DurableRecordStore, LoadOutcome, RecordMedia, ResetReason};
use super::records::{CurrentRecord, LidPosition, SystemRecord};

/// Media offset of the system record region.
pub const SYSTEM_OFFSET: usize = 0;
/// Media offset of the current-cycle record region.
pub const CURRENT_OFFSET: usize = 256;
/// Bytes reserved per record.
pub const REGION_SIZE: usize = 256;

pub struct DeviceStateStore<M: RecordMedia> {
    media: M,
    system: DurableRecordStore<SystemRecord>,
    current: DurableRecordStore<CurrentRecord>,
}

impl<M: RecordMedia> DeviceStateStore<M> {
    pub fn new(media: M, system_save_delay_ms: u32, current_save_delay_ms: u32) -> Self {
        Self {
            media,
            system: DurableRecordStore::new(SYSTEM_OFFSET, REGION_SIZE, system_save_delay_ms),
            current: DurableRecordStore::new(CURRENT_OFFSET, REGION_SIZE, current_save_delay_ms),
        }
    }

    /// Load both records, falling back to factory defaults per record on
    /// validation failure.  Returns the outcome for (system, current).
    ///
    /// Loading is two-stage: the durable store checks the frame
    /// (magic/version/hash/decode), then the record's own field validation
    /// runs here.  The current record validates against the system record's
    /// calibration, so the system record settles first.
    pub fn setup(&mut self) -> Result<(LoadOutcome, LoadOutcome), StoreError> {
        let mut sys = self.system.load(&mut self.media)?;
        if sys == LoadOutcome::Loaded && !self.system.get().validate() {
            self.system.reinitialize(&mut self.media)?;
            sys = LoadOutcome::Initialized(ResetReason::FieldOutOfRange);
        }

        let mut cur = self.current.load(&mut self.media)?;
        if cur == LoadOutcome::Loaded && !self.current.get().validate(self.system.get()) {
            self.current.reinitialize(&mut self.media)?;
            cur = LoadOutcome::Initialized(ResetReason::FieldOutOfRange);
        }

        if let LoadOutcome::Initialized(reason) = sys {
            info!("system record initialized ({reason:?})");
        }
        if let LoadOutcome::Initialized(reason) = cur {
            info!("current record initialized ({reason:?})");
        }
        Ok((sys, cur))
    }

    /// Debounced write-back for both records.  Call once per control-loop
    /// pass.
    pub fn tick(&mut self, now_ms: u64) -> Result<(), StoreError> {
        self.system.flush_if_due(&mut self.media, now_ms)?;
        self.current.flush_if_due(&mut self.media, now_ms)?;
        Ok(())
    }

    /// Force both records to media, ignoring debounce.  Called before sleep
    /// and before any reset or power-cycle.
    pub fn flush_all(&mut self) -> Result<(), StoreError> {
        self.system.flush_now(&mut self.media)?;
        self.current.flush_now(&mut self.media)?;
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.system.is_dirty() || self.current.is_dirty()
    }

    // ── Read access ───────────────────────────────────────────

    pub fn system(&self) -> &SystemRecord {
        self.system.get()
    }

    pub fn current(&self) -> &CurrentRecord {
        self.current.get()
    }

    /// Current alert, decoding unknown persisted codes as `None` so a
    /// corrupted byte cannot wedge the error state.
    pub fn alert(&self) -> AlertCode {
        AlertCode::from_code(self.current.get().alert_code).unwrap_or(AlertCode::None)
    }

    /// Raw persisted alert code, which may be unknown to this firmware.
    pub fn raw_alert_code(&self) -> u8 {
        self.current.get().alert_code
    }

    // ── Checked setters (system record) ───────────────────────

    /// Facility opening hour, midnight through noon.
    pub fn set_open_hour(&mut self, now_ms: u64, hour: u8) -> Result<(), StoreError> {
        if !schedule::is_valid_open_hour(hour) {
            return Err(StoreError::OutOfRange("open_hour"));
        }
        self.system.update(now_ms, |s| s.open_hour = hour);
        Ok(())
    }

    /// Facility closing hour, noon through midnight.
    pub fn set_close_hour(&mut self, now_ms: u64, hour: u8) -> Result<(), StoreError> {
        if !schedule::is_valid_close_hour(hour) {
            return Err(StoreError::OutOfRange("close_hour"));
        }
        self.system.update(now_ms, |s| s.close_hour = hour);
        Ok(())
    }

    /// Connect attempts are capped at 900 s, so any duration past that is a
    /// bookkeeping bug.
    pub fn set_last_connection_duration(
        &mut self,
        now_ms: u64,
        secs: u16,
    ) -> Result<(), StoreError> {
        if secs > 900 {
            return Err(StoreError::OutOfRange("last_connection_duration_secs"));
        }
        self.system
            .update(now_ms, |s| s.last_connection_duration_secs = secs);
        Ok(())
    }

    pub fn record_connection(&mut self, now_ms: u64, epoch: u64) {
        self.system.update(now_ms, |s| s.last_connection_epoch = epoch);
    }

    /// Signal strength snapshot taken with the session up, percent.
    pub fn set_signal_strength(&mut self, now_ms: u64, percent: u8) -> Result<(), StoreError> {
        if percent > 100 {
            return Err(StoreError::OutOfRange("signal_strength"));
        }
        self.system.update(now_ms, |s| s.signal_strength = percent);
        Ok(())
    }

    pub fn record_report(&mut self, now_ms: u64, epoch: u64) {
        self.system.update(now_ms, |s| s.last_report_epoch = epoch);
    }

    pub fn record_hook_response(&mut self, now_ms: u64, epoch: u64) {
        self.system
            .update(now_ms, |s| s.last_hook_response_epoch = epoch);
    }

    pub fn increment_reset_count(&mut self, now_ms: u64) -> u8 {
        self.system
            .update(now_ms, |s| s.reset_count = s.reset_count.saturating_add(1));
        self.system.get().reset_count
    }

    /// Bump the per-day firmware update attempt counter, returning the new
    /// count.
    pub fn increment_update_attempts(&mut self, now_ms: u64) -> u8 {
        self.system.update(now_ms, |s| {
            s.update_attempts = s.update_attempts.saturating_add(1);
        });
        self.system.get().update_attempts
    }

    pub fn set_low_power_mode(&mut self, now_ms: u64, on: bool) {
        self.system.update(now_ms, |s| s.low_power_mode = on);
    }

    pub fn set_low_battery_mode(&mut self, now_ms: u64, on: bool) {
        self.system.update(now_ms, |s| s.low_battery_mode = on);
    }

    pub fn set_verbose_mode(&mut self, now_ms: u64, on: bool) {
        self.system.update(now_ms, |s| s.verbose_mode = on);
    }

    // ── Checked setters (current record) ──────────────────────

    /// Record a completed fill measurement.
    pub fn record_measurement(
        &mut self,
        now_ms: u64,
        epoch: u64,
        trash_height_in: f32,
        percent_full: f32,
        emptied: bool,
    ) -> Result<(), StoreError> {
        if !(0.0..=100.0).contains(&percent_full) {
            return Err(StoreError::OutOfRange("percent_full"));
        }
        self.current.update(now_ms, |c| {
            c.trash_height_in = trash_height_in;
            c.percent_full = percent_full;
            c.emptied = emptied;
            c.last_measure_epoch = epoch;
        });
        Ok(())
    }

    /// Enclosure temperature must be inside the sensor's rated range.
    pub fn set_internal_temp_c(&mut self, now_ms: u64, temp_c: f32) -> Result<(), StoreError> {
        if !(-40.0..=85.0).contains(&temp_c) {
            return Err(StoreError::OutOfRange("internal_temp_c"));
        }
        self.current.update(now_ms, |c| c.internal_temp_c = temp_c);
        Ok(())
    }

    pub fn set_lid_position(&mut self, now_ms: u64, pos: LidPosition) {
        self.current.update(now_ms, |c| c.lid_position = pos);
    }

    pub fn set_battery(&mut self, now_ms: u64, voltage: f32, soc: Option<u8>) {
        self.current.update(now_ms, |c| {
            c.battery_voltage = voltage;
            c.battery_soc = soc;
        });
    }

    /// Raise an alert.  Raising `None` clears the channel.
    pub fn raise_alert(&mut self, now_ms: u64, alert: AlertCode, epoch: u64) {
        self.current.update(now_ms, |c| {
            c.alert_code = alert.code();
            c.last_alert_epoch = if alert == AlertCode::None { c.last_alert_epoch } else { epoch };
        });
    }

    pub fn clear_alert(&mut self, now_ms: u64) {
        self.current.update(now_ms, |c| c.alert_code = 0);
    }

    // ── Maintenance ───────────────────────────────────────────

    /// Zero the per-day fields: the reset and update-attempt counters, the
    /// alert channel, and the emptied edge flag (operator "resetCounts"
    /// command).
    pub fn reset_counters(&mut self, now_ms: u64) {
        self.system.update(now_ms, |s| {
            s.reset_count = 0;
            s.update_attempts = 0;
        });
        self.current.update(now_ms, |c| {
            c.alert_code = 0;
            c.emptied = false;
        });
    }

    /// Daily cleanup at close of day: drop back to quiet, low-power
    /// operation and zero the per-day counters.
    pub fn daily_cleanup(&mut self, now_ms: u64) {
        info!("daily cleanup: counters reset, returning to low-power quiet mode");
        self.system.update(now_ms, |s| {
            s.verbose_mode = false;
            s.low_power_mode = true;
            s.reset_count = 0;
            s.update_attempts = 0;
        });
        self.current.update(now_ms, |c| {
            c.alert_code = 0;
            c.emptied = false;
        });
    }

    /// Factory reset both records and persist immediately.
    pub fn factory_reset(&mut self, now_ms: u64) -> Result<(), StoreError> {
        use super::durable::Record;
        self.system.replace(now_ms, SystemRecord::factory());
        self.current.replace(now_ms, CurrentRecord::factory());
        self.flush_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testutil::MemMedia;

    fn state() -> DeviceStateStore<MemMedia> {
        let mut s = DeviceStateStore::new(MemMedia::new(512), 0, 0);
        s.setup().unwrap();
        s
    }

    #[test]
    fn open_close_hours_are_range_checked() {
        let mut s = state();
        assert!(s.set_open_hour(0, 12).is_ok());
        assert_eq!(
            s.set_open_hour(0, 13),
            Err(StoreError::OutOfRange("open_hour"))
        );
        assert!(s.set_close_hour(0, 24).is_ok());
        assert_eq!(
            s.set_close_hour(0, 11),
            Err(StoreError::OutOfRange("close_hour"))
        );
        // Rejected writes leave the record untouched.
        assert_eq!(s.system().open_hour, 12);
        assert_eq!(s.system().close_hour, 24);
    }

    #[test]
    fn connection_duration_capped_at_900() {
        let mut s = state();
        assert!(s.set_last_connection_duration(0, 900).is_ok());
        assert!(s.set_last_connection_duration(0, 901).is_err());
    }

    #[test]
    fn measurement_rejects_out_of_range_percent() {
        let mut s = state();
        assert!(s.record_measurement(0, 100, 20.0, 62.0, false).is_ok());
        assert!(s.record_measurement(0, 100, 20.0, 101.0, false).is_err());
        assert!(s.record_measurement(0, 100, 20.0, -1.0, false).is_err());
        assert_eq!(s.current().percent_full, 62.0);
    }

    #[test]
    fn alert_roundtrips_through_typed_channel() {
        let mut s = state();
        s.raise_alert(0, AlertCode::CloudUnreachable, 1000);
        assert_eq!(s.alert(), AlertCode::CloudUnreachable);
        assert_eq!(s.current().last_alert_epoch, 1000);
        s.clear_alert(0);
        assert_eq!(s.alert(), AlertCode::None);
        // Clearing preserves the timestamp of the last real alert.
        assert_eq!(s.current().last_alert_epoch, 1000);
    }

    #[test]
    fn daily_cleanup_resets_counters_and_modes() {
        let mut s = state();
        s.set_verbose_mode(0, true);
        s.increment_reset_count(0);
        s.increment_reset_count(0);
        s.increment_update_attempts(0);
        s.raise_alert(0, AlertCode::ExcessiveResets, 500);
        s.record_measurement(0, 100, 15.0, 80.0, true).unwrap();
        s.daily_cleanup(0);
        assert!(!s.system().verbose_mode);
        assert!(s.system().low_power_mode);
        assert_eq!(s.system().reset_count, 0);
        assert_eq!(s.system().update_attempts, 0);
        assert_eq!(s.alert(), AlertCode::None);
        assert!(!s.current().emptied);
        // Calibration and history survive cleanup.
        assert_eq!(s.system().bin_empty_in, 38.0);
    }

    #[test]
    fn setup_rejects_system_record_with_bad_fields() {
        let mut media = MemMedia::new(512);
        {
            // Seed a frame-valid system record whose fields are garbage.
            let mut raw =
                DurableRecordStore::<SystemRecord>::new(SYSTEM_OFFSET, REGION_SIZE, 0);
            raw.load(&mut media).unwrap();
            raw.update(0, |s| {
                s.open_hour = 20;
                s.last_connection_duration_secs = 5000;
                s.bin_full_in = 2.0;
            });
            raw.flush_now(&mut media).unwrap();
        }
        let mut s = DeviceStateStore::new(&mut media, 0, 0);
        let (sys, _) = s.setup().unwrap();
        assert_eq!(
            sys,
            LoadOutcome::Initialized(ResetReason::FieldOutOfRange)
        );
        // Factory defaults are served and persisted again.
        assert_eq!(s.system().open_hour, 0);
        assert_eq!(s.system().last_connection_duration_secs, 0);
        assert_eq!(s.system().bin_full_in, 9.0);
    }

    #[test]
    fn setup_rejects_current_record_outside_calibration() {
        let mut media = MemMedia::new(512);
        {
            let mut s = DeviceStateStore::new(&mut media, 0, 0);
            s.setup().unwrap();
            s.set_open_hour(0, 6).unwrap();
            s.flush_all().unwrap();
        }
        {
            let mut raw =
                DurableRecordStore::<CurrentRecord>::new(CURRENT_OFFSET, REGION_SIZE, 0);
            raw.load(&mut media).unwrap();
            raw.update(0, |c| {
                c.trash_height_in = 2.0;
                c.percent_full = 250.0;
            });
            raw.flush_now(&mut media).unwrap();
        }
        let mut s = DeviceStateStore::new(&mut media, 0, 0);
        let (sys, cur) = s.setup().unwrap();
        // The system record was fine and keeps its values.
        assert_eq!(sys, LoadOutcome::Loaded);
        assert_eq!(s.system().open_hour, 6);
        assert_eq!(
            cur,
            LoadOutcome::Initialized(ResetReason::FieldOutOfRange)
        );
        assert_eq!(s.current().percent_full, 0.0);
        assert_eq!(s.current().trash_height_in, 38.0);
    }

    #[test]
    fn state_survives_reload() {
        let mut media = MemMedia::new(512);
        {
            let mut s = DeviceStateStore::new(&mut media, 0, 0);
            s.setup().unwrap();
            s.set_open_hour(0, 6).unwrap();
            s.record_measurement(0, 777, 15.0, 80.0, false).unwrap();
            s.flush_all().unwrap();
        }
        let mut s2 = DeviceStateStore::new(&mut media, 0, 0);
        let (sys, cur) = s2.setup().unwrap();
        assert_eq!(sys, crate::store::durable::LoadOutcome::Loaded);
        assert_eq!(cur, crate::store::durable::LoadOutcome::Loaded);
        assert_eq!(s2.system().open_hour, 6);
        assert_eq!(s2.current().percent_full, 80.0);
        assert_eq!(s2.current().last_measure_epoch, 777);
    }
}

//! Shared mutable context threaded through every state handler.
//!
//! `DeviceContext` is the blackboard: handlers read the input snapshot the
//! control loop refreshed before the tick, mutate persistent state through
//! the typed store, and write side-effect requests that the loop executes
//! through the ports after the tick.  Handlers themselves never touch
//! hardware.

use crate::alert::{AlertInputs, AlertPolicy};
use crate::comms::{ConnectionManager, ResumeTarget};
use crate::config::SystemConfig;
use crate::error::RecoveryAction;
use crate::store::{DeviceStateStore, RecordMedia};

// ---------------------------------------------------------------------------
// Input snapshot (written by the control loop before each tick)
// ---------------------------------------------------------------------------

/// What woke the device from a sleep request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeSource {
    /// User button: override low-power behaviour and reconnect.
    Button,
    /// Accelerometer motion interrupt.
    Motion,
    /// Timer expired at a wake boundary.
    Timer,
}

/// Terminal result of a firmware update session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Completed,
    Failed,
}

/// Point-in-time snapshot of everything outside the state machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputSnapshot {
    /// Monotonic milliseconds since boot.
    pub now_ms: u64,
    /// Wall clock, epoch seconds.  Only meaningful when `time_valid`.
    pub now_epoch: u64,
    /// Wall clock has been synced since boot or restored from the RTC.
    pub time_valid: bool,

    /// Cloud session established.
    pub cloud_up: bool,
    /// Cellular layer registered with a tower.
    pub cellular_registered: bool,
    /// Radio signal quality, 0..=100 percent, when the modem reports one.
    pub signal_quality: Option<u8>,

    /// Set by the loop after a sleep request returns.
    pub wake: Option<WakeSource>,
    /// Webhook acknowledgement observed since the last tick.
    pub response_received: bool,
    /// User button currently held (overrides low-battery gating).
    pub button_held: bool,

    /// An OTA session is running.
    pub update_in_progress: bool,
    /// Terminal OTA result observed since the last tick.
    pub update_outcome: Option<UpdateOutcome>,
}

// ---------------------------------------------------------------------------
// Side-effect requests (written by handlers, executed by the control loop)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepRequest {
    pub duration_secs: u32,
    /// Deep sleep powers the modem down first; a nap leaves it alone.
    pub deep: bool,
}

/// Requests are cleared by the loop after execution, so a handler setting a
/// flag gets exactly one side effect.
#[derive(Debug, Clone, Copy, Default)]
pub struct Requests {
    /// Run a full measurement cycle (distance, lid, battery, temperature).
    pub measure: bool,
    /// Queue the hourly report webhook.
    pub publish_report: bool,
    /// Kick the modem and start a cloud session.
    pub connect: bool,
    /// Tear the session down and power the modem off.
    pub disconnect: bool,
    pub sleep: Option<SleepRequest>,
    /// Software reset after flushing state.
    pub reset: bool,
    /// Hard power-cycle through the external RTC after flushing state.
    pub power_cycle: bool,
}

// ---------------------------------------------------------------------------
// DeviceContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
pub struct DeviceContext<M: RecordMedia> {
    // -- Timing --
    /// Ticks elapsed since the current state was entered.
    pub ticks_in_state: u64,
    /// Monotonic total tick count.
    pub total_ticks: u64,
    /// Monotonic ms at which the current state was entered.
    pub state_entered_ms: u64,

    // -- Configuration --
    pub config: SystemConfig,

    // -- Persistent state --
    pub state: DeviceStateStore<M>,

    // -- Connectivity --
    pub conn: ConnectionManager,
    /// Where the machine resumes once a session comes up.
    pub connect_target: ResumeTarget,

    // -- Alerting --
    pub alert_policy: AlertPolicy,
    /// Resolution chosen on error entry, pending the hold-off.
    pub pending_recovery: Option<RecoveryAction>,
    /// Alert code captured at the last resolution, for the next report.
    pub last_resolved_alert: u8,

    // -- Inputs / outputs --
    pub inputs: InputSnapshot,
    pub requests: Requests,

    // -- Stay-awake budget --
    /// Current awake budget in low-power mode, ms.
    pub stay_awake_ms: u32,
    /// When the budget last restarted.
    pub stay_awake_stamp_ms: u64,

    // -- Report tracking --
    /// A report was queued and its acknowledgement is outstanding.
    pub data_in_flight: bool,
}

impl<M: RecordMedia> DeviceContext<M> {
    pub fn new(config: SystemConfig, state: DeviceStateStore<M>) -> Self {
        let conn = ConnectionManager::new(config.connect_timeout_secs);
        let alert_policy = AlertPolicy::new(&config);
        let stay_awake_ms = config.stay_awake_long_ms;
        Self {
            ticks_in_state: 0,
            total_ticks: 0,
            state_entered_ms: 0,
            config,
            state,
            conn,
            connect_target: ResumeTarget::Idle,
            alert_policy,
            pending_recovery: None,
            last_resolved_alert: 0,
            inputs: InputSnapshot::default(),
            requests: Requests::default(),
            stay_awake_ms,
            stay_awake_stamp_ms: 0,
            data_in_flight: false,
        }
    }

    /// Milliseconds spent in the current state.
    pub fn ms_in_state(&self) -> u64 {
        self.inputs.now_ms.saturating_sub(self.state_entered_ms)
    }

    /// An alert is pending on the current-cycle record.
    pub fn alert_active(&self) -> bool {
        self.state.raw_alert_code() != 0
    }

    /// Restart the stay-awake budget.
    pub fn touch_stay_awake(&mut self) {
        self.stay_awake_stamp_ms = self.inputs.now_ms;
    }

    pub fn stay_awake_expired(&self) -> bool {
        self.inputs.now_ms.saturating_sub(self.stay_awake_stamp_ms)
            > u64::from(self.stay_awake_ms)
    }

    /// Facility open at the current hour (false when the clock is unsynced,
    /// so an unsynced device never reports on garbage hours).
    pub fn facility_open(&self) -> bool {
        if !self.inputs.time_valid {
            return false;
        }
        let hour = crate::schedule::hour_of_day(self.inputs.now_epoch);
        let sys = self.state.system();
        crate::schedule::is_facility_open(hour, sys.open_hour, sys.close_hour)
    }

    /// Connection history for the alert policy, taken from the records.
    pub fn alert_inputs(&self) -> AlertInputs {
        let sys = self.state.system();
        AlertInputs {
            now_epoch: self.inputs.now_epoch,
            last_connection_epoch: sys.last_connection_epoch,
            last_hook_response_epoch: sys.last_hook_response_epoch,
        }
    }
}

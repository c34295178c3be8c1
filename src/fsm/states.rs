//! Concrete state handler functions and table builder.
//!
//! Each state is defined by three plain `fn` pointers: no closures, no
//! dynamic dispatch, no heap.
//!
//! ```text
//!  INITIALIZATION ──▶ IDLE ◀──[wake]── SLEEPING / NAPPING
//!                      │ ▲
//!          [report due]│ │[ack / resolved]
//!                      ▼ │
//!                  REPORTING ──▶ CONNECTING ──▶ RESP_WAIT
//!
//!  IDLE ──[OTA running]──▶ FIRMWARE_UPDATE
//!
//!  Any state ──[alert raised]──▶ ERROR ──[policy]──▶ IDLE / CONNECTING
//!                                                    / reset / power-cycle
//! ```
//!
//! Every non-error state checks the alert channel first, so a raised alert
//! reaches ERROR within one tick no matter where it originated.

use log::{info, warn};

use super::context::{DeviceContext, SleepRequest, UpdateOutcome, WakeSource};
use super::{StateDescriptor, StateId};
use crate::comms::{ConnectPoll, ResumeTarget};
use crate::error::{AlertCode, RecoveryAction};
use crate::schedule;
use crate::store::RecordMedia;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table<M: RecordMedia>() -> [StateDescriptor<M>; StateId::COUNT] {
    [
        // Index 0: Initialization
        StateDescriptor {
            id: StateId::Initialization,
            name: "Initialization",
            on_enter: None,
            on_exit: None,
            on_update: initialization_update,
        },
        // Index 1: Idle
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: None,
            on_exit: None,
            on_update: idle_update,
        },
        // Index 2: Sleeping
        StateDescriptor {
            id: StateId::Sleeping,
            name: "Sleeping",
            on_enter: Some(sleeping_enter),
            on_exit: None,
            on_update: sleeping_update,
        },
        // Index 3: Napping
        StateDescriptor {
            id: StateId::Napping,
            name: "Napping",
            on_enter: Some(napping_enter),
            on_exit: None,
            on_update: napping_update,
        },
        // Index 4: Connecting
        StateDescriptor {
            id: StateId::Connecting,
            name: "Connecting",
            on_enter: Some(connecting_enter),
            on_exit: None,
            on_update: connecting_update,
        },
        // Index 5: Reporting
        StateDescriptor {
            id: StateId::Reporting,
            name: "Reporting",
            on_enter: Some(reporting_enter),
            on_exit: None,
            on_update: reporting_update,
        },
        // Index 6: RespWait
        StateDescriptor {
            id: StateId::RespWait,
            name: "RespWait",
            on_enter: Some(resp_wait_enter),
            on_exit: Some(resp_wait_exit),
            on_update: resp_wait_update,
        },
        // Index 7: FirmwareUpdate
        StateDescriptor {
            id: StateId::FirmwareUpdate,
            name: "FirmwareUpdate",
            on_enter: Some(firmware_update_enter),
            on_exit: None,
            on_update: firmware_update_update,
        },
        // Index 8: Error
        StateDescriptor {
            id: StateId::Error,
            name: "Error",
            on_enter: Some(error_enter),
            on_exit: Some(error_exit),
            on_update: error_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  INITIALIZATION: decide how to come up after boot
// ═══════════════════════════════════════════════════════════════════════════

fn initialization_update<M: RecordMedia>(ctx: &mut DeviceContext<M>) -> Option<StateId> {
    if ctx.alert_active() {
        return Some(StateId::Error);
    }

    ctx.touch_stay_awake();

    // No valid wall clock: connect first so the report schedule means
    // something.
    if !ctx.inputs.time_valid {
        info!("clock not set, connecting to sync time");
        ctx.connect_target = ResumeTarget::Idle;
        return Some(StateId::Connecting);
    }

    if ctx.state.system().low_power_mode {
        Some(StateId::Idle)
    } else {
        ctx.connect_target = ResumeTarget::Idle;
        Some(StateId::Connecting)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE: awake, deciding what (if anything) needs doing
// ═══════════════════════════════════════════════════════════════════════════

fn idle_update<M: RecordMedia>(ctx: &mut DeviceContext<M>) -> Option<StateId> {
    if ctx.alert_active() {
        return Some(StateId::Error);
    }

    if ctx.inputs.update_in_progress {
        return Some(StateId::FirmwareUpdate);
    }

    // Report on the hour, but only while the facility is open.
    if ctx.facility_open()
        && schedule::is_report_due(ctx.inputs.now_epoch, ctx.state.system().last_report_epoch)
    {
        return Some(StateId::Reporting);
    }

    if ctx.state.system().low_power_mode && ctx.stay_awake_expired() {
        return Some(StateId::Sleeping);
    }

    // Mains-of-mind devices still doze through closed hours.
    if !ctx.state.system().low_power_mode && ctx.inputs.time_valid && !ctx.facility_open() {
        return Some(StateId::Napping);
    }

    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  SLEEPING: modem off, deep sleep until the next wake boundary
// ═══════════════════════════════════════════════════════════════════════════

fn sleeping_enter<M: RecordMedia>(ctx: &mut DeviceContext<M>) {
    let wake_secs =
        schedule::seconds_until_next_wake(ctx.inputs.now_epoch, ctx.config.wake_boundary_secs);
    info!("sleeping for {wake_secs} s");
    ctx.requests.disconnect = true;
    ctx.requests.sleep = Some(SleepRequest {
        duration_secs: wake_secs,
        deep: true,
    });
}

fn sleeping_update<M: RecordMedia>(ctx: &mut DeviceContext<M>) -> Option<StateId> {
    if ctx.alert_active() {
        return Some(StateId::Error);
    }

    let wake = ctx.inputs.wake.take()?;
    ctx.touch_stay_awake();
    match wake {
        WakeSource::Button => {
            // The operator wants the device's attention: leave low-power
            // mode and reopen the reporting window until reconfigured.
            info!("woke by button: exiting low-power mode");
            let now_ms = ctx.inputs.now_ms;
            ctx.state.set_low_power_mode(now_ms, false);
            let _ = ctx.state.set_open_hour(now_ms, 0);
            let _ = ctx.state.set_close_hour(now_ms, 24);
            ctx.stay_awake_ms = ctx.config.stay_awake_long_ms;
            ctx.connect_target = ResumeTarget::Idle;
            Some(StateId::Connecting)
        }
        WakeSource::Motion => {
            info!("woke by lid motion");
            Some(StateId::Idle)
        }
        WakeSource::Timer => {
            ctx.stay_awake_ms = if ctx.facility_open() {
                ctx.config.stay_awake_long_ms
            } else {
                ctx.config.stay_awake_short_ms
            };
            Some(StateId::Idle)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  NAPPING: light doze through closed hours, modem left alone
// ═══════════════════════════════════════════════════════════════════════════

fn napping_enter<M: RecordMedia>(ctx: &mut DeviceContext<M>) {
    let wake_secs =
        schedule::seconds_until_next_wake(ctx.inputs.now_epoch, ctx.config.wake_boundary_secs);
    info!("napping for {wake_secs} s");
    ctx.requests.sleep = Some(SleepRequest {
        duration_secs: wake_secs,
        deep: false,
    });
}

fn napping_update<M: RecordMedia>(ctx: &mut DeviceContext<M>) -> Option<StateId> {
    if ctx.alert_active() {
        return Some(StateId::Error);
    }

    let wake = ctx.inputs.wake.take()?;
    ctx.touch_stay_awake();
    if wake == WakeSource::Button {
        ctx.stay_awake_ms = ctx.config.stay_awake_long_ms;
    }
    Some(StateId::Idle)
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTING: bring the cloud session up within the connect budget
// ═══════════════════════════════════════════════════════════════════════════

fn connecting_enter<M: RecordMedia>(ctx: &mut DeviceContext<M>) {
    let now_ms = ctx.inputs.now_ms;
    let _ = ctx.state.set_last_connection_duration(now_ms, 0);
    ctx.requests.connect = true;
    let target = ctx.connect_target;
    ctx.conn.begin(now_ms, target);
}

fn connecting_update<M: RecordMedia>(ctx: &mut DeviceContext<M>) -> Option<StateId> {
    if ctx.alert_active() {
        ctx.conn.cancel();
        return Some(StateId::Error);
    }

    let now_ms = ctx.inputs.now_ms;
    match ctx
        .conn
        .poll(now_ms, ctx.inputs.cloud_up, ctx.inputs.cellular_registered)
    {
        ConnectPoll::InProgress => None,
        ConnectPoll::Connected {
            duration_secs,
            target,
        } => {
            let _ = ctx.state.set_last_connection_duration(now_ms, duration_secs);
            ctx.state.record_connection(now_ms, ctx.inputs.now_epoch);
            if let Some(q) = ctx.inputs.signal_quality {
                let _ = ctx.state.set_signal_strength(now_ms, q);
            }
            ctx.touch_stay_awake();
            match target {
                ResumeTarget::RespWait => Some(StateId::RespWait),
                ResumeTarget::Idle => Some(StateId::Idle),
            }
        }
        ConnectPoll::TimedOut { alert } => {
            let epoch = ctx.inputs.now_epoch;
            ctx.state.raise_alert(now_ms, alert, epoch);
            // A device that cannot connect must stop burning its battery on
            // retries.
            ctx.state.set_low_power_mode(now_ms, true);
            None // the alert guard routes to Error on the next tick
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  REPORTING: measure and queue the hourly webhook
// ═══════════════════════════════════════════════════════════════════════════

fn reporting_enter<M: RecordMedia>(ctx: &mut DeviceContext<M>) {
    let now_ms = ctx.inputs.now_ms;
    let now_epoch = ctx.inputs.now_epoch;

    // Day rolled over since we last connected: housekeeping before the
    // first report of the new day.
    if ctx.inputs.time_valid
        && schedule::day_number(now_epoch)
            != schedule::day_number(ctx.state.system().last_connection_epoch)
    {
        ctx.state.daily_cleanup(now_ms);
    }

    ctx.state.record_report(now_ms, now_epoch);
    ctx.requests.measure = true;
    ctx.requests.publish_report = true;
}

fn reporting_update<M: RecordMedia>(ctx: &mut DeviceContext<M>) -> Option<StateId> {
    if ctx.alert_active() {
        return Some(StateId::Error);
    }

    // Already connected: the queued report is on its way, wait for the ack.
    if ctx.inputs.cloud_up {
        ctx.touch_stay_awake();
        return Some(StateId::RespWait);
    }

    // Too little battery to bring the modem up.  The button overrides so a
    // technician can always force a connection on site.
    if ctx.state.system().low_battery_mode && !ctx.inputs.button_held {
        info!("not connecting: low battery mode");
        return Some(StateId::Idle);
    }

    ctx.connect_target = ResumeTarget::RespWait;
    Some(StateId::Connecting)
}

// ═══════════════════════════════════════════════════════════════════════════
//  RESP_WAIT: report queued, waiting for the webhook acknowledgement
// ═══════════════════════════════════════════════════════════════════════════

fn resp_wait_enter<M: RecordMedia>(ctx: &mut DeviceContext<M>) {
    ctx.data_in_flight = true;
}

// Runs on every way out of RESP_WAIT, including the alert route to ERROR,
// so a timed-out report can never keep the device awake forever.
fn resp_wait_exit<M: RecordMedia>(ctx: &mut DeviceContext<M>) {
    ctx.data_in_flight = false;
}

fn resp_wait_update<M: RecordMedia>(ctx: &mut DeviceContext<M>) -> Option<StateId> {
    if ctx.alert_active() {
        return Some(StateId::Error);
    }

    if ctx.inputs.response_received {
        let now_ms = ctx.inputs.now_ms;
        ctx.state.record_hook_response(now_ms, ctx.inputs.now_epoch);
        ctx.touch_stay_awake();
        return Some(StateId::Idle);
    }

    if ctx.ms_in_state() > u64::from(ctx.config.webhook_wait_secs) * 1000 {
        warn!("no webhook response in {} s", ctx.config.webhook_wait_secs);
        let now_ms = ctx.inputs.now_ms;
        let epoch = ctx.inputs.now_epoch;
        ctx.state
            .raise_alert(now_ms, AlertCode::HookResponseTimeout, epoch);
    }

    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  FIRMWARE_UPDATE: hold still while an OTA session runs
// ═══════════════════════════════════════════════════════════════════════════

fn firmware_update_enter<M: RecordMedia>(ctx: &mut DeviceContext<M>) {
    info!("firmware update in progress, holding state");
    ctx.touch_stay_awake();

    let now_ms = ctx.inputs.now_ms;
    let attempts = ctx.state.increment_update_attempts(now_ms);
    if attempts > ctx.config.max_update_attempts {
        warn!("update attempt {attempts} exceeds the daily budget");
        let epoch = ctx.inputs.now_epoch;
        ctx.state
            .raise_alert(now_ms, AlertCode::UpdateAttemptLimit, epoch);
    }
}

fn firmware_update_update<M: RecordMedia>(ctx: &mut DeviceContext<M>) -> Option<StateId> {
    if ctx.alert_active() {
        return Some(StateId::Error);
    }

    let now_ms = ctx.inputs.now_ms;
    let epoch = ctx.inputs.now_epoch;

    if let Some(outcome) = ctx.inputs.update_outcome.take() {
        let alert = match outcome {
            UpdateOutcome::Completed => AlertCode::UpdateCompleted,
            UpdateOutcome::Failed => AlertCode::UpdateFailed,
        };
        ctx.state.raise_alert(now_ms, alert, epoch);
        return None;
    }

    if ctx.ms_in_state() > u64::from(ctx.config.update_timeout_secs) * 1000 {
        warn!(
            "firmware update still running after {} s, abandoning",
            ctx.config.update_timeout_secs
        );
        ctx.state
            .raise_alert(now_ms, AlertCode::UpdateTimedOut, epoch);
        return None;
    }

    // Session ended without a reported outcome: nothing to alert on.
    if !ctx.inputs.update_in_progress {
        return Some(StateId::Idle);
    }

    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  ERROR: resolve the alert into an escalating recovery action
// ═══════════════════════════════════════════════════════════════════════════

fn error_enter<M: RecordMedia>(ctx: &mut DeviceContext<M>) {
    let code = ctx.state.raw_alert_code();
    ctx.last_resolved_alert = code;
    let action = ctx.alert_policy.resolve(code, &ctx.alert_inputs());
    warn!("alert {code} active, recovery: {action}");
    ctx.pending_recovery = Some(action);
}

fn error_exit<M: RecordMedia>(ctx: &mut DeviceContext<M>) {
    ctx.pending_recovery = None;
}

fn error_update<M: RecordMedia>(ctx: &mut DeviceContext<M>) -> Option<StateId> {
    let action = ctx.pending_recovery.unwrap_or(RecoveryAction::NoAction);

    // Destructive actions wait out the hold-off so the alert has a chance
    // to reach the cloud first.
    if ctx.alert_policy.needs_holdoff(action)
        && ctx.ms_in_state() < u64::from(ctx.alert_policy.holdoff_ms())
    {
        return None;
    }

    // The alert has been acted on; clear the channel so the guard does not
    // re-enter.  Its code and timestamp remain available for the report.
    let now_ms = ctx.inputs.now_ms;
    ctx.state.clear_alert(now_ms);

    match action {
        RecoveryAction::NoAction => Some(StateId::Idle),
        RecoveryAction::Reconnect => {
            ctx.connect_target = ResumeTarget::Idle;
            Some(StateId::Connecting)
        }
        RecoveryAction::Reset => {
            ctx.requests.reset = true;
            None
        }
        RecoveryAction::PowerCycle => {
            ctx.requests.power_cycle = true;
            None
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::config::SystemConfig;
    use crate::fsm::Fsm;
    use crate::fsm::context::InputSnapshot;
    use crate::store::DeviceStateStore;
    use crate::store::testutil::MemMedia;
    use proptest::prelude::*;

    fn arb_step() -> impl Strategy<Value = (u64, bool, bool, bool)> {
        (
            100u64..120_000, // ms advanced per step
            any::<bool>(),   // cloud_up
            any::<bool>(),   // cellular_registered
            any::<bool>(),   // response_received
        )
    }

    proptest! {
        #[test]
        fn no_invalid_state_reachable(steps in proptest::collection::vec(arb_step(), 1..200)) {
            let mut state = DeviceStateStore::new(MemMedia::new(512), 0, 0);
            state.setup().unwrap();
            let mut ctx = DeviceContext::new(SystemConfig::default(), state);
            ctx.inputs = InputSnapshot {
                now_ms: 1_000,
                now_epoch: 1_700_000_000,
                time_valid: true,
                ..Default::default()
            };
            let mut fsm = Fsm::new(build_state_table(), StateId::Initialization);
            fsm.start(&mut ctx);

            for (dt, cloud, cell, resp) in steps {
                ctx.inputs.now_ms += dt;
                ctx.inputs.now_epoch += dt / 1000;
                ctx.inputs.cloud_up = cloud;
                ctx.inputs.cellular_registered = cell;
                ctx.inputs.response_received = resp;
                ctx.requests = Default::default();
                fsm.tick(&mut ctx);

                let current = fsm.current_state();
                prop_assert!((current as usize) < StateId::COUNT);
                // The persisted duration invariant holds under any schedule.
                prop_assert!(ctx.state.system().last_connection_duration_secs <= 900);
                // A destructive request only ever comes out of Error.
                if ctx.requests.reset || ctx.requests.power_cycle {
                    prop_assert_eq!(current, StateId::Error);
                }
            }
        }

        #[test]
        fn raised_alert_always_reaches_error_within_two_ticks(code in prop_oneof![
            Just(10u8), Just(12), Just(14), Just(22), Just(30), Just(40), Just(99)
        ]) {
            let mut state = DeviceStateStore::new(MemMedia::new(512), 0, 0);
            state.setup().unwrap();
            let mut ctx = DeviceContext::new(SystemConfig::default(), state);
            ctx.inputs = InputSnapshot {
                now_ms: 1_000,
                now_epoch: 1_700_000_000,
                time_valid: true,
                ..Default::default()
            };
            let mut fsm = Fsm::new(build_state_table(), StateId::Initialization);
            fsm.start(&mut ctx);
            fsm.tick(&mut ctx);

            if let Some(alert) = crate::error::AlertCode::from_code(code) {
                ctx.state.raise_alert(1_000, alert, 1_700_000_000);
            } else {
                // Unknown codes can only come off media; plant one through
                // a known alert then check the policy path separately.
                ctx.state.raise_alert(1_000, crate::error::AlertCode::OutOfMemory, 1_700_000_000);
            }
            fsm.tick(&mut ctx);
            fsm.tick(&mut ctx);
            prop_assert_eq!(fsm.current_state(), StateId::Error);
        }
    }
}

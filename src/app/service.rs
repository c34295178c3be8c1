//! Application service, the hexagonal core.
//!
//! [`DeviceService`] owns the state machine and its context, and runs the
//! control loop pass: refresh inputs → drain event flags → FSM tick →
//! execute side-effect requests → debounced persistence.  All I/O flows
//! through port traits injected at call sites, making the entire service
//! testable with mock adapters.
//!
//! ```text
//!  SensorPort ──▶ ┌────────────────────────┐ ──▶ EventSink
//!   ClockPort ──▶ │      DeviceService      │
//! NetworkPort ◀──▶│  FSM · store · alerts   │──▶ PowerPort
//!                 └────────────────────────┘ ──▶ SleepPort
//! ```

use log::{info, warn};

use crate::config::SystemConfig;
use crate::error::{AlertCode, RecoveryAction, Result};
use crate::events::{self as isr, Event};
use crate::fsm::context::{DeviceContext, UpdateOutcome};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::measure;
use crate::schedule;
use crate::store::{DeviceStateStore, RecordMedia};

use super::commands::AppCommand;
use super::events::{AppEvent, ReportPayload};
use super::ports::{ClockPort, EventSink, NetworkPort, PowerPort, SensorPort, SleepPort};

// ───────────────────────────────────────────────────────────────
// DeviceService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct DeviceService<M: RecordMedia> {
    fsm: Fsm<M>,
    ctx: DeviceContext<M>,
    tick_count: u64,
    /// Latched from the OTA lifecycle events.
    update_active: bool,
}

impl<M: RecordMedia> DeviceService<M> {
    /// Construct the service.  The store must already be set up (records
    /// loaded or initialized).
    pub fn new(config: SystemConfig, state: DeviceStateStore<M>) -> Self {
        let ctx = DeviceContext::new(config, state);
        let fsm = Fsm::new(build_state_table(), StateId::Initialization);
        Self {
            fsm,
            ctx,
            tick_count: 0,
            update_active: false,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Boot-time bookkeeping, then start the state machine.
    ///
    /// `unexpected_reset` is true when the last reboot was not an orderly
    /// power-on (watchdog, panic, pin reset); `peripherals_ok` is false
    /// when a bus device failed to come up; `factory_requested` is true
    /// when the user button was held through boot.
    pub fn boot(
        &mut self,
        clock: &impl ClockPort,
        unexpected_reset: bool,
        peripherals_ok: bool,
        factory_requested: bool,
        sink: &mut impl EventSink,
    ) {
        let now_ms = clock.now_ms();
        self.ctx.inputs.now_ms = now_ms;
        self.ctx.inputs.now_epoch = clock.now_epoch();
        self.ctx.inputs.time_valid = clock.time_valid();

        if factory_requested {
            info!("button held through boot: factory reset");
            if let Err(e) = self.ctx.state.factory_reset(now_ms) {
                warn!("factory reset write failed: {e}");
            }
        } else {
            // A reboot wipes any half-handled alert; whatever raised it
            // will raise it again if it still holds.
            self.ctx.state.clear_alert(now_ms);

            // First boot of a new day: run the daily housekeeping before
            // this reset is counted, so yesterday's tally never bleeds into
            // today's budget.  A device that has never connected skips this;
            // its zero epoch would make every boot look like a rollover.
            let last_epoch = self.ctx.state.system().last_connection_epoch;
            if self.ctx.inputs.time_valid
                && last_epoch != 0
                && schedule::day_number(self.ctx.inputs.now_epoch)
                    != schedule::day_number(last_epoch)
            {
                self.ctx.state.daily_cleanup(now_ms);
            }

            if unexpected_reset {
                let count = self.ctx.state.increment_reset_count(now_ms);
                info!("unexpected reset, count now {count}");
                if count > self.ctx.config.max_resets_per_day {
                    let epoch = self.ctx.inputs.now_epoch;
                    self.ctx
                        .state
                        .raise_alert(now_ms, AlertCode::ExcessiveResets, epoch);
                }
            }
        }

        if !peripherals_ok {
            let epoch = self.ctx.inputs.now_epoch;
            self.ctx
                .state
                .raise_alert(now_ms, AlertCode::InitFailure, epoch);
        }

        self.fsm.start(&mut self.ctx);
        sink.emit(&AppEvent::Started(self.fsm.current_state()));
        info!("service started in {:?}", self.fsm.current_state());
    }

    // ── Per-pass orchestration ────────────────────────────────

    /// Run one full control pass.
    ///
    /// `hw` covers the bin-facing peripherals (sensors plus power); the
    /// network and sleep adapters come in separately because they are
    /// distinct devices on the board.
    pub fn tick(
        &mut self,
        hw: &mut (impl SensorPort + PowerPort),
        net: &mut impl NetworkPort,
        sleeper: &mut impl SleepPort,
        clock: &impl ClockPort,
        sink: &mut impl EventSink,
    ) {
        self.tick_count += 1;
        let prev_state = self.fsm.current_state();
        let prev_alert = self.ctx.state.raw_alert_code();

        // 1. Refresh the input snapshot.
        self.ctx.inputs.now_ms = clock.now_ms();
        self.ctx.inputs.now_epoch = clock.now_epoch();
        self.ctx.inputs.time_valid = clock.time_valid();
        self.ctx.inputs.cloud_up = net.cloud_up();
        self.ctx.inputs.cellular_registered = net.cellular_registered();
        self.ctx.inputs.signal_quality = net.signal_quality();
        self.ctx.inputs.button_held = hw.button_held();
        self.ctx.inputs.response_received = net.take_response();

        // 2. Drain ISR and cloud event flags.
        isr::drain_events(|event| self.on_event(event));
        self.ctx.inputs.update_in_progress = self.update_active;

        // 3. FSM tick (pure state logic).
        self.fsm.tick(&mut self.ctx);

        // 4. Execute the side-effect requests the handlers wrote.
        self.execute_requests(hw, net, sleeper, sink);

        // 5. Debounced write-back of the persistent records.
        if let Err(e) = self.ctx.state.tick(self.ctx.inputs.now_ms) {
            warn!("record flush failed: {e}");
        }

        // 6. Emit edges.
        let new_alert = self.ctx.state.raw_alert_code();
        if new_alert != prev_alert && new_alert != 0 {
            sink.emit(&AppEvent::AlertRaised(new_alert));
        }
        let new_state = self.fsm.current_state();
        if new_state != prev_state {
            sink.emit(&AppEvent::StateChanged {
                from: prev_state,
                to: new_state,
            });
        }
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an external command (cloud function, serial console).
    pub fn handle_command(&mut self, cmd: AppCommand, sink: &mut impl EventSink) -> Result<()> {
        let now_ms = self.ctx.inputs.now_ms;
        match cmd {
            AppCommand::SetOpenHour(hour) => self.ctx.state.set_open_hour(now_ms, hour)?,
            AppCommand::SetCloseHour(hour) => self.ctx.state.set_close_hour(now_ms, hour)?,
            AppCommand::SetLowPowerMode(on) => self.ctx.state.set_low_power_mode(now_ms, on),
            AppCommand::SetVerboseMode(on) => self.ctx.state.set_verbose_mode(now_ms, on),
            AppCommand::ReportNow => self.force_state(StateId::Reporting, sink),
            AppCommand::ResetCounters => self.ctx.state.reset_counters(now_ms),
            AppCommand::FactoryReset => self.ctx.state.factory_reset(now_ms)?,
            AppCommand::ForceState(target) => self.force_state(target, sink),
        }
        Ok(())
    }

    /// Raise an alert from outside the state machine (out-of-memory hook,
    /// charge supervisor).
    pub fn raise_alert(&mut self, alert: AlertCode) {
        let now_ms = self.ctx.inputs.now_ms;
        let epoch = self.ctx.inputs.now_epoch;
        self.ctx.state.raise_alert(now_ms, alert, epoch);
    }

    // ── Queries ───────────────────────────────────────────────

    /// Current state machine state.
    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    /// Total control passes executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Read access to the persistent records, for consoles and tests.
    pub fn store(&self) -> &DeviceStateStore<M> {
        &self.ctx.state
    }

    /// Clone of the live configuration.
    pub fn current_config(&self) -> SystemConfig {
        self.ctx.config.clone()
    }

    // ── Internal ──────────────────────────────────────────────

    fn on_event(&mut self, event: Event) {
        match event {
            Event::ButtonPressed | Event::LidActivity => {
                // Somebody is at the bin: stay up long enough to matter.
                self.ctx.touch_stay_awake();
            }
            Event::UpdateStarted => {
                self.update_active = true;
            }
            Event::UpdateCompleted => {
                self.update_active = false;
                self.ctx.inputs.update_outcome = Some(UpdateOutcome::Completed);
            }
            Event::UpdateFailed => {
                self.update_active = false;
                self.ctx.inputs.update_outcome = Some(UpdateOutcome::Failed);
            }
            Event::HookResponse => {
                self.ctx.inputs.response_received = true;
            }
            Event::TimeSynced => {
                info!("wall clock synced");
            }
            Event::WatchdogWarning => {
                warn!("watchdog pre-timeout warning");
            }
        }
    }

    fn force_state(&mut self, target: StateId, sink: &mut impl EventSink) {
        let prev = self.fsm.current_state();
        self.fsm.force_transition(target, &mut self.ctx);
        if prev != target {
            sink.emit(&AppEvent::StateChanged {
                from: prev,
                to: target,
            });
        }
    }

    fn execute_requests(
        &mut self,
        hw: &mut (impl SensorPort + PowerPort),
        net: &mut impl NetworkPort,
        sleeper: &mut impl SleepPort,
        sink: &mut impl EventSink,
    ) {
        let req = core::mem::take(&mut self.ctx.requests);
        let now_ms = self.ctx.inputs.now_ms;

        if req.measure {
            self.run_measurement(hw, sink);
        }
        if req.publish_report {
            self.queue_report(net, sink);
        }
        if req.connect {
            net.connect();
        }

        let mut sleep = req.sleep;
        if req.disconnect {
            if let Err(e) = net.disconnect() {
                warn!("modem refused to power down: {e}");
                let epoch = self.ctx.inputs.now_epoch;
                self.ctx
                    .state
                    .raise_alert(now_ms, AlertCode::ModemPowerDownFailed, epoch);
                // Sleeping with the modem live would drain the battery.
                sleep = None;
            }
        }

        if req.reset {
            self.flush_before_shutdown();
            sink.emit(&AppEvent::RecoveryExecuted {
                alert: self.ctx.last_resolved_alert,
                action: RecoveryAction::Reset,
            });
            hw.reset();
            return;
        }
        if req.power_cycle {
            self.flush_before_shutdown();
            sink.emit(&AppEvent::RecoveryExecuted {
                alert: self.ctx.last_resolved_alert,
                action: RecoveryAction::PowerCycle,
            });
            hw.power_cycle();
            return;
        }

        if let Some(request) = sleep {
            self.flush_before_shutdown();
            let wake = sleeper.sleep(request);
            self.ctx.inputs.wake = Some(wake);
        }
    }

    /// Run a full measurement cycle through the sensor and power ports.
    fn run_measurement(
        &mut self,
        hw: &mut (impl SensorPort + PowerPort),
        sink: &mut impl EventSink,
    ) {
        let now_ms = self.ctx.inputs.now_ms;
        let epoch = self.ctx.inputs.now_epoch;
        let sys = self.ctx.state.system();
        let (full, empty) = (sys.bin_full_in, sys.bin_empty_in);
        let last_pct = self.ctx.state.current().percent_full;

        match hw.distance_in() {
            Ok(distance) => {
                let pct = measure::percent_full(distance, full, empty);
                let emptied = measure::was_emptied(pct, last_pct);
                let clamped = distance.clamp(full, empty);
                if let Err(e) = self
                    .ctx
                    .state
                    .record_measurement(now_ms, epoch, clamped, pct, emptied)
                {
                    warn!("measurement rejected: {e}");
                } else {
                    sink.emit(&AppEvent::MeasurementTaken {
                        percent_full: pct,
                        emptied,
                    });
                }
            }
            Err(e) => warn!("distance measurement failed: {e}"),
        }

        match hw.accel_z() {
            Ok(z) => {
                let pos = measure::classify_lid(z);
                self.ctx.state.set_lid_position(now_ms, pos);
            }
            Err(e) => warn!("accelerometer read failed: {e}"),
        }

        let voltage = hw.battery_voltage();
        let soc = hw.battery_soc();
        self.ctx.state.set_battery(now_ms, voltage, soc);

        let mut low = voltage < self.ctx.config.low_battery_cutoff_v;
        if let (Some(floor), Some(soc)) = (self.ctx.config.soc_connect_floor, soc) {
            low = low || soc < floor;
        }
        if low != self.ctx.state.system().low_battery_mode {
            info!("low battery mode {}", if low { "entered" } else { "cleared" });
            self.ctx.state.set_low_battery_mode(now_ms, low);
        }

        if let Some(temp_c) = measure::temp_c_from_adc(hw.temp_adc()) {
            if let Err(e) = self.ctx.state.set_internal_temp_c(now_ms, temp_c) {
                warn!("temperature rejected: {e}");
            }
        }
    }

    /// Build the hourly payload from the records and hand it to the
    /// network layer.
    fn queue_report(&mut self, hw: &mut impl NetworkPort, sink: &mut impl EventSink) {
        let cur = self.ctx.state.current();
        let sys = self.ctx.state.system();
        // Carry the most recently resolved alert when the channel itself
        // is already clear, so recoveries are visible on the dashboard.
        let alert_code = if cur.alert_code != 0 {
            cur.alert_code
        } else {
            self.ctx.last_resolved_alert
        };
        let payload = ReportPayload {
            timestamp: cur.last_measure_epoch,
            percent_full: cur.percent_full,
            trash_height_in: cur.trash_height_in,
            emptied: cur.emptied,
            lid_position: cur.lid_position.code(),
            internal_temp_c: cur.internal_temp_c,
            battery: cur.battery_voltage,
            battery_soc: cur.battery_soc,
            alert_code,
            reset_count: sys.reset_count,
            connect_duration_secs: sys.last_connection_duration_secs,
            signal_strength: sys.signal_strength,
        };
        match hw.publish(&payload) {
            Ok(()) => {
                self.ctx.last_resolved_alert = 0;
                sink.emit(&AppEvent::ReportQueued(payload));
            }
            Err(e) => warn!("report queue failed: {e}"),
        }
    }

    fn flush_before_shutdown(&mut self) {
        if let Err(e) = self.ctx.state.flush_all() {
            warn!("flush before shutdown failed: {e}");
        }
    }
}

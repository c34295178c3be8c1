//! Integration tests: DeviceService → FSM → ports, over a simulated FRAM.

use core::cell::Cell;

use binwatch::adapters::fram::SimFram;
use binwatch::app::commands::AppCommand;
use binwatch::app::events::{AppEvent, ReportPayload};
use binwatch::app::ports::{
    ClockPort, EventSink, NetworkPort, PowerPort, SensorPort, SleepPort,
};
use binwatch::app::service::DeviceService;
use binwatch::config::SystemConfig;
use binwatch::error::{CommsError, RecoveryAction, SensorError};
use binwatch::fsm::StateId;
use binwatch::fsm::context::{SleepRequest, WakeSource};
use binwatch::store::DeviceStateStore;
use binwatch::store::durable::LoadOutcome;

// A Tuesday evening, 22:13 UTC.
const BASE_EPOCH: u64 = 1_700_000_000;

// ── Mock implementations ──────────────────────────────────────

struct MockHw {
    distance: Result<f32, SensorError>,
    accel_z: i32,
    voltage: f32,
    soc: Option<u8>,
    temp_adc: u16,
    button: bool,
    resets: u32,
    power_cycles: u32,
}

impl MockHw {
    fn new() -> Self {
        Self {
            distance: Ok(23.5),
            accel_z: 16_000,
            voltage: 3.9,
            soc: None,
            temp_adc: 1_000,
            button: false,
            resets: 0,
            power_cycles: 0,
        }
    }
}

impl SensorPort for MockHw {
    fn distance_in(&mut self) -> Result<f32, SensorError> {
        self.distance
    }
    fn accel_z(&mut self) -> Result<i32, SensorError> {
        Ok(self.accel_z)
    }
    fn button_held(&self) -> bool {
        self.button
    }
}

impl PowerPort for MockHw {
    fn battery_voltage(&mut self) -> f32 {
        self.voltage
    }
    fn battery_soc(&mut self) -> Option<u8> {
        self.soc
    }
    fn temp_adc(&mut self) -> u16 {
        self.temp_adc
    }
    fn reset(&mut self) {
        self.resets += 1;
    }
    fn power_cycle(&mut self) {
        self.power_cycles += 1;
    }
}

struct MockNet {
    cloud: bool,
    cellular: bool,
    ack: bool,
    published: Vec<ReportPayload>,
    connects: u32,
    disconnects: u32,
}

impl MockNet {
    fn new() -> Self {
        Self {
            cloud: false,
            cellular: false,
            ack: false,
            published: Vec::new(),
            connects: 0,
            disconnects: 0,
        }
    }

    fn go_online(&mut self) {
        self.cloud = true;
        self.cellular = true;
    }
}

impl NetworkPort for MockNet {
    fn connect(&mut self) {
        self.connects += 1;
    }
    fn disconnect(&mut self) -> Result<(), CommsError> {
        self.disconnects += 1;
        self.cloud = false;
        self.cellular = false;
        Ok(())
    }
    fn cloud_up(&self) -> bool {
        self.cloud
    }
    fn cellular_registered(&self) -> bool {
        self.cellular
    }
    fn signal_quality(&mut self) -> Option<u8> {
        self.cellular.then_some(61)
    }
    fn publish(&mut self, report: &ReportPayload) -> Result<(), CommsError> {
        self.published.push(report.clone());
        Ok(())
    }
    fn take_response(&mut self) -> bool {
        core::mem::take(&mut self.ack)
    }
}

struct MockSleep {
    wake: WakeSource,
    slept: Vec<SleepRequest>,
}

impl MockSleep {
    fn new() -> Self {
        Self {
            wake: WakeSource::Timer,
            slept: Vec::new(),
        }
    }
}

impl SleepPort for MockSleep {
    fn sleep(&mut self, request: SleepRequest) -> WakeSource {
        self.slept.push(request);
        self.wake
    }
}

struct TestClock {
    ms: Cell<u64>,
    epoch: Cell<u64>,
}

impl TestClock {
    fn new() -> Self {
        Self {
            ms: Cell::new(1_000),
            epoch: Cell::new(BASE_EPOCH),
        }
    }

    fn advance_secs(&self, secs: u64) {
        self.ms.set(self.ms.get() + secs * 1_000);
        self.epoch.set(self.epoch.get() + secs);
    }
}

impl ClockPort for TestClock {
    fn now_ms(&self) -> u64 {
        self.ms.get()
    }
    fn now_epoch(&self) -> u64 {
        self.epoch.get()
    }
    fn time_valid(&self) -> bool {
        true
    }
}

#[derive(Default)]
struct Recorder(Vec<AppEvent>);

impl EventSink for Recorder {
    fn emit(&mut self, event: &AppEvent) {
        self.0.push(event.clone());
    }
}

// ── Test rig ──────────────────────────────────────────────────

struct Rig {
    svc: DeviceService<SimFram>,
    hw: MockHw,
    net: MockNet,
    sleep: MockSleep,
    clock: TestClock,
    sink: Recorder,
}

impl Rig {
    fn new() -> Self {
        let mut store = DeviceStateStore::new(SimFram::new(1024), 0, 0);
        store.setup().unwrap();
        Self {
            svc: DeviceService::new(SystemConfig::gen3(), store),
            hw: MockHw::new(),
            net: MockNet::new(),
            sleep: MockSleep::new(),
            clock: TestClock::new(),
            sink: Recorder::default(),
        }
    }

    fn boot(&mut self) {
        self.svc.boot(&self.clock, false, true, false, &mut self.sink);
    }

    fn tick(&mut self) {
        self.svc.tick(
            &mut self.hw,
            &mut self.net,
            &mut self.sleep,
            &self.clock,
            &mut self.sink,
        );
    }

    /// Boot, connect, and run the first report/ack cycle down to Idle.
    fn settle_to_idle(&mut self) {
        self.boot();
        self.tick(); // Initialization -> Connecting (connect issued)
        self.net.go_online();
        self.tick(); // Connecting -> Idle
        self.tick(); // Idle -> Reporting (report due), measure + publish
        self.tick(); // Reporting -> RespWait
        self.net.ack = true;
        self.tick(); // RespWait -> Idle
        assert_eq!(self.svc.state(), StateId::Idle);
    }
}

// ── Scenarios ─────────────────────────────────────────────────

#[test]
fn boot_report_ack_cycle() {
    let mut rig = Rig::new();
    rig.boot();
    assert_eq!(rig.svc.state(), StateId::Initialization);

    rig.tick();
    assert_eq!(rig.svc.state(), StateId::Connecting);
    assert_eq!(rig.net.connects, 1);

    rig.net.go_online();
    rig.tick();
    assert_eq!(rig.svc.state(), StateId::Idle);

    // Top of the logical hour: measure and report.
    rig.tick();
    assert_eq!(rig.svc.state(), StateId::Reporting);
    assert_eq!(rig.net.published.len(), 1);
    let report = &rig.net.published[0];
    // 23.5 in of headroom in a 9..38 in bin is exactly half full.
    assert_eq!(report.percent_full, 50.0);
    assert_eq!(report.lid_position, 5); // rightside up
    assert_eq!(report.alert_code, 0);

    rig.tick();
    assert_eq!(rig.svc.state(), StateId::RespWait);

    rig.net.ack = true;
    rig.tick();
    assert_eq!(rig.svc.state(), StateId::Idle);
    assert_eq!(
        rig.svc.store().system().last_hook_response_epoch,
        rig.clock.now_epoch()
    );

    // Same hour: no second report.
    rig.tick();
    assert_eq!(rig.svc.state(), StateId::Idle);
    assert_eq!(rig.net.published.len(), 1);

    assert!(rig.sink.0.iter().any(|e| matches!(e, AppEvent::Started(_))));
    assert!(
        rig.sink
            .0
            .iter()
            .any(|e| matches!(e, AppEvent::MeasurementTaken { .. }))
    );
    assert!(rig.sink.0.iter().any(|e| matches!(e, AppEvent::ReportQueued(_))));
}

#[test]
fn corrupted_record_recovers_across_restart() {
    let mut fram = SimFram::new(1024);
    {
        let mut store = DeviceStateStore::new(&mut fram, 0, 0);
        store.setup().unwrap();
        store.set_open_hour(0, 6).unwrap();
        store.record_measurement(0, BASE_EPOCH, 15.0, 80.0, false).unwrap();
        store.flush_all().unwrap();
    }

    // One flipped byte inside the system record body.
    fram.corrupt(13);

    let mut store = DeviceStateStore::new(&mut fram, 0, 0);
    let (sys, cur) = store.setup().unwrap();
    assert!(matches!(sys, LoadOutcome::Initialized(_)));
    assert_eq!(cur, LoadOutcome::Loaded);

    // The corrupted record came back as factory defaults; the intact one
    // survived untouched.
    assert_eq!(store.system().open_hour, 0);
    assert_eq!(store.current().percent_full, 80.0);

    // The factory write-back is durable: a further restart loads cleanly.
    let mut store = DeviceStateStore::new(&mut fram, 0, 0);
    let (sys, cur) = store.setup().unwrap();
    assert_eq!(sys, LoadOutcome::Loaded);
    assert_eq!(cur, LoadOutcome::Loaded);
}

#[test]
fn connect_timeout_escalates_to_power_cycle() {
    let mut rig = Rig::new();
    rig.boot();
    rig.tick();
    assert_eq!(rig.svc.state(), StateId::Connecting);

    // Nothing comes up within the connect budget.
    rig.clock.advance_secs(601);
    rig.tick();
    assert!(
        rig.sink
            .0
            .iter()
            .any(|e| matches!(e, AppEvent::AlertRaised(31)))
    );
    // A device that cannot connect drops into low-power mode.
    assert!(rig.svc.store().system().low_power_mode);

    rig.tick();
    assert_eq!(rig.svc.state(), StateId::Error);

    // Destructive recovery honours the hold-off.
    rig.tick();
    assert_eq!(rig.hw.power_cycles, 0);

    rig.clock.advance_secs(31);
    rig.tick();
    assert_eq!(rig.hw.power_cycles, 1);
    assert_eq!(rig.svc.store().raw_alert_code(), 0);
    assert!(rig.sink.0.iter().any(|e| matches!(
        e,
        AppEvent::RecoveryExecuted {
            alert: 31,
            action: RecoveryAction::PowerCycle,
        }
    )));
}

#[test]
fn low_power_device_sleeps_to_the_wake_boundary() {
    let mut rig = Rig::new();
    rig.settle_to_idle();
    rig.svc
        .handle_command(AppCommand::SetLowPowerMode(true), &mut rig.sink)
        .unwrap();

    // Stay-awake budget runs out well inside the same report hour.
    rig.clock.advance_secs(91);
    rig.tick();
    assert_eq!(rig.svc.state(), StateId::Sleeping);

    // Sleep executed: modem off first, then a deep sleep to the boundary.
    assert_eq!(rig.net.disconnects, 1);
    assert_eq!(rig.sleep.slept.len(), 1);
    let request = rig.sleep.slept[0];
    assert!(request.deep);
    assert!(request.duration_secs >= 2 && request.duration_secs <= 3_601);

    // Timer wake resumes the loop in Idle.
    rig.tick();
    assert_eq!(rig.svc.state(), StateId::Idle);
}

#[test]
fn button_wake_exits_low_power_and_reconnects() {
    let mut rig = Rig::new();
    rig.settle_to_idle();
    rig.svc
        .handle_command(AppCommand::SetLowPowerMode(true), &mut rig.sink)
        .unwrap();
    rig.svc
        .handle_command(AppCommand::SetOpenHour(6), &mut rig.sink)
        .unwrap();
    rig.sleep.wake = WakeSource::Button;

    rig.clock.advance_secs(91);
    rig.tick();
    assert_eq!(rig.svc.state(), StateId::Sleeping);

    let connects_before = rig.net.connects;
    rig.tick();
    // The operator pressed the button: full-power service resumes and the
    // reporting window reopens.
    assert_eq!(rig.svc.state(), StateId::Connecting);
    assert_eq!(rig.net.connects, connects_before + 1);
    assert!(!rig.svc.store().system().low_power_mode);
    assert_eq!(rig.svc.store().system().open_hour, 0);
    assert_eq!(rig.svc.store().system().close_hour, 24);
}

#[test]
fn bin_emptied_is_detected_on_the_next_report() {
    let mut rig = Rig::new();
    rig.settle_to_idle();
    assert_eq!(rig.svc.store().current().percent_full, 50.0);

    // The hauler empties the bin; the next hourly report sees it.
    rig.hw.distance = Ok(36.0);
    rig.clock.advance_secs(3_600);
    rig.tick(); // Idle -> Reporting (new hour)

    assert_eq!(rig.net.published.len(), 2);
    let report = &rig.net.published[1];
    assert!(report.percent_full < 10.0);
    assert!(report.emptied);
}

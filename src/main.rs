//! BinWatch firmware main entry point.
//!
//! Hexagonal architecture with a 1 Hz control loop:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     Adapters (outer ring)                     │
//! │                                                               │
//! │  HardwareAdapter    NetworkAdapter    I2cFram    SystemClock  │
//! │  (Sensor+Power)     (Network)         (Media)    (Clock)      │
//! │  Sleeper            LogEventSink                              │
//! │                                                               │
//! │  ───────────────── Port Trait Boundary ─────────────────      │
//! │                                                               │
//! │  ┌───────────────────────────────────────────────────────┐    │
//! │  │            DeviceService (pure logic)                 │    │
//! │  │  FSM · durable records · alert policy · schedule      │    │
//! │  └───────────────────────────────────────────────────────┘    │
//! └───────────────────────────────────────────────────────────────┘
//! ```

use anyhow::Result;
use log::{error, info, warn};

use binwatch::adapters::clock::SystemClock;
use binwatch::adapters::fram::{FRAM_I2C_ADDR, I2cFram};
use binwatch::adapters::hardware::HardwareAdapter;
use binwatch::adapters::log_sink::LogEventSink;
use binwatch::adapters::network::NetworkAdapter;
use binwatch::adapters::sleeper::Sleeper;
use binwatch::config::SystemConfig;
use binwatch::drivers::{hw_init, watchdog::Watchdog};
use binwatch::error::AlertCode;
use binwatch::events::{Event, push_event};
use binwatch::pins;
use binwatch::store::DeviceStateStore;

use binwatch::app::ports::SensorPort;
use binwatch::app::service::DeviceService;

use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::units::FromValueType;
use esp_idf_svc::sys::{
    esp_get_free_heap_size, esp_reset_reason, esp_reset_reason_t_ESP_RST_BROWNOUT,
    esp_reset_reason_t_ESP_RST_INT_WDT, esp_reset_reason_t_ESP_RST_PANIC,
    esp_reset_reason_t_ESP_RST_TASK_WDT, esp_reset_reason_t_ESP_RST_WDT, gpio_isr_handler_add,
};

/// On-board FRAM capacity (MB85RC64: 8 KiB).
const FRAM_CAPACITY: usize = 8 * 1024;

/// Free-heap floor below which the loop raises an out-of-memory alert.
const HEAP_FLOOR_BYTES: u32 = 16 * 1024;

const WIFI_SSID: &str = match option_env!("BINWATCH_WIFI_SSID") {
    Some(s) => s,
    None => "binwatch-fleet",
};
const WIFI_PASS: &str = match option_env!("BINWATCH_WIFI_PASS") {
    Some(s) => s,
    None => "",
};

// ── ISR handlers ──────────────────────────────────────────────
//
// Both push onto the lock-free event queue; the service drains it at the
// top of every control pass.

extern "C" fn button_isr(_arg: *mut core::ffi::c_void) {
    push_event(Event::ButtonPressed);
}

extern "C" fn accel_isr(_arg: *mut core::ffi::c_void) {
    push_event(Event::LidActivity);
}

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("BinWatch v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Peripheral bring-up ────────────────────────────────
    let mut peripherals_ok = true;
    if let Err(e) = hw_init::init_peripherals() {
        error!("HAL init failed: {e}");
        peripherals_ok = false;
    }
    if let Err(e) = hw_init::init_isr_service() {
        error!("ISR service init failed: {e}; continuing without wake interrupts");
    } else {
        unsafe {
            gpio_isr_handler_add(pins::BUTTON_GPIO, Some(button_isr), core::ptr::null_mut());
            gpio_isr_handler_add(pins::ACCEL_INT_GPIO, Some(accel_isr), core::ptr::null_mut());
        }
    }
    let watchdog = Watchdog::new();

    let reset_reason = unsafe { esp_reset_reason() };
    let unexpected_reset = matches!(
        reset_reason,
        esp_reset_reason_t_ESP_RST_PANIC
            | esp_reset_reason_t_ESP_RST_INT_WDT
            | esp_reset_reason_t_ESP_RST_TASK_WDT
            | esp_reset_reason_t_ESP_RST_WDT
            | esp_reset_reason_t_ESP_RST_BROWNOUT
    );

    // ── 2. Persistent records on FRAM ─────────────────────────
    let peripherals = Peripherals::take()?;
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio8,
        peripherals.pins.gpio9,
        &I2cConfig::new().baudrate(400.kHz().into()),
    )?;
    let fram = I2cFram::new(i2c, FRAM_I2C_ADDR, FRAM_CAPACITY);

    let config = SystemConfig::gen3();
    config.validate().map_err(anyhow::Error::msg)?;

    let mut store =
        DeviceStateStore::new(fram, config.system_save_delay_ms, config.current_save_delay_ms);
    if let Err(e) = store.setup() {
        error!("FRAM unreachable: {e}");
        peripherals_ok = false;
    }

    // ── 3. Adapters + service ─────────────────────────────────
    let mut hw = HardwareAdapter::new();
    let mut net = NetworkAdapter::new(peripherals.modem, WIFI_SSID, WIFI_PASS)?;
    let mut sleeper = Sleeper::new();
    let clock = SystemClock::new();
    let mut sink = LogEventSink::new();

    let mut service = DeviceService::new(config, store);
    let factory_requested = hw.button_held();
    service.boot(
        &clock,
        unexpected_reset,
        peripherals_ok,
        factory_requested,
        &mut sink,
    );

    // ── 4. Control loop (1 Hz) ────────────────────────────────
    loop {
        watchdog.feed();

        if unsafe { esp_get_free_heap_size() } < HEAP_FLOOR_BYTES {
            warn!("free heap below floor");
            service.raise_alert(AlertCode::OutOfMemory);
        }

        service.tick(&mut hw, &mut net, &mut sleeper, &clock, &mut sink);

        FreeRtos::delay_ms(1_000);
    }
}

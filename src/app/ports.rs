//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ DeviceService (domain)
//! ```
//!
//! Driven adapters (sensors, modem, power, clock, event sinks) implement
//! these traits.  The [`DeviceService`](super::service::DeviceService)
//! consumes them via generics, so the domain core never touches hardware
//! directly.

use crate::error::{CommsError, SensorError};
use crate::fsm::context::{SleepRequest, WakeSource};

use super::events::ReportPayload;

// ───────────────────────────────────────────────────────────────
// Bin sensors (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port for the bin-facing sensors.
pub trait SensorPort {
    /// Range the time-of-flight sensor: distance from lid to trash surface
    /// in inches.  Powers the sensor up and back down around the reading.
    fn distance_in(&mut self) -> Result<f32, SensorError>;

    /// Latest accelerometer z-axis sample (raw counts).
    fn accel_z(&mut self) -> Result<i32, SensorError>;

    /// The user button is currently held (active low on the board).
    fn button_held(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Power (battery telemetry plus the two destructive recoveries)
// ───────────────────────────────────────────────────────────────

pub trait PowerPort {
    fn battery_voltage(&mut self) -> f32;

    /// State of charge when the board carries a fuel gauge.
    fn battery_soc(&mut self) -> Option<u8>;

    /// Raw thermistor ADC reading for the enclosure temperature.
    fn temp_adc(&mut self) -> u16;

    /// Software reset.  Does not return on hardware; mocks record the call.
    fn reset(&mut self);

    /// Hard power-cycle through the external RTC/watchdog chip.
    fn power_cycle(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Network (modem + cloud session + webhook transport)
// ───────────────────────────────────────────────────────────────

pub trait NetworkPort {
    /// Kick off a session.  Non-blocking; progress is observed via
    /// [`cloud_up`](Self::cloud_up).
    fn connect(&mut self);

    /// Tear the session down and power the modem off.
    fn disconnect(&mut self) -> Result<(), CommsError>;

    fn cloud_up(&self) -> bool;

    /// Cellular layer registered with a tower (distinct from the cloud
    /// session being up).
    fn cellular_registered(&self) -> bool;

    /// Radio signal quality, 0..=100 percent, or `None` when the modem is
    /// down or has no reading yet.
    fn signal_quality(&mut self) -> Option<u8>;

    /// Queue the hourly report webhook.  Implementations buffer while
    /// offline and deliver once the session comes up.
    fn publish(&mut self, report: &ReportPayload) -> Result<(), CommsError>;

    /// A webhook acknowledgement arrived since the last call (consumed).
    fn take_response(&mut self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Clock
// ───────────────────────────────────────────────────────────────

pub trait ClockPort {
    /// Monotonic milliseconds since boot.
    fn now_ms(&self) -> u64;

    /// Wall clock, epoch seconds.  Garbage until [`time_valid`](Self::time_valid).
    fn now_epoch(&self) -> u64;

    /// Wall clock synced from the network or restored from the RTC.
    fn time_valid(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Sleep
// ───────────────────────────────────────────────────────────────

/// Executes a sleep request and reports what ended it.  On hardware this
/// blocks in ULP sleep with the watchdog paused; in tests it returns a
/// scripted wake.
pub trait SleepPort {
    fn sleep(&mut self, request: SleepRequest) -> WakeSource;
}

// ───────────────────────────────────────────────────────────────
// Event sink (domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (serial log, cloud
/// event, test recorder).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

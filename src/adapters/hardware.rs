//! Hardware adapter: bridges real peripherals to the domain port traits.
//!
//! Implements [`SensorPort`] (ranging sensor, accelerometer, button) and
//! [`PowerPort`] (battery telemetry, thermistor, the two destructive
//! recoveries).  This is the only module besides the FRAM adapter that
//! touches actual hardware.  On non-espidf targets every reading comes
//! from scripted simulation fields, settable by tests and the host demo
//! loop.

use crate::app::ports::{PowerPort, SensorPort};
#[cfg(feature = "espidf")]
use crate::drivers::hw_init;
use crate::error::SensorError;
#[cfg(feature = "espidf")]
use crate::pins;

/// Accelerometer bus address (LIS3DH, SA0 low).
#[cfg(feature = "espidf")]
const ACCEL_I2C_ADDR: u8 = 0x18;

/// OUT_Z_L with the auto-increment bit set.
#[cfg(feature = "espidf")]
const ACCEL_REG_OUT_Z: u8 = 0x2C | 0x80;

/// Echo pulses longer than this mean the sensor saw nothing.
#[cfg(feature = "espidf")]
const ECHO_TIMEOUT_US: u64 = 30_000;

pub struct HardwareAdapter {
    #[cfg(not(feature = "espidf"))]
    sim: SimState,
}

#[cfg(not(feature = "espidf"))]
struct SimState {
    distance: Result<f32, SensorError>,
    accel_z: i32,
    voltage: f32,
    soc: Option<u8>,
    temp_adc: u16,
    button_held: bool,
}

impl Default for HardwareAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(feature = "espidf"))]
            sim: SimState {
                distance: Ok(38.0),
                accel_z: 16_000,
                voltage: 4.0,
                soc: None,
                temp_adc: 1_000,
                button_held: false,
            },
        }
    }

    // ── Simulation controls (host only) ───────────────────────

    #[cfg(not(feature = "espidf"))]
    pub fn sim_set_distance(&mut self, distance: Result<f32, SensorError>) {
        self.sim.distance = distance;
    }

    #[cfg(not(feature = "espidf"))]
    pub fn sim_set_accel_z(&mut self, z: i32) {
        self.sim.accel_z = z;
    }

    #[cfg(not(feature = "espidf"))]
    pub fn sim_set_battery(&mut self, voltage: f32, soc: Option<u8>) {
        self.sim.voltage = voltage;
        self.sim.soc = soc;
    }

    #[cfg(not(feature = "espidf"))]
    pub fn sim_set_button(&mut self, held: bool) {
        self.sim.button_held = held;
    }

    // ── Hardware ranging (espidf only) ────────────────────────

    /// One trigger/echo cycle, distance in inches.
    #[cfg(feature = "espidf")]
    fn range_once(&self) -> Result<f32, SensorError> {
        use esp_idf_svc::sys::{esp_rom_delay_us, esp_timer_get_time};

        // 10 µs trigger pulse.
        hw_init::gpio_write(pins::TOF_TRIGGER_GPIO, true);
        unsafe { esp_rom_delay_us(10) };
        hw_init::gpio_write(pins::TOF_TRIGGER_GPIO, false);

        let deadline = unsafe { esp_timer_get_time() } as u64 + ECHO_TIMEOUT_US;
        while !hw_init::gpio_read(pins::TOF_ECHO_GPIO) {
            if unsafe { esp_timer_get_time() } as u64 > deadline {
                return Err(SensorError::NotReady);
            }
        }
        let start = unsafe { esp_timer_get_time() } as u64;
        while hw_init::gpio_read(pins::TOF_ECHO_GPIO) {
            if unsafe { esp_timer_get_time() } as u64 > deadline {
                return Err(SensorError::OutOfRange);
            }
        }
        let width_us = unsafe { esp_timer_get_time() } as u64 - start;

        // Round-trip speed of sound: 148 µs per inch.
        Ok(width_us as f32 / 148.0)
    }
}

// ── SensorPort implementation ─────────────────────────────────

impl SensorPort for HardwareAdapter {
    #[cfg(feature = "espidf")]
    fn distance_in(&mut self) -> Result<f32, SensorError> {
        use esp_idf_svc::sys::esp_rom_delay_us;

        hw_init::gpio_write(pins::TOF_POWER_GPIO, true);
        // Sensor boot time after power-up.
        unsafe { esp_rom_delay_us(50_000) };

        // Median of three to reject single-echo glitches off the bin wall.
        let mut samples = [0.0f32; 3];
        let mut count = 0;
        let mut last_err = SensorError::NotReady;
        for _ in 0..3 {
            match self.range_once() {
                Ok(d) => {
                    samples[count] = d;
                    count += 1;
                }
                Err(e) => last_err = e,
            }
            unsafe { esp_rom_delay_us(60_000) };
        }
        hw_init::gpio_write(pins::TOF_POWER_GPIO, false);

        if count == 0 {
            return Err(last_err);
        }
        let taken = &mut samples[..count];
        taken.sort_by(|a, b| a.total_cmp(b));
        Ok(taken[count / 2])
    }

    #[cfg(not(feature = "espidf"))]
    fn distance_in(&mut self) -> Result<f32, SensorError> {
        self.sim.distance
    }

    #[cfg(feature = "espidf")]
    fn accel_z(&mut self) -> Result<i32, SensorError> {
        let mut raw = [0u8; 2];
        if !hw_init::i2c_read_reg(ACCEL_I2C_ADDR, ACCEL_REG_OUT_Z, &mut raw) {
            return Err(SensorError::BusError);
        }
        Ok(i32::from(i16::from_le_bytes(raw)))
    }

    #[cfg(not(feature = "espidf"))]
    fn accel_z(&mut self) -> Result<i32, SensorError> {
        Ok(self.sim.accel_z)
    }

    #[cfg(feature = "espidf")]
    fn button_held(&self) -> bool {
        // Active low.
        !hw_init::gpio_read(pins::BUTTON_GPIO)
    }

    #[cfg(not(feature = "espidf"))]
    fn button_held(&self) -> bool {
        self.sim.button_held
    }
}

// ── PowerPort implementation ──────────────────────────────────

impl PowerPort for HardwareAdapter {
    #[cfg(feature = "espidf")]
    fn battery_voltage(&mut self) -> f32 {
        let raw = hw_init::adc_read(pins::ADC_CH_BATTERY);
        f32::from(raw) * 3.3 / 4095.0 * pins::BATTERY_DIVIDER
    }

    #[cfg(not(feature = "espidf"))]
    fn battery_voltage(&mut self) -> f32 {
        self.sim.voltage
    }

    #[cfg(feature = "espidf")]
    fn battery_soc(&mut self) -> Option<u8> {
        // Rev C carries no fuel gauge; gen2 boards report SoC here.
        None
    }

    #[cfg(not(feature = "espidf"))]
    fn battery_soc(&mut self) -> Option<u8> {
        self.sim.soc
    }

    #[cfg(feature = "espidf")]
    fn temp_adc(&mut self) -> u16 {
        hw_init::adc_read(pins::ADC_CH_THERMISTOR)
    }

    #[cfg(not(feature = "espidf"))]
    fn temp_adc(&mut self) -> u16 {
        self.sim.temp_adc
    }

    #[cfg(feature = "espidf")]
    fn reset(&mut self) {
        log::warn!("software reset requested");
        unsafe { esp_idf_svc::sys::esp_restart() };
    }

    #[cfg(not(feature = "espidf"))]
    fn reset(&mut self) {
        log::warn!("reset(sim): no-op");
    }

    #[cfg(feature = "espidf")]
    fn power_cycle(&mut self) {
        use esp_idf_svc::sys::esp_rom_delay_us;
        log::warn!("hard power-cycle requested");
        // The KILL line drops the load switch; the RTC re-enables it after
        // its programmed interval.  If the line is not wired, fall through
        // to a software reset so the recovery still happens.
        hw_init::gpio_write(pins::POWER_CYCLE_GPIO, true);
        unsafe { esp_rom_delay_us(100_000) };
        unsafe { esp_idf_svc::sys::esp_restart() };
    }

    #[cfg(not(feature = "espidf"))]
    fn power_cycle(&mut self) {
        log::warn!("power_cycle(sim): no-op");
    }
}

//! Board pin map (BinWatch rev C carrier).
//!
//! Single source of truth for GPIO and ADC channel assignments.  Change
//! here when the carrier board is re-spun, nowhere else.

/// User button, active low, RTC-capable (wakes from deep sleep).
pub const BUTTON_GPIO: i32 = 0;

/// High-side switch for the ranging sensor.  Held low except during a
/// measurement to save the sensor's idle current.
pub const TOF_POWER_GPIO: i32 = 4;

/// Ranging sensor trigger pulse output.
pub const TOF_TRIGGER_GPIO: i32 = 6;

/// Ranging sensor echo pulse input.
pub const TOF_ECHO_GPIO: i32 = 7;

/// Drives the external RTC/load-switch KILL line for a hard power-cycle.
pub const POWER_CYCLE_GPIO: i32 = 10;

/// Accelerometer motion interrupt, RTC-capable wake source.
pub const ACCEL_INT_GPIO: i32 = 5;

/// Shared I2C bus (FRAM + accelerometer).
pub const I2C_SDA_GPIO: i32 = 8;
pub const I2C_SCL_GPIO: i32 = 9;

/// ADC1 channel for the battery divider.
pub const ADC_CH_BATTERY: u32 = 3;

/// ADC1 channel for the enclosure thermistor.
pub const ADC_CH_THERMISTOR: u32 = 4;

/// Battery sense divider ratio (two equal resistors).
pub const BATTERY_DIVIDER: f32 = 2.0;

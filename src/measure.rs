//! Fill-level measurement math.
//!
//! Pure conversions between raw sensor readings and the derived values we
//! persist and report.  The actual sensor I/O lives behind the port traits;
//! keeping the math here means the calibration and emptied-detection rules
//! get exercised on the host.

use crate::store::LidPosition;

/// Percent-full below which a sharp drop counts as "emptied"...
pub const EMPTIED_LOW_PCT: f32 = 20.0;
/// ...but only when the previous reading was above this.
pub const EMPTIED_HIGH_PCT: f32 = 30.0;

/// Accelerometer z-axis magnitude separating flat from on-side.
pub const LID_Z_THRESHOLD: i32 = 10_000;

/// Convert a raw distance reading to percent full.
///
/// The sensor measures down from the lid, so a *smaller* distance means a
/// *fuller* bin.  Readings are clamped to the calibration span first; a
/// bin packed above the "full" line reads 100, an empty echo past the
/// floor reads 0.
pub fn percent_full(height_in: f32, full_in: f32, empty_in: f32) -> f32 {
    debug_assert!(empty_in > full_in);
    let span = empty_in - full_in;
    let clamped = height_in.clamp(full_in, empty_in);
    (span - (clamped - full_in)) / span * 100.0
}

/// Emptied detection: a drop below the low threshold from above the high
/// threshold.  The dead band between the two keeps readings that jitter
/// around a single level from flapping the flag.
pub fn was_emptied(percent_now: f32, percent_before: f32) -> bool {
    percent_now < EMPTIED_LOW_PCT && percent_before > EMPTIED_HIGH_PCT
}

/// Classify lid orientation from an accelerometer sample's z axis.
pub fn classify_lid(z: i32) -> LidPosition {
    if z > LID_Z_THRESHOLD {
        LidPosition::RightsideUp
    } else if z < -LID_Z_THRESHOLD {
        LidPosition::UpsideDown
    } else {
        LidPosition::Side
    }
}

/// Convert a 12-bit thermistor ADC reading to degrees C (10 mV/degC with a
/// 500 mV offset).  Readings outside 0..=2048 span -50 C to boiling and
/// indicate a wiring fault, not a temperature.
pub fn temp_c_from_adc(reading: u16) -> Option<f32> {
    if reading > 2048 {
        return None;
    }
    let voltage = f32::from(reading) * 3.3 / 4096.0;
    Some((voltage - 0.5) * 100.0)
}

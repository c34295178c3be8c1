//! One-shot hardware peripheral initialization plus raw GPIO/ADC helpers.
//!
//! Configures ADC channels and GPIO directions using raw ESP-IDF sys
//! calls.  Called once from `main()` before the control loop starts.
//! The helpers are thin wrappers so the adapters never carry `unsafe`
//! blocks of their own.

#[cfg(feature = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(feature = "espidf")]
use crate::pins;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    AdcInitFailed(i32),
    GpioConfigFailed(i32),
    IsrInstallFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AdcInitFailed(rc) => write!(f, "ADC1 init failed (rc={rc})"),
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={rc})"),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={rc})"),
        }
    }
}

// ── Init ──────────────────────────────────────────────────────

#[cfg(feature = "espidf")]
pub fn init_peripherals() -> Result<(), HwInitError> {
    // SAFETY: called once from main() before the control loop; single-threaded.
    unsafe {
        init_adc()?;
        init_gpio()?;
    }
    log::info!("hw_init: all peripherals configured");
    Ok(())
}

#[cfg(not(feature = "espidf"))]
pub fn init_peripherals() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

#[cfg(feature = "espidf")]
pub fn init_isr_service() -> Result<(), HwInitError> {
    let rc = unsafe { gpio_install_isr_service(0) };
    if rc != ESP_OK && rc != ESP_ERR_INVALID_STATE {
        return Err(HwInitError::IsrInstallFailed(rc));
    }
    Ok(())
}

#[cfg(not(feature = "espidf"))]
pub fn init_isr_service() -> Result<(), HwInitError> {
    Ok(())
}

#[cfg(feature = "espidf")]
unsafe fn init_adc() -> Result<(), HwInitError> {
    let rc = adc1_config_width(adc_bits_width_t_ADC_WIDTH_BIT_12);
    if rc != ESP_OK {
        return Err(HwInitError::AdcInitFailed(rc));
    }
    for ch in [pins::ADC_CH_BATTERY, pins::ADC_CH_THERMISTOR] {
        let rc = adc1_config_channel_atten(ch, adc_atten_t_ADC_ATTEN_DB_11);
        if rc != ESP_OK {
            return Err(HwInitError::AdcInitFailed(rc));
        }
    }
    Ok(())
}

#[cfg(feature = "espidf")]
unsafe fn init_gpio() -> Result<(), HwInitError> {
    // Button: input, pulled up, active low.
    let input = gpio_config_t {
        pin_bit_mask: (1u64 << pins::BUTTON_GPIO) | (1u64 << pins::ACCEL_INT_GPIO),
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_NEGEDGE,
    };
    let rc = gpio_config(&input);
    if rc != ESP_OK {
        return Err(HwInitError::GpioConfigFailed(rc));
    }

    // Sensor power switch: output, off until a measurement.
    let output = gpio_config_t {
        pin_bit_mask: 1u64 << pins::TOF_POWER_GPIO,
        mode: gpio_mode_t_GPIO_MODE_OUTPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    let rc = gpio_config(&output);
    if rc != ESP_OK {
        return Err(HwInitError::GpioConfigFailed(rc));
    }
    gpio_set_level(pins::TOF_POWER_GPIO, 0);
    Ok(())
}

// ── Runtime helpers ───────────────────────────────────────────

#[cfg(feature = "espidf")]
pub fn gpio_read(pin: i32) -> bool {
    unsafe { gpio_get_level(pin) != 0 }
}

#[cfg(not(feature = "espidf"))]
pub fn gpio_read(_pin: i32) -> bool {
    true
}

#[cfg(feature = "espidf")]
pub fn gpio_write(pin: i32, high: bool) {
    unsafe {
        gpio_set_level(pin, u32::from(high));
    }
}

#[cfg(not(feature = "espidf"))]
pub fn gpio_write(_pin: i32, _high: bool) {}

/// Raw 12-bit ADC1 reading, 0 on driver error.
#[cfg(feature = "espidf")]
pub fn adc_read(channel: u32) -> u16 {
    let raw = unsafe { adc1_get_raw(channel) };
    if raw < 0 { 0 } else { raw as u16 }
}

#[cfg(not(feature = "espidf"))]
pub fn adc_read(_channel: u32) -> u16 {
    0
}

/// Register read on the shared I2C bus.  Returns false on a bus error.
#[cfg(feature = "espidf")]
pub fn i2c_read_reg(addr: u8, reg: u8, buf: &mut [u8]) -> bool {
    const I2C_TIMEOUT_TICKS: u32 = 100;
    let rc = unsafe {
        i2c_master_write_read_device(
            0,
            addr,
            &reg,
            1,
            buf.as_mut_ptr(),
            buf.len(),
            I2C_TIMEOUT_TICKS,
        )
    };
    rc == ESP_OK
}

#[cfg(not(feature = "espidf"))]
pub fn i2c_read_reg(_addr: u8, _reg: u8, _buf: &mut [u8]) -> bool {
    false
}

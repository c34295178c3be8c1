//! Inbound commands to the application service.
//!
//! These mirror the cloud functions the fleet backend can invoke on a
//! connected device.  The [`DeviceService`](super::service::DeviceService)
//! validates and applies them; invalid values are rejected, never clamped.

use crate::fsm::StateId;

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    /// Set the facility opening hour (0-12).
    SetOpenHour(u8),

    /// Set the facility closing hour (12-24).
    SetCloseHour(u8),

    /// Toggle disconnected low-power operation.
    SetLowPowerMode(bool),

    /// Toggle commissioning-time verbose messaging.
    SetVerboseMode(bool),

    /// Measure and report immediately, outside the hourly schedule.
    ReportNow,

    /// Zero the reset counter and clear the alert channel.
    ResetCounters,

    /// Reset both persistent records to factory defaults.
    FactoryReset,

    /// Force the state machine into a specific state (debug / testing only).
    ForceState(StateId),
}

//! Unified error and alert types for the BinWatch firmware.
//!
//! Follows embedded best practice: a single `Error` enum that every subsystem
//! can convert into, keeping the top-level control loop's error handling
//! uniform.  All variants are `Copy` so they can be cheaply passed through the
//! state machine without allocation.
//!
//! Alert codes are the cross-cutting fault channel: any subsystem that hits a
//! condition the operator should know about writes an [`AlertCode`] onto the
//! current-cycle record, and the state machine inspects that single channel.
//! It never needs to know where a fault originated.

use core::fmt;

// ---------------------------------------------------------------------------
// Alert codes
// ---------------------------------------------------------------------------

/// Integer fault classification surfaced on the current-cycle record.
///
/// The numeric values are wire/operator-facing constants shared with the
/// fleet dashboard; do not renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertCode {
    /// Normal operations, no alert.
    None = 0,

    // ── Device alerts ─────────────────────────────────────────
    /// Battery temperature too high or low to charge safely.
    ChargeTempUnsafe = 10,
    /// PMIC reset required.
    PmicResetRequired = 11,
    /// Initialization error (FRAM or sensor failed to come up).
    InitFailure = 12,
    /// Excessive reset count since the last daily cleanup.
    ExcessiveResets = 13,
    /// Out-of-memory signal from the runtime.
    OutOfMemory = 14,
    /// Modem refused to power down cleanly before sleep.
    ModemPowerDownFailed = 15,

    // ── Firmware update alerts ────────────────────────────────
    /// Firmware update completed (reported, then cleared).
    UpdateCompleted = 20,
    /// Firmware update timed out.
    UpdateTimedOut = 21,
    /// Firmware update failed.
    UpdateFailed = 22,
    /// Update attempt limit reached, done for the day.
    UpdateAttemptLimit = 23,

    // ── Connectivity alerts ───────────────────────────────────
    /// Cloud connection timed out but the cellular layer came up.
    CloudUnreachable = 30,
    /// Neither cloud nor cellular layer reachable.
    NetworkUnreachable = 31,

    // ── Cloud alerts ──────────────────────────────────────────
    /// No webhook response received while connected.
    HookResponseTimeout = 40,
}

impl AlertCode {
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Decode a raw persisted code.  Unknown codes return `None` here; the
    /// alert policy separately treats unknown raw codes as fail-safe Reset.
    pub fn from_code(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::None),
            10 => Some(Self::ChargeTempUnsafe),
            11 => Some(Self::PmicResetRequired),
            12 => Some(Self::InitFailure),
            13 => Some(Self::ExcessiveResets),
            14 => Some(Self::OutOfMemory),
            15 => Some(Self::ModemPowerDownFailed),
            20 => Some(Self::UpdateCompleted),
            21 => Some(Self::UpdateTimedOut),
            22 => Some(Self::UpdateFailed),
            23 => Some(Self::UpdateAttemptLimit),
            30 => Some(Self::CloudUnreachable),
            31 => Some(Self::NetworkUnreachable),
            40 => Some(Self::HookResponseTimeout),
            _ => None,
        }
    }
}

impl fmt::Display for AlertCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::ChargeTempUnsafe => write!(f, "battery temp unsafe to charge"),
            Self::PmicResetRequired => write!(f, "PMIC reset required"),
            Self::InitFailure => write!(f, "initialization failure"),
            Self::ExcessiveResets => write!(f, "excessive resets"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::ModemPowerDownFailed => write!(f, "modem power-down failed"),
            Self::UpdateCompleted => write!(f, "firmware update completed"),
            Self::UpdateTimedOut => write!(f, "firmware update timed out"),
            Self::UpdateFailed => write!(f, "firmware update failed"),
            Self::UpdateAttemptLimit => write!(f, "update attempt limit reached"),
            Self::CloudUnreachable => write!(f, "cloud unreachable (cellular up)"),
            Self::NetworkUnreachable => write!(f, "network unreachable"),
            Self::HookResponseTimeout => write!(f, "webhook response timeout"),
        }
    }
}

// ---------------------------------------------------------------------------
// Recovery actions
// ---------------------------------------------------------------------------

/// Escalating recovery actions, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RecoveryAction {
    /// Clear the alert and return to normal operation.
    NoAction,
    /// Connect (or reconnect) so the condition gets reported.
    Reconnect,
    /// Software reset of the device.
    Reset,
    /// Hard power-cycle through the external RTC/watchdog chip.
    PowerCycle,
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAction => write!(f, "no action"),
            Self::Reconnect => write!(f, "reconnect"),
            Self::Reset => write!(f, "reset"),
            Self::PowerCycle => write!(f, "power cycle"),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Persistent storage failed (corruption is handled internally; this is
    /// for unrecoverable media I/O).
    Store(StoreError),
    /// A sensor could not be read or returned out-of-range data.
    Sensor(SensorError),
    /// A communication subsystem failed.
    Comms(CommsError),
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// A configuration value failed range validation.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store: {e}"),
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Comms(e) => write!(f, "comms: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Media read/write failed at the bus level.
    MediaIo,
    /// Serialized record does not fit its media region.
    RegionOverflow,
    /// Record failed magic/version/length/hash validation.
    Corrupted,
    /// A field value failed its declared range check.
    OutOfRange(&'static str),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MediaIo => write!(f, "media I/O failed"),
            Self::RegionOverflow => write!(f, "record exceeds media region"),
            Self::Corrupted => write!(f, "record corrupted"),
            Self::OutOfRange(field) => write!(f, "value out of range: {field}"),
        }
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Ranging data never became ready within the sensor's window.
    NotReady,
    /// Reading is outside the physically plausible range.
    OutOfRange,
    /// The accelerometer produced no sample this cycle.
    NoSample,
    /// I2C transaction failed.
    BusError,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "data not ready"),
            Self::OutOfRange => write!(f, "reading out of range"),
            Self::NoSample => write!(f, "no accelerometer sample"),
            Self::BusError => write!(f, "bus error"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Communications errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsError {
    ConnectFailed,
    DisconnectFailed,
    PublishFailed,
}

impl fmt::Display for CommsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::DisconnectFailed => write!(f, "disconnect failed"),
            Self::PublishFailed => write!(f, "publish failed"),
        }
    }
}

impl From<CommsError> for Error {
    fn from(e: CommsError) -> Self {
        Self::Comms(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

//! Durable device state.
//!
//! Two versioned records live in external FRAM: a boot-scoped system record
//! and a frequently-updated current-cycle record.  [`durable`] provides the
//! generic framed store (magic, version, hash, debounced flush);
//! [`records`] defines the two record types; [`device_state`] wraps both
//! behind typed, range-checked accessors.

pub mod device_state;
pub mod durable;
pub mod records;

pub use device_state::DeviceStateStore;
pub use durable::{DurableRecordStore, LoadOutcome, Record, RecordMedia, ResetReason};
pub use records::{CurrentRecord, LidPosition, SystemRecord};

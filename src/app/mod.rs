//! Application core: pure domain logic, zero I/O.
//!
//! This module orchestrates the control loop for the bin monitor: state
//! machine ticks, measurement cycles, report delivery, and recovery
//! actions.  All interaction with hardware happens through **port traits**
//! defined in [`ports`], keeping this layer fully testable without real
//! peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;

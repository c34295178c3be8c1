//! BinWatch firmware library.
//!
//! Control core for a battery-powered trash-fill monitor: a durable
//! record store on FRAM, a function-pointer state machine, the alert and
//! recovery policy, and the hexagonal port layer that keeps all of it
//! testable on the host.  Platform-specific code is confined to the
//! adapters and drivers behind the `espidf` feature.

pub mod alert;
pub mod app;
pub mod comms;
pub mod config;
pub mod error;
pub mod events;
pub mod fsm;
pub mod measure;
pub mod pins;
pub mod schedule;
pub mod store;

pub mod adapters;
pub mod drivers;

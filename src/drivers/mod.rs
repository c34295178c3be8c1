//! Low-level peripheral drivers.
//!
//! Everything here is dual-target: real ESP-IDF calls behind the `espidf`
//! feature, in-memory stubs everywhere else so the domain layer and its
//! tests build on the host.

pub mod hw_init;
pub mod watchdog;

//! Cellular/cloud session management.

pub mod connection;

pub use connection::{ConnectPoll, ConnectionManager, ResumeTarget};

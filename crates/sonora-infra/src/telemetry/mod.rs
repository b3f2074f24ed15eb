//! Telemetry initialization
//!
//! Binaries call [`init_telemetry`] once at startup and [`shutdown_telemetry`]
//! before exiting.

mod init_basic;

pub use init_basic::{init_telemetry, shutdown_telemetry};

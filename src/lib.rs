//! Fan Control cluster library.
//!
//! Server-side state machine for the Fan Control cluster: capability-gated
//! attributes, mode/percent/speed reconciliation, the Step command and the
//! driver callbacks that turn committed changes into motor and timer actions.

pub mod clusters;
pub mod config;
pub mod device;
pub mod error;
#[cfg(feature = "matter")]
pub mod matter;
pub mod notifier;

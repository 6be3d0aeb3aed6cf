//! rs-matter integration.
//!
//! Only compiled with the `matter` feature.

pub mod fan_control;

pub use fan_control::FanControlHandler;

//! Simulated fan device for the demo binary.

pub mod script;
pub mod simulated_fan;

pub use script::FanAction;
pub use simulated_fan::SimulatedFanDriver;

//! Cluster implementations, independent of the Matter transport.

pub mod fan_control;

//! Registries guarding every invocation: tools the planner may call and
//! capabilities the engine may run.

pub mod capabilities;
pub mod tools;

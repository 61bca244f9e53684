//! Hardware drivers: one-shot peripheral init plus the dumb actuator
//! wrappers. Safety policy lives in the domain core — drivers only
//! translate commands into register writes.

pub mod heater;
pub mod hw_init;
pub mod servo;

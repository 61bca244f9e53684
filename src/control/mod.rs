//! Control algorithms: DCC→regulator physics, pressure regulation, and
//! the mechanical servo mapper.

pub mod degraded;
pub mod physics;
pub mod pressure;
pub mod regulator;

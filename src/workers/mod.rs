//! Non-blocking background workers.
//!
//! Each worker exposes a constant-time `enqueue`-style producer API and
//! a `tick()` the orchestrator calls once per control cycle, after the
//! safety and actuation stages. No worker ever blocks the tick, and no
//! failure inside a worker propagates — errors are returned for the
//! orchestrator to log and are otherwise swallowed.

pub mod cached;
pub mod encoder;
pub mod file_queue;
pub mod heap;
pub mod print_queue;

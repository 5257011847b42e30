//! Response generation on top of the memory layer.
//!
//! The engine answers a user message from the active context and then
//! schedules maintenance; it never waits for that maintenance.

pub mod context;
pub mod engine;

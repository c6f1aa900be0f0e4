//! Domain model: orders, queue messages, and the ports the engine depends on.

pub mod message;
pub mod order;
pub mod ports;

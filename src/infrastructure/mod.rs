//! Adapters implementing the domain ports.

pub mod in_memory;
pub mod memory_queue;
pub mod simulated_payment;

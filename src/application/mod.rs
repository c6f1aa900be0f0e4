//! Application layer: the order processing engine and everything that drives it.
//!
//! `OrderEngine` handles a single delivered message. `WorkerPool` runs any
//! number of consumer loops over it, each a `tokio` task sharing one stop
//! signal, one `AdmissionGate` and one `MetricsRegistry`.

pub mod engine;
pub mod gate;
pub mod ingest;
pub mod metrics;
pub mod pool;

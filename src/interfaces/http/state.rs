use crate::application::ingest::Ingestor;
use crate::application::pool::WorkerPool;
use std::sync::Arc;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<WorkerPool>,
    pub ingestor: Arc<Ingestor>,
}

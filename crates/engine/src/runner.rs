use std::future::Future;
use tokio::sync::broadcast;
use tracing::warn;

use appmodeler_core::Result;

use crate::events::EngineEvent;

/// Wraps every background operation: busy bracketing plus failure events.
///
/// A failed operation always produces exactly one `TaskFailed` before
/// `Busy(false)`; nothing is swallowed and nothing is retried.
#[derive(Clone)]
pub struct TaskRunner {
    events: broadcast::Sender<EngineEvent>,
}

impl TaskRunner {
    pub fn new(events: broadcast::Sender<EngineEvent>) -> Self {
        Self { events }
    }

    pub async fn run<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _ = self.events.send(EngineEvent::Busy(true));
        let result = fut.await;
        if let Err(e) = &result {
            warn!(operation, error = %e, "Operation failed");
            let _ = self.events.send(EngineEvent::TaskFailed {
                operation: operation.to_string(),
                message: e.to_string(),
            });
        }
        let _ = self.events.send(EngineEvent::Busy(false));
        result
    }
}

//! EventSink port - observers of terminal task transitions.
//!
//! Any number of sinks may be registered; each receives every event.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::TaskEvent;

#[derive(Debug, Error)]
#[error("event sink failed: {0}")]
pub struct EventSinkError(pub String);

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &TaskEvent) -> Result<(), EventSinkError>;
}

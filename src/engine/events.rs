//! Engine events
//!
//! Observers subscribe to `file` and `error` events for monitoring. This
//! channel is separate from the upload result: a slow, lagging or dropped
//! subscriber never changes what the caller gets back.

use super::EngineError;
use crate::store::ObjectHandle;
use crate::upload::FileInfo;
use tokio::sync::broadcast;

/// Events buffered per subscriber before the oldest are dropped
const EVENT_CAPACITY: usize = 256;

/// Observable engine event
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// An upload succeeded
    File { file: FileInfo, object: ObjectHandle },
    /// An upload or removal failed
    Error { error: EngineError },
}

impl EngineEvent {
    /// Event name (`file` or `error`)
    pub fn name(&self) -> &'static str {
        match self {
            Self::File { .. } => "file",
            Self::Error { .. } => "error",
        }
    }
}

/// Fan-out of engine events to subscribers
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish to current subscribers; no subscribers is not an error
    pub fn emit(&self, event: EngineEvent) {
        let name = event.name();
        if self.sender.send(event).is_err() {
            tracing::trace!(event = name, "No event subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

use serde::Serialize;
use tokio::sync::broadcast;

/// Lifecycle notifications published after a change is committed.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum NodeEvent {
    Created { id: String, parent: String },
    Updated { id: String, version: u64 },
    Moved { id: String, new_parent: String },
    Copied { id: String, source: String },
    Trashed { id: String, cascade: usize },
    Restored { id: String, cascade: usize },
    Deleted { id: String, removed: usize },
    Released { id: String, release: u64 },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<NodeEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.tx.subscribe()
    }

    /// Fire and forget; having no subscribers is not an error.
    pub fn send(&self, event: NodeEvent) {
        let _ = self.tx.send(event);
    }
}

//! Change notification plumbing.
//!
//! Every task mutation becomes a [`NodeUpdate`]. Nodes forward them to their
//! own listeners, and each graph owns an [`UpdateBus`] that aggregates the
//! updates of all of its nodes for external observers (e.g. a transport that
//! mirrors live state to a UI).

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tasks::TaskState;
use tokio::sync::broadcast;

use crate::NodeId;

/// A node's task changed state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    pub node_id: NodeId,
    pub state: TaskState,
}

pub type NodeCallback = Arc<dyn Fn(&NodeUpdate) + Send + Sync>;

/// Shared list of callbacks. Cloning shares the list.
#[derive(Clone, Default)]
pub struct Listeners {
    inner: Arc<Mutex<Vec<NodeCallback>>>,
}

impl Listeners {
    pub fn push(&self, callback: NodeCallback) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }

    /// Calls every callback. The list lock is not held while they run, so a
    /// callback may register further callbacks.
    pub fn emit(&self, update: &NodeUpdate) {
        let callbacks = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in callbacks {
            callback(update);
        }
    }
}

const BUS_CAPACITY: usize = 256;

/// Per-graph update stream, consumable as callbacks or as a broadcast channel.
#[derive(Clone)]
pub struct UpdateBus {
    listeners: Listeners,
    sender: broadcast::Sender<NodeUpdate>,
}

impl Default for UpdateBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            listeners: Listeners::default(),
            sender,
        }
    }
}

impl UpdateBus {
    pub fn on_update(&self, callback: NodeCallback) {
        self.listeners.push(callback);
    }

    /// Receivers that fall more than the channel capacity behind skip the
    /// oldest updates (`RecvError::Lagged`).
    pub fn subscribe(&self) -> broadcast::Receiver<NodeUpdate> {
        self.sender.subscribe()
    }

    pub fn publish(&self, update: &NodeUpdate) {
        self.listeners.emit(update);
        // No receivers is fine.
        let _ = self.sender.send(update.clone());
    }
}

//! Per-worker FIFO of ready nodes.

use super::graph::NodeId;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Mutex-protected FIFO holding the ids of nodes ready to run.
///
/// `pop` never blocks on an empty queue; workers move on to the next
/// queue instead.
#[derive(Debug, Default)]
pub(crate) struct TaskQueue {
    data: Mutex<VecDeque<NodeId>>,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, node: NodeId) {
        self.data.lock().push_back(node);
    }

    pub(crate) fn pop(&self) -> Option<NodeId> {
        self.data.lock().pop_front()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.data.lock().len()
    }
}

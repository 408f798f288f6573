//! The shared event queue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::exposure::Payload;
use crate::metrics;

/// One pending invocation: the event name and the payload it carries.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub event: String,
    pub payload: Payload,
}

/// FIFO of pending invocations, shared between the ingestion boundary,
/// the dispatcher workers and the steps themselves (the planner re-emits
/// through it). Clones share the same queue.
///
/// The lock is a plain std mutex held only for push/pop, never across
/// an await point.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    inner: Arc<Mutex<VecDeque<QueuedEvent>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pending invocation. Every producer funnels through here,
    /// so the queue depth gauge stays current no matter who pushes.
    pub fn push(&self, event: impl Into<String>, payload: Payload) {
        let mut q = self.inner.lock().unwrap();
        q.push_back(QueuedEvent {
            event: event.into(),
            payload,
        });
        metrics::EVENT_QUEUE_DEPTH.set(q.len() as i64);
    }

    /// Take the oldest pending invocation, if any.
    pub fn pop(&self) -> Option<QueuedEvent> {
        let mut q = self.inner.lock().unwrap();
        let queued = q.pop_front();
        metrics::EVENT_QUEUE_DEPTH.set(q.len() as i64);
        queued
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

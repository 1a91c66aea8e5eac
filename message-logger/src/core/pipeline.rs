/*!
Event pipeline with an explicit, ordered interceptor chain

Replaces the ambient patching a client plugin would do: interceptors are
registered and deregistered explicitly and see every event before it
reaches downstream consumers. Detached tasks re-enter the pipeline through
a queued sender rather than sharing state with the synchronous path.
*/

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::debug;

use crate::core::record::Message;

/// Raw deletion event as delivered by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionEvent {
    pub conversation_id: String,
    pub message_id: String,
    /// Set on deletions the logger re-emitted itself; those must never be
    /// intercepted again.
    #[serde(default)]
    pub cleanup: bool,
}

/// Replacement event telling the client a message changed rather than
/// disappeared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageUpdate {
    pub message: Message,
}

/// Events the pipeline understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientEvent {
    MessageDelete(DeletionEvent),
    MessageUpdate(MessageUpdate),
}

/// Outcome of one interceptor looking at an event before dispatch.
#[derive(Debug)]
pub enum Intercept {
    /// Let the event continue unchanged
    Pass,
    /// Drop the event entirely
    Suppress,
    /// Continue dispatch with a different event
    Replace(ClientEvent),
}

/// Middleware hook run before an event reaches consumers. Runs inline on
/// the dispatch loop and must not suspend.
pub trait Interceptor: Send {
    fn name(&self) -> &'static str;

    fn before_dispatch(&mut self, event: &ClientEvent) -> Intercept;
}

/// Downstream consumer of dispatched events.
pub trait EventConsumer: Send + Sync {
    fn on_event(&self, event: &ClientEvent);
}

/// Handle identifying a registered interceptor for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterceptorId(u64);

/// Single-threaded dispatch pipeline. Events run through the interceptor
/// chain in registration order; the surviving event is delivered to every
/// consumer. A cloneable sender lets detached tasks queue events that are
/// dispatched on the next drain.
pub struct EventPipeline {
    interceptors: Vec<(InterceptorId, Box<dyn Interceptor>)>,
    consumers: Vec<Arc<dyn EventConsumer>>,
    next_id: u64,
    queue_tx: mpsc::UnboundedSender<ClientEvent>,
    queue_rx: mpsc::UnboundedReceiver<ClientEvent>,
}

impl EventPipeline {
    pub fn new() -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            interceptors: Vec::new(),
            consumers: Vec::new(),
            next_id: 0,
            queue_tx,
            queue_rx,
        }
    }

    pub fn add_interceptor(&mut self, interceptor: Box<dyn Interceptor>) -> InterceptorId {
        let id = InterceptorId(self.next_id);
        self.next_id += 1;
        debug!(name = interceptor.name(), "interceptor registered");
        self.interceptors.push((id, interceptor));
        id
    }

    /// Returns false if the id was already removed.
    pub fn remove_interceptor(&mut self, id: InterceptorId) -> bool {
        let before = self.interceptors.len();
        self.interceptors.retain(|(other, _)| *other != id);
        self.interceptors.len() != before
    }

    /// Detach every interceptor, returning how many were removed.
    pub fn clear_interceptors(&mut self) -> usize {
        let removed = self.interceptors.len();
        self.interceptors.clear();
        removed
    }

    pub fn add_consumer(&mut self, consumer: Arc<dyn EventConsumer>) {
        self.consumers.push(consumer);
    }

    /// Sender detached tasks use to re-enter the pipeline.
    pub fn sender(&self) -> mpsc::UnboundedSender<ClientEvent> {
        self.queue_tx.clone()
    }

    /// Run one event through the interceptor chain and deliver the survivor
    /// to every consumer. Returns the delivered event, or None when an
    /// interceptor suppressed it.
    pub fn dispatch(&mut self, event: ClientEvent) -> Option<ClientEvent> {
        let mut current = event;
        for (_, interceptor) in &mut self.interceptors {
            match interceptor.before_dispatch(&current) {
                Intercept::Pass => {}
                Intercept::Suppress => {
                    debug!(interceptor = interceptor.name(), "event suppressed");
                    return None;
                }
                Intercept::Replace(replacement) => {
                    debug!(interceptor = interceptor.name(), "event replaced");
                    current = replacement;
                }
            }
        }
        for consumer in &self.consumers {
            consumer.on_event(&current);
        }
        Some(current)
    }

    /// Dispatch everything queued by detached tasks so far; returns the
    /// delivered events.
    pub fn drain_queued(&mut self) -> Vec<ClientEvent> {
        let mut delivered = Vec::new();
        while let Ok(event) = self.queue_rx.try_recv() {
            if let Some(event) = self.dispatch(event) {
                delivered.push(event);
            }
        }
        delivered
    }

    /// Stream of delivered events, dispatching queued re-entries as they
    /// arrive. Never terminates while the pipeline exists, since it holds
    /// its own sender.
    pub fn processed(&mut self) -> impl Stream<Item = ClientEvent> + '_ {
        async_stream::stream! {
            while let Some(event) = self.queue_rx.recv().await {
                if let Some(delivered) = self.dispatch(event) {
                    yield delivered;
                }
            }
        }
    }
}

impl Default for EventPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/*!
Intercepts message-deletion events inside a chat client, keeps deleted
messages visible as tombstones, and durably records them in per-conversation
append-only logs before the client can discard them.

Flow: a raw deletion event runs through the [`EventPipeline`] where the
[`DeletionInterceptor`] either lets it pass (cleanup re-emissions,
uncached/system/failed messages) or appends a snapshot to the
[`DeletionLog`] and replaces the deletion with an update carrying
`tombstoned = true`. The [`MessageRecord`] factory keeps that flag alive
across every later re-derivation of the record. For proxied messages an
optional detached [`ProxyResolver`] confirms true removal and re-emits a
synthetic cleanup deletion. On shutdown the [`MessageLogger`] detaches
interception, finalizes every log into valid JSON, and replays cleanup
deletions for messages still tombstoned in the cache.
*/

pub mod core;

pub use crate::core::cache::{ConversationSnapshot, InMemoryMessageCache, MessageCache};
pub use crate::core::config::{LoggerConfig, ProxyConfig, StorageConfig, LOG_DIR_NAME};
pub use crate::core::error::{LoggerError, Result};
pub use crate::core::interceptor::DeletionInterceptor;
pub use crate::core::log_writer::{DeletionLog, LogEntry};
pub use crate::core::pipeline::{
    ClientEvent, DeletionEvent, EventConsumer, EventPipeline, Intercept, Interceptor,
    InterceptorId, MessageUpdate,
};
pub use crate::core::proxy::{HttpProxyLookup, ProxyLookup, ProxyMember, ProxyMessage, ProxyResolver};
pub use crate::core::record::{
    Author, DeliveryState, Message, MessageRecord, Reaction, SYSTEM_AUTHOR_ID,
};
pub use crate::core::session::{MessageLogger, ShutdownReport};

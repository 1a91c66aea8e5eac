/*!
Message cache seam between the client and the logger core
*/

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::core::pipeline::{ClientEvent, EventConsumer};
use crate::core::record::{Message, MessageRecord};

/// Snapshot of one conversation's currently loaded records.
#[derive(Debug, Clone)]
pub struct ConversationSnapshot {
    pub conversation_id: String,
    pub records: Vec<MessageRecord>,
}

/// Read access to the client's per-conversation message cache. The logger
/// takes this as an injected handle; it never owns the cache.
pub trait MessageCache: Send + Sync {
    /// Fetch the record behind a deletion event, if it is loaded.
    fn record(&self, conversation_id: &str, message_id: &str) -> Option<MessageRecord>;

    /// Snapshot every loaded conversation, for shutdown reconciliation.
    fn conversations(&self) -> Vec<ConversationSnapshot>;
}

type ConversationMap = HashMap<String, HashMap<String, MessageRecord>>;

/// In-memory cache mirroring the client's conversation -> message map.
///
/// As an event consumer it applies delivered updates through the record
/// factory and honors delivered deletions by dropping the record; only
/// cleanup deletions ever reach consumers while the interceptor is
/// attached, so a drop here is the "real" deletion the logger previously
/// suppressed.
#[derive(Debug, Default)]
pub struct InMemoryMessageCache {
    conversations: Mutex<ConversationMap>,
}

impl InMemoryMessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ConversationMap> {
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a payload as a freshly created record.
    pub fn insert(&self, message: Message) {
        let conversation_id = message.channel_id.clone();
        let record = MessageRecord::from_payload(message);
        self.lock()
            .entry(conversation_id)
            .or_default()
            .insert(record.message.id.clone(), record);
    }

    pub fn remove(&self, conversation_id: &str, message_id: &str) -> Option<MessageRecord> {
        let mut conversations = self.lock();
        let conversation = conversations.get_mut(conversation_id)?;
        let removed = conversation.remove(message_id);
        if conversation.is_empty() {
            conversations.remove(conversation_id);
        }
        removed
    }

    /// Upsert through the record factory: existing records absorb the
    /// payload as an update, unknown ones are created from it.
    pub fn apply_update(&self, message: Message) {
        let mut conversations = self.lock();
        let conversation = conversations.entry(message.channel_id.clone()).or_default();
        let record = match conversation.get(&message.id) {
            Some(existing) => existing.apply_update(message),
            None => MessageRecord::from_payload(message),
        };
        conversation.insert(record.message.id.clone(), record);
    }

    pub fn message_count(&self) -> usize {
        self.lock().values().map(HashMap::len).sum()
    }
}

impl MessageCache for InMemoryMessageCache {
    fn record(&self, conversation_id: &str, message_id: &str) -> Option<MessageRecord> {
        self.lock().get(conversation_id)?.get(message_id).cloned()
    }

    fn conversations(&self) -> Vec<ConversationSnapshot> {
        self.lock()
            .iter()
            .map(|(conversation_id, records)| ConversationSnapshot {
                conversation_id: conversation_id.clone(),
                records: records.values().cloned().collect(),
            })
            .collect()
    }
}

impl EventConsumer for InMemoryMessageCache {
    fn on_event(&self, event: &ClientEvent) {
        match event {
            ClientEvent::MessageDelete(deletion) => {
                self.remove(&deletion.conversation_id, &deletion.message_id);
            }
            ClientEvent::MessageUpdate(update) => self.apply_update(update.message.clone()),
        }
    }
}

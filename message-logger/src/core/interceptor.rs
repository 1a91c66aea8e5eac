/*!
Deletion interception: per event, decide whether to suppress the visible
deletion and durably record the message first
*/

use std::sync::Arc;

use tracing::{error, info};

use crate::core::cache::MessageCache;
use crate::core::log_writer::DeletionLog;
use crate::core::pipeline::{ClientEvent, Intercept, Interceptor, MessageUpdate};
use crate::core::proxy::ProxyResolver;
use crate::core::record::{DeliveryState, SYSTEM_AUTHOR_ID};

/// Intercepts deletion events before normal dispatch. A real deletion is
/// logged and rewritten into a tombstone update, so the client is told
/// "this message changed" rather than "this message is gone". Cleanup
/// re-emissions and deletions not worth logging pass through untouched.
pub struct DeletionInterceptor {
    cache: Arc<dyn MessageCache>,
    log: Arc<DeletionLog>,
    resolver: Option<ProxyResolver>,
}

impl DeletionInterceptor {
    pub fn new(
        cache: Arc<dyn MessageCache>,
        log: Arc<DeletionLog>,
        resolver: Option<ProxyResolver>,
    ) -> Self {
        Self {
            cache,
            log,
            resolver,
        }
    }
}

impl Interceptor for DeletionInterceptor {
    fn name(&self) -> &'static str {
        "deletion-interceptor"
    }

    fn before_dispatch(&mut self, event: &ClientEvent) -> Intercept {
        let ClientEvent::MessageDelete(deletion) = event else {
            return Intercept::Pass;
        };
        // Never re-process a deletion this logger re-emitted itself.
        if deletion.cleanup {
            return Intercept::Pass;
        }
        let Some(record) = self
            .cache
            .record(&deletion.conversation_id, &deletion.message_id)
        else {
            // Never cached: nothing to log, not ours to handle.
            return Intercept::Pass;
        };
        if record.message.author.id == SYSTEM_AUTHOR_ID {
            return Intercept::Pass;
        }
        if record.message.state == DeliveryState::SendFailed {
            return Intercept::Pass;
        }

        if let Some(resolver) = &self.resolver {
            resolver.spawn_check(
                deletion.conversation_id.clone(),
                deletion.message_id.clone(),
            );
        }

        if let Err(err) = self.log.append(&deletion.conversation_id, &record.message) {
            // Keep tombstoning even when the snapshot could not be written.
            error!(
                conversation_id = %deletion.conversation_id,
                message_id = %deletion.message_id,
                %err,
                "failed to log deleted message"
            );
        }

        info!(
            conversation_id = %deletion.conversation_id,
            message_id = %deletion.message_id,
            "tombstoning deleted message"
        );

        let mut replacement = record.message;
        replacement.tombstoned = true;
        Intercept::Replace(ClientEvent::MessageUpdate(MessageUpdate {
            message: replacement,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::InMemoryMessageCache;
    use crate::core::pipeline::DeletionEvent;
    use crate::core::record::{Author, Message};

    fn message(id: &str, author_id: &str, state: DeliveryState) -> Message {
        Message {
            id: id.to_string(),
            channel_id: "c1".to_string(),
            author: Author {
                id: author_id.to_string(),
                username: "ada".to_string(),
            },
            content: "hi".to_string(),
            state,
            timestamp: 0,
            reactions: Vec::new(),
            tombstoned: false,
        }
    }

    fn deletion(id: &str, cleanup: bool) -> ClientEvent {
        ClientEvent::MessageDelete(DeletionEvent {
            conversation_id: "c1".to_string(),
            message_id: id.to_string(),
            cleanup,
        })
    }

    fn interceptor_with(
        cache: Arc<InMemoryMessageCache>,
        dir: &tempfile::TempDir,
    ) -> (DeletionInterceptor, Arc<DeletionLog>) {
        let log = Arc::new(DeletionLog::new(dir.path()).unwrap());
        (
            DeletionInterceptor::new(cache, Arc::clone(&log), None),
            log,
        )
    }

    #[test]
    fn real_deletion_is_logged_and_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(InMemoryMessageCache::new());
        cache.insert(message("m1", "42", DeliveryState::Sent));
        let (mut interceptor, log) = interceptor_with(Arc::clone(&cache), &dir);

        let outcome = interceptor.before_dispatch(&deletion("m1", false));
        let Intercept::Replace(ClientEvent::MessageUpdate(update)) = outcome else {
            panic!("expected a replacement update");
        };
        assert!(update.message.tombstoned);
        assert_eq!(update.message.id, "m1");
        assert_eq!(log.entries("c1").unwrap().len(), 1);
    }

    #[test]
    fn cleanup_events_pass_without_logging() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(InMemoryMessageCache::new());
        cache.insert(message("m1", "42", DeliveryState::Sent));
        let (mut interceptor, log) = interceptor_with(Arc::clone(&cache), &dir);

        assert!(matches!(
            interceptor.before_dispatch(&deletion("m1", true)),
            Intercept::Pass
        ));
        assert!(log.entries("c1").is_err());
    }

    #[test]
    fn uncached_system_and_failed_messages_pass() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(InMemoryMessageCache::new());
        cache.insert(message("sys", SYSTEM_AUTHOR_ID, DeliveryState::Sent));
        cache.insert(message("failed", "42", DeliveryState::SendFailed));
        let (mut interceptor, log) = interceptor_with(Arc::clone(&cache), &dir);

        for id in ["never-cached", "sys", "failed"] {
            assert!(matches!(
                interceptor.before_dispatch(&deletion(id, false)),
                Intercept::Pass
            ));
        }
        assert!(log.entries("c1").is_err());
    }

    #[test]
    fn replay_appends_twice_without_deduplication() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(InMemoryMessageCache::new());
        cache.insert(message("m1", "42", DeliveryState::Sent));
        let (mut interceptor, log) = interceptor_with(Arc::clone(&cache), &dir);

        // The cache still holds the record after the first interception (the
        // client saw an update, not a delete), so a replayed deletion is
        // logged again. The log is an audit trail, not a set.
        for _ in 0..2 {
            let outcome = interceptor.before_dispatch(&deletion("m1", false));
            let Intercept::Replace(ClientEvent::MessageUpdate(update)) = outcome else {
                panic!("expected a replacement update");
            };
            cache.apply_update(update.message);
        }

        assert_eq!(log.entries("c1").unwrap().len(), 2);
        assert!(cache.record("c1", "m1").unwrap().tombstoned);
    }
}

/*!
Session lifecycle: wiring, the dispatch loop, and shutdown reconciliation
*/

use std::sync::Arc;

use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::core::cache::MessageCache;
use crate::core::config::LoggerConfig;
use crate::core::error::Result;
use crate::core::interceptor::DeletionInterceptor;
use crate::core::log_writer::DeletionLog;
use crate::core::pipeline::{ClientEvent, DeletionEvent, EventPipeline, InterceptorId};
use crate::core::proxy::{HttpProxyLookup, ProxyResolver};

/// Counters reported by a completed shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Log files rewritten into valid JSON
    pub finalized_logs: usize,
    /// Synthetic cleanup deletions replayed for still-tombstoned messages
    pub replayed_deletions: usize,
}

/// Top-level coordinator owning the pipeline, the log writer, and the
/// interceptor registration for one plugin session.
pub struct MessageLogger {
    config: LoggerConfig,
    cache: Arc<dyn MessageCache>,
    log: Arc<DeletionLog>,
    pipeline: EventPipeline,
    interceptor_id: InterceptorId,
}

impl MessageLogger {
    /// Wire up a session against the injected message cache. A proxy
    /// resolver is attached only when enabled in the config.
    pub fn new(config: LoggerConfig, cache: Arc<dyn MessageCache>) -> Result<Self> {
        let log = Arc::new(DeletionLog::new(config.log_directory()?)?);
        let mut pipeline = EventPipeline::new();

        let resolver = config.proxy.enabled.then(|| {
            ProxyResolver::new(
                Arc::new(HttpProxyLookup::new(config.proxy.base_url.clone())),
                pipeline.sender(),
            )
        });
        let interceptor =
            DeletionInterceptor::new(Arc::clone(&cache), Arc::clone(&log), resolver);
        let interceptor_id = pipeline.add_interceptor(Box::new(interceptor));

        info!(proxy_enabled = config.proxy.enabled, "message logger session started");
        Ok(Self {
            config,
            cache,
            log,
            pipeline,
            interceptor_id,
        })
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    pub fn log(&self) -> &DeletionLog {
        &self.log
    }

    /// Pipeline access for registering host consumers or extra middleware.
    pub fn pipeline_mut(&mut self) -> &mut EventPipeline {
        &mut self.pipeline
    }

    /// Feed one client event through the interception chain; returns the
    /// delivered event, if any.
    pub fn handle_event(&mut self, event: ClientEvent) -> Option<ClientEvent> {
        self.pipeline.dispatch(event)
    }

    /// Drive the pipeline until the session is torn down, dispatching
    /// events re-emitted by detached resolver tasks as they arrive.
    pub async fn run(&mut self) {
        let mut processed = std::pin::pin!(self.pipeline.processed());
        while let Some(event) = processed.next().await {
            debug!(?event, "dispatched");
        }
    }

    /// Finalize the session exactly once: detach interception, close every
    /// log, then replay a cleanup deletion for each message still
    /// tombstoned in the cache so the client performs the real deletion it
    /// was prevented from doing.
    pub fn shutdown(mut self) -> Result<ShutdownReport> {
        // Detach our interceptor plus anything else still registered; from
        // here on no deletion can reach the log.
        self.pipeline.remove_interceptor(self.interceptor_id);
        let detached = self.pipeline.clear_interceptors();
        debug!(detached = detached + 1, "interceptors detached");

        let finalized_logs = self.log.finalize_all()?;

        let mut replayed_deletions = 0;
        for snapshot in self.cache.conversations() {
            for record in snapshot.records {
                if !record.tombstoned {
                    continue;
                }
                self.pipeline
                    .dispatch(ClientEvent::MessageDelete(DeletionEvent {
                        conversation_id: snapshot.conversation_id.clone(),
                        message_id: record.message.id.clone(),
                        cleanup: true,
                    }));
                replayed_deletions += 1;
            }
        }

        info!(
            finalized_logs,
            replayed_deletions, "message logger session shut down"
        );
        Ok(ShutdownReport {
            finalized_logs,
            replayed_deletions,
        })
    }
}

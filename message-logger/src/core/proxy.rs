/*!
Best-effort proxy-deletion confirmation for tombstoned messages

Messages sent through a third-party proxy service get a two-phase
deletion: first tombstone-and-log, then, only if the service confirms the
message is the canonical original and not worth keeping, a synthetic
cleanup deletion lets the client actually remove it. The lookup is purely
advisory; every failure is dropped without touching the synchronous path.
*/

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::core::pipeline::{ClientEvent, DeletionEvent};

type LookupError = Box<dyn std::error::Error + Send + Sync>;

/// Proxy service's view of a message.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyMessage {
    /// Id of the canonical original message
    pub original: String,
    #[serde(default)]
    pub member: Option<ProxyMember>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyMember {
    #[serde(default)]
    pub keep_proxy: bool,
}

/// Outbound lookup against the proxy service.
#[async_trait]
pub trait ProxyLookup: Send + Sync {
    /// Fetch the proxy record for a message id. `Ok(None)` means the
    /// service answered but has no signal for this message.
    async fn message(&self, message_id: &str) -> Result<Option<ProxyMessage>, LookupError>;
}

/// reqwest-backed lookup: one `GET {base}/messages/{id}` per check.
pub struct HttpProxyLookup {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProxyLookup {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProxyLookup for HttpProxyLookup {
    async fn message(&self, message_id: &str) -> Result<Option<ProxyMessage>, LookupError> {
        let url = format!(
            "{}/messages/{message_id}",
            self.base_url.trim_end_matches('/')
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        Ok(Some(response.json().await?))
    }
}

/// True when the service confirms the message is the canonical original and
/// the proxied copy should not be preserved. A missing member block counts
/// as "do not keep".
fn confirms_removal(proxied: &ProxyMessage, message_id: &str) -> bool {
    let keep = proxied
        .member
        .as_ref()
        .map(|member| member.keep_proxy)
        .unwrap_or(false);
    proxied.original == message_id && !keep
}

/// Spawns detached confirmation tasks. The only effect of a task is
/// re-emitting a synthetic cleanup deletion into the pipeline; it shares no
/// state with the synchronous dispatch path.
#[derive(Clone)]
pub struct ProxyResolver {
    lookup: Arc<dyn ProxyLookup>,
    events: UnboundedSender<ClientEvent>,
}

impl ProxyResolver {
    pub fn new(lookup: Arc<dyn ProxyLookup>, events: UnboundedSender<ClientEvent>) -> Self {
        Self { lookup, events }
    }

    /// Fire-and-forget check for one tombstoned message. Must be called
    /// from within a tokio runtime; no timeout is imposed, a hung lookup
    /// simply never resolves.
    pub fn spawn_check(&self, conversation_id: String, message_id: String) {
        let lookup = Arc::clone(&self.lookup);
        let events = self.events.clone();
        tokio::spawn(async move {
            match lookup.message(&message_id).await {
                Ok(Some(proxied)) if confirms_removal(&proxied, &message_id) => {
                    debug!(%message_id, "proxy confirmed removal, queueing cleanup deletion");
                    let _ = events.send(ClientEvent::MessageDelete(DeletionEvent {
                        conversation_id,
                        message_id,
                        cleanup: true,
                    }));
                }
                Ok(_) => {}
                Err(error) => {
                    // Advisory only; the tombstone stands either way.
                    debug!(%message_id, %error, "proxy lookup failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn proxied(original: &str, member: Option<bool>) -> ProxyMessage {
        ProxyMessage {
            original: original.to_string(),
            member: member.map(|keep_proxy| ProxyMember { keep_proxy }),
        }
    }

    #[test]
    fn removal_rules() {
        assert!(confirms_removal(&proxied("m1", Some(false)), "m1"));
        assert!(confirms_removal(&proxied("m1", None), "m1"));
        assert!(!confirms_removal(&proxied("m1", Some(true)), "m1"));
        // An alias points at a different original; leave it alone.
        assert!(!confirms_removal(&proxied("m0", Some(false)), "m1"));
    }

    #[tokio::test]
    async fn confirmed_removal_queues_one_cleanup_deletion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/messages/m1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "original": "m1",
                "member": { "keep_proxy": false }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let resolver = ProxyResolver::new(Arc::new(HttpProxyLookup::new(server.uri())), tx);
        resolver.spawn_check("c1".to_string(), "m1".to_string());

        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("resolver should emit before timeout")
            .unwrap();
        assert_eq!(
            event,
            ClientEvent::MessageDelete(DeletionEvent {
                conversation_id: "c1".to_string(),
                message_id: "m1".to_string(),
                cleanup: true,
            })
        );
    }

    #[tokio::test]
    async fn keep_proxy_and_failures_emit_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/messages/kept"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "original": "kept",
                "member": { "keep_proxy": true }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/messages/unknown"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let resolver = ProxyResolver::new(Arc::new(HttpProxyLookup::new(server.uri())), tx);
        resolver.spawn_check("c1".to_string(), "kept".to_string());
        resolver.spawn_check("c1".to_string(), "unknown".to_string());

        assert!(
            timeout(Duration::from_millis(300), rx.recv()).await.is_err(),
            "no cleanup deletion expected"
        );
    }

    #[tokio::test]
    async fn transport_failure_is_swallowed() {
        // Nothing listens on this port; the lookup errors out quietly.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let resolver = ProxyResolver::new(Arc::new(HttpProxyLookup::new("http://127.0.0.1:9")), tx);
        resolver.spawn_check("c1".to_string(), "m1".to_string());

        assert!(timeout(Duration::from_millis(300), rx.recv()).await.is_err());
    }
}

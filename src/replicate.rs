//! Replication - fan-out of lifecycle/goal events to a session's clients
//!
//! The wire transport is external; this module defines the pub/sub boundary,
//! the message envelope, and the delivery policy: one active subscription per
//! client per match, time-boxed publishes, and exactly one reconnect after a
//! transport failure. Resubscription never replays historical events - late
//! joiners converge from the canonical status message instead.

use crate::error::{MatchError, Result};
use crate::types::{MatchMessage, match_topic};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tokio::time::{Duration, sleep, timeout};
use tracing::{debug, info, warn};

/// A message as delivered by the transport. `sender` is stamped by the
/// publishing client's transport so receivers can skip their own events.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub sender: String,
    pub payload: String,
}

pub type MessageHandler = Arc<dyn Fn(Envelope) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub String);

/// Pub/sub primitive consumed by the replicator. Implementations own the
/// client identity and the wire; this crate only defines message shapes and
/// delivery semantics.
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Identity stamped on published envelopes.
    fn client_id(&self) -> String;
    async fn publish(&self, topic: &str, payload: &str) -> Result<()>;
    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<SubscriptionId>;
    async fn unsubscribe(&self, id: &SubscriptionId) -> Result<()>;
}

struct ActiveSubscription {
    match_id: String,
    sub_id: SubscriptionId,
    handler: MessageHandler,
}

pub struct Replicator {
    transport: Arc<dyn PubSub>,
    reconnect_delay: Duration,
    publish_timeout: Duration,
    active: Arc<RwLock<Option<ActiveSubscription>>>,
    reconnect_pending: Arc<AtomicBool>,
}

impl Replicator {
    pub fn new(
        transport: Arc<dyn PubSub>,
        reconnect_delay: Duration,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            reconnect_delay,
            publish_timeout,
            active: Arc::new(RwLock::new(None)),
            reconnect_pending: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn client_id(&self) -> String {
        self.transport.client_id()
    }

    pub async fn subscribed_match(&self) -> Option<String> {
        self.active.read().await.as_ref().map(|a| a.match_id.clone())
    }

    /// Subscribe this client to a match session. Any prior subscription is
    /// torn down first - never two listeners for one client.
    pub async fn subscribe_session(&self, match_id: &str, handler: MessageHandler) -> Result<()> {
        self.unsubscribe_session().await;

        let topic = match_topic(match_id);
        let me = self.transport.client_id();
        let wrapped: MessageHandler = Arc::new(move |envelope: Envelope| {
            // Skip own events
            if envelope.sender == me {
                return;
            }
            handler(envelope);
        });

        let sub_id = self.transport.subscribe(&topic, wrapped.clone()).await?;
        *self.active.write().await = Some(ActiveSubscription {
            match_id: match_id.to_string(),
            sub_id,
            handler: wrapped,
        });

        debug!("Subscribed to {}", topic);
        Ok(())
    }

    /// Guaranteed local teardown; a transport refusal is logged, not raised.
    pub async fn unsubscribe_session(&self) {
        if let Some(active) = self.active.write().await.take() {
            if let Err(e) = self.transport.unsubscribe(&active.sub_id).await {
                warn!("Unsubscribe from {} failed: {}", active.match_id, e);
            }
        }
    }

    /// Publish a message to a session's topic, time-boxed. A transport
    /// failure or timeout schedules the single reconnect and is returned to
    /// the caller for queueing.
    pub async fn publish(&self, match_id: &str, message: &MatchMessage) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        let topic = match_topic(match_id);

        let result = match timeout(self.publish_timeout, self.transport.publish(&topic, &payload))
            .await
        {
            Ok(r) => r,
            Err(_) => Err(MatchError::Timeout),
        };

        if let Err(e) = &result {
            if e.is_retryable() {
                warn!("Publish to {} failed: {}", topic, e);
                self.schedule_reconnect();
            }
        }
        result
    }

    /// Schedule exactly one reconnect after the fixed delay. Further failures
    /// while it is pending do not stack additional attempts.
    fn schedule_reconnect(&self) {
        if self.reconnect_pending.swap(true, Ordering::SeqCst) {
            return;
        }

        let transport = self.transport.clone();
        let active = self.active.clone();
        let pending = self.reconnect_pending.clone();
        let delay = self.reconnect_delay;

        tokio::spawn(async move {
            sleep(delay).await;

            let mut guard = active.write().await;
            if let Some(sub) = guard.as_mut() {
                let topic = match_topic(&sub.match_id);
                let _ = transport.unsubscribe(&sub.sub_id).await;
                match transport.subscribe(&topic, sub.handler.clone()).await {
                    Ok(new_id) => {
                        sub.sub_id = new_id;
                        info!("Resubscribed to {}", topic);
                    }
                    Err(e) => warn!("Reconnect to {} failed: {}", topic, e),
                }
            }
            pending.store(false, Ordering::SeqCst);
        });
    }
}

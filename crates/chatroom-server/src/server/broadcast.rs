//! Message fan-out to every registered session.
//!
//! [`BroadcastEngine::broadcast`] snapshots the [`SessionRegistry`], releases
//! the lock, and then delivers one copy of the message to every sink in the
//! snapshot, including the sender's own. Deliveries run concurrently and each
//! is bounded by the configured send timeout, so a closed or stalled client
//! costs the others nothing beyond that bound. Failures are logged and
//! counted, never returned.
//!
//! Each call returns only after every recipient either accepted the message
//! or was given up on. A session submits its messages one at a time, so every
//! recipient sees that session's messages in submission order.

use crate::server::{
    registry::{DeliveryError, SessionRegistry},
    telemetry::record_deliveries,
};
use chatroom_core::proto::ChatMessage;
use core::time::Duration;
use futures::future::join_all;
use std::sync::Arc;

/// Outcome of one broadcast, for logging and tests. Never an error.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DeliveryReport {
    pub fn recipients(&self) -> usize {
        self.delivered + self.failed
    }
}

pub struct BroadcastEngine {
    registry: Arc<SessionRegistry>,
    send_timeout: Duration,
}

impl BroadcastEngine {
    pub fn new(registry: Arc<SessionRegistry>, send_timeout: Duration) -> Self {
        Self {
            registry,
            send_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Delivers `message` to every session registered at the time of the
    /// call.
    #[tracing::instrument(
        skip_all,
        fields(sender = %message.username, system = message.is_system())
    )]
    pub async fn broadcast(&self, message: ChatMessage) -> DeliveryReport {
        let recipients = self.registry.snapshot_all();
        if recipients.is_empty() {
            return DeliveryReport::default();
        }

        let send_timeout = self.send_timeout;
        let sends = recipients.into_iter().map(|(username, sink)| {
            let message = message.clone();
            async move {
                match sink.deliver(message, send_timeout).await {
                    Ok(()) => true,
                    Err(DeliveryError::Closed) => {
                        tracing::debug!(recipient = %username, "Skipping closed stream");
                        false
                    }
                    Err(e @ DeliveryError::TimedOut(_)) => {
                        tracing::warn!(recipient = %username, "Dropping message: {e}");
                        false
                    }
                }
            }
        });

        let results = join_all(sends).await;
        let delivered = results.iter().filter(|ok| **ok).count();
        let report = DeliveryReport {
            delivered,
            failed: results.len() - delivered,
        };

        record_deliveries(report.delivered, report.failed);
        tracing::trace!(
            recipients = report.recipients(),
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast complete"
        );
        report
    }

    /// Broadcasts the system-authored "`username` joined" announcement.
    pub async fn announce_join(&self, username: &str) -> DeliveryReport {
        self.broadcast(ChatMessage::join_announcement(username)).await
    }
}

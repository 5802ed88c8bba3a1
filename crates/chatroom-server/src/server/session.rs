//! Per-connection chat session.
//!
//! A [`ChatSession`] owns one client's `Chat` stream from the first inbound
//! frame to teardown:
//!
//! ```text
//! Unidentified --first frame--> Active --end of input / error / shutdown--> Closed
//!      |                                                                      ^
//!      +------------------ stream ends before any frame ----------------------+
//! ```
//!
//! The first frame names the user and registers the session's sink; a
//! "`<user>` joined" announcement follows. Every later frame is stamped with
//! the server's clock and handed to the [`BroadcastEngine`]. On the way out
//! the session removes its own registry entry, and only its own: a newer
//! stream that took over the username is left alone.

use crate::server::{
    broadcast::BroadcastEngine,
    registry::{SessionRegistry, SessionSink},
    telemetry::{
        decrement_sessions_active, increment_messages_relayed, increment_sessions_active,
        record_session_duration,
    },
};
use chatroom_core::{Error, proto::ChatMessage, types::unix_timestamp};
use core::time::Duration;
use futures::{Stream, StreamExt};
use std::{sync::Arc, time::Instant};
use tokio_util::sync::CancellationToken;
use tonic::Status;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Stream open, no frame received yet.
    Unidentified,
    /// Registered under `username`.
    Active { username: String, since: Instant },
    /// Terminal.
    Closed,
}

pub struct ChatSession {
    state: SessionState,
    sink: SessionSink,
    registry: Arc<SessionRegistry>,
    engine: Arc<BroadcastEngine>,
    shutdown: CancellationToken,
    send_timeout: Duration,
}

impl ChatSession {
    pub fn new(
        sink: SessionSink,
        engine: Arc<BroadcastEngine>,
        shutdown: CancellationToken,
        send_timeout: Duration,
    ) -> Self {
        Self {
            state: SessionState::Unidentified,
            sink,
            registry: Arc::clone(engine.registry()),
            engine,
            shutdown,
            send_timeout,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &SessionState {
        &self.state
    }

    /// Drives the session until the inbound stream ends, fails, or the server
    /// shuts down. The session is always `Closed` and deregistered when this
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns the inbound stream's error, or `InvalidArgument` if the
    /// identifying frame carries no username. The same status is also pushed
    /// to the client's response stream, best effort.
    pub async fn run<S>(mut self, inbound: S) -> Result<(), Status>
    where
        S: Stream<Item = Result<ChatMessage, Status>> + Send,
    {
        tokio::pin!(inbound);

        let result = self.drive(&mut inbound).await;
        if let Err(status) = &result {
            self.sink.fail(status.clone(), self.send_timeout).await;
        }
        self.close();
        result
    }

    async fn drive<S>(&mut self, inbound: &mut core::pin::Pin<&mut S>) -> Result<(), Status>
    where
        S: Stream<Item = Result<ChatMessage, Status>> + Send,
    {
        let Some(first) = self.next_frame(inbound).await else {
            tracing::debug!("Stream closed before identifying");
            return Ok(());
        };
        self.identify(first?).await?;

        while let Some(frame) = self.next_frame(inbound).await {
            self.relay(frame?).await;
        }
        Ok(())
    }

    /// Next inbound frame, or `None` on end of input or server shutdown.
    async fn next_frame<S>(
        &self,
        inbound: &mut core::pin::Pin<&mut S>,
    ) -> Option<Result<ChatMessage, Status>>
    where
        S: Stream<Item = Result<ChatMessage, Status>> + Send,
    {
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => None,
            frame = inbound.next() => frame,
        }
    }

    /// `Unidentified -> Active`. The frame's content is ignored.
    async fn identify(&mut self, frame: ChatMessage) -> Result<(), Status> {
        let username = frame.username;
        if username.trim().is_empty() {
            return Err(Error::InvalidRequest {
                reason: "first frame must carry a username".to_string(),
            }
            .into());
        }

        if self.registry.register(&username, self.sink.clone()) {
            // The earlier stream keeps running but no longer receives
            // broadcasts.
            tracing::warn!(%username, "Replaced an existing session for this user");
        }
        increment_sessions_active();
        tracing::info!(%username, "Session joined");

        self.state = SessionState::Active {
            username: username.clone(),
            since: Instant::now(),
        };
        self.engine.announce_join(&username).await;
        Ok(())
    }

    /// Stamps and broadcasts one client frame. The sender field is forwarded
    /// as the client sent it.
    async fn relay(&self, frame: ChatMessage) {
        let SessionState::Active { username, .. } = &self.state else {
            return;
        };
        if frame.username != *username {
            tracing::warn!(
                %username,
                claimed = %frame.username,
                "Frame sender differs from the session identity"
            );
        }

        let message = frame.stamped(unix_timestamp());

        increment_messages_relayed();
        self.engine.broadcast(message).await;
    }

    /// `* -> Closed`, removing this session's own registry entry.
    fn close(&mut self) {
        let previous = core::mem::replace(&mut self.state, SessionState::Closed);
        if let SessionState::Active { username, since } = previous {
            if !self.registry.unregister(&username, &self.sink) {
                tracing::debug!(%username, "Entry already taken over by a newer session");
            }
            decrement_sessions_active();
            record_session_duration(since.elapsed().as_millis() as f64);
            tracing::info!(%username, "Session left");
        }
    }
}

use chatroom_core::proto::ChatMessage;
use core::time::Duration;
use tokio::{sync::mpsc, time::timeout};
use tonic::Status;

/// Item type of a client's outbound gRPC stream.
pub type Outbound = Result<ChatMessage, Status>;

/// Write side of one client's `Chat` response stream.
///
/// A sink is a cheap, cloneable handle to a bounded channel whose receiver is
/// the gRPC response stream. Clones refer to the same connection, which is how
/// the registry tells a session's own sink apart from a newer one registered
/// under the same username.
#[derive(Clone, Debug)]
pub struct SessionSink {
    tx: mpsc::Sender<Outbound>,
}

/// Why a single delivery did not reach its recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The recipient's stream is gone.
    #[error("recipient stream closed")]
    Closed,
    /// The recipient's buffer stayed full for the whole send timeout.
    #[error("recipient buffer full after {0:?}")]
    TimedOut(Duration),
}

impl SessionSink {
    /// Creates a sink and the receiver that backs the client's response
    /// stream. `buffer` must be greater than zero.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    /// Whether both handles write to the same client stream.
    pub fn same_as(&self, other: &Self) -> bool {
        self.tx.same_channel(&other.tx)
    }

    /// Delivers `message`, waiting at most `send_timeout` if the client's
    /// buffer is full.
    ///
    /// Tries a non-blocking send first so the common case never touches the
    /// timer.
    pub async fn deliver(
        &self,
        message: ChatMessage,
        send_timeout: Duration,
    ) -> Result<(), DeliveryError> {
        match self.tx.try_send(Ok(message)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(item)) => {
                match timeout(send_timeout, self.tx.send(item)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(_)) => Err(DeliveryError::Closed),
                    Err(_) => Err(DeliveryError::TimedOut(send_timeout)),
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DeliveryError::Closed),
        }
    }

    /// Ends the client's stream with `status`, best effort.
    ///
    /// The stream itself only finishes once every clone of the sink is
    /// dropped.
    pub async fn fail(&self, status: Status, send_timeout: Duration) {
        if let Err(_e) = timeout(send_timeout, self.tx.send(Err(status))).await {
            tracing::debug!("Dropped terminal status for a stalled stream");
        }
    }
}

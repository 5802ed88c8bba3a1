//! Shared protocol bindings, types and errors for the chatroom service.
//!
//! ## Submodules
//!
//! - [`error`] - Service error type and its mapping to `tonic::Status`.
//! - [`types`] - Constants and helpers around [`proto::ChatMessage`].
//! - [`proto`] - Generated Protobuf messages and the `ChatService` client and
//!   server bindings.

pub mod error;
pub mod types;

pub use error::{Error, Result};

/// gRPC service and message definitions generated from `proto/chat.proto`.
///
/// ## Service
///
/// - `Register` - Creates an account. Duplicate usernames are reported with
///   `success = false`.
/// - `Login` - Verifies credentials and issues an opaque token.
/// - `Chat` - Bidirectional stream of [`ChatMessage`](proto::ChatMessage). The
///   first client frame identifies the user; every later frame is relayed to
///   all connected clients.
pub mod proto {
    tonic::include_proto!("chat");
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("chat_descriptor");
}

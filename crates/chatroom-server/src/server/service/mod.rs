//! gRPC entry point.
//!
//! [`handler::ChatServer`] implements the generated [`ChatService`] trait: the
//! unary `Register` and `Login` calls go straight to the account store, and
//! each `Chat` stream is handed to its own [`ChatSession`] task.
//!
//! [`ChatService`]: chatroom_core::proto::chat_service_server::ChatService
//! [`ChatSession`]: crate::server::session::ChatSession

pub mod handler;

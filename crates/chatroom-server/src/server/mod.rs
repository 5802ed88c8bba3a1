//! Server-side components of the chat room.
//!
//! ## Submodules
//!
//! - [`accounts`] - Credential storage behind `Register` and `Login`.
//! - [`registry`] - Username to outbound-sink map shared by all sessions.
//! - [`broadcast`] - Fan-out of one message to every registered sink.
//! - [`session`] - Lifecycle of a single `Chat` stream.
//! - [`service`] - The tonic service tying the above together.
//! - [`config`] - CLI / environment configuration.
//! - [`telemetry`] - Tracing subscriber and optional OpenTelemetry export.

pub mod accounts;
pub mod broadcast;
pub mod config;
pub mod registry;
pub mod service;
pub mod session;
pub mod telemetry;

//! gRPC service implementation for the chat room.
//!
//! [`ChatServer`] owns the shared state of a running server: the account
//! store, the session registry, the broadcast engine, and the shutdown token
//! every session listens on.
//!
//! ## Key Responsibilities
//!
//! - Answer `Register` / `Login` from the [`AccountStore`], hashing on the
//!   blocking pool.
//! - Turn every `Chat` call into a spawned [`ChatSession`] whose outbound sink
//!   backs the response stream.
//! - Refuse new streams and drain live ones on [`ChatServer::shutdown`].
use crate::server::{
    accounts::{AccountStore, memory::MemoryAccountStore},
    broadcast::BroadcastEngine,
    config::ServerConfig,
    registry::{SessionRegistry, SessionSink},
    session::ChatSession,
    telemetry::record_auth_attempt,
};
use chatroom_core::{
    Error,
    proto::{
        ChatMessage, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
        chat_service_server::ChatService,
    },
};
use core::{pin::Pin, time::Duration};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};
use tracing::Instrument;

const REGISTERED: &str = "registration successful";
const LOGGED_IN: &str = "login successful";

/// How often [`ChatServer::shutdown`] checks whether sessions have drained.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// gRPC service for the chat room.
///
/// Cheap to clone; every clone shares the same registry, account store and
/// shutdown token.
#[derive(Clone)]
pub struct ChatServer {
    config: ServerConfig,
    accounts: Arc<dyn AccountStore>,
    engine: Arc<BroadcastEngine>,
    shutdown_token: CancellationToken,
}

impl ChatServer {
    /// Creates a server backed by an in-memory account store.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_account_store(config, Arc::new(MemoryAccountStore::new()))
    }

    pub fn with_account_store(config: ServerConfig, accounts: Arc<dyn AccountStore>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let engine = Arc::new(BroadcastEngine::new(registry, config.send_timeout));
        Self {
            config,
            accounts,
            engine,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.engine.registry()
    }

    /// Stops accepting chat streams and ends the live ones.
    ///
    /// Cancels the shared token, then waits up to the configured
    /// `shutdown_timeout` for every session to leave the registry.
    pub async fn shutdown(&self) -> Result<(), Error> {
        tracing::info!("Closing chat sessions");
        self.shutdown_token.cancel();

        let deadline = Instant::now() + self.config.shutdown_timeout;
        while !self.registry().is_empty() {
            if Instant::now() >= deadline {
                tracing::warn!(
                    remaining = self.registry().len(),
                    "Timed out waiting for chat sessions to close"
                );
                return Ok(());
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }

        tracing::info!("All chat sessions closed");
        Ok(())
    }

    /// Runs an account store call on the blocking pool.
    async fn with_accounts<F>(&self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&dyn AccountStore) -> Result<(), Error> + Send + 'static,
    {
        let accounts = Arc::clone(&self.accounts);
        tokio::task::spawn_blocking(move || f(accounts.as_ref()))
            .await
            .map_err(|e| Error::ChannelError {
                context: format!("Account task failed: {e}"),
            })?
    }
}

#[tonic::async_trait]
impl ChatService for ChatServer {
    type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatMessage, Status>> + Send>>;

    #[tracing::instrument(skip_all, fields(username = %req.get_ref().username))]
    async fn register(
        &self,
        req: Request<RegisterRequest>,
    ) -> Result<Response<RegisterResponse>, Status> {
        let RegisterRequest { username, password } = req.into_inner();

        let result = self
            .with_accounts(move |accounts| accounts.register(&username, &password))
            .await;

        let response = match result {
            Ok(()) => {
                tracing::info!("Account registered");
                record_auth_attempt("register", "success");
                RegisterResponse {
                    success: true,
                    message: REGISTERED.to_string(),
                }
            }
            Err(e @ Error::AccountExists) => {
                tracing::debug!("Registration refused: {e}");
                record_auth_attempt("register", "failure");
                RegisterResponse {
                    success: false,
                    message: e.to_string(),
                }
            }
            Err(e) => {
                tracing::error!("Registration failed: {e}");
                record_auth_attempt("register", "error");
                return Err(e.into());
            }
        };

        Ok(Response::new(response))
    }

    #[tracing::instrument(skip_all, fields(username = %req.get_ref().username))]
    async fn login(&self, req: Request<LoginRequest>) -> Result<Response<LoginResponse>, Status> {
        let LoginRequest { username, password } = req.into_inner();

        let result = self
            .with_accounts(move |accounts| accounts.verify(&username, &password))
            .await;

        let response = match result {
            Ok(()) => {
                tracing::info!("Login succeeded");
                record_auth_attempt("login", "success");
                LoginResponse {
                    success: true,
                    message: LOGGED_IN.to_string(),
                    token: format!("{:032x}", rand::random::<u128>()),
                }
            }
            Err(e @ Error::InvalidCredentials) => {
                tracing::debug!("Login refused");
                record_auth_attempt("login", "failure");
                LoginResponse {
                    success: false,
                    message: e.to_string(),
                    token: String::new(),
                }
            }
            Err(e) => {
                tracing::error!("Login failed: {e}");
                record_auth_attempt("login", "error");
                return Err(e.into());
            }
        };

        Ok(Response::new(response))
    }

    /// Opens a chat stream.
    ///
    /// The first inbound frame identifies the user; everything after it is
    /// relayed to the room. The response stream carries every broadcast while
    /// the session is registered, and ends when the session closes.
    async fn chat(
        &self,
        req: Request<Streaming<ChatMessage>>,
    ) -> Result<Response<Self::ChatStream>, Status> {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown.into());
        }

        let remote = req.remote_addr();
        let inbound = req.into_inner();
        let (sink, outbound) = SessionSink::channel(self.config.sink_buffer_size);

        let session = ChatSession::new(
            sink,
            Arc::clone(&self.engine),
            self.shutdown_token.child_token(),
            self.config.send_timeout,
        );

        let span = match remote {
            Some(addr) => tracing::info_span!("chat", remote = %addr),
            None => tracing::info_span!("chat"),
        };
        tokio::spawn(
            async move {
                if let Err(status) = session.run(inbound).await {
                    tracing::debug!("Session ended with {status}");
                }
            }
            .instrument(span),
        );

        Ok(Response::new(Box::pin(ReceiverStream::new(outbound))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::accounts::memory::tests::fast_store;

    fn server() -> ChatServer {
        ChatServer::with_account_store(ServerConfig::default(), Arc::new(fast_store()))
    }

    async fn register(server: &ChatServer, username: &str, password: &str) -> RegisterResponse {
        server
            .register(Request::new(RegisterRequest {
                username: username.to_string(),
                password: password.to_string(),
            }))
            .await
            .unwrap()
            .into_inner()
    }

    async fn login(server: &ChatServer, username: &str, password: &str) -> LoginResponse {
        server
            .login(Request::new(LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            }))
            .await
            .unwrap()
            .into_inner()
    }

    #[tokio::test]
    async fn register_then_login() {
        let server = server();

        let first = register(&server, "alice", "pw1").await;
        assert!(first.success);
        assert_eq!(first.message, REGISTERED);

        let duplicate = register(&server, "alice", "other").await;
        assert!(!duplicate.success);
        assert_eq!(duplicate.message, "username already exists");

        // The duplicate attempt must not have replaced the password.
        let ok = login(&server, "alice", "pw1").await;
        assert!(ok.success);
        assert_eq!(ok.message, LOGGED_IN);
        assert!(!ok.token.is_empty());

        let wrong = login(&server, "alice", "other").await;
        assert!(!wrong.success);
        assert!(wrong.token.is_empty());
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_password_look_the_same() {
        let server = server();
        register(&server, "alice", "pw1").await;

        let unknown = login(&server, "mallory", "pw1").await;
        let wrong = login(&server, "alice", "nope").await;
        assert!(!unknown.success);
        assert_eq!(unknown, wrong);
        assert_eq!(unknown.message, "invalid username or password");
    }

    #[tokio::test]
    async fn tokens_are_not_reused() {
        let server = server();
        register(&server, "alice", "pw1").await;

        let a = login(&server, "alice", "pw1").await.token;
        let b = login(&server, "alice", "pw1").await.token;
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn empty_fields_are_ordinary_credentials() {
        let server = server();

        for (username, password) in [("", "pw"), ("alice", "")] {
            let response = register(&server, username, password).await;
            assert!(response.success, "{username:?}/{password:?}");
            assert_eq!(response.message, REGISTERED);
        }

        assert!(login(&server, "", "pw").await.success);
        assert!(login(&server, "alice", "").await.success);
        assert!(!login(&server, "alice", "pw").await.success);
        assert!(!login(&server, "", "").await.success);
    }

    #[tokio::test]
    async fn shutdown_waits_for_sessions_to_leave() {
        let server = server();
        let (sink, _rx) = SessionSink::channel(1);
        server.registry().register("alice", sink.clone());

        let registry = Arc::clone(server.registry());
        let token = server.shutdown_token.clone();
        let leaver = tokio::spawn(async move {
            token.cancelled().await;
            registry.unregister("alice", &sink);
        });

        server.shutdown().await.unwrap();
        assert!(server.registry().is_empty());
        leaver.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_gives_up_after_timeout() {
        let config = ServerConfig {
            shutdown_timeout: Duration::from_secs(1),
            ..ServerConfig::default()
        };
        let server = ChatServer::with_account_store(config, Arc::new(fast_store()));
        let (stuck, _rx) = SessionSink::channel(1);
        server.registry().register("stuck", stuck);

        server.shutdown().await.unwrap();
        assert_eq!(server.registry().len(), 1);
        assert!(server.shutdown_token.is_cancelled());
    }
}

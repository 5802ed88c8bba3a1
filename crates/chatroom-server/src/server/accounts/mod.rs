//! Credential storage behind the `Register` and `Login` RPCs.
//!
//! The chat core treats account storage as an opaque capability: the service
//! only ever asks the store to create an account or to check a password. The
//! default implementation, [`memory::MemoryAccountStore`], keeps argon2 hashes
//! in process memory and loses them on restart.

pub mod memory;

use chatroom_core::Result;

/// Username to credential mapping.
///
/// Implementations must be safe to share between request tasks. Both methods
/// may be CPU-heavy (password hashing), so the service calls them from a
/// blocking task.
pub trait AccountStore: Send + Sync + 'static {
    /// Creates an account.
    ///
    /// # Errors
    ///
    /// - [`Error::AccountExists`] if the username is taken. The stored
    ///   credential is left untouched.
    /// - [`Error::PasswordHash`] if the password could not be hashed.
    ///
    /// [`Error::AccountExists`]: chatroom_core::Error::AccountExists
    /// [`Error::PasswordHash`]: chatroom_core::Error::PasswordHash
    fn register(&self, username: &str, password: &str) -> Result<()>;

    /// Checks a username/password pair.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCredentials`] for an unknown username and for a wrong
    /// password alike.
    ///
    /// [`Error::InvalidCredentials`]: chatroom_core::Error::InvalidCredentials
    fn verify(&self, username: &str, password: &str) -> Result<()>;
}

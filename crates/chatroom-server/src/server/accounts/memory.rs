use super::AccountStore;
use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{SaltString, rand_core::OsRng},
};
use chatroom_core::{Error, Result};
use parking_lot::RwLock;
use std::collections::{HashMap, hash_map::Entry};

/// In-memory [`AccountStore`] holding argon2 password hashes.
///
/// Accounts are never mutated or deleted once created.
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<String, String>>,
    hasher: Argon2<'static>,
}

impl MemoryAccountStore {
    /// Creates an empty store using the default argon2id parameters.
    pub fn new() -> Self {
        Self::with_hasher(Argon2::default())
    }

    /// Creates an empty store with explicit argon2id cost parameters.
    pub fn with_params(params: Params) -> Self {
        Self::with_hasher(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    fn with_hasher(hasher: Argon2<'static>) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            hasher,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.accounts.read().len()
    }

    fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.hasher
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::PasswordHash {
                context: e.to_string(),
            })
    }
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountStore for MemoryAccountStore {
    fn register(&self, username: &str, password: &str) -> Result<()> {
        // Skip the hashing cost for the common duplicate case; the entry check
        // below still settles concurrent registrations of the same name.
        if self.accounts.read().contains_key(username) {
            return Err(Error::AccountExists);
        }

        let hash = self.hash_password(password)?;

        match self.accounts.write().entry(username.to_string()) {
            Entry::Occupied(_) => Err(Error::AccountExists),
            Entry::Vacant(slot) => {
                slot.insert(hash);
                Ok(())
            }
        }
    }

    fn verify(&self, username: &str, password: &str) -> Result<()> {
        let Some(stored) = self.accounts.read().get(username).cloned() else {
            return Err(Error::InvalidCredentials);
        };

        let parsed = PasswordHash::new(&stored).map_err(|e| Error::PasswordHash {
            context: e.to_string(),
        })?;

        self.hasher
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| Error::InvalidCredentials)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;

    /// Cheap argon2 parameters so tests don't spend seconds hashing.
    pub(crate) fn fast_store() -> MemoryAccountStore {
        MemoryAccountStore::with_params(Params::new(8, 1, 1, None).unwrap())
    }

    #[test]
    fn registers_once() {
        let store = fast_store();
        assert_eq!(store.register("alice", "pw1"), Ok(()));
        assert_eq!(store.register("alice", "other"), Err(Error::AccountExists));
        assert_eq!(store.len(), 1);

        // The original credential is unchanged by the failed attempt.
        assert_eq!(store.verify("alice", "pw1"), Ok(()));
        assert_eq!(store.verify("alice", "other"), Err(Error::InvalidCredentials));
    }

    #[test]
    fn unknown_user_and_wrong_password_look_the_same() {
        let store = fast_store();
        store.register("alice", "pw1").unwrap();

        let unknown = store.verify("mallory", "pw1").unwrap_err();
        let wrong = store.verify("alice", "wrong").unwrap_err();
        assert_eq!(unknown, wrong);
        assert_eq!(unknown.to_string(), "invalid username or password");
    }

    #[test]
    fn does_not_store_plaintext() {
        let store = fast_store();
        store.register("alice", "pw1").unwrap();
        let stored = store.accounts.read().get("alice").cloned().unwrap();
        assert_ne!(stored, "pw1");
        assert!(stored.starts_with("$argon2id$"));
    }

    #[test]
    fn concurrent_registration_has_one_winner() {
        let store = Arc::new(fast_store());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.register("bob", &format!("pw{i}")))
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(Result::is_ok)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(store.len(), 1);
    }
}

//! Credential rotation for rate-limited providers.
//!
//! A [`CredentialPool`] holds a fixed, ordered slice of interchangeable
//! credentials and a shared cursor. The cursor is the only state in a job that
//! is mutated by concurrent tasks, so every read-and-advance happens inside a
//! single critical section.
//!
//! - [`CredentialPool::next`] returns the credential under the cursor.
//! - [`CredentialPool::lease`] does the same but skips slots the calling
//!   operation has already tried; it returns `None` once every slot has been
//!   tried, which the caller treats as operation failure.
//! - [`CredentialPool::rotate`] advances the cursor past a slot that just
//!   failed. If another task already rotated past that slot, the call is a
//!   no-op, so two failures on the same slot never skip a healthy one.

use std::sync::Arc;

use parking_lot::Mutex;
use pipeline::{Credential, CredentialSlot};

/// A credential handed out by a [`CredentialPool`], with the slot it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialLease {
    credential: Credential,
    slot: CredentialSlot,
}

impl CredentialLease {
    /// The leased credential.
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// The slot to pass to [`CredentialPool::rotate`] if the credential fails.
    pub fn slot(&self) -> CredentialSlot {
        self.slot
    }
}

/// A shared pool of interchangeable credentials with an atomic cursor.
///
/// Cloning the pool is cheap and shares the cursor.
#[derive(Debug, Clone)]
pub struct CredentialPool {
    provider: Arc<str>,
    credentials: Arc<[Credential]>,
    cursor: Arc<Mutex<usize>>,
}

impl CredentialPool {
    /// Creates a pool for `provider`. Returns `None` if `credentials` is empty.
    pub fn new(provider: impl Into<String>, credentials: Vec<Credential>) -> Option<Self> {
        if credentials.is_empty() {
            return None;
        }
        Some(Self {
            provider: Arc::from(provider.into()),
            credentials: credentials.into(),
            cursor: Arc::new(Mutex::new(0)),
        })
    }

    /// Name of the provider these credentials belong to.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Number of credentials in the pool.
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Always `false`; a pool is never constructed empty.
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Returns the credential under the cursor.
    pub fn next(&self) -> CredentialLease {
        let cursor = self.cursor.lock();
        self.lease_at(*cursor)
    }

    /// Returns the first credential at or after the cursor whose slot is not
    /// in `tried`, or `None` if every slot has been tried.
    ///
    /// The cursor itself is not moved; only [`CredentialPool::rotate`] moves it.
    pub fn lease(&self, tried: &[CredentialSlot]) -> Option<CredentialLease> {
        let cursor = self.cursor.lock();
        let n = self.credentials.len();
        (0..n)
            .map(|offset| (*cursor + offset) % n)
            .find(|i| !tried.contains(&CredentialSlot::new(*i)))
            .map(|i| self.lease_at(i))
    }

    /// Advances the cursor past `failed` if the cursor still points at it.
    pub fn rotate(&self, failed: CredentialSlot) {
        let mut cursor = self.cursor.lock();
        if *cursor == failed.as_usize() {
            *cursor = (*cursor + 1) % self.credentials.len();
            tracing::debug!(
                provider = %self.provider,
                failed = %failed,
                next = *cursor,
                "rotated credential"
            );
        }
    }

    fn lease_at(&self, index: usize) -> CredentialLease {
        CredentialLease {
            credential: self.credentials[index].clone(),
            slot: CredentialSlot::new(index),
        }
    }
}

//! Revocation ledger: revoked token ids (JTI) and per-user cutoffs.
//!
//! An entry past its `expires_at` is treated as absent whether or not a sweep has removed
//! it yet; [`RevocationLedger::delete_expired`] only bounds storage.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::core::models::{RevocationEntry, UserRevocation};
use crate::core::types::TokenId;
use crate::error::Error;
use crate::sweep::Sweep;
use crate::util::clock::{Clock, SystemClock};

pub trait RevocationLedger: Debug + Send + Sync {
    fn add(
        &self,
        jti: &TokenId,
        owner: Option<&str>,
        reason: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error>;
    fn is_revoked(&self, jti: &TokenId) -> Result<bool, Error>;
    /// Revokes every token of `user_id` issued up to now.
    fn revoke_all_for_user(&self, user_id: &str, reason: &str) -> Result<(), Error>;
    fn user_revoked_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, Error>;
    fn delete_expired(&self) -> Result<usize, Error>;
}

#[derive(Debug)]
pub struct MemoryLedger {
    tokens: RwLock<HashMap<TokenId, RevocationEntry>>,
    users: RwLock<HashMap<String, UserRevocation>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl MemoryLedger {
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RevocationLedger for MemoryLedger {
    fn add(
        &self,
        jti: &TokenId,
        owner: Option<&str>,
        reason: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let entry = RevocationEntry {
            jti: jti.clone(),
            user_id: owner.map(ToString::to_string),
            reason: reason.to_string(),
            expires_at,
            revoked_at: self.clock.now(),
        };
        self.tokens.write().insert(jti.clone(), entry);
        Ok(())
    }

    fn is_revoked(&self, jti: &TokenId) -> Result<bool, Error> {
        let now = self.clock.now();
        Ok(self
            .tokens
            .read()
            .get(jti)
            .map(|e| e.is_live(now))
            .unwrap_or(false))
    }

    fn revoke_all_for_user(&self, user_id: &str, reason: &str) -> Result<(), Error> {
        let record = UserRevocation {
            user_id: user_id.to_string(),
            reason: reason.to_string(),
            revoked_at: self.clock.now(),
        };
        self.users.write().insert(user_id.to_string(), record);
        Ok(())
    }

    fn user_revoked_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, Error> {
        Ok(self.users.read().get(user_id).map(|r| r.revoked_at))
    }

    fn delete_expired(&self) -> Result<usize, Error> {
        let now = self.clock.now();
        let mut tokens = self.tokens.write();
        let before = tokens.len();
        tokens.retain(|_, e| e.is_live(now));
        Ok(before - tokens.len())
    }
}

impl Sweep for MemoryLedger {
    fn name(&self) -> &'static str {
        "revocation_ledger"
    }

    fn sweep(&self) -> Result<usize, Error> {
        self.delete_expired()
    }
}

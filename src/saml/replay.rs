//! Assertion replay detection.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{event, Level};

use crate::core::models::ReplayRecord;
use crate::core::types::AssertionId;
use crate::error::Error;
use crate::sweep::Sweep;
use crate::util::clock::{Clock, SystemClock};

/// Storage for assertion ids seen so far.
pub trait ReplayLedger: Debug + Send + Sync {
    /// Records `id` as first seen at `now` unless a live record already exists.
    fn insert_if_absent(
        &self,
        id: &AssertionId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), Error>;
    fn first_seen(&self, id: &AssertionId) -> Result<Option<DateTime<Utc>>, Error>;
    fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize, Error>;
}

/// Two presentations of one assertion inside this window are both accepted.
pub const GRACE_WINDOW_MS: i64 = 1000;

/// Decides whether an assertion id has been used before.
///
/// The ledger is only asked to insert-if-absent and report the first sighting, so any
/// insert-race loser within [`GRACE_WINDOW_MS`] passes too.
#[derive(Debug, Clone)]
pub struct ReplayGuard {
    ledger: Arc<dyn ReplayLedger>,
    grace: Duration,
}

impl ReplayGuard {
    pub fn new(ledger: Arc<dyn ReplayLedger>) -> Self {
        Self {
            ledger,
            grace: Duration::milliseconds(GRACE_WINDOW_MS),
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn check(
        &self,
        id: &AssertionId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.ledger.insert_if_absent(id, expires_at, now)?;
        let first_seen = self.ledger.first_seen(id)?.unwrap_or(now);

        if now - first_seen > self.grace {
            event!(Level::WARN, %first_seen, "Assertion replayed");
            return Err(Error::AssertionReplayed);
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryReplayLedger {
    records: Mutex<HashMap<AssertionId, ReplayRecord>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryReplayLedger {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl MemoryReplayLedger {
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
        }
    }
}

impl ReplayLedger for MemoryReplayLedger {
    fn insert_if_absent(
        &self,
        id: &AssertionId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let mut records = self.records.lock();
        let stale = records.get(id).map(|r| r.expires_at <= now).unwrap_or(true);
        if stale {
            records.insert(
                id.clone(),
                ReplayRecord {
                    assertion_id: id.clone(),
                    expires_at,
                    first_seen: now,
                },
            );
        }
        Ok(())
    }

    fn first_seen(&self, id: &AssertionId) -> Result<Option<DateTime<Utc>>, Error> {
        Ok(self.records.lock().get(id).map(|r| r.first_seen))
    }

    fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize, Error> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, r| r.expires_at > now);
        Ok(before - records.len())
    }
}

impl Sweep for MemoryReplayLedger {
    fn name(&self) -> &'static str {
        "saml_replays"
    }

    fn sweep(&self) -> Result<usize, Error> {
        self.delete_expired(self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> (Arc<MemoryReplayLedger>, ReplayGuard) {
        let ledger = Arc::new(MemoryReplayLedger::default());
        (ledger.clone(), ReplayGuard::new(ledger))
    }

    #[test]
    fn second_use_after_grace_window_is_a_replay() {
        let (_, guard) = guard();
        let id = AssertionId("_abc".into());
        let now = Utc::now();
        let expires = now + Duration::minutes(5);

        assert!(guard.check(&id, expires, now).is_ok());
        assert!(matches!(
            guard.check(&id, expires, now + Duration::milliseconds(1500)),
            Err(Error::AssertionReplayed)
        ));
    }

    #[test]
    fn concurrent_presentations_inside_grace_window_both_pass() {
        let (_, guard) = guard();
        let id = AssertionId("_abc".into());
        let now = Utc::now();
        let expires = now + Duration::minutes(5);

        assert!(guard.check(&id, expires, now).is_ok());
        assert!(guard
            .check(&id, expires, now + Duration::milliseconds(999))
            .is_ok());
    }

    #[test]
    fn expired_records_are_forgotten() {
        let (ledger, guard) = guard();
        let id = AssertionId("_abc".into());
        let now = Utc::now();

        guard.check(&id, now + Duration::seconds(10), now).unwrap();
        assert_eq!(ledger.delete_expired(now + Duration::seconds(10)).unwrap(), 1);
        assert!(ledger.first_seen(&id).unwrap().is_none());
    }

    #[test]
    fn distinct_ids_are_independent() {
        let (_, guard) = guard();
        let now = Utc::now();
        let expires = now + Duration::minutes(5);
        guard.check(&AssertionId("_a".into()), expires, now).unwrap();
        assert!(guard
            .check(&AssertionId("_b".into()), expires, now + Duration::minutes(1))
            .is_ok());
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use parking_lot::Mutex;
use tracing::{event, Level};

use super::{default_ttl, CsrfStore};
use crate::core::models::{CsrfMetadata, CsrfStateEntry};
use crate::core::types::CsrfKey;
use crate::error::Error;
use crate::sweep::Sweep;
use crate::util::clock::{Clock, SystemClock};

/// Process-local store. State does not survive a restart or span replicas.
#[derive(Debug)]
pub struct MemoryCsrfStore {
    entries: Mutex<HashMap<CsrfKey, CsrfStateEntry>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryCsrfStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl MemoryCsrfStore {
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CsrfStore for MemoryCsrfStore {
    fn set(
        &self,
        key: &CsrfKey,
        metadata: CsrfMetadata,
        ttl: Option<Duration>,
    ) -> Result<(), Error> {
        let expires_at = self.clock.now() + ttl.unwrap_or_else(default_ttl);
        let entry = CsrfStateEntry {
            key: key.clone(),
            metadata,
            expires_at,
        };
        self.entries.lock().insert(key.clone(), entry);
        Ok(())
    }

    fn validate_and_consume(&self, key: &CsrfKey) -> Result<Option<CsrfMetadata>, Error> {
        let now = self.clock.now();
        let entry = self.entries.lock().remove(key);

        Ok(match entry {
            Some(entry) if entry.is_live(now) => Some(entry.metadata),
            Some(_) => {
                event!(Level::DEBUG, "CSRF state presented after expiry");
                None
            }
            None => None,
        })
    }

    fn cleanup(&self) -> Result<usize, Error> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        Ok(before - entries.len())
    }
}

impl Sweep for MemoryCsrfStore {
    fn name(&self) -> &'static str {
        "csrf_states"
    }

    fn sweep(&self) -> Result<usize, Error> {
        self.cleanup()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::util::clock::FixedClock;
    use crate::util::random::FromRandom;

    fn store() -> (Arc<FixedClock>, MemoryCsrfStore) {
        let clock = Arc::new(FixedClock::at(Utc::now()));
        (clock.clone(), MemoryCsrfStore::with_clock(clock))
    }

    #[test]
    fn consumed_exactly_once() {
        let (_, store) = store();
        let key = CsrfKey::from_random();
        let mut metadata = CsrfMetadata::for_provider("okta");
        metadata.redirect_uri = Some("/dashboard".into());
        store.set(&key, metadata.clone(), None).unwrap();

        assert_eq!(store.validate_and_consume(&key).unwrap(), Some(metadata));
        assert_eq!(store.validate_and_consume(&key).unwrap(), None);
    }

    #[test]
    fn default_ttl_applies() {
        let (clock, store) = store();
        let key = CsrfKey::from_random();
        store.set(&key, CsrfMetadata::for_provider("okta"), None).unwrap();

        clock.advance(Duration::minutes(10));
        assert_eq!(store.validate_and_consume(&key).unwrap(), None);
    }

    #[test]
    fn custom_ttl_applies() {
        let (clock, store) = store();
        let key = CsrfKey::from_random();
        store
            .set(&key, CsrfMetadata::for_provider("okta"), Some(Duration::seconds(30)))
            .unwrap();

        clock.advance(Duration::seconds(29));
        assert!(store.validate_and_consume(&key).unwrap().is_some());
    }

    #[test]
    fn unknown_keys_yield_nothing() {
        let (_, store) = store();
        assert_eq!(store.validate_and_consume(&CsrfKey::from_random()).unwrap(), None);
    }

    #[test]
    fn cleanup_counts_expired_entries() {
        let (clock, store) = store();
        for _ in 0..3 {
            store
                .set(&CsrfKey::from_random(), CsrfMetadata::for_provider("a"), Some(Duration::seconds(5)))
                .unwrap();
        }
        store
            .set(&CsrfKey::from_random(), CsrfMetadata::for_provider("b"), None)
            .unwrap();

        clock.advance(Duration::seconds(5));
        assert_eq!(store.cleanup().unwrap(), 3);
        assert_eq!(store.len(), 1);
    }
}

//! Single-use state shared by SAML RelayState and OAuth `state`.

mod memory;

use std::fmt::Debug;

use chrono::Duration;

use crate::core::models::{CsrfMetadata, CsrfStateEntry};
use crate::core::types::{CsrfKey, Expire};
use crate::error::Error;

pub use memory::MemoryCsrfStore;

pub trait CsrfStore: Debug + Send + Sync {
    /// Stores `metadata` under `key`, replacing any previous entry. `None` means
    /// [`default_ttl`].
    fn set(&self, key: &CsrfKey, metadata: CsrfMetadata, ttl: Option<Duration>)
        -> Result<(), Error>;

    /// Removes the entry and hands it back if it was still live. A second call for the same
    /// key always yields `None`.
    fn validate_and_consume(&self, key: &CsrfKey) -> Result<Option<CsrfMetadata>, Error>;

    /// Drops expired entries, returning how many.
    fn cleanup(&self) -> Result<usize, Error>;
}

pub fn default_ttl() -> Duration {
    Duration::seconds(CsrfStateEntry::EXPIRES_IN_SECS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfBackend {
    Memory,
    Database,
}

impl std::str::FromStr for CsrfBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "database" | "db" => Ok(Self::Database),
            other => Err(Error::Config(format!("unknown CSRF backend {:?}", other))),
        }
    }
}

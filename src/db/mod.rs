//! Postgres-backed ledgers and CSRF store.

pub mod models;
pub mod schema;

use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use diesel::prelude::*;
use diesel::r2d2::{Builder as PoolBuilder, ConnectionManager, Pool, PooledConnection};
use tokio::task::block_in_place;
use tracing::{event, Level};

use crate::core::models::CsrfMetadata;
use crate::core::types::{AssertionId, CsrfKey, TokenId};
use crate::csrf::{default_ttl, CsrfStore};
use crate::error::Error;
use crate::revocation::RevocationLedger;
use crate::saml::ReplayLedger;
use crate::sweep::Sweep;
use crate::util::clock::{Clock, SystemClock};

diesel_migrations::embed_migrations!("migrations");

type PgPool = Pool<ConnectionManager<PgConnection>>;

pub struct DbStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl Debug for DbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbStore").finish()
    }
}

fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, Error> {
    Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
        Error::Db(diesel::result::Error::DeserializationError(
            format!("timestamp {} out of range", ms).into(),
        ))
    })
}

impl DbStore {
    pub fn acquire(uri: &str) -> Result<Self, Error> {
        let pool = PoolBuilder::new()
            .max_size(10)
            .build(ConnectionManager::new(uri))?;
        Ok(Self {
            pool,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn conn(&self) -> Result<PooledConnection<ConnectionManager<PgConnection>>, Error> {
        Ok(self.pool.get()?)
    }

    pub fn migrate(&self) -> Result<(), Error> {
        let conn = self.conn()?;
        embedded_migrations::run_with_output(&conn, &mut std::io::stderr())
            .map_err(|e| Error::Config(format!("migration failed: {}", e)))?;
        event!(Level::INFO, "Ran migrations");
        Ok(())
    }

    fn now_ms(&self) -> i64 {
        to_millis(self.clock.now())
    }
}

impl RevocationLedger for DbStore {
    fn add(
        &self,
        jti: &TokenId,
        owner: Option<&str>,
        reason: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        use schema::revoked_tokens::dsl::{self, revoked_tokens};

        let row = models::RevokedToken {
            jti: jti.0.clone(),
            user_id: owner.map(ToString::to_string),
            reason: reason.to_string(),
            expires_at: to_millis(expires_at),
            revoked_at: self.now_ms(),
        };

        block_in_place(|| {
            diesel::insert_into(revoked_tokens)
                .values(&row)
                .on_conflict(dsl::jti)
                .do_nothing()
                .execute(&self.conn()?)
                .map_err(Error::from)
        })?;

        Ok(())
    }

    fn is_revoked(&self, jti: &TokenId) -> Result<bool, Error> {
        use diesel::dsl::exists;
        use schema::revoked_tokens::dsl::{self, revoked_tokens};

        let now = self.now_ms();
        block_in_place(|| {
            diesel::select(exists(
                revoked_tokens
                    .find(&jti.0)
                    .filter(dsl::expires_at.gt(now)),
            ))
            .get_result::<bool>(&self.conn()?)
            .map_err(Error::from)
        })
    }

    fn revoke_all_for_user(&self, user_id: &str, reason: &str) -> Result<(), Error> {
        use schema::revoked_users::dsl::{self, revoked_users};

        let row = models::RevokedUser {
            user_id: user_id.to_string(),
            reason: reason.to_string(),
            revoked_at: self.now_ms(),
        };

        block_in_place(|| {
            diesel::insert_into(revoked_users)
                .values(&row)
                .on_conflict(dsl::user_id)
                .do_update()
                .set((
                    dsl::reason.eq(&row.reason),
                    dsl::revoked_at.eq(row.revoked_at),
                ))
                .execute(&self.conn()?)
                .map_err(Error::from)
        })?;

        Ok(())
    }

    fn user_revoked_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, Error> {
        use schema::revoked_users::dsl::{self, revoked_users};

        let found = block_in_place(|| {
            revoked_users
                .find(user_id)
                .select(dsl::revoked_at)
                .first::<i64>(&self.conn()?)
                .optional()
                .map_err(Error::from)
        })?;

        found.map(from_millis).transpose()
    }

    fn delete_expired(&self) -> Result<usize, Error> {
        use schema::revoked_tokens::dsl::{self, revoked_tokens};

        let now = self.now_ms();
        block_in_place(|| {
            diesel::delete(revoked_tokens.filter(dsl::expires_at.le(now)))
                .execute(&self.conn()?)
                .map_err(Error::from)
        })
    }
}

impl ReplayLedger for DbStore {
    fn insert_if_absent(
        &self,
        id: &AssertionId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        use schema::saml_replays::dsl::{self, saml_replays};

        let row = models::SamlReplay {
            assertion_id: id.0.clone(),
            expires_at: to_millis(expires_at),
            first_seen: to_millis(now),
        };

        block_in_place(|| {
            let conn = self.conn()?;
            // an unswept expired record must not count as a sighting
            diesel::delete(
                saml_replays
                    .find(&row.assertion_id)
                    .filter(dsl::expires_at.le(row.first_seen)),
            )
            .execute(&conn)?;
            diesel::insert_into(saml_replays)
                .values(&row)
                .on_conflict_do_nothing()
                .execute(&conn)?;
            Ok::<_, Error>(())
        })
    }

    fn first_seen(&self, id: &AssertionId) -> Result<Option<DateTime<Utc>>, Error> {
        use schema::saml_replays::dsl::{self, saml_replays};

        let found = block_in_place(|| {
            saml_replays
                .find(&id.0)
                .select(dsl::first_seen)
                .first::<i64>(&self.conn()?)
                .optional()
                .map_err(Error::from)
        })?;

        found.map(from_millis).transpose()
    }

    fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize, Error> {
        use schema::saml_replays::dsl::{self, saml_replays};

        let now = to_millis(now);
        block_in_place(|| {
            diesel::delete(saml_replays.filter(dsl::expires_at.le(now)))
                .execute(&self.conn()?)
                .map_err(Error::from)
        })
    }
}

impl CsrfStore for DbStore {
    fn set(
        &self,
        key: &CsrfKey,
        metadata: CsrfMetadata,
        ttl: Option<Duration>,
    ) -> Result<(), Error> {
        use schema::csrf_states::dsl::{self, csrf_states};

        let expires_at = self.clock.now() + ttl.unwrap_or_else(default_ttl);
        let row = models::CsrfState {
            state_key: key.0.clone(),
            metadata: serde_json::to_string(&metadata)?,
            expires_at: to_millis(expires_at),
        };

        block_in_place(|| {
            diesel::insert_into(csrf_states)
                .values(&row)
                .on_conflict(dsl::state_key)
                .do_update()
                .set((
                    dsl::metadata.eq(&row.metadata),
                    dsl::expires_at.eq(row.expires_at),
                ))
                .execute(&self.conn()?)
                .map_err(Error::from)
        })?;

        Ok(())
    }

    fn validate_and_consume(&self, key: &CsrfKey) -> Result<Option<CsrfMetadata>, Error> {
        use schema::csrf_states::dsl::csrf_states;

        let now = self.now_ms();
        let taken = block_in_place(|| {
            diesel::delete(csrf_states.find(&key.0))
                .get_result::<models::CsrfState>(&self.conn()?)
                .optional()
                .map_err(Error::from)
        })?;

        match taken {
            Some(row) if row.expires_at > now => Ok(Some(serde_json::from_str(&row.metadata)?)),
            Some(_) => {
                event!(Level::DEBUG, "CSRF state presented after expiry");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn cleanup(&self) -> Result<usize, Error> {
        use schema::csrf_states::dsl::{self, csrf_states};

        let now = self.now_ms();
        block_in_place(|| {
            diesel::delete(csrf_states.filter(dsl::expires_at.le(now)))
                .execute(&self.conn()?)
                .map_err(Error::from)
        })
    }
}

impl Sweep for DbStore {
    fn name(&self) -> &'static str {
        "database"
    }

    fn sweep(&self) -> Result<usize, Error> {
        let tokens = RevocationLedger::delete_expired(self)?;
        let replays = ReplayLedger::delete_expired(self, self.clock.now())?;
        let states = self.cleanup()?;
        event!(Level::DEBUG, tokens, replays, states, "Swept expired rows");
        Ok(tokens + replays + states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_round_trip() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).single().unwrap();
        assert_eq!(from_millis(to_millis(now)).unwrap(), now);
    }

    #[test]
    fn out_of_range_millis_are_a_db_error() {
        assert!(matches!(from_millis(i64::MAX), Err(Error::Db(_))));
    }
}

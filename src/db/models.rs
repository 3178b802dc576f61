use super::schema::*;

#[derive(Debug)]
#[derive(Queryable, Insertable)]
pub struct RevokedToken {
    pub jti: String,
    pub user_id: Option<String>,
    pub reason: String,
    pub expires_at: i64,
    pub revoked_at: i64,
}

#[derive(Debug)]
#[derive(Queryable, Insertable)]
pub struct RevokedUser {
    pub user_id: String,
    pub reason: String,
    pub revoked_at: i64,
}

#[derive(Debug)]
#[derive(Queryable, Insertable)]
pub struct SamlReplay {
    pub assertion_id: String,
    pub expires_at: i64,
    pub first_seen: i64,
}

#[derive(Debug)]
#[derive(Queryable, Insertable)]
pub struct CsrfState {
    pub state_key: String,
    /// JSON-encoded `CsrfMetadata`.
    pub metadata: String,
    pub expires_at: i64,
}

use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::{event, Level};

use crate::error::Error;

/// The only algorithm this service signs with or accepts.
pub const ALGORITHM: Algorithm = Algorithm::HS256;

pub struct TokenCodec {
    secret: EncodingKey,
    public: DecodingKey<'static>,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenCodec {{ ... }}")
    }
}

impl TokenCodec {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            secret: EncodingKey::from_secret(secret),
            public: DecodingKey::from_secret(secret).into_static(),
        }
    }

    /// Validation preset pinned to [`ALGORITHM`].
    pub fn validation() -> Validation {
        Validation {
            algorithms: vec![ALGORITHM],
            validate_nbf: true,
            ..Validation::default()
        }
    }

    pub fn encode(&self, claims: &impl serde::Serialize) -> Result<String, Error> {
        let header = Header::new(ALGORITHM);
        jsonwebtoken::encode(&header, claims, &self.secret)
            .map_err(|e| Error::Signing(e.to_string()))
    }

    pub fn decode<T>(&self, token: &str, validation: &Validation) -> Result<T, Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let header = jsonwebtoken::decode_header(token).map_err(|_| Error::TokenInvalid)?;
        if header.alg != ALGORITHM {
            event!(Level::WARN, alg = ?header.alg, "Rejecting token with unexpected algorithm");
            return Err(Error::TokenInvalid);
        }

        jsonwebtoken::decode::<T>(token, &self.public, validation)
            .map(|td| td.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => Error::TokenExpired,
                kind => {
                    event!(Level::DEBUG, ?kind, "Token failed verification");
                    Error::TokenInvalid
                }
            })
    }
}

use crate::core::types::{CsrfKey, SessionId, TokenId};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};

pub trait FromRandom {
    fn from_random() -> Self;
}

impl FromRandom for TokenId {
    fn from_random() -> Self {
        TokenId(random_string(24))
    }
}

impl FromRandom for SessionId {
    fn from_random() -> Self {
        SessionId(random_string(24))
    }
}

impl FromRandom for CsrfKey {
    fn from_random() -> Self {
        CsrfKey(random_string(32))
    }
}

/// `bytes` bytes from the OS generator, URL-safe base64 without padding.
pub fn random_string(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

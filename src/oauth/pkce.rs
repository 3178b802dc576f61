use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha256};

use crate::util::random::{random_string, FromRandom};

/// Challenge methods this service sends; never `plain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transformation {
    S256,
}

impl Transformation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::S256 => "S256",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Challenge {
    pub code: String,
    pub method: Transformation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verifier {
    pub value: String,
}

impl FromRandom for Verifier {
    /// 32 random bytes give a 43-character verifier, the RFC 7636 minimum.
    fn from_random() -> Self {
        Self {
            value: random_string(32),
        }
    }
}

impl Verifier {
    pub fn challenge(&self) -> Challenge {
        let digest = Sha256::digest(self.value.as_bytes());
        Challenge {
            code: URL_SAFE_NO_PAD.encode(digest),
            method: Transformation::S256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc7636_appendix_b() {
        let verifier = Verifier {
            value: "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".into(),
        };
        assert_eq!(
            verifier.challenge().code,
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URD-Cc_2A8HmzI"
        );
    }

    #[test]
    fn generated_verifiers_have_distinct_challenges() {
        let verifier = Verifier::from_random();
        assert_eq!(verifier.value.len(), 43);
        let challenge = verifier.challenge();
        assert_eq!(challenge.method.as_str(), "S256");
        assert_eq!(challenge, verifier.challenge());
        assert_ne!(challenge, Verifier::from_random().challenge());
    }
}

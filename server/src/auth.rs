//! Bearer-token verification gating connection admission.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by tokens signed by the external identity service.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub username: String,
    pub exp: u64,
}

/// A verified identity. Immutable for the lifetime of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub username: String,
}

/// Validates bearer tokens against the server secret.
///
/// Verification is a pure CPU-bound check with no side effects. Every
/// failure mode (malformed token, bad signature, expired) comes back as an
/// error so the caller can refuse the connection before any shared state
/// is touched.
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Creates a verifier for HS256 tokens signed with the given secret.
    /// The secret is injected configuration, shared out-of-band with the
    /// identity service that issues the tokens.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Decodes and validates a token, yielding the identity it asserts.
    pub fn verify(&self, token: &str) -> Result<Identity, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(Identity {
            id: data.claims.id,
            username: data.claims.username,
        })
    }
}

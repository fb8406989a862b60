use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Claims carried by a bearer credential. Issuance lives with the external
/// credential service; this gate only verifies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Pass/fail credential gate for mutating calls.
///
/// The core never sees the claims — only the verdict. With `enabled:
/// false` every call passes, which is the development default.
#[derive(Clone)]
pub struct AuthGate {
    enabled: bool,
    decoding_key: DecodingKey,
}

impl AuthGate {
    pub fn new(enabled: bool, secret: &str) -> Self {
        AuthGate {
            enabled,
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Verify a bearer token. Returns the verdict only.
    pub fn verify(&self, token: &str) -> bool {
        if !self.enabled {
            return true;
        }

        match decode::<Claims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256)) {
            Ok(_) => true,
            Err(e) => {
                debug!("Rejected bearer credential: {}", e);
                false
            }
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::debug;
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::chat::types::UserId;
use crate::error::{ChatError, Result};

/// Resolves a bearer token to the authenticated user behind it. The chat
/// relay only ever sees tokens through this trait; issuing them is the job
/// of the surrounding application.
pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: &str) -> Result<UserId>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id, as a UUID string.
    pub sub: String,
    pub exp: usize,
}

/// HS256 JWT validation against a shared secret, matching the tokens the
/// REST layer issues.
pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl TokenValidator for JwtValidator {
    fn validate(&self, token: &str) -> Result<UserId> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!("Token rejected: {}", e);
                ChatError::Unauthorized("invalid token".to_string())
            })?;

        Uuid::parse_str(&data.claims.sub)
            .map_err(|_| ChatError::Unauthorized("invalid token".to_string()))
    }
}

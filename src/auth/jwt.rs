use std::collections::HashMap;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::config::JwtConfig;
use crate::connection::UserId;
use crate::error::AppError;

use super::Claims;

/// Clock skew tolerated on `exp`, in seconds
const LEEWAY_SECS: u64 = 30;

/// Identity established for a connection at upgrade time
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub metadata: HashMap<String, String>,
}

/// Verifies HS256 bearer tokens against the shared secret
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECS;

        // A configured issuer or audience must also be present in the token
        let mut required = vec!["exp", "sub"];
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
            required.push("iss");
        }
        if let Some(audience) = &config.audience {
            validation.set_audience(&[audience]);
            required.push("aud");
        }
        validation.set_required_spec_claims(&required[..]);

        Self {
            key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
        }
    }

    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))
    }

    /// Decode a token and resolve the user it addresses
    pub fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        let claims = self.decode(token)?;
        Ok(AuthenticatedUser {
            user_id: claims.user_id()?,
            metadata: claims.connection_metadata(),
        })
    }
}

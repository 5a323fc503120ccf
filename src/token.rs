use chrono::Utc;
use hmac::{Hmac, Mac};
use jwt::{SignWithKey, VerifyWithKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::perm::Role;

/// JWT 载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// employee code
    pub sub: String,
    pub name: String,
    pub role: Role,
    pub center: Option<String>,
    /// session id, must still be live in the session cache
    pub sid: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid token")]
    Invalid(#[from] jwt::Error),
    #[error("Token expired, please log in again")]
    Expired,
    #[error("Session ended, please log in again")]
    Revoked,
    #[error("Missing bearer token")]
    Missing,
}

impl From<TokenError> for crate::Response {
    fn from(value: TokenError) -> Self {
        crate::Response::token_error(value)
    }
}

pub struct TokenKey {
    key: Hmac<Sha256>,
    lifetime_hours: i64,
}

impl TokenKey {
    pub fn new(secret: &[u8], lifetime_hours: i64) -> Result<Self, TokenError> {
        let key = Hmac::new_from_slice(secret).map_err(|_| TokenError::Invalid(jwt::Error::InvalidSignature))?;
        Ok(Self {
            key,
            lifetime_hours,
        })
    }

    pub fn claims(&self, sub: &str, name: &str, role: Role, center: Option<String>, sid: &str) -> Claims {
        let iat = Utc::now().timestamp();
        Claims {
            sub: sub.to_owned(),
            name: name.to_owned(),
            role,
            center,
            sid: sid.to_owned(),
            iat,
            exp: iat + self.lifetime_hours * 3600,
        }
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        Ok(claims.sign_with_key(&self.key)?)
    }

    /// Checks signature and expiry; session liveness is the caller's job.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let claims: Claims = token.verify_with_key(&self.key)?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

/// Random session id carried in the token.
pub fn gen_session_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> TokenKey {
        TokenKey::new(b"test-secret", 12).unwrap()
    }

    #[test]
    fn signed_claims_verify() {
        let key = key();
        let claims = key.claims("AL0001", "Ravi", Role::TeamLeader, Some("C01".into()), "sid");
        let token = key.sign(&claims).unwrap();
        let back = key.verify(&token).unwrap();
        assert_eq!(back.sub, "AL0001");
        assert_eq!(back.role, Role::TeamLeader);
        assert_eq!(back.center.as_deref(), Some("C01"));
    }

    #[test]
    fn other_secret_is_rejected() {
        let token = key()
            .sign(&key().claims("AL0001", "Ravi", Role::Technician, None, "sid"))
            .unwrap();
        let other = TokenKey::new(b"another-secret", 12).unwrap();
        assert!(matches!(other.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let key = TokenKey::new(b"test-secret", -1).unwrap();
        let token = key
            .sign(&key.claims("AL0001", "Ravi", Role::Technician, None, "sid"))
            .unwrap();
        assert!(matches!(key.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(gen_session_id(), gen_session_id());
        assert_eq!(gen_session_id().len(), 32);
    }
}

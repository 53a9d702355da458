//! Admin authentication
//!
//! A single configured password unlocks a signed HS256 token carrying the
//! `admin` role. Nothing is stored server side: a token is valid while its
//! signature checks out and its expiry lies in the future.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::AuthConfig;

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingHeader,

    #[error("invalid authorization header format, expected 'Bearer <token>'")]
    MalformedHeader,

    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token does not grant admin access")]
    Forbidden,

    #[error("failed to issue token: {0}")]
    Issue(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub role: String,
    /// Expiry (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Outcome of a login attempt
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub success: bool,
    pub token: Option<String>,
    pub message: String,
}

#[derive(Clone)]
pub struct TokenService {
    admin_password: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            admin_password: config.admin_password.clone(),
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            ttl: Duration::hours(config.token_ttl_hours),
        }
    }

    /// Check the supplied password and hand out an admin token on a match
    pub fn authenticate(&self, password: &str) -> AuthResult {
        let matches: bool = password.as_bytes().ct_eq(self.admin_password.as_bytes()).into();
        if !matches {
            return AuthResult {
                success: false,
                token: None,
                message: "Incorrect password".to_string(),
            };
        }

        match self.issue(ADMIN_ROLE, Utc::now() + self.ttl) {
            Ok(token) => AuthResult {
                success: true,
                token: Some(token),
                message: "Login successful".to_string(),
            },
            Err(e) => {
                tracing::error!("Failed to sign admin token: {}", e);
                AuthResult {
                    success: false,
                    token: None,
                    message: "Failed to generate token".to_string(),
                }
            }
        }
    }

    pub fn issue(&self, role: &str, expires_at: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = Claims {
            role: role.to_string(),
            exp: expires_at.timestamp(),
            iat: Utc::now().timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Issue(e.to_string()))
    }

    /// Verify signature and expiry, returning the embedded claims
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }

    /// Validate a raw `Authorization` header and require the admin role
    pub fn authorize(&self, header: Option<&str>) -> Result<Claims, AuthError> {
        let token = extract_bearer(header.ok_or(AuthError::MissingHeader)?)?;
        let claims = self.validate(token)?;
        if claims.role != ADMIN_ROLE {
            return Err(AuthError::Forbidden);
        }
        Ok(claims)
    }
}

/// Extract the token from a `Bearer <token>` header value
pub fn extract_bearer(header: &str) -> Result<&str, AuthError> {
    let header = header.trim();
    if header.is_empty() {
        return Err(AuthError::MissingHeader);
    }
    match header.strip_prefix("Bearer ").map(str::trim) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(&AuthConfig {
            admin_password: "hunter2".to_string(),
            jwt_secret: "test-secret".to_string(),
            token_ttl_hours: 720,
        })
    }

    #[test]
    fn correct_password_yields_valid_admin_token() {
        let svc = service();
        let result = svc.authenticate("hunter2");
        assert!(result.success);

        let claims = svc.validate(result.token.as_deref().unwrap()).unwrap();
        assert_eq!(claims.role, "admin");

        let expected = (Utc::now() + Duration::days(30)).timestamp();
        assert!((claims.exp - expected).abs() <= 2);
    }

    #[test]
    fn wrong_password_yields_no_token() {
        let result = service().authenticate("hunter3");
        assert!(!result.success);
        assert!(result.token.is_none());

        assert!(!service().authenticate("").success);
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let svc = service();
        let token = svc.authenticate("hunter2").token.unwrap();

        let (body, signature) = token.rsplit_once('.').unwrap();
        let mut bytes = signature.as_bytes().to_vec();
        bytes[0] = if bytes[0] == b'A' { b'B' } else { b'A' };
        let tampered = format!("{}.{}", body, String::from_utf8(bytes).unwrap());

        assert!(matches!(svc.validate(&tampered), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let svc = service();
        let token = svc.issue(ADMIN_ROLE, Utc::now() - Duration::hours(1)).unwrap();
        assert!(matches!(svc.validate(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let other = TokenService::new(&AuthConfig {
            jwt_secret: "another-secret".to_string(),
            ..AuthConfig::default()
        });
        let token = other.issue(ADMIN_ROLE, Utc::now() + Duration::hours(1)).unwrap();
        assert!(service().validate(&token).is_err());
        assert!(service().validate("not-a-token").is_err());
    }

    #[test]
    fn authorize_checks_header_and_role() {
        let svc = service();
        assert!(matches!(svc.authorize(None), Err(AuthError::MissingHeader)));
        assert!(matches!(svc.authorize(Some("Basic abc")), Err(AuthError::MalformedHeader)));
        assert!(matches!(svc.authorize(Some("Bearer ")), Err(AuthError::MalformedHeader)));

        let reader = svc.issue("reader", Utc::now() + Duration::hours(1)).unwrap();
        assert!(matches!(svc.authorize(Some(&format!("Bearer {}", reader))), Err(AuthError::Forbidden)));

        let admin = svc.authenticate("hunter2").token.unwrap();
        assert!(svc.authorize(Some(&format!("Bearer {}", admin))).is_ok());
    }
}

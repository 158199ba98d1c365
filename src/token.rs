use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::AppConfig;

/// Failures of the token service. Verification failures are kept distinct so callers
/// can tell them apart from downstream authorization failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Bad signature, wrong purpose, or otherwise rejected by validation.
    #[error("invalid token")]
    Invalid,
    #[error("token expired")]
    Expired,
    /// Not a structurally valid JWT (segments, base64, JSON, required claims).
    #[error("malformed token")]
    Malformed,
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// What a token may be used for. Embedded in the claims so a token minted for one
/// purpose never verifies as the other, even if the secrets were misconfigured to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Session,
    PasswordReset,
}

/// Claims
///
/// Payload signed into every token issued by this service.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user id.
    pub sub: Uuid,
    /// Expiration Time (exp), seconds since the epoch.
    pub exp: i64,
    /// Issued At (iat), seconds since the epoch.
    pub iat: i64,
    pub purpose: TokenPurpose,
}

/// TokenService
///
/// Issues and verifies HS256 bearer tokens for a single purpose. Session and reset
/// tokens are two instances with different secrets and lifetimes.
#[derive(Clone)]
pub struct TokenService {
    purpose: TokenPurpose,
    ttl: Duration,
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    validation: Arc<Validation>,
}

impl TokenService {
    pub fn new(purpose: TokenPurpose, secret: &str, ttl_secs: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is exact: a token is rejected as soon as `now > exp`.
        validation.leeway = 0;
        validation.validate_exp = true;

        Self {
            purpose,
            ttl: Duration::seconds(ttl_secs),
            encoding_key: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding_key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            validation: Arc::new(validation),
        }
    }

    /// Session tokens: `JWT_SECRET`, default lifetime 24 hours.
    pub fn session(config: &AppConfig) -> Self {
        Self::new(
            TokenPurpose::Session,
            &config.jwt_secret,
            config.jwt_expires_in_secs,
        )
    }

    /// Password-reset tokens: `RESET_JWT_SECRET`, default lifetime 1 hour.
    pub fn password_reset(config: &AppConfig) -> Self {
        Self::new(
            TokenPurpose::PasswordReset,
            &config.reset_jwt_secret,
            config.reset_jwt_expires_in_secs,
        )
    }

    pub fn purpose(&self) -> TokenPurpose {
        self.purpose
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a token for `user_id` with the configured lifetime.
    pub fn issue(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.issue_with_ttl(user_id, self.ttl)
    }

    /// Issues a token with an explicit lifetime. A negative `ttl` yields an already
    /// expired token.
    pub fn issue_with_ttl(&self, user_id: Uuid, ttl: Duration) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            purpose: self.purpose,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Validates signature, expiry and purpose, and returns the subject user id.
    pub fn verify(&self, token: &str) -> Result<Uuid, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::Invalid,
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_)
                | ErrorKind::MissingRequiredClaim(_) => TokenError::Malformed,
                _ => TokenError::Invalid,
            }
        })?;

        if data.claims.purpose != self.purpose {
            return Err(TokenError::Invalid);
        }

        Ok(data.claims.sub)
    }
}

/// Both token services, shared through the application state.
#[derive(Clone)]
pub struct Tokens {
    pub session: TokenService,
    pub reset: TokenService,
}

impl Tokens {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            session: TokenService::session(config),
            reset: TokenService::password_reset(config),
        }
    }
}

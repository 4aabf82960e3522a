use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::core::config::JwtConfig;
use crate::core::shared::enums::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Login email of the principal.
    pub sub: String,
    pub role: Role,
    pub user_id: i64,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    pub fn new(
        identity: &str,
        role: Role,
        user_id: i64,
        issuer: &str,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            sub: identity.to_string(),
            role,
            user_id,
            iss: issuer.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// Lifetime of a password reset link.
pub const RESET_TOKEN_MINUTES: i64 = 30;

/// Claims of a password reset token. Signed with the same key as bearer
/// tokens but under a separate issuer, so neither kind is accepted in place
/// of the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetClaims {
    pub sub: String,
    /// `CUSTOMER` or `EMPLOYEE`: which table `user_id` points into.
    pub account: Role,
    pub user_id: i64,
    /// `updated_at` of the account in microseconds when the link was issued.
    /// Any later change to the account, including the reset itself,
    /// invalidates the link.
    pub ver: i64,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Issues and checks HS256 bearer tokens.
///
/// Tokens are never stored or revoked; expiry is the only way a token stops
/// being accepted.
pub struct TokenService {
    issuer: String,
    ttl: Duration,
    leeway_seconds: u64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenService {
    pub fn new(secret: &[u8], issuer: &str, ttl: Duration, leeway_seconds: u64) -> Self {
        Self {
            issuer: issuer.to_string(),
            ttl,
            leeway_seconds,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    pub fn from_config(config: &JwtConfig) -> Result<Self> {
        let secret = config.signing_secret()?;
        Ok(Self::new(
            secret.as_bytes(),
            &config.issuer,
            Duration::minutes(config.expiry_minutes),
            config.leeway_seconds,
        ))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, identity: &str, role: Role, user_id: i64) -> Result<String> {
        self.issue_at(identity, role, user_id, Utc::now())
    }

    fn issue_at(
        &self,
        identity: &str,
        role: Role,
        user_id: i64,
        issued_at: DateTime<Utc>,
    ) -> Result<String> {
        let claims = Claims::new(identity, role, user_id, &self.issuer, issued_at, self.ttl);
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow!("Failed to encode token: {e}"))
    }

    /// Decodes and checks signature, issuer and expiry. Any failure,
    /// including garbage input, yields `None`.
    pub fn verify(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.leeway = self.leeway_seconds;

        match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!("Rejected bearer token: {e}");
                None
            }
        }
    }

    fn reset_issuer(&self) -> String {
        format!("{}/password-reset", self.issuer)
    }

    pub fn issue_reset(
        &self,
        identity: &str,
        account: Role,
        user_id: i64,
        version: i64,
    ) -> Result<String> {
        self.issue_reset_at(identity, account, user_id, version, Utc::now())
    }

    fn issue_reset_at(
        &self,
        identity: &str,
        account: Role,
        user_id: i64,
        version: i64,
        issued_at: DateTime<Utc>,
    ) -> Result<String> {
        let claims = ResetClaims {
            sub: identity.to_string(),
            account,
            user_id,
            ver: version,
            iss: self.reset_issuer(),
            iat: issued_at.timestamp(),
            exp: (issued_at + Duration::minutes(RESET_TOKEN_MINUTES)).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow!("Failed to encode reset token: {e}"))
    }

    pub fn verify_reset(&self, token: &str) -> Option<ResetClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.reset_issuer()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.leeway = self.leeway_seconds;

        match decode::<ResetClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!("Rejected reset token: {e}");
                None
            }
        }
    }

    pub fn validate(&self, token: &str) -> bool {
        self.verify(token).is_some()
    }

    pub fn extract_identity(&self, token: &str) -> Option<String> {
        self.verify(token).map(|c| c.sub)
    }

    pub fn extract_role(&self, token: &str) -> Option<Role> {
        self.verify(token).map(|c| c.role)
    }

    pub fn extract_user_id(&self, token: &str) -> Option<i64> {
        self.verify(token).map(|c| c.user_id)
    }
}

pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

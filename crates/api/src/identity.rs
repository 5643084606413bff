//! Bearer-token verification on top of `jsonwebtoken`.
//!
//! Accepts HS256 tokens signed with a shared secret, or RS256 tokens (e.g.
//! Firebase ID tokens) checked against a PEM public key.

use chrono::{DateTime, Utc};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;

use orgguard_auth::{validate_claims, IdentityClaim, IdentityVerifier, TokenValidationError};

use crate::config::JwtConfig;

#[derive(Debug, Error)]
pub enum VerifierConfigError {
    #[error("invalid RS256 public key: {0}")]
    InvalidPublicKey(#[from] jsonwebtoken::errors::Error),
}

/// Wire shape of the token payload.
#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(default)]
    sub: String,
    email: Option<String>,
    name: Option<String>,
    #[serde(default)]
    email_verified: bool,
    #[serde(default)]
    disabled: bool,
    iat: i64,
    exp: i64,
}

pub struct JwtIdentityVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityVerifier {
    pub fn hs256(secret: impl AsRef<[u8]>) -> Self {
        Self::with_key(DecodingKey::from_secret(secret.as_ref()), Algorithm::HS256)
    }

    pub fn rs256_pem(pem: &str) -> Result<Self, VerifierConfigError> {
        Ok(Self::with_key(DecodingKey::from_rsa_pem(pem.as_bytes())?, Algorithm::RS256))
    }

    /// Require Firebase's issuer and audience for `project_id`.
    pub fn with_firebase_project(mut self, project_id: &str) -> Self {
        self.validation
            .set_issuer(&[format!("https://securetoken.google.com/{project_id}")]);
        self.validation.set_audience(&[project_id]);
        self.validation.validate_aud = true;
        self
    }

    pub fn from_config(config: &JwtConfig) -> Result<Self, VerifierConfigError> {
        let verifier = match &config.public_key_pem {
            Some(pem) => Self::rs256_pem(pem)?,
            None => Self::hs256(config.secret.as_bytes()),
        };
        Ok(match &config.firebase_project_id {
            Some(project) => verifier.with_firebase_project(project),
            None => verifier,
        })
    }

    fn with_key(key: DecodingKey, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        // The time window is checked by `validate_claims` against the caller's clock.
        validation.validate_exp = false;
        validation.validate_aud = false;
        Self { key, validation }
    }
}

impl IdentityVerifier for JwtIdentityVerifier {
    fn verify(&self, credential: &str, now: DateTime<Utc>) -> Result<IdentityClaim, TokenValidationError> {
        let data = jsonwebtoken::decode::<TokenClaims>(credential, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenValidationError::Expired,
                ErrorKind::ImmatureSignature => TokenValidationError::NotYetValid,
                _ => TokenValidationError::Rejected(e.to_string()),
            }
        })?;
        let raw = data.claims;

        let claim = IdentityClaim {
            subject: raw.sub,
            email: raw.email,
            name: raw.name,
            email_verified: raw.email_verified,
            disabled: raw.disabled,
            issued_at: timestamp(raw.iat)?,
            expires_at: timestamp(raw.exp)?,
        };
        validate_claims(&claim, now)?;
        Ok(claim)
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, TokenValidationError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| TokenValidationError::Rejected(format!("timestamp out of range: {secs}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "unit-secret";

    fn mint(payload: serde_json::Value) -> String {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &payload,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_maps_to_claim() {
        let now = Utc::now();
        let token = mint(json!({
            "sub": "firebase|u1",
            "email": "a@example.com",
            "email_verified": true,
            "iat": (now - Duration::minutes(1)).timestamp(),
            "exp": (now + Duration::minutes(10)).timestamp(),
        }));

        let claim = JwtIdentityVerifier::hs256(SECRET).verify(&token, now).unwrap();
        assert_eq!(claim.subject, "firebase|u1");
        assert_eq!(claim.email.as_deref(), Some("a@example.com"));
        assert!(claim.email_verified);
        assert!(!claim.disabled);
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let now = Utc::now();
        let token = mint(json!({
            "sub": "u1",
            "iat": (now - Duration::hours(2)).timestamp(),
            "exp": (now - Duration::hours(1)).timestamp(),
        }));

        let err = JwtIdentityVerifier::hs256(SECRET).verify(&token, now).unwrap_err();
        assert_eq!(err, TokenValidationError::Expired);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = Utc::now();
        let token = mint(json!({
            "sub": "u1",
            "iat": now.timestamp(),
            "exp": (now + Duration::minutes(5)).timestamp(),
        }));

        let err = JwtIdentityVerifier::hs256("other").verify(&token, now).unwrap_err();
        assert!(matches!(err, TokenValidationError::Rejected(_)));
    }

    #[test]
    fn firebase_project_requires_matching_audience() {
        let now = Utc::now();
        let token = mint(json!({
            "sub": "u1",
            "iss": "https://securetoken.google.com/other-project",
            "aud": "other-project",
            "iat": now.timestamp(),
            "exp": (now + Duration::minutes(5)).timestamp(),
        }));

        let verifier = JwtIdentityVerifier::hs256(SECRET).with_firebase_project("my-project");
        assert!(matches!(verifier.verify(&token, now), Err(TokenValidationError::Rejected(_))));
    }

    #[test]
    fn blank_subject_is_missing_subject() {
        let now = Utc::now();
        let token = mint(json!({
            "iat": now.timestamp(),
            "exp": (now + Duration::minutes(5)).timestamp(),
        }));

        let err = JwtIdentityVerifier::hs256(SECRET).verify(&token, now).unwrap_err();
        assert_eq!(err, TokenValidationError::MissingSubject);
    }
}

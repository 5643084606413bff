use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Verified identity claim (transport-agnostic).
///
/// What the identity provider vouches for once a credential has been decoded
/// and its signature checked by whatever verifier is wired in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaim {
    /// Provider subject; maps to `User::external_id`.
    pub subject: String,

    pub email: Option<String>,

    pub name: Option<String>,

    pub email_verified: bool,

    /// Account disabled at the provider.
    pub disabled: bool,

    /// Issued-at timestamp.
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("token has no subject")]
    MissingSubject,

    #[error("token rejected: {0}")]
    Rejected(String),
}

/// Deterministically validate claim contents.
///
/// Note: this validates the *claims* only. Signature verification / decoding
/// belongs to the [`IdentityVerifier`] implementation.
pub fn validate_claims(claim: &IdentityClaim, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claim.subject.trim().is_empty() {
        return Err(TokenValidationError::MissingSubject);
    }
    if claim.expires_at <= claim.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claim.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claim.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

/// Narrow port onto the identity provider.
///
/// Every failure is reported to the caller as `AuthenticationRequired`; the
/// variant is kept for logs only.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, credential: &str, now: DateTime<Utc>) -> Result<IdentityClaim, TokenValidationError>;
}

impl<V: IdentityVerifier + ?Sized> IdentityVerifier for std::sync::Arc<V> {
    fn verify(&self, credential: &str, now: DateTime<Utc>) -> Result<IdentityClaim, TokenValidationError> {
        (**self).verify(credential, now)
    }
}

//! Organization record and slug handling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orgguard_core::{DomainError, OrganizationId};

/// Longest slug accepted (one DNS label, so slugs double as subdomains).
pub const MAX_SLUG_LEN: usize = 63;

/// Slug used when a name contains nothing URL-safe.
const FALLBACK_SLUG: &str = "org";

/// URL-safe organization handle: lower-case ASCII alphanumerics separated by
/// single hyphens, no leading or trailing hyphen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.is_empty() || value.len() > MAX_SLUG_LEN {
            return Err(DomainError::validation(format!(
                "slug must be 1..={MAX_SLUG_LEN} characters"
            )));
        }
        let well_formed = value
            .split('-')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
        if !well_formed {
            return Err(DomainError::validation(format!(
                "slug '{value}' must be lower-case alphanumerics separated by single hyphens"
            )));
        }
        Ok(Self(value))
    }

    /// Derive a slug from a display name.
    ///
    /// Lower-cases, drops everything that is not alphanumeric, a hyphen or
    /// whitespace, then turns whitespace runs into single hyphens.
    pub fn derive(name: &str) -> Self {
        let kept: String = name
            .to_lowercase()
            .chars()
            .filter_map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    Some(c)
                } else if c.is_whitespace() {
                    Some(' ')
                } else {
                    None
                }
            })
            .collect();

        let mut slug = kept
            .split(|c: char| c == ' ' || c == '-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-");

        if slug.len() > MAX_SLUG_LEN {
            slug.truncate(MAX_SLUG_LEN);
            while slug.ends_with('-') {
                slug.pop();
            }
        }
        if slug.is_empty() {
            slug = FALLBACK_SLUG.to_string();
        }
        Self(slug)
    }

    /// Collision candidate `base-n`, trimmed so the result still fits.
    pub fn with_suffix(&self, n: u32) -> Self {
        let suffix = format!("-{n}");
        let mut base = self.0.clone();
        if base.len() + suffix.len() > MAX_SLUG_LEN {
            base.truncate(MAX_SLUG_LEN - suffix.len());
            while base.ends_with('-') {
                base.pop();
            }
        }
        Self(format!("{base}{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Slug {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Slug::parse(value)
    }
}

impl From<Slug> for String {
    fn from(value: Slug) -> Self {
        value.0
    }
}

impl core::fmt::Display for Slug {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub slug: Slug,
    pub parent_id: Option<OrganizationId>,
    pub is_active: bool,
    /// Opaque to the core.
    pub settings: serde_json::Value,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: impl Into<String>, slug: Slug, now: DateTime<Utc>) -> Self {
        Self {
            id: OrganizationId::new(),
            name: name.into(),
            slug,
            parent_id: None,
            is_active: true,
            settings: serde_json::Value::Object(Default::default()),
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_parent(mut self, parent_id: Option<OrganizationId>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = settings;
        self
    }

    /// Active and not soft-deleted: the only state a request may resolve to.
    pub fn is_available(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }
}

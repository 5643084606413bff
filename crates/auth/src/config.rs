//! Tunables of the authorization core.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuthzConfig {
    /// Deepest ancestor chain (and descendant level count) a walk may visit.
    pub max_hierarchy_depth: usize,

    /// Numeric suffixes tried after the base slug before giving up.
    pub slug_retry_limit: u32,

    /// Create a `user` account on first sight of an unknown verified subject.
    pub auto_provision_users: bool,

    pub tenant: TenantConfig,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            max_hierarchy_depth: 32,
            slug_retry_limit: 100,
            auto_provision_users: true,
            tenant: TenantConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TenantConfig {
    pub header_name: String,
    pub path_param: String,
    /// Leftmost host labels that never name a tenant.
    pub reserved_subdomains: Vec<String>,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            header_name: "x-organization-slug".to_string(),
            path_param: "slug".to_string(),
            reserved_subdomains: vec!["www".to_string(), "api".to_string()],
        }
    }
}

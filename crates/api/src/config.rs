//! Process configuration, read once at startup from the environment.

use anyhow::{Context, Result};

use orgguard_auth::{AuthzConfig, TenantConfig};

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JwtConfig {
    /// HS256 shared secret.
    pub secret: String,
    /// RS256 public key; takes precedence over `secret` when set.
    pub public_key_pem: Option<String>,
    /// Expect Firebase ID tokens for this project (issuer and audience).
    pub firebase_project_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: String,
    /// `None` runs on the in-memory store.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub authz: AuthzConfig,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the environment in production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = AuthzConfig::default();

        let secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let database_url = get("DATABASE_URL");
        if database_url.is_none() {
            tracing::warn!("DATABASE_URL not set; using in-memory directory store");
        }

        let tenant = TenantConfig {
            header_name: get("TENANT_HEADER").unwrap_or(defaults.tenant.header_name),
            path_param: get("TENANT_PATH_PARAM").unwrap_or(defaults.tenant.path_param),
            reserved_subdomains: get("RESERVED_SUBDOMAINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_ascii_lowercase())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.tenant.reserved_subdomains),
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            database_url,
            jwt: JwtConfig {
                secret,
                public_key_pem: get("JWT_PUBLIC_KEY_PEM"),
                firebase_project_id: get("FIREBASE_PROJECT_ID"),
            },
            authz: AuthzConfig {
                max_hierarchy_depth: parse_or(&get, "MAX_HIERARCHY_DEPTH", defaults.max_hierarchy_depth)?,
                slug_retry_limit: parse_or(&get, "SLUG_RETRY_LIMIT", defaults.slug_retry_limit)?,
                auto_provision_users: parse_or(&get, "AUTO_PROVISION_USERS", defaults.auto_provision_users)?,
                tenant,
            },
        })
    }

    /// In-memory configuration with an HS256 secret (tests, local runs).
    pub fn in_memory(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            database_url: None,
            jwt: JwtConfig {
                secret: jwt_secret.into(),
                public_key_pem: None,
                firebase_project_id: None,
            },
            authz: AuthzConfig::default(),
        }
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw.parse().with_context(|| format!("invalid {key}: '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<ApiConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.jwt.secret, DEV_JWT_SECRET);
        assert_eq!(cfg.authz, AuthzConfig::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            ("MAX_HIERARCHY_DEPTH", "8"),
            ("AUTO_PROVISION_USERS", "false"),
            ("RESERVED_SUBDOMAINS", "www, App ,"),
            ("TENANT_HEADER", "x-tenant"),
        ])
        .unwrap();
        assert_eq!(cfg.authz.max_hierarchy_depth, 8);
        assert!(!cfg.authz.auto_provision_users);
        assert_eq!(cfg.authz.tenant.reserved_subdomains, vec!["www", "app"]);
        assert_eq!(cfg.authz.tenant.header_name, "x-tenant");
    }

    #[test]
    fn malformed_numbers_are_errors() {
        let err = config(&[("SLUG_RETRY_LIMIT", "lots")]).unwrap_err();
        assert!(err.to_string().contains("SLUG_RETRY_LIMIT"));
    }
}

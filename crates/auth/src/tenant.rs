//! Tenant identifier resolution.
//!
//! Pure: looks only at the request signals handed in. Priority is
//! path parameter > header > host subdomain; the first present signal wins,
//! even if it later turns out not to name an organization.

use std::net::IpAddr;

use serde::Serialize;

use crate::config::TenantConfig;

/// Raw tenant hints extracted from one request.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantSignals<'a> {
    pub path_param: Option<&'a str>,
    pub header: Option<&'a str>,
    pub host: Option<&'a str>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantSource {
    PathParam,
    Header,
    Subdomain,
}

/// Slug candidate and the signal it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantHint {
    pub slug: String,
    pub source: TenantSource,
}

#[derive(Debug, Clone)]
pub struct TenantResolver {
    reserved_subdomains: Vec<String>,
}

impl TenantResolver {
    pub fn new(config: &TenantConfig) -> Self {
        Self {
            reserved_subdomains: config
                .reserved_subdomains
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
        }
    }

    /// `None` means "no tenant".
    pub fn resolve(&self, signals: &TenantSignals<'_>) -> Option<TenantHint> {
        if let Some(slug) = non_blank(signals.path_param) {
            return Some(TenantHint {
                slug,
                source: TenantSource::PathParam,
            });
        }
        if let Some(slug) = non_blank(signals.header) {
            return Some(TenantHint {
                slug,
                source: TenantSource::Header,
            });
        }
        signals
            .host
            .and_then(|host| self.subdomain(host))
            .map(|slug| TenantHint {
                slug,
                source: TenantSource::Subdomain,
            })
    }

    /// Leftmost label of a host with at least three labels, unless reserved.
    fn subdomain(&self, host: &str) -> Option<String> {
        let host = strip_port(host.trim()).trim_end_matches('.');
        if host.parse::<IpAddr>().is_ok() {
            return None;
        }
        let labels: Vec<&str> = host.split('.').collect();
        if labels.len() < 3 || labels.iter().any(|l| l.is_empty()) {
            return None;
        }
        let label = labels[0].to_ascii_lowercase();
        if self.reserved_subdomains.contains(&label) {
            return None;
        }
        Some(label)
    }
}

impl Default for TenantResolver {
    fn default() -> Self {
        Self::new(&TenantConfig::default())
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literal, with or without port.
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

use std::sync::Arc;

use axum::{
    extract::{RawPathParams, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::debug;

use orgguard_auth::{
    AuthzError, Authenticator, ContextBuilder, IdentityVerifier, TenantConfig, TenantResolver, TenantSignals,
};

use crate::app::errors;
use crate::context::{PrincipalContext, TenantContext};

// ─────────────────────────────────────────────────────────────────────────────
// Authentication
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<dyn IdentityVerifier>,
    pub authenticator: Authenticator,
}

/// Bearer verification, then account resolution; inserts [`PrincipalContext`].
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers()).map_err(|_| unauthenticated())?;
    let now = Utc::now();

    let claim = state.verifier.verify(token, now).map_err(|e| {
        debug!(reason = %e, "bearer token rejected");
        unauthenticated()
    })?;

    let identity = state
        .authenticator
        .authenticate(claim, now)
        .await
        .map_err(errors::access_error_to_response)?;

    req.extensions_mut().insert(PrincipalContext::new(identity));

    Ok(next.run(req).await)
}

fn unauthenticated() -> Response {
    errors::authz_error_to_response(&AuthzError::AuthenticationRequired)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tenant context
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct TenantState {
    pub resolver: TenantResolver,
    pub contexts: ContextBuilder,
    pub path_param: Arc<str>,
    pub header_name: Arc<str>,
}

impl TenantState {
    pub fn new(config: &TenantConfig, contexts: ContextBuilder) -> Self {
        Self {
            resolver: TenantResolver::new(config),
            contexts,
            path_param: Arc::from(config.path_param.as_str()),
            header_name: Arc::from(config.header_name.as_str()),
        }
    }

    /// Slug named by the request's path parameter, tenant header or host.
    pub fn tenant_slug(&self, params: Option<&RawPathParams>, headers: &HeaderMap) -> Option<String> {
        let path_param = params.and_then(|params| {
            params
                .iter()
                .find(|(key, _)| *key == &*self.path_param)
                .map(|(_, value)| value)
        });
        let signals = TenantSignals {
            path_param,
            header: header_str(headers, &self.header_name),
            host: header_str(headers, axum::http::header::HOST.as_str()),
        };
        self.resolver.resolve(&signals).map(|hint| {
            debug!(slug = %hint.slug, source = ?hint.source, "tenant hint resolved");
            hint.slug
        })
    }
}

/// Builds the [`TenantContext`] once per request; tenant-scoped routes only.
pub async fn tenant_middleware(
    State(state): State<TenantState>,
    params: Option<RawPathParams>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let slug = state.tenant_slug(params.as_ref(), req.headers());
    let identity = req
        .extensions()
        .get::<PrincipalContext>()
        .map(|p| p.identity().clone());

    let ctx = state
        .contexts
        .build(identity.as_ref(), slug.as_deref())
        .await
        .map_err(|e| {
            if let Some(denial) = e.denial() {
                debug!(reason = denial.code(), "tenant context denied");
            }
            errors::access_error_to_response(e)
        })?;

    req.extensions_mut().insert(TenantContext::new(ctx));

    Ok(next.run(req).await)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

use std::sync::Arc;

use orgguard_auth::{AuthorizationContext, Identity, User};

/// Principal context for a request (verified claim + resolved account).
///
/// Inserted by the auth middleware; present on every authenticated route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    identity: Identity,
}

impl PrincipalContext {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn user(&self) -> &User {
        &self.identity.user
    }
}

/// Tenant context for a request: the resolved authorization context of the
/// organization named by the route.
///
/// Built once per request by the tenant middleware and immutable afterwards.
#[derive(Debug, Clone)]
pub struct TenantContext {
    ctx: Arc<AuthorizationContext>,
}

impl TenantContext {
    pub fn new(ctx: AuthorizationContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn authorization(&self) -> &AuthorizationContext {
        &self.ctx
    }
}

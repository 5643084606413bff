//! API-side authorization guards.
//!
//! Handlers call these after the tenant context is built and before touching
//! the lifecycle service, keeping the core free of HTTP concerns.

use axum::response::Response;

use orgguard_auth::{guards, Guard, SystemRole};
use orgguard_core::UserId;

use crate::app::errors;
use crate::context::{PrincipalContext, TenantContext};

/// Check a route guard against the request's tenant context.
pub fn enforce(tenant: &TenantContext, guard: Guard) -> Result<(), Response> {
    guard
        .check(tenant.authorization())
        .map_err(|denial| errors::authz_error_to_response(&denial))
}

/// The caller is `target`, or holds at least `minimum` system-wide.
pub fn enforce_self_or_system_role(
    principal: &PrincipalContext,
    target: UserId,
    minimum: SystemRole,
) -> Result<(), Response> {
    guards::require_self_or_system_role(principal.user(), target, minimum)
        .map_err(|denial| errors::authz_error_to_response(&denial))
}

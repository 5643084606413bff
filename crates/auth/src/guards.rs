//! Access guards applied to a resolved [`AuthorizationContext`].
//!
//! Role guards compare against an explicit allowed set; rank ordering is never
//! inferred. A bypass context passes every role and permission guard.

use tracing::debug;

use orgguard_core::UserId;

use crate::authorize::{AccessError, AuthzError};
use crate::context::AuthorizationContext;
use crate::membership::Membership;
use crate::permissions::Permission;
use crate::roles::{OrgRole, SystemRole};
use crate::store::DirectoryStore;
use crate::user::User;

/// Declarative requirement attached to a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Roles(&'static [OrgRole]),
    Permission(Permission),
}

impl Guard {
    pub const fn roles(allowed: &'static [OrgRole]) -> Self {
        Guard::Roles(allowed)
    }

    pub const fn permission(permission: Permission) -> Self {
        Guard::Permission(permission)
    }

    pub fn check(&self, ctx: &AuthorizationContext) -> Result<(), AuthzError> {
        match self {
            Guard::Roles(allowed) => require_role(ctx, allowed),
            Guard::Permission(p) => require_permission(ctx, *p),
        }
    }
}

pub const OWNER_ONLY: &[OrgRole] = &[OrgRole::Owner];
pub const OWNER_OR_ADMIN: &[OrgRole] = &[OrgRole::Owner, OrgRole::Admin];

pub fn require_role(ctx: &AuthorizationContext, allowed: &[OrgRole]) -> Result<(), AuthzError> {
    if ctx.is_bypass() || allowed.contains(&ctx.role()) {
        return Ok(());
    }
    debug!(
        user_id = %ctx.user_id(),
        role = ctx.role().as_str(),
        "role guard denied"
    );
    Err(AuthzError::InsufficientRole {
        allowed: allowed.to_vec(),
    })
}

pub fn require_permission(ctx: &AuthorizationContext, permission: Permission) -> Result<(), AuthzError> {
    if ctx.allows(permission) {
        return Ok(());
    }
    debug!(
        user_id = %ctx.user_id(),
        permission = %permission,
        "permission guard denied"
    );
    Err(AuthzError::InsufficientPermission(permission))
}

/// Pass when `actor` targets their own account or holds at least `minimum` system role.
pub fn require_self_or_system_role(actor: &User, target: UserId, minimum: SystemRole) -> Result<(), AuthzError> {
    if actor.id == target || actor.system_role.satisfies(minimum) {
        return Ok(());
    }
    debug!(user_id = %actor.id, target = %target, "self-or-privileged guard denied");
    Err(AuthzError::AccessDenied)
}

/// Fail fast when removing or demoting `target` would leave its organization ownerless.
///
/// Advisory only: the store repeats the check atomically with the write.
pub async fn ensure_not_last_owner(store: &dyn DirectoryStore, target: &Membership) -> Result<(), AccessError> {
    if !target.is_active_owner() {
        return Ok(());
    }
    let others = store
        .memberships_of_organization(target.organization_id)
        .await?
        .into_iter()
        .filter(|m| m.id != target.id && m.is_active_owner())
        .count();
    if others == 0 {
        debug!(membership_id = %target.id, "last active owner");
        return Err(AuthzError::LastOwnerViolation.into());
    }
    Ok(())
}

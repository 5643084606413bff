//! Per-request authorization context.
//!
//! Building a context runs, in order:
//! 1. no verified identity → `AuthenticationRequired`
//! 2. no tenant slug → `TenantRequired`
//! 3. no live organization for the slug → `OrganizationNotFound`
//! 4. `super_admin` → bypass context, no membership consulted
//! 5. no active membership → `AccessDenied` (inactive is treated as missing)
//! 6. authorized context (organization, membership, role, permissions)
//! 7. spawned `last_access_at` stamp; its failure is logged and never surfaced

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use orgguard_core::UserId;

use crate::authorize::{AccessError, AuthzError};
use crate::identity::Identity;
use crate::membership::Membership;
use crate::organization::Organization;
use crate::permissions::{Permission, PermissionMap, PermissionMatrix};
use crate::roles::{OrgRole, SystemRole};
use crate::store::DirectoryStore;
use crate::user::User;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorizationContext {
    user: User,
    organization: Organization,
    membership: Option<Membership>,
    role: OrgRole,
    permissions: PermissionMap,
    bypass: bool,
}

impl AuthorizationContext {
    /// Context for a member acting in `organization`.
    pub fn for_member(user: User, organization: Organization, membership: Membership) -> Self {
        Self {
            role: membership.role,
            permissions: membership.permissions,
            user,
            organization,
            membership: Some(membership),
            bypass: false,
        }
    }

    /// Context for a system role that bypasses membership: acts as `owner`.
    pub fn bypass(user: User, organization: Organization) -> Self {
        Self {
            user,
            organization,
            membership: None,
            role: OrgRole::Owner,
            permissions: PermissionMatrix::defaults(OrgRole::Owner),
            bypass: true,
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    pub fn system_role(&self) -> SystemRole {
        self.user.system_role
    }

    pub fn organization(&self) -> &Organization {
        &self.organization
    }

    pub fn membership(&self) -> Option<&Membership> {
        self.membership.as_ref()
    }

    /// Effective role: the membership's role, or `owner` under bypass.
    pub fn role(&self) -> OrgRole {
        self.role
    }

    pub fn permissions(&self) -> &PermissionMap {
        &self.permissions
    }

    pub fn is_bypass(&self) -> bool {
        self.bypass
    }

    pub fn allows(&self, permission: Permission) -> bool {
        self.bypass || self.permissions.allows(permission)
    }

    pub fn has_permission(&self, resource: &str, action: &str) -> bool {
        self.bypass || self.permissions.has_permission(resource, action)
    }
}

#[derive(Clone)]
pub struct ContextBuilder {
    store: Arc<dyn DirectoryStore>,
}

impl ContextBuilder {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }

    #[instrument(skip_all, fields(slug = tenant))]
    pub async fn build(
        &self,
        identity: Option<&Identity>,
        tenant: Option<&str>,
    ) -> Result<AuthorizationContext, AccessError> {
        let identity = identity.ok_or(AuthzError::AuthenticationRequired)?;
        let ctx = self.resolve_tenant(identity, tenant).await?;
        if let Some(membership) = ctx.membership() {
            self.stamp_access(membership);
        }
        Ok(ctx)
    }

    /// Like [`build`](Self::build), but tenant failures (steps 2–5) yield `None`.
    /// Identity and store failures still propagate.
    pub async fn build_optional(
        &self,
        identity: Option<&Identity>,
        tenant: Option<&str>,
    ) -> Result<Option<AuthorizationContext>, AccessError> {
        match self.build(identity, tenant).await {
            Ok(ctx) => Ok(Some(ctx)),
            Err(AccessError::Denied(denial)) if denial.is_tenant_resolution_failure() => {
                debug!(reason = denial.code(), "no tenant context");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn resolve_tenant(
        &self,
        identity: &Identity,
        tenant: Option<&str>,
    ) -> Result<AuthorizationContext, AccessError> {
        let slug = tenant
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(AuthzError::TenantRequired)?;

        let organization = self
            .store
            .organization_by_slug(slug)
            .await?
            .filter(Organization::is_available)
            .ok_or_else(|| {
                debug!(slug, "no live organization for slug");
                AuthzError::OrganizationNotFound
            })?;

        let user = identity.user.clone();
        if user.system_role.bypasses_membership() {
            debug!(user_id = %user.id, organization_id = %organization.id, "system role bypass");
            return Ok(AuthorizationContext::bypass(user, organization));
        }

        let membership = self
            .store
            .membership_for(user.id, organization.id)
            .await?
            .filter(|m| m.is_active)
            .ok_or_else(|| {
                debug!(user_id = %user.id, organization_id = %organization.id, "no active membership");
                AuthzError::AccessDenied
            })?;

        Ok(AuthorizationContext::for_member(user, organization, membership))
    }

    /// Fire-and-forget; skipped outside a Tokio runtime.
    fn stamp_access(&self, membership: &Membership) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = Arc::clone(&self.store);
        let membership_id = membership.id;
        handle.spawn(async move {
            if let Err(e) = store.touch_membership(membership_id, Utc::now()).await {
                warn!(membership_id = %membership_id, error = %e, "failed to stamp last access");
            }
        });
    }
}

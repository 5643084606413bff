//! Organization and membership lifecycle.
//!
//! Each mutation is a sequence of named steps run here rather than in storage
//! callbacks: slug assignment and parent validation before the organization is
//! written, the founding owner membership with it, cascade soft-delete of the
//! whole subtree in one write, and permission recompute on role change. Owner
//! retention, cycle and depth re-checks are repeated by the store atomically
//! with the write.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, instrument};

use orgguard_core::{DomainError, MembershipId, OrganizationId};

use crate::authorize::{AccessError, AuthzError};
use crate::config::AuthzConfig;
use crate::context::AuthorizationContext;
use crate::guards;
use crate::hierarchy::{HierarchyError, HierarchyResolver};
use crate::membership::{Membership, NewMembership};
use crate::organization::Organization;
use crate::permissions::{Permission, PermissionMap};
use crate::roles::OrgRole;
use crate::store::{DirectoryStore, StoreError};
use crate::user::User;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error(transparent)]
    Denied(#[from] AuthzError),

    #[error(transparent)]
    Invalid(#[from] DomainError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Rejected(denial) => LifecycleError::Denied(denial),
            StoreError::NotFound(what) => LifecycleError::Invalid(DomainError::not_found(what)),
            StoreError::Conflict(msg) => LifecycleError::Invalid(DomainError::conflict(msg)),
            backend @ StoreError::Backend(_) => LifecycleError::Store(backend),
        }
    }
}

impl From<HierarchyError> for LifecycleError {
    fn from(err: HierarchyError) -> Self {
        if let Some(denial) = err.as_denial() {
            return LifecycleError::Denied(denial);
        }
        match err {
            HierarchyError::InvalidSlug(e) => LifecycleError::Invalid(e),
            HierarchyError::Store(e) => e.into(),
            other => LifecycleError::Invalid(DomainError::conflict(other.to_string())),
        }
    }
}

impl From<AccessError> for LifecycleError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Denied(denial) => LifecycleError::Denied(denial),
            AccessError::Store(e) => e.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrganization {
    pub name: String,
    /// Explicit slug; derived from `name` when absent.
    pub slug: Option<String>,
    pub parent_id: Option<OrganizationId>,
    pub settings: Option<serde_json::Value>,
}

/// One entry of a user's organization list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrganizationMembership {
    pub organization: Organization,
    pub membership: Membership,
}

pub struct OrganizationService {
    store: Arc<dyn DirectoryStore>,
    hierarchy: HierarchyResolver,
    // Serializes validate-then-write on the forest within this process.
    hierarchy_writes: Mutex<()>,
}

impl OrganizationService {
    pub fn new(store: Arc<dyn DirectoryStore>, config: &AuthzConfig) -> Self {
        Self {
            hierarchy: HierarchyResolver::new(
                Arc::clone(&store),
                config.max_hierarchy_depth,
                config.slug_retry_limit,
            ),
            store,
            hierarchy_writes: Mutex::new(()),
        }
    }

    pub fn hierarchy(&self) -> &HierarchyResolver {
        &self.hierarchy
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Organizations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create an organization owned by `actor`.
    #[instrument(skip_all, fields(user_id = %actor.id, name = %input.name), err)]
    pub async fn create_organization(
        &self,
        actor: &User,
        input: NewOrganization,
    ) -> Result<OrganizationMembership, LifecycleError> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("organization name must not be empty").into());
        }

        let _serialized = match input.parent_id {
            Some(_) => Some(self.hierarchy_writes.lock().await),
            None => None,
        };
        if let Some(parent_id) = input.parent_id {
            let parent = self
                .store
                .organization(parent_id)
                .await?
                .filter(Organization::is_available)
                .ok_or(AuthzError::OrganizationNotFound)?;
            self.ensure_can_attach(actor, &parent).await?;
            self.hierarchy.ensure_room_below(&parent).await?;
        }

        let slug = self.hierarchy.assign_slug(name, input.slug.as_deref()).await?;

        let now = Utc::now();
        let mut organization = Organization::new(name, slug, now).with_parent(input.parent_id);
        if let Some(settings) = input.settings {
            organization = organization.with_settings(settings);
        }
        let owner = Membership::founding_owner(actor.id, organization.id, now);

        self.store
            .insert_organization(organization.clone(), owner.clone())
            .await?;

        info!(
            organization_id = %organization.id,
            slug = %organization.slug,
            parent_id = ?organization.parent_id,
            "organization created"
        );
        Ok(OrganizationMembership {
            organization,
            membership: owner,
        })
    }

    /// Move the context's organization under `new_parent`, or to the root.
    #[instrument(skip_all, fields(organization_id = %ctx.organization().id, new_parent = ?new_parent), err)]
    pub async fn reparent(
        &self,
        ctx: &AuthorizationContext,
        new_parent: Option<OrganizationId>,
    ) -> Result<Organization, LifecycleError> {
        let _serialized = self.hierarchy_writes.lock().await;
        let org_id = ctx.organization().id;

        if let Some(parent_id) = new_parent {
            let parent = self.hierarchy.validate_new_parent(org_id, parent_id).await?;
            self.ensure_can_attach(ctx.user(), &parent).await?;
        }

        let updated = self
            .store
            .set_parent(org_id, new_parent, self.hierarchy.max_depth(), Utc::now())
            .await?;
        info!(organization_id = %org_id, parent_id = ?updated.parent_id, "organization reparented");
        Ok(updated)
    }

    /// Soft-delete the context's organization and every live descendant.
    ///
    /// The subtree is collected first and written in a single store call, so a
    /// walk that hits a broken hierarchy deletes nothing. Memberships are left
    /// untouched; a deleted organization simply stops resolving.
    #[instrument(skip_all, fields(organization_id = %ctx.organization().id), err)]
    pub async fn soft_delete(&self, ctx: &AuthorizationContext) -> Result<Vec<OrganizationId>, LifecycleError> {
        let _serialized = self.hierarchy_writes.lock().await;
        let root = ctx.organization().id;

        let mut ids = vec![root];
        ids.extend(self.hierarchy.descendants(root).await?.into_iter().map(|o| o.id));

        self.store.soft_delete_organizations(&ids, Utc::now()).await?;

        info!(count = ids.len(), "organization soft-deleted with descendants");
        Ok(ids)
    }

    /// Live organizations the user holds an active membership in.
    pub async fn my_organizations(&self, user: &User) -> Result<Vec<OrganizationMembership>, LifecycleError> {
        let mut out = Vec::new();
        for membership in self.store.memberships_of_user(user.id).await? {
            if !membership.is_active {
                continue;
            }
            if let Some(organization) = self
                .store
                .organization(membership.organization_id)
                .await?
                .filter(Organization::is_available)
            {
                out.push(OrganizationMembership {
                    organization,
                    membership,
                });
            }
        }
        Ok(out)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Memberships
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn members(&self, ctx: &AuthorizationContext) -> Result<Vec<Membership>, LifecycleError> {
        Ok(self
            .store
            .memberships_of_organization(ctx.organization().id)
            .await?)
    }

    #[instrument(skip_all, fields(organization_id = %ctx.organization().id, user_id = %input.user_id), err)]
    pub async fn add_member(
        &self,
        ctx: &AuthorizationContext,
        input: NewMembership,
    ) -> Result<Membership, LifecycleError> {
        self.store
            .user(input.user_id)
            .await?
            .filter(User::can_act)
            .ok_or_else(|| DomainError::not_found("user"))?;

        ensure_can_assign(ctx, input.role.unwrap_or_default())?;
        if let Some(permissions) = &input.permissions {
            ensure_can_grant(ctx, permissions)?;
        }

        let membership = Membership::create(
            input.user_id,
            ctx.organization().id,
            input.role,
            input.permissions,
            input.invited_by.or(Some(ctx.user_id())),
            Utc::now(),
        );
        self.store
            .insert_membership(membership.clone())
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => {
                    LifecycleError::Invalid(DomainError::conflict("user is already a member of this organization"))
                }
                other => other.into(),
            })?;

        info!(membership_id = %membership.id, role = membership.role.as_str(), "member added");
        Ok(membership)
    }

    /// Change a member's role; permissions are recomputed, custom grants carried over.
    #[instrument(skip_all, fields(organization_id = %ctx.organization().id, membership_id = %id, role = new_role.as_str()), err)]
    pub async fn change_role(
        &self,
        ctx: &AuthorizationContext,
        id: MembershipId,
        new_role: OrgRole,
    ) -> Result<Membership, LifecycleError> {
        let current = self.member_of(ctx, id).await?;
        if current.role == new_role {
            return Ok(current);
        }
        ensure_can_assign(ctx, current.role)?;
        ensure_can_assign(ctx, new_role)?;
        guards::ensure_not_last_owner(self.store.as_ref(), &current).await?;

        let next = current.with_role(new_role, Utc::now());
        self.store.update_membership(next.clone()).await?;
        info!(from = current.role.as_str(), to = new_role.as_str(), "member role changed");
        Ok(next)
    }

    /// Grant or revoke a single permission cell.
    pub async fn set_permission(
        &self,
        ctx: &AuthorizationContext,
        id: MembershipId,
        permission: Permission,
        granted: bool,
    ) -> Result<Membership, LifecycleError> {
        let current = self.member_of(ctx, id).await?;
        ensure_can_assign(ctx, current.role)?;
        if granted && !ctx.is_bypass() && !ctx.allows(permission) {
            return Err(AuthzError::InsufficientPermission(permission).into());
        }

        let next = current.with_permission(permission, granted, Utc::now());
        self.store.update_membership(next.clone()).await?;
        info!(membership_id = %id, permission = %permission, granted, "member permission set");
        Ok(next)
    }

    pub async fn set_member_active(
        &self,
        ctx: &AuthorizationContext,
        id: MembershipId,
        is_active: bool,
    ) -> Result<Membership, LifecycleError> {
        let current = self.member_of(ctx, id).await?;
        ensure_can_assign(ctx, current.role)?;
        if !is_active {
            guards::ensure_not_last_owner(self.store.as_ref(), &current).await?;
        }

        let next = current.with_active(is_active, Utc::now());
        self.store.update_membership(next.clone()).await?;
        info!(membership_id = %id, is_active, "member activation changed");
        Ok(next)
    }

    /// Remove a member. Anyone may leave; removing someone else needs an equal or higher role.
    #[instrument(skip_all, fields(organization_id = %ctx.organization().id, membership_id = %id), err)]
    pub async fn remove_member(
        &self,
        ctx: &AuthorizationContext,
        id: MembershipId,
    ) -> Result<Membership, LifecycleError> {
        let current = self.member_of(ctx, id).await?;
        if current.user_id != ctx.user_id() {
            ensure_can_assign(ctx, current.role)?;
        }
        guards::ensure_not_last_owner(self.store.as_ref(), &current).await?;

        let removed = self.store.delete_membership(id).await?;
        info!(user_id = %removed.user_id, "member removed");
        Ok(removed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Steps
    // ─────────────────────────────────────────────────────────────────────────

    /// Membership `id`, which must belong to the context's organization.
    pub async fn member_of(&self, ctx: &AuthorizationContext, id: MembershipId) -> Result<Membership, LifecycleError> {
        self.store
            .membership(id)
            .await?
            .filter(|m| m.organization_id == ctx.organization().id)
            .ok_or_else(|| DomainError::not_found("membership").into())
    }

    /// `actor` may hang organizations below `parent` only with `organizations.write` there.
    async fn ensure_can_attach(&self, actor: &User, parent: &Organization) -> Result<(), LifecycleError> {
        if actor.system_role.bypasses_membership() {
            return Ok(());
        }
        let membership = self
            .store
            .membership_for(actor.id, parent.id)
            .await?
            .filter(|m| m.is_active)
            .ok_or(AuthzError::AccessDenied)?;
        if !membership.allows(Permission::ORGANIZATIONS_WRITE) {
            return Err(AuthzError::InsufficientPermission(Permission::ORGANIZATIONS_WRITE).into());
        }
        Ok(())
    }
}

/// No one hands out, or edits holders of, a role above their own.
fn ensure_can_assign(ctx: &AuthorizationContext, role: OrgRole) -> Result<(), AuthzError> {
    if ctx.is_bypass() || role.rank() <= ctx.role().rank() {
        return Ok(());
    }
    Err(AuthzError::InsufficientRole {
        allowed: OrgRole::ALL
            .into_iter()
            .filter(|r| r.rank() >= role.rank())
            .collect(),
    })
}

/// No one hands out a permission they do not hold themselves.
fn ensure_can_grant(ctx: &AuthorizationContext, supplied: &PermissionMap) -> Result<(), AuthzError> {
    if ctx.is_bypass() {
        return Ok(());
    }
    match supplied.grants_beyond(ctx.permissions()).first() {
        Some(&extra) => Err(AuthzError::InsufficientPermission(extra)),
        None => Ok(()),
    }
}

//! Persistence port for users, organizations and memberships.
//!
//! Adapters live in `orgguard-infra`. Owner-affecting membership writes and
//! parent changes must be atomic inside the adapter: the count-and-compare (or
//! cycle re-check) and the write happen under one lock or transaction.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use orgguard_core::{MembershipId, OrganizationId, UserId};

use crate::authorize::AuthzError;
use crate::membership::Membership;
use crate::organization::Organization;
use crate::user::User;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A uniqueness constraint would be broken.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The write would break an authorization invariant (last owner, hierarchy cycle).
    #[error("write rejected: {0}")]
    Rejected(AuthzError),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

#[async_trait::async_trait]
pub trait DirectoryStore: Send + Sync {
    // Users

    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn user_by_external_id(&self, external_id: &str) -> Result<Option<User>, StoreError>;

    /// `Conflict` when the external id is already registered.
    async fn insert_user(&self, user: User) -> Result<(), StoreError>;

    // Organizations

    /// Any organization, including inactive or soft-deleted ones.
    async fn organization(&self, id: OrganizationId) -> Result<Option<Organization>, StoreError>;

    /// Any organization by slug, including inactive or soft-deleted ones.
    async fn organization_by_slug(&self, slug: &str) -> Result<Option<Organization>, StoreError>;

    async fn slug_exists(&self, slug: &str) -> Result<bool, StoreError>;

    /// Direct children that are not soft-deleted.
    async fn children(&self, id: OrganizationId) -> Result<Vec<Organization>, StoreError>;

    /// Insert an organization together with its founding owner membership.
    ///
    /// `Conflict` when the slug is taken.
    async fn insert_organization(
        &self,
        organization: Organization,
        founding_owner: Membership,
    ) -> Result<(), StoreError>;

    async fn update_organization(&self, organization: Organization) -> Result<(), StoreError>;

    /// Move `id` under `parent` (or to the root).
    ///
    /// Re-checks for cycles and depth atomically with the write, walking at most
    /// `max_depth` levels. `Rejected(HierarchyCycle)` when the move would close a
    /// loop, `Rejected(HierarchyDepthExceeded)` when the moved subtree would end
    /// up more than `max_depth` levels deep.
    async fn set_parent(
        &self,
        id: OrganizationId,
        parent: Option<OrganizationId>,
        max_depth: usize,
        now: DateTime<Utc>,
    ) -> Result<Organization, StoreError>;

    /// Soft-delete every listed organization in one write; nothing is written
    /// when any id is unknown.
    async fn soft_delete_organizations(&self, ids: &[OrganizationId], now: DateTime<Utc>) -> Result<(), StoreError>;

    // Memberships

    async fn membership(&self, id: MembershipId) -> Result<Option<Membership>, StoreError>;

    async fn membership_for(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> Result<Option<Membership>, StoreError>;

    async fn memberships_of_user(&self, user_id: UserId) -> Result<Vec<Membership>, StoreError>;

    async fn memberships_of_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Membership>, StoreError>;

    /// `Conflict` when the `(user, organization)` pair already has a row.
    async fn insert_membership(&self, membership: Membership) -> Result<(), StoreError>;

    /// Replace a membership row, keeping at least one active owner.
    ///
    /// `Rejected(LastOwnerViolation)` when the write would demote or deactivate
    /// the organization's only active owner.
    async fn update_membership(&self, membership: Membership) -> Result<(), StoreError>;

    /// Delete a membership row, keeping at least one active owner.
    async fn delete_membership(&self, id: MembershipId) -> Result<Membership, StoreError>;

    /// Best-effort `last_access_at` stamp.
    async fn touch_membership(&self, id: MembershipId, at: DateTime<Utc>) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
impl<S: DirectoryStore + ?Sized> DirectoryStore for Arc<S> {
    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        (**self).user(id).await
    }

    async fn user_by_external_id(&self, external_id: &str) -> Result<Option<User>, StoreError> {
        (**self).user_by_external_id(external_id).await
    }

    async fn insert_user(&self, user: User) -> Result<(), StoreError> {
        (**self).insert_user(user).await
    }

    async fn organization(&self, id: OrganizationId) -> Result<Option<Organization>, StoreError> {
        (**self).organization(id).await
    }

    async fn organization_by_slug(&self, slug: &str) -> Result<Option<Organization>, StoreError> {
        (**self).organization_by_slug(slug).await
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, StoreError> {
        (**self).slug_exists(slug).await
    }

    async fn children(&self, id: OrganizationId) -> Result<Vec<Organization>, StoreError> {
        (**self).children(id).await
    }

    async fn insert_organization(
        &self,
        organization: Organization,
        founding_owner: Membership,
    ) -> Result<(), StoreError> {
        (**self).insert_organization(organization, founding_owner).await
    }

    async fn update_organization(&self, organization: Organization) -> Result<(), StoreError> {
        (**self).update_organization(organization).await
    }

    async fn set_parent(
        &self,
        id: OrganizationId,
        parent: Option<OrganizationId>,
        max_depth: usize,
        now: DateTime<Utc>,
    ) -> Result<Organization, StoreError> {
        (**self).set_parent(id, parent, max_depth, now).await
    }

    async fn soft_delete_organizations(&self, ids: &[OrganizationId], now: DateTime<Utc>) -> Result<(), StoreError> {
        (**self).soft_delete_organizations(ids, now).await
    }

    async fn membership(&self, id: MembershipId) -> Result<Option<Membership>, StoreError> {
        (**self).membership(id).await
    }

    async fn membership_for(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> Result<Option<Membership>, StoreError> {
        (**self).membership_for(user_id, organization_id).await
    }

    async fn memberships_of_user(&self, user_id: UserId) -> Result<Vec<Membership>, StoreError> {
        (**self).memberships_of_user(user_id).await
    }

    async fn memberships_of_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Membership>, StoreError> {
        (**self).memberships_of_organization(organization_id).await
    }

    async fn insert_membership(&self, membership: Membership) -> Result<(), StoreError> {
        (**self).insert_membership(membership).await
    }

    async fn update_membership(&self, membership: Membership) -> Result<(), StoreError> {
        (**self).update_membership(membership).await
    }

    async fn delete_membership(&self, id: MembershipId) -> Result<Membership, StoreError> {
        (**self).delete_membership(id).await
    }

    async fn touch_membership(&self, id: MembershipId, at: DateTime<Utc>) -> Result<(), StoreError> {
        (**self).touch_membership(id, at).await
    }
}

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use orgguard_auth::membership::ensure_owner_retained;
use orgguard_auth::{AuthzError, DirectoryStore, Membership, Organization, StoreError, User};
use orgguard_core::{MembershipId, OrganizationId, UserId};

#[derive(Debug, Default)]
struct Directory {
    users: HashMap<UserId, User>,
    organizations: HashMap<OrganizationId, Organization>,
    memberships: HashMap<MembershipId, Membership>,
}

impl Directory {
    fn membership_for(&self, user_id: UserId, organization_id: OrganizationId) -> Option<&Membership> {
        self.memberships
            .values()
            .find(|m| m.user_id == user_id && m.organization_id == organization_id)
    }

    fn other_active_owners(&self, current: &Membership) -> usize {
        self.memberships
            .values()
            .filter(|m| {
                m.organization_id == current.organization_id && m.id != current.id && m.is_active_owner()
            })
            .count()
    }

    /// Levels of live organizations below `root`, never counting past `limit`.
    fn subtree_height(&self, root: OrganizationId, limit: usize) -> usize {
        let mut level = vec![root];
        let mut height = 0;
        while height < limit {
            let next: Vec<OrganizationId> = self
                .organizations
                .values()
                .filter(|o| o.deleted_at.is_none() && o.parent_id.is_some_and(|p| level.contains(&p)))
                .map(|o| o.id)
                .collect();
            if next.is_empty() {
                break;
            }
            level = next;
            height += 1;
        }
        height
    }
}

/// In-memory directory store.
///
/// Intended for tests/dev. One lock guards all three tables, so every
/// check-then-write (uniqueness, owner retention, hierarchy re-checks) is atomic.
#[derive(Debug, Default)]
pub struct InMemoryDirectoryStore {
    inner: RwLock<Directory>,
}

impl InMemoryDirectoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Directory>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Directory>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl DirectoryStore for InMemoryDirectoryStore {
    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn user_by_external_id(&self, external_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.external_id == external_id)
            .cloned())
    }

    async fn insert_user(&self, user: User) -> Result<(), StoreError> {
        let mut dir = self.write()?;
        if dir.users.contains_key(&user.id) || dir.users.values().any(|u| u.external_id == user.external_id) {
            return Err(StoreError::Conflict(format!(
                "user '{}' already exists",
                user.external_id
            )));
        }
        dir.users.insert(user.id, user);
        Ok(())
    }

    async fn organization(&self, id: OrganizationId) -> Result<Option<Organization>, StoreError> {
        Ok(self.read()?.organizations.get(&id).cloned())
    }

    async fn organization_by_slug(&self, slug: &str) -> Result<Option<Organization>, StoreError> {
        Ok(self
            .read()?
            .organizations
            .values()
            .find(|o| o.slug.as_str() == slug)
            .cloned())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, StoreError> {
        Ok(self
            .read()?
            .organizations
            .values()
            .any(|o| o.slug.as_str() == slug))
    }

    async fn children(&self, id: OrganizationId) -> Result<Vec<Organization>, StoreError> {
        let dir = self.read()?;
        let mut children: Vec<Organization> = dir
            .organizations
            .values()
            .filter(|o| o.parent_id == Some(id) && o.deleted_at.is_none())
            .cloned()
            .collect();
        children.sort_by_key(|o| (o.created_at, o.id));
        Ok(children)
    }

    async fn insert_organization(
        &self,
        organization: Organization,
        founding_owner: Membership,
    ) -> Result<(), StoreError> {
        let mut dir = self.write()?;
        if dir
            .organizations
            .values()
            .any(|o| o.slug == organization.slug)
        {
            return Err(StoreError::Conflict(format!(
                "slug '{}' is already taken",
                organization.slug
            )));
        }
        if let Some(parent_id) = organization.parent_id {
            if !dir.organizations.contains_key(&parent_id) {
                return Err(StoreError::NotFound("parent organization"));
            }
        }
        if !dir.users.contains_key(&founding_owner.user_id) {
            return Err(StoreError::NotFound("user"));
        }
        if founding_owner.organization_id != organization.id {
            return Err(StoreError::Conflict(
                "founding membership targets another organization".to_string(),
            ));
        }
        dir.organizations.insert(organization.id, organization);
        dir.memberships.insert(founding_owner.id, founding_owner);
        Ok(())
    }

    async fn update_organization(&self, organization: Organization) -> Result<(), StoreError> {
        let mut dir = self.write()?;
        if dir
            .organizations
            .values()
            .any(|o| o.id != organization.id && o.slug == organization.slug)
        {
            return Err(StoreError::Conflict(format!(
                "slug '{}' is already taken",
                organization.slug
            )));
        }
        let slot = dir
            .organizations
            .get_mut(&organization.id)
            .ok_or(StoreError::NotFound("organization"))?;
        *slot = organization;
        Ok(())
    }

    async fn set_parent(
        &self,
        id: OrganizationId,
        parent: Option<OrganizationId>,
        max_depth: usize,
        now: DateTime<Utc>,
    ) -> Result<Organization, StoreError> {
        let mut dir = self.write()?;
        if !dir.organizations.contains_key(&id) {
            return Err(StoreError::NotFound("organization"));
        }

        if let Some(parent_id) = parent {
            // Re-check under the write lock: walking up from the new parent must not reach `id`.
            let mut cursor = Some(parent_id);
            let mut steps = 0usize;
            while let Some(current) = cursor {
                if current == id {
                    return Err(StoreError::Rejected(AuthzError::HierarchyCycle));
                }
                if steps >= max_depth {
                    return Err(StoreError::Rejected(AuthzError::HierarchyCorruption { max_depth }));
                }
                let org = dir
                    .organizations
                    .get(&current)
                    .ok_or(StoreError::Rejected(AuthzError::OrganizationNotFound))?;
                if steps == 0 && !org.is_available() {
                    return Err(StoreError::Rejected(AuthzError::OrganizationNotFound));
                }
                cursor = org.parent_id;
                steps += 1;
            }
            if steps + 1 + dir.subtree_height(id, max_depth) > max_depth {
                return Err(StoreError::Rejected(AuthzError::HierarchyDepthExceeded { max_depth }));
            }
        }

        let org = dir
            .organizations
            .get_mut(&id)
            .ok_or(StoreError::NotFound("organization"))?;
        org.parent_id = parent;
        org.updated_at = now;
        Ok(org.clone())
    }

    async fn soft_delete_organizations(&self, ids: &[OrganizationId], now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut dir = self.write()?;
        if ids.iter().any(|id| !dir.organizations.contains_key(id)) {
            return Err(StoreError::NotFound("organization"));
        }
        for id in ids {
            if let Some(org) = dir.organizations.get_mut(id) {
                org.deleted_at = Some(now);
                org.updated_at = now;
            }
        }
        Ok(())
    }

    async fn membership(&self, id: MembershipId) -> Result<Option<Membership>, StoreError> {
        Ok(self.read()?.memberships.get(&id).cloned())
    }

    async fn membership_for(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> Result<Option<Membership>, StoreError> {
        Ok(self.read()?.membership_for(user_id, organization_id).cloned())
    }

    async fn memberships_of_user(&self, user_id: UserId) -> Result<Vec<Membership>, StoreError> {
        let dir = self.read()?;
        let mut rows: Vec<Membership> = dir
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| (m.created_at, m.id));
        Ok(rows)
    }

    async fn memberships_of_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Membership>, StoreError> {
        let dir = self.read()?;
        let mut rows: Vec<Membership> = dir
            .memberships
            .values()
            .filter(|m| m.organization_id == organization_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| (m.created_at, m.id));
        Ok(rows)
    }

    async fn insert_membership(&self, membership: Membership) -> Result<(), StoreError> {
        let mut dir = self.write()?;
        if !dir.organizations.contains_key(&membership.organization_id) {
            return Err(StoreError::NotFound("organization"));
        }
        if !dir.users.contains_key(&membership.user_id) {
            return Err(StoreError::NotFound("user"));
        }
        if dir.memberships.contains_key(&membership.id)
            || dir
                .membership_for(membership.user_id, membership.organization_id)
                .is_some()
        {
            return Err(StoreError::Conflict(
                "membership for this user and organization already exists".to_string(),
            ));
        }
        dir.memberships.insert(membership.id, membership);
        Ok(())
    }

    async fn update_membership(&self, membership: Membership) -> Result<(), StoreError> {
        let mut dir = self.write()?;
        let current = dir
            .memberships
            .get(&membership.id)
            .ok_or(StoreError::NotFound("membership"))?;
        if current.user_id != membership.user_id || current.organization_id != membership.organization_id {
            return Err(StoreError::Conflict(
                "membership user and organization are immutable".to_string(),
            ));
        }
        ensure_owner_retained(current, Some(&membership), dir.other_active_owners(current))
            .map_err(StoreError::Rejected)?;
        // `last_access_at` belongs to `touch_membership`.
        let last_access_at = current.last_access_at;
        dir.memberships.insert(
            membership.id,
            Membership {
                last_access_at,
                ..membership
            },
        );
        Ok(())
    }

    async fn delete_membership(&self, id: MembershipId) -> Result<Membership, StoreError> {
        let mut dir = self.write()?;
        let current = dir
            .memberships
            .get(&id)
            .ok_or(StoreError::NotFound("membership"))?;
        ensure_owner_retained(current, None, dir.other_active_owners(current)).map_err(StoreError::Rejected)?;
        dir.memberships
            .remove(&id)
            .ok_or(StoreError::NotFound("membership"))
    }

    async fn touch_membership(&self, id: MembershipId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut dir = self.write()?;
        let membership = dir
            .memberships
            .get_mut(&id)
            .ok_or(StoreError::NotFound("membership"))?;
        membership.last_access_at = Some(at);
        Ok(())
    }
}

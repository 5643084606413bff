//! Membership record: one user's role and permission overrides in one organization.
//!
//! # Invariants
//! - One row per `(user_id, organization_id)` (enforced by the store).
//! - `permissions` is always fully populated ([`PermissionMap`] is dense).
//! - An organization keeps at least one active `owner` ([`ensure_owner_retained`]).
//! - A role change recomputes permissions with the widen-only merge
//!   ([`PermissionMap::recompute_for_role_change`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orgguard_core::{MembershipId, OrganizationId, UserId};

use crate::authorize::AuthzError;
use crate::permissions::{Permission, PermissionMap, PermissionMatrix};
use crate::roles::OrgRole;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: MembershipId,
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub role: OrgRole,
    pub permissions: PermissionMap,
    pub is_active: bool,
    pub invited_by: Option<UserId>,
    pub invited_at: Option<DateTime<Utc>>,
    pub joined_at: Option<DateTime<Utc>>,
    pub last_access_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a membership. Missing fields take the creation defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMembership {
    pub user_id: UserId,
    pub role: Option<OrgRole>,
    pub permissions: Option<PermissionMap>,
    pub invited_by: Option<UserId>,
}

impl Membership {
    /// Build a new active membership.
    ///
    /// Role defaults to `employee`; permissions default to that role's matrix row.
    pub fn create(
        user_id: UserId,
        organization_id: OrganizationId,
        role: Option<OrgRole>,
        permissions: Option<PermissionMap>,
        invited_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Self {
        let role = role.unwrap_or_default();
        let permissions = permissions.unwrap_or_else(|| PermissionMatrix::defaults(role));
        Self {
            id: MembershipId::new(),
            user_id,
            organization_id,
            role,
            permissions,
            is_active: true,
            invited_by,
            invited_at: invited_by.map(|_| now),
            joined_at: Some(now),
            last_access_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The founding owner membership of a freshly created organization.
    pub fn founding_owner(user_id: UserId, organization_id: OrganizationId, now: DateTime<Utc>) -> Self {
        Self::create(user_id, organization_id, Some(OrgRole::Owner), None, None, now)
    }

    pub fn allows(&self, permission: Permission) -> bool {
        self.permissions.allows(permission)
    }

    /// String-keyed check; an absent resource or action is a denial.
    pub fn has_permission(&self, resource: &str, action: &str) -> bool {
        self.permissions.has_permission(resource, action)
    }

    pub fn grant_permission(&self, permission: Permission, now: DateTime<Utc>) -> Self {
        self.with_permission(permission, true, now)
    }

    pub fn revoke_permission(&self, permission: Permission, now: DateTime<Utc>) -> Self {
        self.with_permission(permission, false, now)
    }

    pub fn with_permission(&self, permission: Permission, granted: bool, now: DateTime<Utc>) -> Self {
        Self {
            permissions: self.permissions.with(permission, granted),
            updated_at: now,
            ..self.clone()
        }
    }

    /// Same membership under `new_role`, permissions recomputed.
    pub fn with_role(&self, new_role: OrgRole, now: DateTime<Utc>) -> Self {
        Self {
            role: new_role,
            permissions: self.permissions.recompute_for_role_change(self.role, new_role),
            updated_at: now,
            ..self.clone()
        }
    }

    pub fn with_active(&self, is_active: bool, now: DateTime<Utc>) -> Self {
        Self {
            is_active,
            updated_at: now,
            ..self.clone()
        }
    }

    pub fn is_active_owner(&self) -> bool {
        self.is_active && self.role == OrgRole::Owner
    }

    /// Grants this membership holds on top of its role defaults.
    pub fn custom_grants(&self) -> Vec<Permission> {
        self.permissions.grants_beyond(&PermissionMatrix::defaults(self.role))
    }
}

/// Reject a write that would leave an organization without an active owner.
///
/// - `current`: the row being updated or removed.
/// - `replacement`: the row after the write, `None` for a removal.
/// - `other_active_owners`: active owners in the same organization, excluding `current`.
///
/// Stores call this inside the same transaction (or lock) that performs the
/// write, which makes the count-and-compare atomic.
pub fn ensure_owner_retained(
    current: &Membership,
    replacement: Option<&Membership>,
    other_active_owners: usize,
) -> Result<(), AuthzError> {
    if !current.is_active_owner() {
        return Ok(());
    }
    if replacement.is_some_and(Membership::is_active_owner) {
        return Ok(());
    }
    if other_active_owners == 0 {
        return Err(AuthzError::LastOwnerViolation);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn member(role: Option<OrgRole>) -> Membership {
        Membership::create(UserId::new(), OrganizationId::new(), role, None, None, now())
    }

    #[test]
    fn creation_defaults_to_employee_with_matrix_permissions() {
        let m = member(None);
        assert_eq!(m.role, OrgRole::Employee);
        assert_eq!(m.permissions, PermissionMatrix::defaults(OrgRole::Employee));
        assert!(m.is_active);
        assert!(m.joined_at.is_some());
        assert!(m.invited_at.is_none());
    }

    #[test]
    fn explicit_permissions_are_kept_as_supplied() {
        let custom = PermissionMap::deny_all().grant(Permission::BILLING_READ);
        let m = Membership::create(
            UserId::new(),
            OrganizationId::new(),
            Some(OrgRole::Manager),
            Some(custom),
            Some(UserId::new()),
            now(),
        );
        assert_eq!(m.permissions, custom);
        assert!(m.invited_at.is_some());
    }

    #[test]
    fn has_permission_never_fails_on_absent_keys() {
        let m = member(Some(OrgRole::Owner));
        assert!(!m.has_permission("unknown", "read"));
        assert!(!m.has_permission("users", "approve"));
        assert!(m.has_permission("users", "invite"));
    }

    #[test]
    fn grant_and_revoke_flip_exactly_one_cell() {
        let m = member(Some(OrgRole::Viewer));
        let granted = m.grant_permission(Permission::BILLING_READ, now());
        assert!(granted.allows(Permission::BILLING_READ));
        assert_eq!(granted.permissions.grants_beyond(&m.permissions), vec![Permission::BILLING_READ]);

        let revoked = granted.revoke_permission(Permission::USERS_READ, now());
        assert!(!revoked.allows(Permission::USERS_READ));
        assert!(revoked.allows(Permission::BILLING_READ));
    }

    #[test]
    fn custom_export_grant_survives_viewer_manager_viewer_round_trip() {
        let viewer = member(Some(OrgRole::Viewer));
        assert!(!viewer.allows(Permission::REPORTS_WRITE));

        let manager = viewer.with_role(OrgRole::Manager, now());
        assert!(manager.allows(Permission::REPORTS_WRITE));

        let manager = manager.grant_permission(Permission::REPORTS_EXPORT, now());
        let viewer_again = manager.with_role(OrgRole::Viewer, now());

        assert!(viewer_again.allows(Permission::REPORTS_EXPORT));
        assert!(!viewer_again.allows(Permission::REPORTS_WRITE));
        assert_eq!(viewer_again.custom_grants(), vec![Permission::REPORTS_EXPORT]);
    }

    #[test]
    fn custom_revocation_does_not_survive_role_change() {
        let m = member(Some(OrgRole::Manager))
            .revoke_permission(Permission::REPORTS_WRITE, now())
            .with_role(OrgRole::Employee, now());
        assert!(m.allows(Permission::REPORTS_WRITE));
    }

    #[test]
    fn removing_sole_owner_is_rejected() {
        let owner = member(Some(OrgRole::Owner));
        assert_eq!(
            ensure_owner_retained(&owner, None, 0),
            Err(AuthzError::LastOwnerViolation)
        );
        assert!(ensure_owner_retained(&owner, None, 1).is_ok());
    }

    #[test]
    fn demoting_or_deactivating_sole_owner_is_rejected() {
        let owner = member(Some(OrgRole::Owner));
        let demoted = owner.with_role(OrgRole::Admin, now());
        let deactivated = owner.with_active(false, now());
        assert!(ensure_owner_retained(&owner, Some(&demoted), 0).is_err());
        assert!(ensure_owner_retained(&owner, Some(&deactivated), 0).is_err());

        let regranted = owner.grant_permission(Permission::BILLING_WRITE, now());
        assert!(ensure_owner_retained(&owner, Some(&regranted), 0).is_ok());
    }

    #[test]
    fn non_owner_rows_are_never_blocked() {
        let admin = member(Some(OrgRole::Admin));
        assert!(ensure_owner_retained(&admin, None, 0).is_ok());

        let inactive_owner = member(Some(OrgRole::Owner)).with_active(false, now());
        assert!(ensure_owner_retained(&inactive_owner, None, 0).is_ok());
    }
}

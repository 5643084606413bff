//! Closed resource/action permission model and the per-role default matrix.
//!
//! The set of `(resource, action)` pairs is fixed at compile time, so a
//! [`PermissionMap`] is a dense bit table: every key is always present and a
//! lookup never needs a null check.

use std::collections::BTreeMap;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::roles::OrgRole;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Users,
    Organizations,
    Reports,
    Billing,
    Api,
}

impl Resource {
    pub const ALL: [Resource; 5] = [
        Resource::Users,
        Resource::Organizations,
        Resource::Reports,
        Resource::Billing,
        Resource::Api,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Users => "users",
            Resource::Organizations => "organizations",
            Resource::Reports => "reports",
            Resource::Billing => "billing",
            Resource::Api => "api",
        }
    }

    pub fn parse(name: &str) -> Option<Resource> {
        Resource::ALL.into_iter().find(|r| r.as_str() == name)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Write,
    Delete,
    Invite,
    Settings,
    Export,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Read,
        Action::Write,
        Action::Delete,
        Action::Invite,
        Action::Settings,
        Action::Export,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Delete => "delete",
            Action::Invite => "invite",
            Action::Settings => "settings",
            Action::Export => "export",
        }
    }

    pub fn parse(name: &str) -> Option<Action> {
        Action::ALL.into_iter().find(|a| a.as_str() == name)
    }
}

/// One valid `(resource, action)` cell of the permission table.
///
/// Only the pairs listed in [`Permission::ALL`] can be constructed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Permission {
    resource: Resource,
    action: Action,
    index: usize,
}

macro_rules! permission_table {
    ($( $idx:literal => $konst:ident = ($res:ident, $act:ident) ),+ $(,)?) => {
        impl Permission {
            $(
                pub const $konst: Permission = Permission {
                    resource: Resource::$res,
                    action: Action::$act,
                    index: $idx,
                };
            )+

            /// Every permission cell, in table order.
            pub const ALL: [Permission; PERMISSION_COUNT] = [$( Permission::$konst ),+];
        }
    };
}

pub const PERMISSION_COUNT: usize = 15;

permission_table! {
    0 => USERS_READ = (Users, Read),
    1 => USERS_WRITE = (Users, Write),
    2 => USERS_DELETE = (Users, Delete),
    3 => USERS_INVITE = (Users, Invite),
    4 => ORGANIZATIONS_READ = (Organizations, Read),
    5 => ORGANIZATIONS_WRITE = (Organizations, Write),
    6 => ORGANIZATIONS_DELETE = (Organizations, Delete),
    7 => ORGANIZATIONS_SETTINGS = (Organizations, Settings),
    8 => REPORTS_READ = (Reports, Read),
    9 => REPORTS_WRITE = (Reports, Write),
    10 => REPORTS_EXPORT = (Reports, Export),
    11 => BILLING_READ = (Billing, Read),
    12 => BILLING_WRITE = (Billing, Write),
    13 => API_READ = (Api, Read),
    14 => API_WRITE = (Api, Write),
}

impl Permission {
    /// Look up the cell for a typed pair; `None` when the pair is not part of the table
    /// (e.g. `billing.export`).
    pub fn new(resource: Resource, action: Action) -> Option<Permission> {
        Permission::ALL
            .into_iter()
            .find(|p| p.resource == resource && p.action == action)
    }

    /// Look up the cell for string keys, as they arrive from routes or stored data.
    pub fn lookup(resource: &str, action: &str) -> Option<Permission> {
        Permission::new(Resource::parse(resource)?, Action::parse(action)?)
    }

    /// Parse the dotted form used in query strings and logs: `reports.export`.
    pub fn parse_dotted(s: &str) -> Option<Permission> {
        let (resource, action) = s.trim().split_once('.')?;
        Permission::lookup(resource, action)
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    pub fn action(&self) -> Action {
        self.action
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.resource.as_str(), self.action.as_str())
    }
}

/// Fully populated resource → action → bool table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PermissionMap {
    cells: [bool; PERMISSION_COUNT],
}

impl PermissionMap {
    pub const fn from_cells(cells: [bool; PERMISSION_COUNT]) -> Self {
        Self { cells }
    }

    pub const fn deny_all() -> Self {
        Self {
            cells: [false; PERMISSION_COUNT],
        }
    }

    pub fn allows(&self, permission: Permission) -> bool {
        self.cells[permission.index]
    }

    /// String-keyed lookup. Unknown resources or actions are a denial, never an error.
    pub fn has_permission(&self, resource: &str, action: &str) -> bool {
        Permission::lookup(resource, action)
            .map(|p| self.allows(p))
            .unwrap_or(false)
    }

    /// Copy of this map with one cell set.
    pub fn with(&self, permission: Permission, granted: bool) -> Self {
        let mut next = *self;
        next.cells[permission.index] = granted;
        next
    }

    pub fn grant(&self, permission: Permission) -> Self {
        self.with(permission, true)
    }

    pub fn revoke(&self, permission: Permission) -> Self {
        self.with(permission, false)
    }

    /// Cells set to `true` here but not in `baseline`.
    pub fn grants_beyond(&self, baseline: &PermissionMap) -> Vec<Permission> {
        Permission::ALL
            .into_iter()
            .filter(|p| self.allows(*p) && !baseline.allows(*p))
            .collect()
    }

    /// Cells set to `false` here but `true` in `baseline`.
    pub fn revocations_from(&self, baseline: &PermissionMap) -> Vec<Permission> {
        Permission::ALL
            .into_iter()
            .filter(|p| !self.allows(*p) && baseline.allows(*p))
            .collect()
    }

    pub fn granted(&self) -> Vec<Permission> {
        Permission::ALL
            .into_iter()
            .filter(|p| self.allows(*p))
            .collect()
    }

    /// Recompute the map of a membership whose role changes.
    ///
    /// Result = defaults of `new_role` plus every custom grant the current map
    /// held on top of `old_role`'s defaults. Custom grants only widen; custom
    /// revocations do not survive a role change.
    pub fn recompute_for_role_change(&self, old_role: OrgRole, new_role: OrgRole) -> PermissionMap {
        let custom = self.grants_beyond(&PermissionMatrix::defaults(old_role));
        custom
            .into_iter()
            .fold(PermissionMatrix::defaults(new_role), |map, p| map.grant(p))
    }

    fn to_nested(&self) -> BTreeMap<&'static str, BTreeMap<&'static str, bool>> {
        let mut nested: BTreeMap<&'static str, BTreeMap<&'static str, bool>> = BTreeMap::new();
        for p in Permission::ALL {
            nested
                .entry(p.resource.as_str())
                .or_default()
                .insert(p.action.as_str(), self.allows(p));
        }
        nested
    }
}

impl Default for PermissionMap {
    fn default() -> Self {
        Self::deny_all()
    }
}

impl Serialize for PermissionMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_nested().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PermissionMap {
    /// Accepts the nested JSON shape. Unknown keys are ignored and missing
    /// cells are denied, so a partially shaped document still loads fully populated.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let nested = BTreeMap::<String, BTreeMap<String, bool>>::deserialize(deserializer)?;
        let mut map = PermissionMap::deny_all();
        for (resource, actions) in &nested {
            for (action, granted) in actions {
                if let Some(p) = Permission::lookup(resource, action) {
                    map = map.with(p, *granted);
                }
            }
        }
        Ok(map)
    }
}

// Column order follows `Permission::ALL`:
//   users{read,write,delete,invite} organizations{read,write,delete,settings}
//   reports{read,write,export} billing{read,write} api{read,write}
const OWNER: PermissionMap = PermissionMap::from_cells([
    true, true, true, true, //
    true, true, true, true, //
    true, true, true, //
    true, true, //
    true, true,
]);

const ADMIN: PermissionMap = PermissionMap::from_cells([
    true, true, true, true, //
    true, true, false, true, //
    true, true, true, //
    true, false, //
    true, true,
]);

const MANAGER: PermissionMap = PermissionMap::from_cells([
    true, false, false, true, //
    true, false, false, false, //
    true, true, false, //
    false, false, //
    true, false,
]);

const EMPLOYEE: PermissionMap = PermissionMap::from_cells([
    true, false, false, false, //
    true, false, false, false, //
    true, true, false, //
    false, false, //
    true, false,
]);

const VIEWER: PermissionMap = PermissionMap::from_cells([
    true, false, false, false, //
    true, false, false, false, //
    true, false, false, //
    false, false, //
    false, false,
]);

const GUEST: PermissionMap = PermissionMap::from_cells([
    false, false, false, false, //
    true, false, false, false, //
    false, false, false, //
    false, false, //
    false, false,
]);

/// Static role → default permission table.
pub struct PermissionMatrix;

impl PermissionMatrix {
    pub fn defaults(role: OrgRole) -> PermissionMap {
        match role {
            OrgRole::Owner => OWNER,
            OrgRole::Admin => ADMIN,
            OrgRole::Manager => MANAGER,
            OrgRole::Employee => EMPLOYEE,
            OrgRole::Viewer => VIEWER,
            OrgRole::Guest => GUEST,
        }
    }

    /// Defaults for a role given by name; unknown names get the `guest` table.
    pub fn defaults_for_name(role: &str) -> PermissionMap {
        Self::defaults(OrgRole::parse_or_guest(role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_role() -> impl Strategy<Value = OrgRole> {
        prop::sample::select(OrgRole::ALL.to_vec())
    }

    fn any_permission() -> impl Strategy<Value = Permission> {
        prop::sample::select(Permission::ALL.to_vec())
    }

    #[test]
    fn every_role_table_serializes_with_exact_key_set() {
        let expected: BTreeMap<&str, Vec<&str>> = BTreeMap::from([
            ("users", vec!["delete", "invite", "read", "write"]),
            ("organizations", vec!["delete", "read", "settings", "write"]),
            ("reports", vec!["export", "read", "write"]),
            ("billing", vec!["read", "write"]),
            ("api", vec!["read", "write"]),
        ]);

        for role in OrgRole::ALL {
            let json = serde_json::to_value(PermissionMatrix::defaults(role)).unwrap();
            let obj = json.as_object().unwrap();
            assert_eq!(obj.len(), expected.len(), "role {role}");
            for (resource, actions) in &expected {
                let inner = obj[*resource].as_object().unwrap();
                let mut keys: Vec<&str> = inner.keys().map(String::as_str).collect();
                keys.sort();
                assert_eq!(&keys, actions, "role {role} resource {resource}");
                assert!(inner.values().all(|v| v.is_boolean()));
            }
        }
    }

    #[test]
    fn unknown_role_name_yields_guest_table() {
        assert_eq!(PermissionMatrix::defaults_for_name("root"), GUEST);
        assert_eq!(PermissionMatrix::defaults_for_name("OWNER"), OWNER);
    }

    #[test]
    fn owner_holds_everything_and_guest_only_reads_organizations() {
        assert_eq!(OWNER.granted().len(), PERMISSION_COUNT);
        assert_eq!(GUEST.granted(), vec![Permission::ORGANIZATIONS_READ]);
    }

    #[test]
    fn viewer_has_no_writes() {
        assert!(
            VIEWER
                .granted()
                .iter()
                .all(|p| p.action() == Action::Read)
        );
    }

    #[test]
    fn absent_keys_are_denied() {
        let map = OWNER;
        assert!(!map.has_permission("billing", "export"));
        assert!(!map.has_permission("payroll", "read"));
        assert!(!map.has_permission("", ""));
        assert!(map.has_permission("billing", "write"));
    }

    #[test]
    fn partial_document_deserializes_fully_populated() {
        let map: PermissionMap =
            serde_json::from_value(serde_json::json!({ "reports": { "export": true }, "extra": { "x": true } }))
                .unwrap();
        assert_eq!(map.granted(), vec![Permission::REPORTS_EXPORT]);
    }

    #[test]
    fn dotted_names_parse() {
        assert_eq!(Permission::parse_dotted("reports.export"), Some(Permission::REPORTS_EXPORT));
        assert_eq!(Permission::parse_dotted("reports"), None);
        assert_eq!(Permission::REPORTS_EXPORT.to_string(), "reports.export");
    }

    #[test]
    fn role_change_keeps_custom_grants_and_drops_old_defaults() {
        let viewer = PermissionMatrix::defaults(OrgRole::Viewer);
        let as_manager = viewer.recompute_for_role_change(OrgRole::Viewer, OrgRole::Manager);
        assert!(as_manager.allows(Permission::REPORTS_WRITE));

        let customised = as_manager.grant(Permission::REPORTS_EXPORT);
        let back = customised.recompute_for_role_change(OrgRole::Manager, OrgRole::Viewer);

        assert!(back.allows(Permission::REPORTS_EXPORT));
        assert!(!back.allows(Permission::REPORTS_WRITE));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: a recomputed map never drops below the new role's defaults.
        #[test]
        fn role_change_never_shrinks_below_new_defaults(
            old in any_role(),
            new in any_role(),
            flips in prop::collection::vec((any_permission(), any::<bool>()), 0..20),
        ) {
            let current = flips
                .into_iter()
                .fold(PermissionMatrix::defaults(old), |m, (p, g)| m.with(p, g));
            let next = current.recompute_for_role_change(old, new);
            let defaults = PermissionMatrix::defaults(new);

            prop_assert!(next.revocations_from(&defaults).is_empty());
            for p in next.grants_beyond(&defaults) {
                prop_assert!(current.allows(p));
            }
        }

        /// Property: granting then revoking a cell leaves the other cells untouched.
        #[test]
        fn single_cell_flip_is_local(role in any_role(), p in any_permission()) {
            let base = PermissionMatrix::defaults(role);
            let flipped = base.grant(p).revoke(p);
            for other in Permission::ALL.into_iter().filter(|o| *o != p) {
                prop_assert_eq!(flipped.allows(other), base.allows(other));
            }
            prop_assert!(!flipped.allows(p));
        }
    }
}

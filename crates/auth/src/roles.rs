use core::str::FromStr;

use serde::{Deserialize, Serialize};

use orgguard_core::DomainError;

/// Role of a user inside one organization.
///
/// Variants are declared from most to least privileged; `rank()` exposes that
/// ordering for display and for the creation-time "last owner" bookkeeping.
/// Guards never infer access from the ordering: allowed roles are always
/// listed explicitly.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgRole {
    Owner,
    Admin,
    Manager,
    Employee,
    Viewer,
    Guest,
}

impl OrgRole {
    pub const ALL: [OrgRole; 6] = [
        OrgRole::Owner,
        OrgRole::Admin,
        OrgRole::Manager,
        OrgRole::Employee,
        OrgRole::Viewer,
        OrgRole::Guest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrgRole::Owner => "owner",
            OrgRole::Admin => "admin",
            OrgRole::Manager => "manager",
            OrgRole::Employee => "employee",
            OrgRole::Viewer => "viewer",
            OrgRole::Guest => "guest",
        }
    }

    /// Higher is more privileged (`owner` = 5, `guest` = 0).
    pub fn rank(&self) -> u8 {
        match self {
            OrgRole::Owner => 5,
            OrgRole::Admin => 4,
            OrgRole::Manager => 3,
            OrgRole::Employee => 2,
            OrgRole::Viewer => 1,
            OrgRole::Guest => 0,
        }
    }

    /// Parse a stored or user-supplied role name, falling back to `guest`.
    ///
    /// Used wherever a malformed value must fail closed instead of erroring.
    pub fn parse_or_guest(name: &str) -> OrgRole {
        name.parse().unwrap_or(OrgRole::Guest)
    }
}

impl Default for OrgRole {
    /// Memberships created without an explicit role join as employees.
    fn default() -> Self {
        OrgRole::Employee
    }
}

impl FromStr for OrgRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        OrgRole::ALL
            .into_iter()
            .find(|r| r.as_str() == normalized)
            .ok_or_else(|| DomainError::validation(format!("unknown organization role '{s}'")))
    }
}

impl core::fmt::Display for OrgRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform-wide privilege tier, independent of any organization.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemRole {
    SuperAdmin,
    SystemAdmin,
    #[default]
    User,
}

impl SystemRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemRole::SuperAdmin => "super_admin",
            SystemRole::SystemAdmin => "system_admin",
            SystemRole::User => "user",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            SystemRole::SuperAdmin => 2,
            SystemRole::SystemAdmin => 1,
            SystemRole::User => 0,
        }
    }

    /// Only the top tier bypasses organization membership.
    pub fn bypasses_membership(&self) -> bool {
        matches!(self, SystemRole::SuperAdmin)
    }

    /// `true` when this tier is `required` or above it.
    pub fn satisfies(&self, required: SystemRole) -> bool {
        self.rank() >= required.rank()
    }
}

impl FromStr for SystemRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "super_admin" => Ok(SystemRole::SuperAdmin),
            "system_admin" => Ok(SystemRole::SystemAdmin),
            "user" => Ok(SystemRole::User),
            other => Err(DomainError::validation(format!("unknown system role '{other}'"))),
        }
    }
}

impl core::fmt::Display for SystemRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("Owner".parse::<OrgRole>().unwrap(), OrgRole::Owner);
        assert_eq!(" viewer ".parse::<OrgRole>().unwrap(), OrgRole::Viewer);
        assert!("root".parse::<OrgRole>().is_err());
    }

    #[test]
    fn unknown_role_name_fails_closed_to_guest() {
        assert_eq!(OrgRole::parse_or_guest("superuser"), OrgRole::Guest);
        assert_eq!(OrgRole::parse_or_guest(""), OrgRole::Guest);
        assert_eq!(OrgRole::parse_or_guest("manager"), OrgRole::Manager);
    }

    #[test]
    fn ranks_follow_declaration_order() {
        let ranks: Vec<u8> = OrgRole::ALL.iter().map(OrgRole::rank).collect();
        assert!(ranks.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn only_super_admin_bypasses() {
        assert!(SystemRole::SuperAdmin.bypasses_membership());
        assert!(!SystemRole::SystemAdmin.bypasses_membership());
        assert!(!SystemRole::User.bypasses_membership());
        assert!(SystemRole::SuperAdmin.satisfies(SystemRole::SystemAdmin));
        assert!(!SystemRole::User.satisfies(SystemRole::SystemAdmin));
    }
}

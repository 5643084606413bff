//! User account record as seen by the authorization core.
//!
//! Accounts are owned by the identity subsystem; the core reads them to learn
//! the caller's system role and whether the account may act at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orgguard_core::UserId;

use crate::roles::SystemRole;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Stable subject issued by the identity provider.
    pub external_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub system_role: SystemRole,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// A fresh, active account with the default `user` system role.
    pub fn provisioned(external_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: UserId::new(),
            external_id: external_id.into(),
            email: None,
            display_name: None,
            system_role: SystemRole::User,
            is_active: true,
            deleted_at: None,
            created_at: now,
        }
    }

    pub fn with_system_role(mut self, role: SystemRole) -> Self {
        self.system_role = role;
        self
    }

    pub fn with_profile(mut self, email: Option<String>, display_name: Option<String>) -> Self {
        self.email = email;
        self.display_name = display_name;
        self
    }

    /// Active and not soft-deleted.
    pub fn can_act(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }
}

//! `orgguard-auth`: tenant-scoped authorization core.
//!
//! This crate is intentionally decoupled from HTTP and storage: persistence is
//! reached through the [`DirectoryStore`] port and credentials through the
//! [`IdentityVerifier`] port.

pub mod authorize;
pub mod claims;
pub mod config;
pub mod context;
pub mod guards;
pub mod hierarchy;
pub mod identity;
pub mod lifecycle;
pub mod membership;
pub mod organization;
pub mod permissions;
pub mod roles;
pub mod store;
pub mod tenant;
pub mod user;

pub use authorize::{explain_permission, AccessError, AuthorizationExplanation, AuthzError, GrantSource};
pub use claims::{validate_claims, IdentityClaim, IdentityVerifier, TokenValidationError};
pub use config::{AuthzConfig, TenantConfig};
pub use context::{AuthorizationContext, ContextBuilder};
pub use guards::Guard;
pub use hierarchy::{HierarchyError, HierarchyResolver};
pub use identity::{Authenticator, Identity};
pub use lifecycle::{LifecycleError, NewOrganization, OrganizationMembership, OrganizationService};
pub use membership::{ensure_owner_retained, Membership, NewMembership};
pub use organization::{Organization, Slug};
pub use permissions::{Action, Permission, PermissionMap, PermissionMatrix, Resource};
pub use roles::{OrgRole, SystemRole};
pub use store::{DirectoryStore, StoreError};
pub use tenant::{TenantHint, TenantResolver, TenantSignals, TenantSource};
pub use user::User;

use serde::Serialize;
use thiserror::Error;

use orgguard_core::{OrganizationId, UserId};

use crate::context::AuthorizationContext;
use crate::permissions::{Permission, PermissionMatrix};
use crate::roles::OrgRole;
use crate::store::StoreError;

/// Every way the authorization core can refuse a request.
///
/// All variants are recoverable by the caller and map to 4xx responses.
/// `HierarchyCorruption` additionally signals a stored invariant was broken upstream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("authentication required")]
    AuthenticationRequired,

    #[error("tenant required: no organization could be resolved from the request")]
    TenantRequired,

    #[error("organization not found")]
    OrganizationNotFound,

    #[error("access denied: no active membership in this organization")]
    AccessDenied,

    #[error("insufficient role: requires one of {}", join_roles(.allowed))]
    InsufficientRole { allowed: Vec<OrgRole> },

    #[error("insufficient permission: missing '{0}'")]
    InsufficientPermission(Permission),

    #[error("an organization must keep at least one active owner")]
    LastOwnerViolation,

    #[error("organization hierarchy is corrupt: walk exceeded {max_depth} levels")]
    HierarchyCorruption { max_depth: usize },

    #[error("organization hierarchy cycle: an organization cannot be its own ancestor")]
    HierarchyCycle,

    #[error("organization hierarchy would exceed {max_depth} levels")]
    HierarchyDepthExceeded { max_depth: usize },
}

impl AuthzError {
    /// Stable machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            AuthzError::AuthenticationRequired => "authentication_required",
            AuthzError::TenantRequired => "tenant_required",
            AuthzError::OrganizationNotFound => "organization_not_found",
            AuthzError::AccessDenied => "access_denied",
            AuthzError::InsufficientRole { .. } => "insufficient_role",
            AuthzError::InsufficientPermission(_) => "insufficient_permission",
            AuthzError::LastOwnerViolation => "last_owner_violation",
            AuthzError::HierarchyCorruption { .. } => "hierarchy_corruption",
            AuthzError::HierarchyCycle => "hierarchy_cycle",
            AuthzError::HierarchyDepthExceeded { .. } => "hierarchy_depth_exceeded",
        }
    }

    /// Failures of steps 2–5 of context building, which the optional variant absorbs.
    pub fn is_tenant_resolution_failure(&self) -> bool {
        matches!(
            self,
            AuthzError::TenantRequired | AuthzError::OrganizationNotFound | AuthzError::AccessDenied
        )
    }
}

fn join_roles(roles: &[OrgRole]) -> String {
    roles
        .iter()
        .map(OrgRole::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Outcome of resolving or enforcing access: a denial, or a store that could not answer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error(transparent)]
    Denied(#[from] AuthzError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AccessError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Rejected(denial) => AccessError::Denied(denial),
            other => AccessError::Store(other),
        }
    }
}

impl AccessError {
    pub fn denial(&self) -> Option<&AuthzError> {
        match self {
            AccessError::Denied(d) => Some(d),
            AccessError::Store(_) => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of a permission decision inside a resolved context.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub required_permission: String,
    pub granted: bool,
    pub source: GrantSource,
    pub reason: String,
    pub principal: PrincipalState,
    pub denial_reason: Option<DenialReason>,
}

/// Where a granted permission came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantSource {
    SystemBypass,
    RoleDefault,
    CustomGrant,
    NotGranted,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub role: OrgRole,
    pub bypass: bool,
    pub effective_permissions: Vec<String>,
    pub custom_grants: Vec<String>,
    pub custom_revocations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub code: &'static str,
    pub message: String,
    pub suggestions: Vec<String>,
}

/// Explain why `required` is (or is not) granted in `ctx`.
///
/// Answers "why was this request allowed/denied?" without re-running any IO.
pub fn explain_permission(ctx: &AuthorizationContext, required: Permission) -> AuthorizationExplanation {
    let defaults = PermissionMatrix::defaults(ctx.role());
    let effective = ctx.permissions();
    let required_str = required.to_string();

    let principal = PrincipalState {
        user_id: ctx.user_id(),
        organization_id: ctx.organization().id,
        role: ctx.role(),
        bypass: ctx.is_bypass(),
        effective_permissions: effective.granted().iter().map(ToString::to_string).collect(),
        custom_grants: effective.grants_beyond(&defaults).iter().map(ToString::to_string).collect(),
        custom_revocations: effective
            .revocations_from(&defaults)
            .iter()
            .map(ToString::to_string)
            .collect(),
    };

    let source = if ctx.is_bypass() {
        GrantSource::SystemBypass
    } else if !effective.allows(required) {
        GrantSource::NotGranted
    } else if defaults.allows(required) {
        GrantSource::RoleDefault
    } else {
        GrantSource::CustomGrant
    };

    let (reason, denial_reason) = match source {
        GrantSource::SystemBypass => (
            format!("System role '{}' bypasses organization membership", ctx.system_role()),
            None,
        ),
        GrantSource::RoleDefault => (
            format!("Role '{}' grants '{}' by default", ctx.role(), required_str),
            None,
        ),
        GrantSource::CustomGrant => (
            format!("'{}' was granted to this membership as a custom override", required_str),
            None,
        ),
        GrantSource::NotGranted => {
            let mut suggestions = Vec::new();
            let granting_roles: Vec<&str> = OrgRole::ALL
                .iter()
                .filter(|r| PermissionMatrix::defaults(**r).allows(required))
                .map(OrgRole::as_str)
                .collect();
            if defaults.allows(required) {
                suggestions.push(format!(
                    "'{}' is a default of role '{}' but was revoked on this membership; re-grant it",
                    required_str,
                    ctx.role()
                ));
            } else {
                suggestions.push(format!("Assign one of the roles granting it by default: {granting_roles:?}"));
                suggestions.push(format!("Grant '{required_str}' to the membership as a custom override"));
            }
            (
                format!("Membership with role '{}' does not hold '{}'", ctx.role(), required_str),
                Some(DenialReason {
                    code: AuthzError::InsufficientPermission(required).code(),
                    message: format!("Missing required permission: '{required_str}'"),
                    suggestions,
                }),
            )
        }
    };

    AuthorizationExplanation {
        required_permission: required_str,
        granted: source != GrantSource::NotGranted,
        source,
        reason,
        principal,
        denial_reason,
    }
}

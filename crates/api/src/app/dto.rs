use serde::{Deserialize, Serialize};

use orgguard_auth::{
    AuthorizationContext, Membership, NewMembership, NewOrganization, OrgRole, Organization, Permission,
    PermissionMap, User,
};
use orgguard_core::{MembershipId, OrganizationId, UserId};

use crate::app::errors;

// -------------------------
// Path parameters
// -------------------------

#[derive(Debug, Deserialize)]
pub struct UserPath {
    pub user_id: UserId,
}

/// Member routes sit under the tenant prefix; the slug segment is ignored here.
#[derive(Debug, Deserialize)]
pub struct MemberPath {
    pub id: MembershipId,
}

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    pub name: String,
    pub slug: Option<String>,
    pub parent_id: Option<OrganizationId>,
    pub settings: Option<serde_json::Value>,
}

impl From<CreateOrganizationRequest> for NewOrganization {
    fn from(req: CreateOrganizationRequest) -> Self {
        NewOrganization {
            name: req.name,
            slug: req.slug,
            parent_id: req.parent_id,
            settings: req.settings,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SetParentRequest {
    /// `null` moves the organization to the root.
    pub parent_id: Option<OrganizationId>,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: UserId,
    pub role: Option<OrgRole>,
    pub permissions: Option<PermissionMap>,
}

impl From<AddMemberRequest> for NewMembership {
    fn from(req: AddMemberRequest) -> Self {
        NewMembership {
            user_id: req.user_id,
            role: req.role,
            permissions: req.permissions,
            invited_by: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: OrgRole,
}

/// One permission cell, in dotted form (`reports.export`).
#[derive(Debug, Deserialize)]
pub struct SetPermissionRequest {
    pub permission: String,
    pub granted: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub permission: String,
}

pub fn parse_permission(s: &str) -> Result<Permission, axum::response::Response> {
    Permission::parse_dotted(s).ok_or_else(|| {
        errors::json_error(
            axum::http::StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_permission",
            format!("unknown permission '{s}'; expected '<resource>.<action>'"),
        )
    })
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub system_role: String,
    pub is_active: bool,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            system_role: user.system_role.as_str().to_string(),
            is_active: user.is_active,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrganizationResponse {
    pub id: OrganizationId,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<OrganizationId>,
    pub is_active: bool,
    pub settings: serde_json::Value,
}

impl From<&Organization> for OrganizationResponse {
    fn from(org: &Organization) -> Self {
        Self {
            id: org.id,
            name: org.name.clone(),
            slug: org.slug.as_str().to_string(),
            parent_id: org.parent_id,
            is_active: org.is_active,
            settings: org.settings.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MembershipResponse {
    pub id: MembershipId,
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub role: OrgRole,
    pub permissions: PermissionMap,
    pub is_active: bool,
    pub invited_by: Option<UserId>,
    pub joined_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_access_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&Membership> for MembershipResponse {
    fn from(m: &Membership) -> Self {
        Self {
            id: m.id,
            user_id: m.user_id,
            organization_id: m.organization_id,
            role: m.role,
            permissions: m.permissions,
            is_active: m.is_active,
            invited_by: m.invited_by,
            joined_at: m.joined_at,
            last_access_at: m.last_access_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub user_id: UserId,
    pub organization: OrganizationResponse,
    pub role: OrgRole,
    pub permissions: PermissionMap,
    pub bypass: bool,
}

impl From<&AuthorizationContext> for ContextResponse {
    fn from(ctx: &AuthorizationContext) -> Self {
        Self {
            user_id: ctx.user_id(),
            organization: ctx.organization().into(),
            role: ctx.role(),
            permissions: *ctx.permissions(),
            bypass: ctx.is_bypass(),
        }
    }
}

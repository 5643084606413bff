use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use orgguard_auth::{explain_permission, guards, Guard, LifecycleError, Permission};

use crate::app::{dto, errors, Services};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /organizations - create an organization owned by the caller
pub async fn create_organization(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateOrganizationRequest>,
) -> axum::response::Response {
    match services
        .organizations
        .create_organization(principal.user(), body.into())
        .await
    {
        Ok(created) => (
            StatusCode::CREATED,
            Json(json!({
                "organization": dto::OrganizationResponse::from(&created.organization),
                "membership": dto::MembershipResponse::from(&created.membership),
            })),
        )
            .into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

/// GET /orgs/:slug
pub async fn get_organization(Extension(tenant): Extension<TenantContext>) -> axum::response::Response {
    if let Err(denied) = authz::enforce(&tenant, Guard::permission(Permission::ORGANIZATIONS_READ)) {
        return denied;
    }
    let ctx = tenant.authorization();
    (
        StatusCode::OK,
        Json(json!({
            "organization": dto::OrganizationResponse::from(ctx.organization()),
            "role": ctx.role(),
            "bypass": ctx.is_bypass(),
        })),
    )
        .into_response()
}

/// DELETE /orgs/:slug - soft-delete with every descendant (owner only)
pub async fn delete_organization(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    if let Err(denied) = authz::enforce(&tenant, Guard::roles(guards::OWNER_ONLY)) {
        return denied;
    }
    match services.organizations.soft_delete(tenant.authorization()).await {
        Ok(deleted) => (StatusCode::OK, Json(json!({ "deleted": deleted }))).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

/// PUT /orgs/:slug/parent - move under another organization, or to the root
pub async fn set_parent(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::SetParentRequest>,
) -> axum::response::Response {
    if let Err(denied) = authz::enforce(&tenant, Guard::roles(guards::OWNER_OR_ADMIN)) {
        return denied;
    }
    match services
        .organizations
        .reparent(tenant.authorization(), body.parent_id)
        .await
    {
        Ok(org) => (StatusCode::OK, Json(dto::OrganizationResponse::from(&org))).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

/// GET /orgs/:slug/ancestors - root first, this organization last
pub async fn ancestors(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    if let Err(denied) = authz::enforce(&tenant, Guard::permission(Permission::ORGANIZATIONS_READ)) {
        return denied;
    }
    match services
        .organizations
        .hierarchy()
        .ancestor_chain(tenant.authorization().organization())
        .await
    {
        Ok(chain) => organization_list(&chain),
        Err(e) => errors::lifecycle_error_to_response(LifecycleError::from(e)),
    }
}

/// GET /orgs/:slug/descendants - breadth-first, excluding this organization
pub async fn descendants(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    if let Err(denied) = authz::enforce(&tenant, Guard::permission(Permission::ORGANIZATIONS_READ)) {
        return denied;
    }
    match services
        .organizations
        .hierarchy()
        .descendants(tenant.authorization().organization().id)
        .await
    {
        Ok(found) => organization_list(&found),
        Err(e) => errors::lifecycle_error_to_response(LifecycleError::from(e)),
    }
}

/// GET /orgs/:slug/access/explain?permission=reports.export - why the caller has (or lacks) it
pub async fn explain_access(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ExplainQuery>,
) -> axum::response::Response {
    let permission = match dto::parse_permission(&query.permission) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let explanation = explain_permission(tenant.authorization(), permission);
    tracing::debug!(
        user_id = %principal.user().id,
        permission = %permission,
        granted = explanation.granted,
        "authorization explained"
    );
    (StatusCode::OK, Json(explanation)).into_response()
}

fn organization_list(orgs: &[orgguard_auth::Organization]) -> axum::response::Response {
    let items = orgs
        .iter()
        .map(dto::OrganizationResponse::from)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(json!({ "items": items }))).into_response()
}

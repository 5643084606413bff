use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, put},
    Json, Router,
};
use serde_json::json;

use orgguard_auth::{guards, Guard, Membership, Permission};

use crate::app::{dto, errors, Services};
use crate::authz;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_members).post(add_member))
        .route("/:id", delete(remove_member))
        .route("/:id/role", put(change_role))
        .route("/:id/permissions", put(set_permission))
        .route("/:id/active", put(set_active))
}

pub async fn list_members(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    if let Err(denied) = authz::enforce(&tenant, Guard::permission(Permission::USERS_READ)) {
        return denied;
    }
    match services.organizations.members(tenant.authorization()).await {
        Ok(members) => {
            let items = members
                .iter()
                .map(dto::MembershipResponse::from)
                .collect::<Vec<_>>();
            (StatusCode::OK, Json(json!({ "items": items }))).into_response()
        }
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn add_member(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::AddMemberRequest>,
) -> axum::response::Response {
    if let Err(denied) = authz::enforce(&tenant, Guard::permission(Permission::USERS_INVITE)) {
        return denied;
    }
    let result = services
        .organizations
        .add_member(tenant.authorization(), body.into())
        .await;
    member_response(StatusCode::CREATED, result)
}

pub async fn change_role(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Path(path): Path<dto::MemberPath>,
    Json(body): Json<dto::ChangeRoleRequest>,
) -> axum::response::Response {
    if let Err(denied) = authz::enforce(&tenant, Guard::roles(guards::OWNER_OR_ADMIN)) {
        return denied;
    }
    let result = services
        .organizations
        .change_role(tenant.authorization(), path.id, body.role)
        .await;
    member_response(StatusCode::OK, result)
}

pub async fn set_permission(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Path(path): Path<dto::MemberPath>,
    Json(body): Json<dto::SetPermissionRequest>,
) -> axum::response::Response {
    if let Err(denied) = authz::enforce(&tenant, Guard::roles(guards::OWNER_OR_ADMIN)) {
        return denied;
    }
    let permission = match dto::parse_permission(&body.permission) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let result = services
        .organizations
        .set_permission(tenant.authorization(), path.id, permission, body.granted)
        .await;
    member_response(StatusCode::OK, result)
}

pub async fn set_active(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Path(path): Path<dto::MemberPath>,
    Json(body): Json<dto::SetActiveRequest>,
) -> axum::response::Response {
    if let Err(denied) = authz::enforce(&tenant, Guard::roles(guards::OWNER_OR_ADMIN)) {
        return denied;
    }
    let result = services
        .organizations
        .set_member_active(tenant.authorization(), path.id, body.is_active)
        .await;
    member_response(StatusCode::OK, result)
}

/// DELETE /orgs/:slug/members/:id - leave, or remove someone else with `users.delete`
pub async fn remove_member(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Path(path): Path<dto::MemberPath>,
) -> axum::response::Response {
    let ctx = tenant.authorization();
    let target = match services.organizations.member_of(ctx, path.id).await {
        Ok(m) => m,
        Err(e) => return errors::lifecycle_error_to_response(e),
    };
    if target.user_id != ctx.user_id() {
        if let Err(denied) = authz::enforce(&tenant, Guard::permission(Permission::USERS_DELETE)) {
            return denied;
        }
    }

    match services.organizations.remove_member(ctx, target.id).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

fn member_response(
    status: StatusCode,
    result: Result<Membership, orgguard_auth::LifecycleError>,
) -> axum::response::Response {
    match result {
        Ok(m) => (status, Json(dto::MembershipResponse::from(&m))).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

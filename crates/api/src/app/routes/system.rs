use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use orgguard_auth::{DirectoryStore, SystemRole};

use crate::app::{dto, errors, Services};
use crate::authz;
use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /me - the authenticated account
pub async fn me(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    Json(json!({
        "user": dto::UserResponse::from(principal.user()),
        "email_verified": principal.identity().claim.email_verified,
    }))
}

/// GET /me/organizations - live organizations the caller is an active member of
pub async fn my_organizations(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.organizations.my_organizations(principal.user()).await {
        Ok(entries) => {
            let items = entries
                .iter()
                .map(|e| {
                    json!({
                        "organization": dto::OrganizationResponse::from(&e.organization),
                        "membership": dto::MembershipResponse::from(&e.membership),
                    })
                })
                .collect::<Vec<_>>();
            (StatusCode::OK, Json(json!({ "items": items }))).into_response()
        }
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

/// GET /users/:user_id - self, or a system admin
pub async fn get_user(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<dto::UserPath>,
) -> axum::response::Response {
    if let Err(denied) = authz::enforce_self_or_system_role(&principal, path.user_id, SystemRole::SystemAdmin) {
        return denied;
    }

    match services.store.user(path.user_id).await {
        Ok(Some(user)) => (StatusCode::OK, Json(dto::UserResponse::from(&user))).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "user not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// GET /context - tenant context from the header or host, if any
///
/// Tenant failures are not errors here: the response carries `"context": null`.
pub async fn current_context(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    headers: HeaderMap,
) -> axum::response::Response {
    let slug = services.tenant.tenant_slug(None, &headers);
    match services
        .tenant
        .contexts
        .build_optional(Some(principal.identity()), slug.as_deref())
        .await
    {
        Ok(ctx) => (
            StatusCode::OK,
            Json(json!({ "context": ctx.as_ref().map(dto::ContextResponse::from) })),
        )
            .into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

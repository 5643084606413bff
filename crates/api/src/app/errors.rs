use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use orgguard_auth::{AccessError, AuthzError, LifecycleError, StoreError};
use orgguard_core::DomainError;

pub fn authz_error_to_response(err: &AuthzError) -> axum::response::Response {
    let status = match err {
        AuthzError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
        AuthzError::TenantRequired => StatusCode::BAD_REQUEST,
        AuthzError::OrganizationNotFound => StatusCode::NOT_FOUND,
        AuthzError::AccessDenied
        | AuthzError::InsufficientRole { .. }
        | AuthzError::InsufficientPermission(_) => StatusCode::FORBIDDEN,
        AuthzError::LastOwnerViolation | AuthzError::HierarchyCycle => StatusCode::CONFLICT,
        AuthzError::HierarchyDepthExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AuthzError::HierarchyCorruption { max_depth } => {
            tracing::error!(max_depth, "organization hierarchy corruption detected");
            StatusCode::CONFLICT
        }
    };
    json_error(status, err.code(), err.to_string())
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_id", msg),
        DomainError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::Rejected(denial) => authz_error_to_response(&denial),
        StoreError::Backend(msg) => {
            tracing::error!(error = %msg, "directory store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "storage backend failure")
        }
    }
}

pub fn access_error_to_response(err: AccessError) -> axum::response::Response {
    match err {
        AccessError::Denied(denial) => authz_error_to_response(&denial),
        AccessError::Store(e) => store_error_to_response(e),
    }
}

pub fn lifecycle_error_to_response(err: LifecycleError) -> axum::response::Response {
    match err {
        LifecycleError::Denied(denial) => authz_error_to_response(&denial),
        LifecycleError::Invalid(e) => domain_error_to_response(e),
        LifecycleError::Store(e) => store_error_to_response(e),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

use axum::{
    routing::{get, post, put},
    Router,
};

pub mod members;
pub mod organizations;
pub mod system;

/// Router for authenticated endpoints that do not name a tenant in the path.
pub fn router() -> Router {
    Router::new()
        .route("/me", get(system::me))
        .route("/me/organizations", get(system::my_organizations))
        .route("/users/:user_id", get(system::get_user))
        .route("/context", get(system::current_context))
        .route("/organizations", post(organizations::create_organization))
}

/// Router for endpoints under `/orgs/:slug`; every handler sees a `TenantContext`.
pub fn tenant_router() -> Router {
    Router::new()
        .route(
            "/",
            get(organizations::get_organization).delete(organizations::delete_organization),
        )
        .route("/parent", put(organizations::set_parent))
        .route("/ancestors", get(organizations::ancestors))
        .route("/descendants", get(organizations::descendants))
        .route("/access/explain", get(organizations::explain_access))
        .nest("/members", members::router())
}

//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use anyhow::Context;
use axum::{routing::get, Extension, Router};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;

use orgguard_auth::{Authenticator, ContextBuilder, DirectoryStore, IdentityVerifier, OrganizationService};
use orgguard_infra::{InMemoryDirectoryStore, PostgresDirectoryStore};

use crate::config::ApiConfig;
use crate::identity::JwtIdentityVerifier;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

/// Shared handles reachable from every handler through `Extension`.
pub struct Services {
    pub store: Arc<dyn DirectoryStore>,
    pub organizations: OrganizationService,
    pub tenant: middleware::TenantState,
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: ApiConfig) -> anyhow::Result<Router> {
    let store: Arc<dyn DirectoryStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .context("failed to connect to postgres")?;
            let store = PostgresDirectoryStore::new(pool);
            store.migrate().await.context("failed to bootstrap directory schema")?;
            Arc::new(store)
        }
        None => Arc::new(InMemoryDirectoryStore::new()),
    };

    build_app_with_store(config, store, None)
}

/// Build the router over an existing store; `verifier` overrides the one derived from config.
pub fn build_app_with_store(
    config: ApiConfig,
    store: Arc<dyn DirectoryStore>,
    verifier: Option<Arc<dyn IdentityVerifier>>,
) -> anyhow::Result<Router> {
    let verifier = match verifier {
        Some(v) => v,
        None => Arc::new(JwtIdentityVerifier::from_config(&config.jwt).context("invalid JWT configuration")?),
    };

    let auth_state = middleware::AuthState {
        verifier,
        authenticator: Authenticator::new(Arc::clone(&store), config.authz.auto_provision_users),
    };
    let tenant_state = middleware::TenantState::new(&config.authz.tenant, ContextBuilder::new(Arc::clone(&store)));

    let services = Arc::new(Services {
        organizations: OrganizationService::new(Arc::clone(&store), &config.authz),
        tenant: tenant_state.clone(),
        store,
    });

    // Tenant-scoped routes: the context is built once per request, after authentication.
    let tenant_scoped = routes::tenant_router().route_layer(axum::middleware::from_fn_with_state(
        tenant_state,
        middleware::tenant_middleware,
    ));

    // Protected routes: require a verified, active principal.
    let protected = routes::router()
        .nest(&format!("/orgs/:{}", config.authz.tenant.path_param), tenant_scoped)
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Ok(Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new()))
}

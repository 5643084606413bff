use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    orgguard_observability::init();

    let config = orgguard_api::config::ApiConfig::from_env()?;
    let bind_addr = config.bind_addr.clone();

    let app = orgguard_api::app::build_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

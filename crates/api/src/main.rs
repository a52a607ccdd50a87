use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    atrium_observability::init();

    let config = atrium_infra::AppConfig::from_env();
    let listen_addr = config
        .as_ref()
        .map(|c| c.listen_addr.clone())
        .unwrap_or_else(|_| atrium_infra::config::DEFAULT_LISTEN_ADDR.to_string());

    let services = atrium_api::app::services::build_services(config).await;
    let app = atrium_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

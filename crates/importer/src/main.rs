use anyhow::Context as _;
use clap::Parser as _;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use unrelated_openapi_import::config::Args;
use unrelated_openapi_import::http::{AppState, router};
use unrelated_openapi_import::notifier::{BroadcastNotifier, UpdateNotifier};
use unrelated_openapi_import::pg_fanout::PgUpdateNotifier;
use unrelated_openapi_import::pg_store::PgConfigStore;
use unrelated_openapi_import::store::{ConfigStore, MemoryConfigStore};
use unrelated_openapi_import::telemetry::init_tracing;
use unrelated_openapi_import::workflow::ImportWorkflow;
use unrelated_openapi_tools::Converter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format);

    let converter = Converter::with_config(args.converter_config()?);
    let shutdown = CancellationToken::new();
    let updates = BroadcastNotifier::new(args.broadcast_capacity);

    let (store, notifier): (Arc<dyn ConfigStore>, Arc<dyn UpdateNotifier>) =
        if let Some(url) = &args.database_url {
            let store = PgConfigStore::connect(url, args.db_max_connections).await?;
            let node_id = args.resolved_node_id();
            let fanout =
                PgUpdateNotifier::new(store.pool().clone(), node_id.clone(), updates.clone());
            fanout
                .start_listener(shutdown.clone())
                .await
                .context("start pg fanout listener")?;
            tracing::info!(node_id = %node_id, "using Postgres store and fan-out");
            (Arc::new(store), Arc::new(fanout))
        } else {
            tracing::warn!("no database configured; configurations are kept in memory only");
            (Arc::new(MemoryConfigStore::new()), Arc::new(updates.clone()))
        };

    let state = Arc::new(AppState {
        workflow: ImportWorkflow::new(Arc::new(converter), store, notifier),
        updates,
        shutdown: shutdown.clone(),
    });
    let app = router(state, args.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    tracing::info!(addr = %args.bind, "OpenAPI import service listening");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for ctrl-c; running until killed");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown requested");
            server_shutdown.cancel();
        })
        .await
        .context("serve http")?;

    shutdown.cancel();
    Ok(())
}

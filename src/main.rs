use lpo_invoice_engine::db::{CatalogStore, QueueStore};
use lpo_invoice_engine::{api, create_pool, AppConfig, CsvExporter, MemoryStore, PgStore, Pipeline, PlainTextExtractor};
use std::sync::Arc;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 本地时间格式, 默认 info 级别
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::from_env()?;
    info!("Starting with config: {:?}", config);

    if config.database.is_memory() {
        info!("Using in-memory store");
        run(Arc::new(MemoryStore::new()), config).await
    } else {
        let pool = create_pool(&config.database).await?;
        info!("Database pool created");
        run(Arc::new(PgStore::new(pool)), config).await
    }
}

async fn run<S>(store: Arc<S>, config: AppConfig) -> Result<(), Box<dyn std::error::Error>>
where
    S: CatalogStore + QueueStore,
{
    let exporter = Arc::new(CsvExporter::new(config.export.export_dir.clone()));
    let pipeline = Pipeline::new(
        store,
        Arc::new(PlainTextExtractor),
        exporter,
        config.pipeline.clone(),
        config.matcher.clone(),
    );

    // 后台处理循环
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.run_continuous(shutdown_rx).await })
    };

    let app = api::router(pipeline).layer(ServiceBuilder::new());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  GET  /api/pipeline/stats");
    info!("  POST /api/pipeline/process | /api/pipeline/export | /api/pipeline/recover-stale");
    info!("  POST /api/queue, GET /api/queue/:id, POST /api/queue/:id/resubmit");
    info!("  GET  /api/parsing-failures, POST /api/parsing-failures/:id/resolve");
    info!("  GET  /api/customers/:id/branch-overlaps");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    worker.await?;
    Ok(())
}

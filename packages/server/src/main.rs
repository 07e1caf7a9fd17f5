use std::path::PathBuf;
use std::sync::Arc;

use common::storage::{LocalStore, ObjectStore};
use tracing::{Level, info, warn};

use server::config::AppConfig;
use server::consumers::{consume_job_results, consume_worker_dlq};
use server::database::init_db;
use server::dlq::run_stale_content_sweeper;
use server::state::{AppState, ClientSet};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = Arc::new(AppConfig::load()?);

    let db = init_db(&config.database.url).await?;
    let storage = build_storage(&config).await?;
    let clients = Arc::new(ClientSet::from_config(&config.clients)?);

    let mq = if config.mq.enabled {
        let queue = mq::init_mq(mq::MqConfig {
            url: config.mq.url.clone(),
            pool_size: config.mq.pool_size,
        })
        .await?;
        Some(Arc::new(queue))
    } else {
        warn!("MQ disabled; ingestion will stop at row creation");
        None
    };

    if let Some(mq) = &mq {
        tokio::spawn(consume_job_results(
            db.clone(),
            mq.clone(),
            config.mq.result_queue_name.clone(),
        ));
        tokio::spawn(consume_worker_dlq(
            db.clone(),
            mq.clone(),
            config.mq.dlq_queue_name.clone(),
        ));
    }
    tokio::spawn(run_stale_content_sweeper(db.clone(), config.ingest.clone()));

    let state = AppState {
        config: config.clone(),
        db,
        mq,
        storage,
        clients,
    };
    let app = server::build_router(state);

    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    info!("Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn build_storage(config: &AppConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match config.storage.backend.as_str() {
        "local" => {
            let store = LocalStore::new(
                PathBuf::from(&config.storage.root),
                config.storage.url_prefix.clone(),
            )
            .await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "object-storage")]
        "s3" => {
            let settings = config
                .storage
                .s3
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("storage.s3 settings are required for the s3 backend"))?;
            let store = common::storage::S3Store::new(settings)?;
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("unknown storage backend '{other}'"),
    }
}

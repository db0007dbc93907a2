use std::sync::Arc;
use std::time::Duration;

use tally_pipeline::decoder::CsvTable;
use tally_pipeline::rule_cache::RuleCache;
use tally_pipeline::rules_admin::RulesAdmin;
use tally_worker::{Worker, DEFAULT_POLL_INTERVAL};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally_worker=debug,tally_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = tally_db::create_pool(&database_url).await?;
    tally_db::MIGRATOR.run(&pool).await?;
    tally_db::health_check(&pool).await?;

    let rules = Arc::new(RuleCache::for_pool(pool.clone()));
    let seeded = RulesAdmin::new(pool.clone(), rules.clone())
        .seed_default_rules()
        .await?;
    if seeded > 0 {
        tracing::info!(seeded, "Seeded default matching rules");
    }

    let poll_interval = std::env::var("WORKER_POLL_INTERVAL_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_POLL_INTERVAL);

    let worker = Worker::new(pool, rules, Arc::new(CsvTable)).with_poll_interval(poll_interval);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            signal_cancel.cancel();
        }
    });

    worker.run(cancel).await;
    Ok(())
}

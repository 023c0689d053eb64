use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stocky_core::config::Settings;
use stocky_core::ingest::orchestrator;
use stocky_core::ingest::provider::HttpPageProvider;
use stocky_core::storage::snapshot::SnapshotStore;

#[derive(Debug, Parser)]
#[command(name = "stocky_worker")]
struct Args {
    /// Scrape this URL instead of the one in the configured url file.
    #[arg(long)]
    url: Option<String>,

    /// Scrape and report, but do not write the snapshot.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let provider = HttpPageProvider::from_env()?;

    let url = match args.url {
        Some(url) => url,
        None => orchestrator::read_target_url(&settings.url_file).await?,
    };

    match orchestrator::scrape_top_stocks(&provider, &url, &settings.fallback_url).await {
        Ok(records) => {
            if args.dry_run {
                tracing::info!(
                    count = records.len(),
                    dry_run = true,
                    "scrape succeeded; snapshot not written"
                );
                return Ok(());
            }

            let store = SnapshotStore::new(settings.snapshot_path.clone());
            store.write(&records).await?;

            tracing::info!(
                count = records.len(),
                path = %store.path().display(),
                "snapshot written"
            );
            Ok(())
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "scrape failed; existing snapshot left in place");
            Err(err)
        }
    }
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

use anyhow::{Context, Result};
use songlake_common::{LakeConfig, DEFAULT_CONFIG_FILE};
use songlake_etl::run_pipeline;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CONFIG_PATH_ENV: &str = "SONGLAKE_CONFIG";
const DEFAULT_LOG_DIRECTIVES: &str = "songlake_etl=info,songlake_common=info,datafusion=warn";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    info!("═══════════════════════════════════════════════════════");
    info!("🎵 Songlake ETL");
    info!("═══════════════════════════════════════════════════════");

    let config_path = config_path();
    info!("[MAIN] Loading configuration from {}", config_path.display());
    let config = LakeConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    info!("[MAIN] Configuration: {:?}", config);

    match run_pipeline(&config).await {
        Ok(report) => {
            let json = serde_json::to_string_pretty(&report)
                .context("Failed to serialize pipeline report")?;
            info!("[MAIN] Pipeline report:\n{}", json);
            info!("[MAIN] ✅ Done");
            Ok(())
        }
        Err(e) => {
            error!("[MAIN] ❌ Pipeline failed: {}", e);
            Err(e).context("Pipeline run failed")
        }
    }
}

fn init_tracing() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVES));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))
}

/// First CLI argument, then `SONGLAKE_CONFIG`, then `dl.cfg`
fn config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use adlytics_core::CampaignMetrics;
use adlytics_server::{bundle::read_bundle_dir, state::AppState};

/// `adlytics summary <dir>`: print the whole-campaign metrics of a bundle
/// directory as JSON and exit.
fn run_summary(dir: &str, cfg: &adlytics_core::config::Config) -> Result<()> {
    let campaign = read_bundle_dir(Path::new(dir))?;
    let metrics = CampaignMetrics::with_criteria(Arc::new(campaign), cfg.bounce);
    println!("{}", serde_json::to_string_pretty(&metrics.summary())?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise structured JSON logging. Level controlled via RUST_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("adlytics_server=info".parse()?)
                .add_directive("adlytics_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cfg = adlytics_core::config::Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("summary") {
        let dir = args
            .get(2)
            .ok_or_else(|| anyhow::anyhow!("usage: adlytics summary <bundle-dir>"))?;
        return run_summary(dir, &cfg);
    }

    let state = Arc::new(AppState::new(cfg.clone()));

    // Load the startup bundle if configured; a bad bundle stops startup.
    match &cfg.bundle_dir {
        Some(dir) => {
            let campaign = read_bundle_dir(Path::new(dir))?;
            state.load_campaign(campaign).await;
        }
        None => info!("No ADLYTICS_BUNDLE_DIR set; upload a bundle via POST /api/campaign"),
    }

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = adlytics_server::app::build_app(Arc::clone(&state));

    info!(port = cfg.port, "Adlytics listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}

use metrics_exporter_prometheus::PrometheusBuilder;
use preroller::ad::{DecisionClient, HttpBeaconSink, HttpDecisionClient, StaticDecisionClient};
use preroller::config::Settings;
use preroller::player::{HeadlessPlayer, PlayerSignal, SimulationOptions};
use preroller::preroll::{self, PrerollDriver, PrerollSession};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Preroller demo");

    if let Err(e) = run().await {
        error!("Preroller demo failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let metrics = PrometheusBuilder::new().install_recorder()?;

    let settings = Settings::from_env()?;
    settings.validate()?;
    info!(
        url = ?settings.decision_url_template,
        skip = ?settings.skip_offset,
        suspended = settings.suspended,
        "Loaded settings"
    );

    let client: Arc<dyn DecisionClient> = match std::env::var("PREROLL_VAST_FILE") {
        Ok(path) => {
            info!("Ad decisions: static VAST from {}", path);
            let xml = tokio::fs::read_to_string(&path).await?;
            Arc::new(StaticDecisionClient::from_xml(&xml)?)
        }
        Err(_) => {
            info!("Ad decisions: HTTP");
            Arc::new(HttpDecisionClient::with_defaults()?)
        }
    };

    let (handle, inputs) = preroll::channel();
    let player = HeadlessPlayer::new().with_simulation(
        handle.clone(),
        SimulationOptions {
            tick: Duration::from_millis(250),
            ad_duration: 15.0,
            auto_skip: true,
        },
    );
    let session = PrerollSession::attach(player, settings, Arc::new(HttpBeaconSink::default()))?;
    let driver = PrerollDriver::new(session, client, inputs);

    handle.signal(PlayerSignal::ReadyForPreroll);
    drop(handle);

    let session = driver.run().await;
    let player = session.into_player();
    info!(
        content_playing = player.content_playing(),
        signals = ?player.emitted_names(),
        "Pre-roll finished"
    );

    // let in-flight beacons settle before exit
    tokio::time::sleep(Duration::from_millis(500)).await;
    info!("Metrics:\n{}", metrics.render());
    Ok(())
}

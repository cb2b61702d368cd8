use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use flap_board::{BoardClient, BoardModel};
use flap_core::{DeliveryEngine, EngineConfig};
use flap_providers::transit::TransitProvider;
use flap_providers::weather::{Units, WeatherProvider};
use flap_providers::ProviderRegistry;
use flapd::{api, content, schedule, shutdown, AppState, Metrics};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "flapd", about = "Split-flap board message scheduler")]
struct Args {
    /// Read/write API key for the board
    #[arg(long, env = "VESTABOARD_KEY")]
    board_key: String,

    /// Board API endpoint
    #[arg(long, env = "VESTABOARD_URL", default_value = "https://rw.vestaboard.com")]
    board_url: String,

    /// Target the 6x22 flagship board instead of the 3x15 note
    #[arg(long, env = "FLAGSHIP")]
    flagship: bool,

    /// Directory of content JSON files
    #[arg(long, env = "CONTENT_DIR", default_value = "content")]
    content_dir: PathBuf,

    /// Only schedule templates marked public
    #[arg(long, env = "PUBLIC_ONLY")]
    public_only: bool,

    /// HTTP listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: String,

    /// Shared secret for the media webhook
    #[arg(long, env = "WEBHOOK_SECRET")]
    webhook_secret: Option<String>,

    /// Minimum seconds a message stays on the board
    #[arg(long, env = "MIN_HOLD_SECS", default_value_t = 60)]
    min_hold_secs: u64,

    /// Priority at or above which a held message is preempted
    #[arg(long, env = "INTERRUPT_PRIORITY", default_value_t = 8)]
    interrupt_priority: u8,

    /// City for the weather provider
    #[arg(long, env = "WEATHER_CITY")]
    weather_city: Option<String>,

    /// Weather units: imperial or metric
    #[arg(long, env = "WEATHER_UNITS", default_value = "imperial")]
    weather_units: String,

    /// API key for the transit provider
    #[arg(long, env = "BART_KEY")]
    transit_key: Option<String>,

    /// Origin station abbreviation for the transit provider
    #[arg(long, env = "BART_STATION")]
    transit_station: Option<String>,

    /// Destination station filters, comma separated
    #[arg(long, env = "BART_DESTINATIONS", value_delimiter = ',')]
    transit_destinations: Vec<String>,
}

fn build_registry(args: &Args, model: BoardModel) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    if let Some(city) = &args.weather_city {
        match Units::parse(&args.weather_units) {
            Ok(units) => {
                registry.register(Arc::new(WeatherProvider::new(city.clone(), units)));
                info!(city = %city, "registered weather provider");
            }
            Err(e) => error!(error = %e, "skipping weather provider"),
        }
    }

    match (&args.transit_key, &args.transit_station) {
        (Some(key), Some(station)) => {
            registry.register(Arc::new(TransitProvider::new(
                key.clone(),
                station.clone(),
                args.transit_destinations.clone(),
                model,
            )));
            info!(station = %station, "registered transit provider");
        }
        (Some(_), None) | (None, Some(_)) => {
            warn!("transit provider needs both an API key and a station, skipping");
        }
        (None, None) => {}
    }

    registry
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let model = if args.flagship {
        BoardModel::Flagship
    } else {
        BoardModel::Note
    };
    info!(?model, listen = %args.listen_addr, "starting flapd");

    let client = Arc::new(BoardClient::new(
        args.board_url.clone(),
        args.board_key.clone(),
        model,
    ));

    // Startup probe: log what the board shows now. Failure is tolerated, the
    // board may simply be offline.
    match client.read_state().await {
        Ok(Some(state)) => {
            for line in state.text_lines(model) {
                info!(%line, "board currently shows");
            }
        }
        Ok(None) => info!("board has no current message"),
        Err(e) => warn!(error = %e, "could not read board state"),
    }

    let entries = content::load_dir(&args.content_dir, args.public_only);
    if entries.is_empty() {
        warn!(dir = %args.content_dir.display(), "no content templates loaded");
    }
    let (scheduled, media_templates) = flapd::partition_templates(entries);

    let engine = DeliveryEngine::new(EngineConfig {
        min_hold: Duration::from_secs(args.min_hold_secs),
        interrupt_priority: args.interrupt_priority,
    });

    let state = Arc::new(AppState {
        engine: engine.clone(),
        providers: build_registry(&args, model),
        model,
        webhook_secret: args.webhook_secret.clone(),
        media_templates,
        metrics: Metrics::new(),
    });

    let worker = tokio::spawn(engine.clone().run(client));

    for entry in scheduled {
        let expr = entry.cron.as_deref().unwrap_or_default();
        match schedule::parse_cron(expr) {
            Ok(sched) => {
                info!(template = %entry.id, cron = %expr, "starting schedule");
                tokio::spawn(schedule::run_schedule(state.clone(), entry, sched));
            }
            // load_file validated the field count; the parser can still
            // reject a value range.
            Err(e) => error!(template = %entry.id, error = %e, "bad cron expression"),
        }
    }

    let app = api::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    info!(addr = %args.listen_addr, "listening");

    let shutdown_handle = tokio::spawn(shutdown::wait_for_signal());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_handle.await.ok();
        })
        .await?;

    info!("draining delivery worker");
    engine.shutdown();
    worker.await.ok();
    info!("flapd stopped");
    Ok(())
}

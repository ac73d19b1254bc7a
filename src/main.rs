use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{error, info, warn};

use curate_events::cache::{run_daily_schedule, CacheStore, RefreshCoordinator, RefreshState};
use curate_events::config::AppConfig;
use curate_events::domain::{EventCategory, EventQuery};
use curate_events::lists::ListStore;
use curate_events::observability::logging::init_logging;
use curate_events::pipeline::{EventPipeline, FeedBuilder};
use curate_events::providers::ProviderRegistry;
use curate_events::server::{app_router, AppState};

/// Feeds rebuilt by the daily schedule.
const SCHEDULED_CATEGORIES: &[EventCategory] = &[
    EventCategory::Music,
    EventCategory::Theatre,
    EventCategory::Comedy,
    EventCategory::Art,
    EventCategory::Food,
];

#[derive(Parser)]
#[command(name = "curate-events", about = "Multi-provider event aggregation API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API server with scheduled background refreshes
    Serve,
    /// Build one feed, write it to the cache, and exit
    Refresh {
        /// Event category, e.g. "music" or "comedy"
        #[arg(long, default_value = "music")]
        category: String,
        /// Target location; defaults to the configured location
        #[arg(long)]
        location: Option<String>,
        /// Date range spec, e.g. "this weekend" or "next 7 days"
        #[arg(long, default_value = "next 30 days")]
        date_range: String,
    },
}

struct App {
    config: AppConfig,
    pipeline: Arc<EventPipeline>,
    lists: Arc<ListStore>,
    store: Arc<CacheStore>,
    coordinator: RefreshCoordinator,
    provider_ids: Vec<String>,
}

fn build_app(config: AppConfig) -> anyhow::Result<App> {
    let lists = Arc::new(ListStore::open(&config.lists_path)?);
    let registry = Arc::new(ProviderRegistry::from_enabled(&config.enabled_providers));
    if registry.is_empty() {
        warn!("no providers registered; feeds will be empty until keys are configured");
    }
    let provider_ids = registry.provider_ids();

    let pipeline = Arc::new(EventPipeline::new(&config, registry, Arc::clone(&lists)));
    let store = Arc::new(CacheStore::open(&config.cache_db_path, config.staleness)?);
    let coordinator = RefreshCoordinator::new(
        Arc::clone(&pipeline) as Arc<dyn FeedBuilder>,
        Arc::clone(&store),
        Arc::new(AtomicBool::new(false)),
    );

    Ok(App {
        config,
        pipeline,
        lists,
        store,
        coordinator,
        provider_ids,
    })
}

fn query_for(app: &App, category: EventCategory, location: Option<String>) -> EventQuery {
    let mut query = EventQuery::new(
        category,
        location.unwrap_or_else(|| app.config.default_location.clone()),
    );
    query.providers = app.provider_ids.clone();
    query
}

async fn serve(app: App) -> anyhow::Result<()> {
    let prometheus = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("prometheus recorder not installed: {}", e);
            None
        }
    };

    // Periodic reload of operator-editable rule and list documents.
    let rules = app.pipeline.rules_engine();
    let lists = Arc::clone(&app.lists);
    let reload_interval = app.config.reload_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(reload_interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            rules.reload();
            lists.reload();
        }
    });

    let scheduled: Vec<EventQuery> = SCHEDULED_CATEGORIES
        .iter()
        .map(|&category| query_for(&app, category, None))
        .collect();
    tokio::spawn(run_daily_schedule(
        app.coordinator.clone(),
        scheduled,
        app.config.daily_refresh_time,
        app.config.timezone,
    ));

    let state = AppState {
        store: Arc::clone(&app.store),
        coordinator: app.coordinator.clone(),
        config: Arc::new(app.config.clone()),
        provider_ids: app.provider_ids.clone(),
        prometheus,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], app.config.port));
    info!("listening on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app_router(state).into_make_service())
        .await?;
    Ok(())
}

async fn refresh_once(
    app: App,
    category: String,
    location: Option<String>,
    date_range: String,
) -> anyhow::Result<()> {
    let mut query = query_for(&app, EventCategory::from_vendor(&category), location);
    query.date_range = date_range;

    let run = app.coordinator.refresh_now(&query).await;
    match run.state {
        RefreshState::Succeeded => {
            info!(run_id = %run.id, "refresh complete");
            Ok(())
        }
        _ => {
            let reason = run.error.unwrap_or_else(|| "unknown".to_string());
            error!(run_id = %run.id, "refresh failed: {}", reason);
            anyhow::bail!("refresh failed: {}", reason)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let app = build_app(config)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(app).await,
        Command::Refresh {
            category,
            location,
            date_range,
        } => refresh_once(app, category, location, date_range).await,
    }
}

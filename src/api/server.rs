//! API Server
//!
//! Wires the engines to their collaborators, runs the crash scheduler and
//! serves HTTP until a shutdown signal arrives.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
    websocket::WebSocketManager,
};
use crate::{
    clock::SystemClock,
    config::{ApiConfig, StarpitConfig},
    errors::{ConfigurationError, StarpitResult},
    games::{mines::MinesEngine, outcome::RandomOutcomes, scheduler::RoundScheduler, GameContext},
    history::GameHistory,
    ledger::MemoryLedger,
    metrics::GameMetrics,
    sink::BroadcastSink,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{signal, sync::watch};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Default log filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "starpit=info,tower_http=info";

/// Initialise the global tracing subscriber
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .try_init();
}

/// Build the engines and shared state from configuration
pub fn build_state(config: &StarpitConfig) -> StarpitResult<Arc<AppState>> {
    let ledger = Arc::new(MemoryLedger::new());
    let history = Arc::new(GameHistory::new(config.ledger.history_per_user));
    let metrics = Arc::new(GameMetrics::new()?);
    let sink = Arc::new(BroadcastSink::new(config.api.broadcast_buffer_size));

    let ctx = GameContext {
        ledger: ledger.clone(),
        outcomes: Arc::new(RandomOutcomes::new(config.crash.distribution.clone())),
        clock: Arc::new(SystemClock),
        history: history.clone(),
        metrics: metrics.clone(),
    };

    let scheduler = Arc::new(RoundScheduler::new(config.crash.clone(), ctx.clone(), sink.clone()));
    let mines = Arc::new(MinesEngine::new(config.mines.clone(), ctx));

    Ok(Arc::new(AppState {
        scheduler,
        mines,
        ledger,
        history,
        metrics,
        websocket_manager: Arc::new(WebSocketManager::new(sink)),
        starting_balance: config.ledger.starting_balance,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// Create the application with the middleware stack
pub fn create_app(state: Arc<AppState>, config: &ApiConfig) -> axum::Router {
    create_router(state)
        // Request ID middleware (first for tracing)
        .layer(axum::middleware::from_fn(request_id_middleware))
        // CORS layer (before timeout to handle preflight)
        .layer(create_cors_layer(config.cors_origins.clone()))
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        // Tracing layer (last for complete request tracing)
        .layer(TraceLayer::new_for_http())
}

pub struct ApiServer {
    config: StarpitConfig,
}

impl ApiServer {
    pub fn new(config: StarpitConfig) -> Self {
        Self { config }
    }

    /// Run the scheduler and the HTTP server until shutdown
    pub async fn run(self) -> StarpitResult<()> {
        let state = build_state(&self.config)?;
        let addr = self.socket_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler_task = state.scheduler.spawn(shutdown_rx);

        let app = create_app(state, &self.config.api);
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("Starting starpit game server");
        info!("   Listen: http://{}", addr);
        self.log_server_info();

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        let _ = shutdown_tx.send(true);
        if let Err(e) = scheduler_task.await {
            warn!("Crash scheduler task ended abnormally: {}", e);
        }

        served?;
        info!("Server stopped gracefully");
        Ok(())
    }

    fn socket_addr(&self) -> StarpitResult<SocketAddr> {
        let ip = self
            .config
            .api
            .host
            .parse::<std::net::IpAddr>()
            .map_err(|_| ConfigurationError::invalid("api.host", &self.config.api.host, "Not an IP address"))?;
        Ok(SocketAddr::from((ip, self.config.api.port)))
    }

    fn log_server_info(&self) {
        let crash = &self.config.crash;
        info!("Server Configuration:");
        info!("   CORS: {:?}", self.config.api.cors_origins);
        info!("   Request timeout: {}s", self.config.api.request_timeout_secs);
        info!(
            "   Crash: tick {}ms, countdown {}ms, pause {}ms, cutoff {}",
            crash.tick_interval_ms, crash.countdown_ms, crash.pause_ms, crash.betting_cutoff
        );
        info!(
            "   Mines: {}..={} mines on {} cells",
            self.config.mines.min_mines, self.config.mines.max_mines, self.config.mines.total_cells
        );
        info!("   Starting balance: {}", self.config.ledger.starting_balance);
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}

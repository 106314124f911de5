//! TTS Server Core
//!
//! Main server implementation with Axum web framework. The same synthesis
//! pipeline backs the REST API and the Wyoming listener.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::core::error::Result;
use crate::engine::create_engine;
use crate::inference::SynthesisPipeline;
use crate::server::config::ServerConfig;
use crate::server::middleware::{track_requests, HttpMetrics};
use crate::server::routes;
use crate::server::types::ServerStats;
use crate::wyoming::WyomingServer;

/// Server state shared across handlers
pub struct ServerState {
    /// Server configuration
    pub config: ServerConfig,
    /// Synthesis pipeline shared by every transport
    pub pipeline: Arc<SynthesisPipeline>,
    /// HTTP request metrics
    pub metrics: Arc<HttpMetrics>,
    /// Start time for uptime calculation
    pub start_time: Instant,
}

impl ServerState {
    /// Create new server state around an existing pipeline
    pub fn new(config: ServerConfig, pipeline: Arc<SynthesisPipeline>) -> Self {
        let metrics = Arc::new(HttpMetrics::new(config.logging.access_log));
        Self {
            config,
            pipeline,
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Build engine, gate, voice cache and pipeline from configuration
    pub fn from_config(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let engine = create_engine(&config.engine)?;
        let pipeline = SynthesisPipeline::from_parts(
            engine,
            config.engine.max_concurrent,
            &config.voices,
            config.pipeline.clone(),
            config.defaults.clone(),
        )?;
        Ok(Self::new(config, pipeline))
    }

    /// Get server uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get server statistics
    pub async fn get_stats(&self) -> ServerStats {
        let voices = self.pipeline.voices();
        ServerStats {
            uptime: self.uptime().as_secs(),
            http: self.metrics.summary(),
            sessions: self.pipeline.stats(),
            engine: self.pipeline.gate().stats(),
            voice_cache: voices.stats(),
            loaded_voices: voices.cached_voices(),
        }
    }
}

/// Create the router with all routes
pub fn create_router(state: Arc<ServerState>) -> Router {
    // CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let metrics = Arc::clone(&state.metrics);

    Router::new()
        // Health check
        .route("/health", get(routes::health::health_check))
        // Synthesis
        .route(
            "/api/tts",
            get(routes::tts::synthesize_get).post(routes::tts::synthesize_post),
        )
        // Discovery
        .route("/api/languages", get(routes::catalog::list_languages))
        .route("/api/voices", get(routes::catalog::list_voices))
        // Server stats
        .route("/api/stats", get(routes::stats::get_stats))
        // State
        .with_state(state)
        // Middleware
        .layer(middleware::from_fn_with_state(metrics, track_requests))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
}

/// TTS Server
pub struct TtsServer {
    state: Arc<ServerState>,
}

impl TtsServer {
    /// Create new TTS server
    pub fn new(config: ServerConfig) -> Result<Self> {
        Ok(Self {
            state: Arc::new(ServerState::from_config(config)?),
        })
    }

    /// Get server state
    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Load configured voices before taking traffic
    pub async fn preload_voices(&self) -> Result<usize> {
        let keys = self.state.config.preload_keys()?;
        info!(count = keys.len(), "preloading voices");

        let mut loaded = 0;
        for (key, result) in self.state.pipeline.voices().preload(&keys).await {
            match result {
                Ok(()) => {
                    loaded += 1;
                    info!(voice = %key, "voice ready");
                }
                Err(e) => warn!(voice = %key, error = %e, "voice not available"),
            }
        }
        info!(loaded, requested = keys.len(), "voice preload finished");
        Ok(loaded)
    }

    /// Bind the configured addresses and serve until ctrl-c or SIGTERM
    pub async fn run(self) -> Result<()> {
        let config = &self.state.config;
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(%addr, "HTTP listener bound");

        let wyoming = if config.wyoming.enabled {
            let addr = format!("{}:{}", config.wyoming.host, config.wyoming.port);
            let listener = TcpListener::bind(&addr).await?;
            info!(%addr, "Wyoming listener bound");
            Some(listener)
        } else {
            None
        };

        self.serve(listener, wyoming, shutdown_signal()).await
    }

    /// Serve on already-bound listeners until `shutdown` resolves
    pub async fn serve<F>(self, http: TcpListener, wyoming: Option<TcpListener>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.preload_voices().await?;

        let pipeline = Arc::clone(&self.state.pipeline);
        let reaper = pipeline
            .voices()
            .spawn_reaper(self.state.config.voices.reap_interval());

        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown.await;
            let _ = stop_tx.send(true);
        });

        let wyoming_task = wyoming.map(|listener| {
            let server = WyomingServer::new(Arc::clone(&pipeline));
            tokio::spawn(server.serve(listener, stop_rx.clone()))
        });

        let router = create_router(Arc::clone(&self.state));
        let mut http_stop = stop_rx.clone();
        info!(
            service = crate::SERVICE_NAME,
            version = crate::VERSION,
            engine = %pipeline.engine().info().name,
            "server started"
        );
        axum::serve(http, router)
            .with_graceful_shutdown(async move {
                let _ = http_stop.wait_for(|stop| *stop).await;
            })
            .await?;

        if let Some(task) = wyoming_task {
            match task.await {
                Ok(Err(e)) => warn!(error = %e, "Wyoming listener stopped with error"),
                Err(e) => warn!(error = %e, "Wyoming listener task failed"),
                Ok(Ok(())) => {}
            }
        }
        reaper.abort();
        info!("server shutdown complete");
        Ok(())
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

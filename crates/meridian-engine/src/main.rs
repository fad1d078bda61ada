//! Meridian engine binary.
//!
//! Loads the topology seed and configuration, builds the engine, and
//! serves the HTTP operations surface.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use meridian_engine::{
    api, Engine, MemorySink, ServiceConfig, StaticSource, Topology, TopologySource,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("meridian_engine=info".parse()?))
        .init();

    info!("Meridian engine starting");

    // Load configuration
    let config: ServiceConfig = Figment::new()
        .merge(Toml::file("engine.toml"))
        .merge(Env::prefixed("MERIDIAN_").split("_"))
        .extract()?;

    info!(listen_addr = %config.api.listen_addr, "Configuration loaded");

    // Load the topology once at startup
    let source = StaticSource::from_seed(config.topology.clone());
    let nodes = source.load_nodes().await?;
    let links = source.load_links().await?;
    let topology = Topology::build(&nodes, &links)?;
    info!(
        users = topology.user_count(),
        comms = topology.comm_count(),
        "Topology built"
    );

    // Build the engine
    let sink = Arc::new(MemorySink::new());
    let engine = Arc::new(Engine::new(topology, sink, config.engine.clone()));
    info!("Engine initialised");

    // Build router
    let state = Arc::new(api::AppState {
        engine: engine.clone(),
    });
    let app = api::router(state);

    // Start HTTP server
    let listener = TcpListener::bind(&config.api.listen_addr).await?;
    info!(addr = %config.api.listen_addr, "Engine API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(engine))
        .await?;

    Ok(())
}

async fn shutdown_signal(engine: Arc<Engine>) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
        engine.stop();
    }
}

use std::sync::Arc;

use camino::Utf8PathBuf;
use eyre::{Result as EyreResult, WrapErr};
use relay_config::{build_extractors, ConfigFile, Mode, CONFIG_FILE};
use relay_protocol::{Dispatcher, HandlerRegistry};
use relay_store::RocksdbEngine;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{registry, EnvFilter};

#[tokio::main]
async fn main() -> EyreResult<()> {
    let config_path = std::env::var("RELAY_CONFIG")
        .map(Utf8PathBuf::from)
        .unwrap_or_else(|_| Utf8PathBuf::from(CONFIG_FILE));
    let config = ConfigFile::load(&config_path)?;

    setup_tracing(&config.log)?;
    tracing::info!(port = config.port, mode = ?config.mode, data_dir = %config.data_dir, "starting relay");

    let engine: Arc<dyn relay_store::Engine> =
        Arc::new(RocksdbEngine::open(&config.data_dir).wrap_err_with(|| format!("opening {}", config.data_dir))?);

    let handlers = match config.mode {
        Mode::Unlimited => HandlerRegistry::new(),
        Mode::Smart => HandlerRegistry::with_defaults(),
    };
    let extractors = Arc::new(build_extractors(&config));

    let dispatcher = Arc::new(Dispatcher::new(engine.clone(), config.mode, handlers, config.event_freshness_secs));
    let config = Arc::new(config);

    let dag_port = config.port;
    let dag_engine = engine.clone();
    let dag_extractors = extractors.clone();
    let dag_transport = tokio::spawn(async move { relay_protocol::serve_dag_transport(dag_port, dag_engine, dag_extractors).await });

    let websocket_server = tokio::spawn(relay_protocol::serve(config, dispatcher));

    tokio::select! {
        result = dag_transport => result.wrap_err("dag transport task panicked")?.wrap_err("dag transport failed")?,
        result = websocket_server => result.wrap_err("websocket server task panicked")?.wrap_err("websocket server failed")?,
    }

    Ok(())
}

fn setup_tracing(directives: &str) -> EyreResult<()> {
    registry().with(EnvFilter::builder().parse(directives)?).with(layer()).init();
    Ok(())
}

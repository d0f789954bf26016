use fluxgate::{
    config::BootstrapConfig,
    configurator::{Configurator, ConfiguratorError},
    gate::Gate,
    logging::{init_json_logging, init_logging},
    transmitter::Transmitter,
};
use fluxgate_execution::{
    client::{
        ExchangeClient,
        mock::{MockExchange, MockExchangeConfig},
    },
    pool::PublicPool,
};
use fluxgate_integration::{
    bus::{self, BusError, ipc::IpcDriver},
    kv::{KeyValueStore, RedisStore, StoreError},
};
use std::{path::Path, process::ExitCode, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{error, info};

const DEFAULT_BOOTSTRAP_PATH: &str = "gate.yaml";
const DEFAULT_CACHE_URI: &str = "redis://127.0.0.1/";

#[derive(Debug, Error)]
enum InitError {
    #[error("config: {0}")]
    Config(#[from] fluxgate::config::ConfigError),

    #[error("configurator: {0}")]
    Configurator(#[from] ConfiguratorError),

    #[error("bus: {0}")]
    Bus(#[from] BusError),

    #[error("cache: {0}")]
    Cache(#[from] StoreError),
}

#[tokio::main]
async fn main() -> ExitCode {
    if std::env::var_os("GATE_LOG_JSON").is_some() {
        init_json_logging();
    } else {
        init_logging();
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(init_error) => {
            error!(%init_error, "gateway failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), InitError> {
    let bootstrap_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_BOOTSTRAP_PATH.to_owned());
    let bootstrap = BootstrapConfig::load(Path::new(&bootstrap_path))?;

    let configurator = Configurator::new(&bootstrap.configurator)?;
    let config = configurator.fetch().await?;
    let gate_config = config.gate_config();

    info!(
        exchange = %gate_config.info.exchange,
        instance = %gate_config.info.instance,
        rate_limiter = gate_config.rate_limits.enable_rate_limiter,
        symbols = config.symbols().len(),
        "configuring gateway"
    );

    // Bus endpoints from the configuration blob.
    let driver = IpcDriver::new();
    let publishers = &gate_config.aeron.publishers;
    let transmitter = Transmitter::new(
        bus::publication(&driver, &publishers.orderbooks)?,
        bus::publication(&driver, &publishers.balances)?,
        bus::publication(&driver, &publishers.core)?,
        bus::publication(&driver, &publishers.logs)?,
    );
    let subscription = bus::subscription(&driver, &gate_config.aeron.subscribers.core)?;

    // Correlator cache.
    let cache_uri = gate_config
        .cache
        .as_ref()
        .map(|cache| cache.uri.as_str())
        .unwrap_or(DEFAULT_CACHE_URI);
    let store: Arc<dyn KeyValueStore> = Arc::new(RedisStore::connect(cache_uri).await?);

    // Venue clients: one private instance per configured credential.
    // Native venue drivers plug in at the ExchangeClient seam; the shipped
    // binary runs against the bundled simulated venue (paper mode).
    let account_count = gate_config
        .accounts
        .as_ref()
        .map(|accounts| accounts.len())
        .unwrap_or(1)
        .max(1);
    let venue = MockExchange::new(MockExchangeConfig::default());
    let private_clients = (0..account_count).map(|_| venue.clone()).collect();
    let public_pool = PublicPool::new(
        venue.clone(),
        Duration::from_secs_f64(gate_config.gate.order_book_delay),
    );

    let gate = Gate::new(&config, private_clients, public_pool, transmitter, store);

    let signal_gate = gate.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_gate.trigger_shutdown();
    });

    gate.run(subscription).await;
    gate.close().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(_) => {
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

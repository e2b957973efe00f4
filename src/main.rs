use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use courier::backend::manager::BackendManager;
use courier::capsule::DEFAULT_CAPACITY;
use courier::config;
use courier::consts::{
    BACKEND_CONFIG_ENV, DEFAULT_BACKEND_CONFIG, DEFAULT_FRONTEND_CONFIG, ENVIRONMENT_ENV,
    FRONTEND_CONFIG_ENV,
};
use courier::frontend::manager::FrontendManager;
use courier::lifecycle;
use courier::logging::{self, Environment};
use courier::registry::ProviderRegistry;

#[derive(Parser)]
#[command(
    name = "courier",
    version,
    about = "Routes chat messages between front-end bots and an NLU back-end."
)]
struct Cli {
    /// Front-end providers configuration (YAML list)
    #[arg(long, env = FRONTEND_CONFIG_ENV, default_value = DEFAULT_FRONTEND_CONFIG)]
    frontend_config: PathBuf,

    /// Back-end providers configuration (YAML record or list)
    #[arg(long, env = BACKEND_CONFIG_ENV, default_value = DEFAULT_BACKEND_CONFIG)]
    backend_config: PathBuf,

    /// DEV for debug text logs, PROD for warn-level JSON logs
    #[arg(long, env = ENVIRONMENT_ENV, default_value_t = Environment::Dev)]
    environment: Environment,

    /// Capsules buffered in each direction between the managers
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.environment)?;

    let frontends = config::load_frontend(&cli.frontend_config).with_context(|| {
        format!(
            "loading frontend configuration from {}",
            cli.frontend_config.display()
        )
    })?;
    let backends = config::load_backend(&cli.backend_config).with_context(|| {
        format!(
            "loading backend configuration from {}",
            cli.backend_config.display()
        )
    })?;

    let registry = ProviderRegistry::with_defaults();
    let frontend = FrontendManager::initialize(&frontends, &registry)
        .await
        .context("initializing frontend providers")?;
    let backend = BackendManager::initialize(&backends, &registry)
        .await
        .context("initializing backend provider")?;

    info!(
        environment = %cli.environment,
        frontends = ?frontend.labels(),
        backend = backend.label(),
        "courier started"
    );
    lifecycle::run(frontend, backend, cli.capacity, lifecycle::shutdown_signal()).await?;
    info!("graceful shutdown");
    Ok(())
}

//! Kontainer Bridge - hosts the example driver and reconciles KontainerDrivers

use std::sync::Arc;

use clap::Parser;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, CustomResourceExt};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kontainer_bridge::config::{ControllerConfig, InstallerConfig, DEFAULT_THREADINESS};
use kontainer_bridge::controller::kube::FIELD_MANAGER;
use kontainer_bridge::controller::run_kontainer_driver_controller;
use kontainer_bridge::crd::KontainerDriver;
use kontainer_bridge::driver::example::EXAMPLE_DRIVER_NAME;
use kontainer_bridge::driver::ExampleDriver;
use kontainer_bridge::install::BinaryInstaller;
use kontainer_bridge::plugin::PluginRegistry;

/// Kontainer Bridge - serve the example cluster driver on a loopback port
#[derive(Parser, Debug)]
#[command(name = "kontainer-bridge", version, about, long_about = None)]
struct Cli {
    /// Port the example driver listens on
    #[arg(required_unless_present = "crd")]
    port: Option<u16>,

    /// Print the KontainerDriver CRD manifest and exit
    #[arg(long)]
    crd: bool,

    /// Also reconcile KontainerDriver objects from the current cluster
    #[arg(long)]
    controller: bool,

    /// Concurrent reconcile workers
    #[arg(long, env = "KONTAINER_THREADINESS", default_value_t = DEFAULT_THREADINESS)]
    threadiness: usize,

    /// Where downloaded driver binaries are written
    #[arg(long, env = "KONTAINER_DRIVER_DIR")]
    driver_dir: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&KontainerDriver::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let port = cli
        .port
        .ok_or_else(|| anyhow::anyhow!("a listen port is required"))?;

    let registry = Arc::new(PluginRegistry::new());
    let address = registry
        .register(EXAMPLE_DRIVER_NAME, Arc::new(ExampleDriver), port)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start {}: {}", EXAMPLE_DRIVER_NAME, e))?;
    tracing::info!(driver = EXAMPLE_DRIVER_NAME, %address, "driver is serving");

    let token = CancellationToken::new();
    let controller = if cli.controller {
        let client = Client::try_default()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;
        ensure_crd_installed(&client).await?;

        let mut installer_config = InstallerConfig::default();
        if let Some(dir) = cli.driver_dir {
            installer_config = installer_config.install_dir(dir);
        }
        let installer = Arc::new(BinaryInstaller::new(installer_config));
        let config = ControllerConfig::default().threadiness(cli.threadiness);

        Some(tokio::spawn(run_kontainer_driver_controller(
            client,
            registry.clone(),
            installer,
            config,
            token.clone(),
        )))
    } else {
        None
    };

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for shutdown signal: {}", e))?;
    tracing::info!("shutting down");

    token.cancel();
    if let Some(controller) = controller {
        controller
            .await
            .map_err(|e| anyhow::anyhow!("Controller task failed: {}", e))?;
    }
    Ok(())
}

/// Install the KontainerDriver CRD with server-side apply
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing KontainerDriver CRD...");
    crds.patch(
        "kontainerdrivers.kontainer.dev",
        &params,
        &Patch::Apply(&KontainerDriver::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install KontainerDriver CRD: {}", e))?;
    Ok(())
}

//! SR-IOV Network Control Plane
//!
//! Runs the admission webhook for the SR-IOV network operator and detects
//! the platform the drain coordinator works against.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sriov_control_plane::{
    AdmissionConfig, AdmissionMetrics, AdmissionValidator, ClusterPlatform, ClusterStoreRef,
    ClusterType, ControlPlaneConfig, Error, KubeStore, Result, SupportedNics, WebhookServer,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// SR-IOV Network Control Plane - admission webhook and drain coordination
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Namespace of the operator's resources
    #[arg(long, env = "NAMESPACE", default_value = sriov_control_plane::config::DEFAULT_NAMESPACE)]
    namespace: String,

    /// Cluster type (kubernetes, openshift)
    #[arg(long, env = "CLUSTER_TYPE", default_value = "kubernetes")]
    cluster_type: String,

    /// Skip supported NIC model checks
    #[arg(long, env = "DEV_MODE")]
    dev_mode: bool,

    /// YAML map of supported NIC models replacing the built-in table
    #[arg(long, env = "SUPPORTED_NICS_FILE")]
    supported_nics_file: Option<PathBuf>,

    /// Webhook bind address
    #[arg(long, env = "WEBHOOK_ADDR", default_value = "0.0.0.0:6443")]
    webhook_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn control_plane_config(&self) -> Result<ControlPlaneConfig> {
        Ok(ControlPlaneConfig {
            namespace: self.namespace.clone(),
            cluster_type: self.cluster_type.parse::<ClusterType>()?,
            dev_mode: self.dev_mode,
            supported_nics_file: self.supported_nics_file.clone(),
            webhook_addr: self.webhook_addr.parse().map_err(|e| {
                Error::Configuration(format!("Invalid webhook address: {}", e))
            })?,
        })
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = args.control_plane_config()?;

    info!("Starting SR-IOV network control plane");
    info!("  Version: {}", sriov_control_plane::VERSION);
    info!("  Namespace: {}", config.namespace);
    info!("  Cluster type: {}", config.cluster_type);
    info!("  Webhook: {}", config.webhook_addr);
    info!("  Dev mode: {}", config.dev_mode);

    let supported_nics = match &config.supported_nics_file {
        Some(path) => {
            info!("Loading supported NIC models from {}", path.display());
            SupportedNics::from_yaml_file(path)?
        }
        None => SupportedNics::default(),
    };
    info!("{} supported NIC models", supported_nics.models().len());

    let store: ClusterStoreRef = Arc::new(KubeStore::try_default().await?);

    let platform = ClusterPlatform::detect(config.cluster_type, store.as_ref()).await?;
    info!(
        "Machine config pool coordination: {}",
        platform.uses_machine_config_pools()
    );

    let validator = Arc::new(AdmissionValidator::new(
        store.clone(),
        AdmissionConfig::from_control_plane(&config, supported_nics),
    ));
    let metrics = Arc::new(AdmissionMetrics::new()?);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal.cancel();
    });

    WebhookServer::new(config.webhook_addr, validator, metrics)
        .run(shutdown)
        .await?;

    info!("Control plane shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "tower=warn", "axum=info"] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

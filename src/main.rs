use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use kube::ResourceExt;
use ps_operator::{
    controller::{self, ControllerConfig, ControllerState},
    crd::PerconaServerMySQL,
    Error,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator
    Run(RunArgs),
    /// Show version and build information
    Version,
    /// Show managed clusters
    Info(InfoArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Namespace to watch (all namespaces when empty)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Requeue interval after a successful reconcile
    #[arg(long, env = "RESYNC_SECONDS", default_value_t = 300)]
    resync_seconds: u64,

    /// Requeue interval after a retryable failure
    #[arg(long, env = "RETRY_SECONDS", default_value_t = 15)]
    retry_seconds: u64,

    /// Requeue interval after a failure that needs a spec change
    #[arg(long, env = "TERMINAL_RETRY_SECONDS", default_value_t = 300)]
    terminal_retry_seconds: u64,

    /// Listen address for the health and metrics server
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: SocketAddr,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl RunArgs {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            namespace: self.namespace.clone().filter(|ns| !ns.trim().is_empty()),
            resync: Duration::from_secs(self.resync_seconds),
            retry: Duration::from_secs(self.retry_seconds),
            terminal_retry: Duration::from_secs(self.terminal_retry_seconds),
        }
    }
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Namespace to list (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("Percona Server Operator v{}", env!("CARGO_PKG_VERSION"));
            println!("Build Date: {}", env!("BUILD_DATE"));
            println!("Git SHA: {}", env!("GIT_SHA"));
            println!("Rust Version: {}", env!("RUST_VERSION"));
            Ok(())
        }
        Commands::Info(info_args) => run_info(info_args).await,
        Commands::Run(run_args) => run_operator(run_args).await,
    }
}

async fn run_info(args: InfoArgs) -> Result<(), Error> {
    let client = kube::Client::try_default().await?;

    let api: kube::Api<PerconaServerMySQL> = match args.namespace.as_deref() {
        Some(ns) if !ns.is_empty() => kube::Api::namespaced(client, ns),
        _ => kube::Api::all(client),
    };
    let clusters = api.list(&Default::default()).await?;

    println!("Managed Percona Server clusters: {}", clusters.items.len());
    for cluster in &clusters.items {
        let status = cluster.status.clone().unwrap_or_default();
        println!(
            "  {}/{}: {} ({}/{} ready)",
            cluster.namespace().unwrap_or_default(),
            cluster.name_any(),
            status.state,
            status.mysql.ready,
            status.mysql.size
        );
    }
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let fmt_layer = match format {
        LogFormat::Text => fmt::layer().with_target(true).boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    // Only enable OTEL if an endpoint is provided
    let otel_enabled = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok();

    if otel_enabled {
        let otel_layer = ps_operator::telemetry::init_telemetry(&registry);
        registry.with(otel_layer).init();
        info!("OpenTelemetry tracing initialized");
    } else {
        registry.init();
        info!("OpenTelemetry tracing disabled (OTEL_EXPORTER_OTLP_ENDPOINT not set)");
    }
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

async fn run_operator(args: RunArgs) -> Result<(), Error> {
    init_tracing(args.log_format);

    info!(
        "Starting Percona Server Operator v{}",
        env!("CARGO_PKG_VERSION")
    );

    let client = kube::Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.cancel();
        });
    }

    let state = Arc::new(ControllerState::new(
        client,
        args.controller_config(),
        shutdown.clone(),
    ));

    // Start the health and metrics server
    #[cfg(feature = "rest-api")]
    {
        let api_state = state.clone();
        let addr = args.metrics_addr;
        tokio::spawn(async move {
            if let Err(e) = ps_operator::rest_api::run_server(api_state, addr).await {
                tracing::error!("REST API server error: {:?}", e);
            }
        });
    }
    #[cfg(not(feature = "rest-api"))]
    let _ = args.metrics_addr;

    // Run the main controller loop
    let result = controller::run_controller(state).await;

    // The runtime may stop on its own signal handling first.
    shutdown.cancel();

    // Flush any remaining traces
    ps_operator::telemetry::shutdown_telemetry();

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_defaults() {
        let args = Args::try_parse_from(["ps-operator", "run"]).unwrap();
        let Commands::Run(run) = args.command else {
            panic!("expected run command");
        };
        let config = run.controller_config();

        assert_eq!(config.resync, Duration::from_secs(300));
        assert_eq!(config.retry, Duration::from_secs(15));
        assert_eq!(config.terminal_retry, Duration::from_secs(300));
    }

    #[test]
    fn test_empty_namespace_watches_all() {
        let args =
            Args::try_parse_from(["ps-operator", "run", "--namespace", "", "--retry-seconds", "5"])
                .unwrap();
        let Commands::Run(run) = args.command else {
            panic!("expected run command");
        };
        let config = run.controller_config();

        assert!(config.namespace.is_none());
        assert_eq!(config.retry, Duration::from_secs(5));
    }
}

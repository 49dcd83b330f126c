//! HoneyCertify tenant routing server
//!
//! Usage:
//! ```bash
//! # Serve with a config file
//! honeycertify-server --config honeycertify.yaml
//!
//! # Or with environment variables only
//! HONEYCERTIFY_DATABASE_URL=postgres://localhost/honeycertify honeycertify-server
//!
//! # Provision a tenant from the command line
//! honeycertify-server provision --name "Busy Bees Apiary" --subdomain busybees
//! ```
//!
//! Test with:
//! ```bash
//! curl -H "Host: busybees.honeycertify.com" http://localhost:3000/api/tenant
//! curl http://localhost:3000/company/<id>/tenant
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use honeycertify_core::TenantId;
use honeycertify_observability::init_logging;
use honeycertify_server::{ServerConfig, bootstrap, router};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// HoneyCertify Server - tenant resolution and per-tenant data routing
#[derive(Parser)]
#[command(name = "honeycertify-server")]
#[command(about = "HoneyCertify tenant routing server", long_about = None)]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("SHA"), ")"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file (YAML or TOML)
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "HONEYCERTIFY_CONFIG",
        global = true
    )]
    config: Option<String>,

    /// Port to listen on (overrides config and environment)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Log level (overrides config and environment)
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server (default if no command specified)
    Serve,
    /// Provision a new tenant
    Provision {
        /// Company display name
        #[arg(long)]
        name: String,

        /// Subdomain label the tenant is served under
        #[arg(long)]
        subdomain: String,
    },
    /// Continue an interrupted provisioning run
    Resume {
        /// Tenant identifier
        #[arg(long)]
        tenant: String,
    },
    /// Abandon provisioning runs stalled before registration
    Cleanup {
        /// Minimum age of a stalled run, in seconds
        #[arg(long, default_value = "3600")]
        older_than_secs: u64,
    },
    /// Create the master registry tables and exit
    MigrateRegistry,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Config file, then environment, then CLI flags
    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    config.merge_env();
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    init_logging(&config.logging).context("Failed to initialize logging")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("SHA"),
        "HoneyCertify starting"
    );

    let registry = bootstrap::connect_registry(&config).await?;

    match cli.command {
        Some(Commands::MigrateRegistry) => {
            info!("Registry schema is up to date");
            Ok(())
        }
        Some(Commands::Provision { name, subdomain }) => {
            let state = bootstrap::build_state(&config, registry)?;
            let tenant = state.provisioner.create_tenant(&name, &subdomain).await?;
            println!("{}", serde_json::to_string_pretty(&tenant)?);
            Ok(())
        }
        Some(Commands::Resume { tenant }) => {
            let state = bootstrap::build_state(&config, registry)?;
            let id = TenantId::new(tenant)?;
            let tenant = state.provisioner.resume(&id).await?;
            println!("{}", serde_json::to_string_pretty(&tenant)?);
            Ok(())
        }
        Some(Commands::Cleanup { older_than_secs }) => {
            let state = bootstrap::build_state(&config, registry)?;
            let abandoned = state
                .provisioner
                .cleanup_stalled(Duration::from_secs(older_than_secs))
                .await?;
            info!(count = abandoned.len(), "Stalled provisioning runs abandoned");
            for id in abandoned {
                println!("{}", id);
            }
            Ok(())
        }
        Some(Commands::Serve) | None => serve(&config, registry).await,
    }
}

async fn serve(
    config: &ServerConfig,
    registry: honeycertify_registry_postgres::PostgresTenantRegistry,
) -> anyhow::Result<()> {
    let state = bootstrap::build_state(config, registry)?;
    let handles = state.handles.clone();
    let app = router(state, config.server.request_timeout());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid listen address")?;
    let listener = TcpListener::bind(addr).await?;

    info!("HoneyCertify listening on http://{}", addr);
    info!("   Tenant API:           http://{}/api/tenant", addr);
    info!("   Admin API:            http://{}/admin/tenants", addr);
    info!("   Health check:         http://{}/healthz", addr);
    info!("   Readiness check:      http://{}/readyz", addr);
    info!("   Prometheus metrics:   http://{}/metrics", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let closed = handles.shutdown().await;
    info!(closed, "Tenant handles closed");
    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

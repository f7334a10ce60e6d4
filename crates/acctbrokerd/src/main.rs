use acctbroker_aws::OrganizationsClient;
use acctbroker_core::{
    Broker, BrokerSettings, CorrelationStore, FileCorrelationStore, derive_address,
};
use acctbrokerd::{BrokerConfig, Credentials, build_router};
use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "acctbrokerd")]
#[command(about = "Service broker that provisions AWS accounts", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (KDL). Defaults to ./broker.kdl, then the user config dir
    #[arg(short, long, env = "ACCTBROKER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Username the platform authenticates with
    #[arg(long, env = "BROKER_USERNAME", default_value = "", global = true)]
    user: String,

    /// Password the platform authenticates with
    #[arg(
        long,
        env = "BROKER_PASSWORD",
        default_value = "",
        hide_env_values = true,
        global = true
    )]
    pass: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Serve,
    /// List reservations whose account creation was never confirmed
    Pending,
    /// Record the create-account request id for a pending reservation
    Confirm {
        /// Service instance id of the reservation
        instance_id: String,
        /// Create-account request id found in AWS Organizations
        operation_id: String,
    },
    /// Drop a pending reservation whose account was never created
    Release {
        /// Service instance id of the reservation
        instance_id: String,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    acctbrokerd::init_tracing();

    match cli.command {
        Some(Commands::Version) => {
            println!("acctbrokerd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Pending) => pending(cli.config.as_deref()).await,
        Some(Commands::Confirm {
            ref instance_id,
            ref operation_id,
        }) => confirm(cli.config.as_deref(), instance_id, operation_id).await,
        Some(Commands::Release { ref instance_id }) => {
            release(cli.config.as_deref(), instance_id).await
        }
        Some(Commands::Serve) | None => serve(&cli).await,
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<BrokerConfig> {
    let mut config = BrokerConfig::load(path).context("Problem reading config")?;
    config.apply_process_env()?;
    Ok(config)
}

async fn open_store(config: &BrokerConfig) -> anyhow::Result<FileCorrelationStore> {
    FileCorrelationStore::open(&config.database_path)
        .await
        .with_context(|| {
            format!(
                "Failed to open state file {}",
                config.database_path.display()
            )
        })
}

async fn serve(cli: &Cli) -> anyhow::Result<()> {
    tracing::info!("Starting account broker");

    let config = load_config(cli.config.as_deref())?;
    let base_email = config.base_email()?.to_string();

    let credentials = Credentials::new(&cli.user, &cli.pass);
    if credentials.is_empty() {
        tracing::warn!("No broker credentials set; the API accepts empty basic auth");
    }

    let store = open_store(&config).await?;
    let unconfirmed = store.pending().await?;
    if !unconfirmed.is_empty() {
        tracing::warn!(
            "{} reservation(s) were never confirmed; run `acctbrokerd pending` to reconcile",
            unconfirmed.len()
        );
    }

    let api = OrganizationsClient::from_env().await;
    let settings = BrokerSettings::new(base_email).with_submit_timeout(config.submit_timeout);
    let broker = Broker::new(Arc::new(api), Arc::new(store), settings)
        .context("Problem starting broker")?;

    let app = build_router(Arc::new(broker), credentials);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to listen on {}", addr))?;

    tracing::info!("Broker listening at {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Broker stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutting down");
}

async fn pending(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let state = FileCorrelationStore::snapshot(&config.database_path)
        .await
        .with_context(|| {
            format!(
                "Failed to read state file {}",
                config.database_path.display()
            )
        })?;
    let entries = state.pending();

    if entries.is_empty() {
        println!("{}", "No unconfirmed reservations".green());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{} unconfirmed reservation(s) in {}",
            entries.len(),
            config.database_path.display()
        )
        .yellow()
        .bold()
    );

    let base_email = config.base_email().ok();
    for entry in &entries {
        let address = base_email
            .and_then(|base| derive_address(base, &entry.instance_id).ok())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "  {}  {}  reserved {}",
            entry.instance_id.cyan(),
            address,
            entry.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    println!();
    println!(
        "Look these addresses up in AWS Organizations. Where an account exists, \
         record its request id with `acctbrokerd confirm <instance-id> <request-id>`; \
         otherwise drop the reservation with `acctbrokerd release <instance-id>`."
    );

    Ok(())
}

async fn confirm(
    config_path: Option<&Path>,
    instance_id: &str,
    operation_id: &str,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config).await?;

    if let Some(record) = store.get(instance_id).await? {
        anyhow::bail!(
            "Instance {} is already confirmed with request {}",
            instance_id,
            record.operation_id
        );
    }
    let is_pending = store
        .pending()
        .await?
        .iter()
        .any(|e| e.instance_id == instance_id);
    if !is_pending {
        anyhow::bail!("No pending reservation for instance {}", instance_id);
    }

    store.put(instance_id, operation_id).await?;
    store.close().await?;

    tracing::info!(instance_id, operation_id, "Reservation confirmed by operator");
    println!(
        "{} {} -> {}",
        "Confirmed".green().bold(),
        instance_id.cyan(),
        operation_id
    );
    Ok(())
}

async fn release(config_path: Option<&Path>, instance_id: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config).await?;

    if !store.release(instance_id).await? {
        anyhow::bail!("No pending reservation for instance {}", instance_id);
    }
    store.close().await?;

    tracing::info!(instance_id, "Reservation released by operator");
    println!("{} {}", "Released".green().bold(), instance_id.cyan());
    Ok(())
}

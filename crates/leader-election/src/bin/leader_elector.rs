//! Leader Elector CLI
//!
//! Joins a leader election against a live cluster and logs every leadership
//! change until interrupted. Useful for checking RBAC and lock placement
//! before wiring the library into a controller.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use leader_election::{
    ConfigMapLock, EndpointsLock, LeaderElector, LeaderElectorOptions, LeadershipObserver,
    LeaseLock, ResourceLock,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Take part in a Kubernetes leader election
#[derive(Parser)]
#[command(name = "leader-elector")]
#[command(about = "Take part in a Kubernetes leader election and log leadership changes")]
#[command(version)]
struct Cli {
    /// Namespace of the lock object
    #[arg(long, env = "LEADER_ELECTION_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Name of the lock object
    #[arg(long, env = "LEADER_ELECTION_NAME")]
    name: String,

    /// Candidate identity (defaults to HOSTNAME, then a random UUID)
    #[arg(long, env = "LEADER_ELECTION_IDENTITY")]
    identity: Option<String>,

    /// Kind of object used as the lock
    #[arg(long, value_enum, default_value = "lease")]
    lock_kind: LockKind,

    /// Lease validity in seconds
    #[arg(long, default_value_t = 15)]
    lease_duration: u64,

    /// Renewal cadence in seconds
    #[arg(long, default_value_t = 10)]
    renew_deadline: u64,

    /// Base delay between acquisition attempts in seconds
    #[arg(long, default_value_t = 2)]
    retry_period: u64,

    /// Release the lease on shutdown instead of letting it expire
    #[arg(long)]
    release_on_cancel: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum LockKind {
    #[default]
    Lease,
    Configmap,
    Endpoints,
}

/// Logs every notification it receives.
struct LoggingObserver {
    identity: String,
}

#[async_trait]
impl LeadershipObserver for LoggingObserver {
    async fn on_new_leader(&self, identity: &str) {
        if identity == self.identity {
            info!(leader = %identity, "This candidate is now the leader");
        } else {
            info!(leader = %identity, "Leader is another candidate");
        }
    }

    async fn on_started_leading(&self) {
        info!(identity = %self.identity, "Started leading");
    }

    async fn on_stopped_leading(&self) {
        warn!(identity = %self.identity, "Stopped leading");
    }
}

fn default_identity() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG takes precedence over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let identity = cli.identity.clone().unwrap_or_else(default_identity);
    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let lock: Arc<dyn ResourceLock> = match cli.lock_kind {
        LockKind::Lease => Arc::new(LeaseLock::new(client, &cli.namespace, &cli.name, &identity)),
        LockKind::Configmap => {
            Arc::new(ConfigMapLock::new(client, &cli.namespace, &cli.name, &identity))
        }
        LockKind::Endpoints => {
            Arc::new(EndpointsLock::new(client, &cli.namespace, &cli.name, &identity))
        }
    };

    let mut options = LeaderElectorOptions::new(lock);
    options.set_lease_duration(Duration::from_secs(cli.lease_duration))?;
    options.set_renew_deadline(Duration::from_secs(cli.renew_deadline))?;
    options.set_retry_period(Duration::from_secs(cli.retry_period))?;
    options.set_release_on_cancel(cli.release_on_cancel)?;

    let elector = LeaderElector::new(options).context("Invalid leader election settings")?;
    elector.subscribe(Arc::new(LoggingObserver {
        identity: identity.clone(),
    }));

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                shutdown.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    elector
        .run(cancel)
        .await
        .context("Leader election failed")?;

    Ok(())
}

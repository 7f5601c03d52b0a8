//! dbgridd: the dbgrid daemon.
//!
//! Hosts the database reconciler over a local redb store:
//! - `run` drives every stored database to its desired state
//! - `apply` stores object manifests (databases, storage clusters, ...)
//! - `status` prints a database's status and recorded events
//!
//! # Usage
//!
//! ```text
//! dbgridd apply --data-dir /var/lib/dbgrid manifests.json
//! dbgridd run --data-dir /var/lib/dbgrid --config dbgrid.toml
//! dbgridd status --data-dir /var/lib/dbgrid prod/orders
//! ```

mod builders;
mod controller;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use dbgrid_core::{ControllerConfig, Database, DynamicObject, ObjectKey, Resource};
use dbgrid_reconcile::{Collaborators, Reconciler, ReconcilerConfig};
use dbgrid_state::StateStore;

use crate::builders::StandardCatalog;
use crate::controller::Controller;

const DEFAULT_LOG_FILTER: &str = "info,dbgridd=debug,dbgrid=debug";

#[derive(Parser)]
#[command(name = "dbgridd", about = "dbgrid database controller")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the reconcile loop until interrupted.
    Run {
        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/dbgrid")]
        data_dir: PathBuf,

        /// Controller configuration (TOML).
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Store the objects in a JSON manifest (one object or an array).
    Apply {
        #[arg(long, default_value = "/var/lib/dbgrid")]
        data_dir: PathBuf,

        manifest: PathBuf,
    },

    /// Print a database's status and events as JSON.
    Status {
        #[arg(long, default_value = "/var/lib/dbgrid")]
        data_dir: PathBuf,

        /// Database as `namespace/name`.
        database: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Run { data_dir, config } => run(&data_dir, config.as_deref()).await,
        Command::Apply { data_dir, manifest } => apply(&data_dir, &manifest),
        Command::Status { data_dir, database } => status(&data_dir, &database),
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_store(data_dir: &Path) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;
    let db_path = data_dir.join("dbgrid.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");
    Ok(store)
}

async fn run(data_dir: &Path, config_path: Option<&Path>) -> anyhow::Result<()> {
    info!("dbgrid daemon starting");

    let config = match config_path {
        Some(path) => ControllerConfig::from_file(path)?,
        None => ControllerConfig::default(),
    };
    let store = open_store(data_dir)?;

    let reconciler = Reconciler::new(
        Collaborators::from_backend(Arc::new(store.clone()), Arc::new(StandardCatalog)),
        ReconcilerConfig {
            delays: config.requeue_delays()?,
            cluster_domain: config.cluster_domain(),
        },
    );
    let mut controller = Controller::new(
        store,
        reconciler,
        config.resync_interval()?,
        config.tick_interval()?,
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        controller.run(shutdown_rx).await;
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to install CTRL+C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = handle.await;

    info!("dbgrid daemon stopped");
    Ok(())
}

/// Parse a manifest holding one object or an array of objects.
fn parse_manifest(content: &str) -> anyhow::Result<Vec<DynamicObject>> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    let objects = match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<DynamicObject>, _>>()?,
        other => vec![serde_json::from_value(other)?],
    };
    for object in &objects {
        if object.kind.is_empty() || object.metadata.name.is_empty() {
            bail!("manifest object is missing kind or metadata.name");
        }
    }
    Ok(objects)
}

fn apply(data_dir: &Path, manifest: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(manifest)
        .with_context(|| format!("reading {}", manifest.display()))?;
    let objects = parse_manifest(&content)?;
    let store = open_store(data_dir)?;
    for object in &objects {
        let version = store.put_object(object)?;
        println!("{} {} stored (version {version})", object.kind, object.key());
    }
    Ok(())
}

fn status(data_dir: &Path, database: &str) -> anyhow::Result<()> {
    let Some(key) = ObjectKey::parse(database) else {
        bail!("expected namespace/name, got {database:?}");
    };
    let store = open_store(data_dir)?;
    let Some(object) = store.get_object(Database::KIND, &key)? else {
        bail!("database {key} not found");
    };
    let database = Database::from_dynamic(object)?;
    let report = serde_json::json!({
        "database": key.to_string(),
        "status": database.status,
        "events": store.list_events(&key)?,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_accepts_single_object_and_array() {
        let single = r#"{"kind": "StorageCluster", "metadata": {"name": "storage", "namespace": "prod"}, "status": {"state": "Ready"}}"#;
        let objects = parse_manifest(single).unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].status["state"], "Ready");

        let many = r#"[
            {"kind": "StorageCluster", "metadata": {"name": "storage", "namespace": "prod"}},
            {"kind": "Database", "metadata": {"name": "orders", "namespace": "prod"},
             "spec": {"storageClusterRef": {"name": "storage"}, "nodes": 1, "resources": {}}}
        ]"#;
        let objects = parse_manifest(many).unwrap();
        assert_eq!(objects[1].key(), ObjectKey::new("prod", "orders"));
    }

    #[test]
    fn manifest_requires_kind_and_name() {
        let err = parse_manifest(r#"{"kind": "", "metadata": {"name": "x", "namespace": "prod"}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("missing kind"));
    }

    #[test]
    fn apply_then_status_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("orders.json");
        std::fs::write(
            &manifest,
            r#"{"kind": "Database", "metadata": {"name": "orders", "namespace": "prod"},
                "spec": {"storageClusterRef": {"name": "storage"}, "nodes": 1, "resources": {}}}"#,
        )
        .unwrap();

        apply(dir.path(), &manifest).unwrap();
        status(dir.path(), "prod/orders").unwrap();
        assert!(status(dir.path(), "prod/missing").is_err());
        assert!(status(dir.path(), "orders").is_err());
    }
}

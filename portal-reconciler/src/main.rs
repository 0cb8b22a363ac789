//! portal-reconciler: command line front end.
//!
//! `plan` prints the operations that would take a current collection to a
//! desired one. `apply` runs a full reconcile cycle against a file-backed
//! order store.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tabled::{Table, Tabled};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portal_reconciler::clients::FileOrderStore;
use portal_reconciler::reconciler::{self, Operation, PhaseOutcome};
use portal_reconciler::resources::{AddressPolicy, ConnectorTopic, ResourceKind, TechnicalUser};
use portal_reconciler::{Collection, Identity, ReconcileError, Reconciler, ReconcilerConfig, Resource};
use portal_reconciler::{PartialConvergenceError, PhaseOrdering, ValidationError};

#[derive(Parser)]
#[command(name = "portal-reconciler", version, about)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Phase ordering (overrides the config file)
    #[arg(long, value_enum)]
    ordering: Option<PhaseOrdering>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the operations between two collections
    Plan {
        #[arg(short, long, value_enum)]
        kind: ResourceKind,

        /// Current collection (JSON array)
        #[arg(long)]
        current: PathBuf,

        /// Desired collection (JSON array)
        #[arg(long)]
        desired: PathBuf,
    },

    /// Reconcile one order in a file-backed store
    Apply {
        #[arg(short, long, value_enum)]
        kind: ResourceKind,

        /// Order store file (created if missing)
        #[arg(long)]
        store: PathBuf,

        /// Order id
        #[arg(short, long)]
        order: String,

        /// Desired collection (JSON array)
        #[arg(long)]
        desired: PathBuf,
    },
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "OP")]
    op: &'static str,
    #[tabled(rename = "IDENTITY")]
    identity: String,
    #[tabled(rename = "FIELDS")]
    fields: String,
}

impl<'a, R: Resource> From<Operation<'a, R>> for PlanRow {
    fn from(op: Operation<'a, R>) -> Self {
        match op {
            Operation::Create(entity) => PlanRow {
                op: "create",
                identity: entity.identity().to_string(),
                fields: String::new(),
            },
            Operation::Update(identity, changes) => PlanRow {
                op: "update",
                identity: identity.to_string(),
                fields: changes
                    .changed
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(", "),
            },
            Operation::Delete(identity) => PlanRow {
                op: "delete",
                identity: identity.to_string(),
                fields: String::new(),
            },
        }
    }
}

#[derive(Tabled)]
struct PhaseRow {
    #[tabled(rename = "PHASE")]
    phase: String,
    #[tabled(rename = "OUTCOME")]
    outcome: &'static str,
}

fn format_outcome(outcome: PhaseOutcome) -> &'static str {
    match outcome {
        PhaseOutcome::Done => "done",
        PhaseOutcome::Failed => "failed",
        PhaseOutcome::Skipped => "skipped",
    }
}

async fn read_collection<R>(path: &Path) -> Result<Collection<R>>
where
    R: Resource + DeserializeOwned,
{
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid collection in {}", path.display()))
}

fn join_ids(ids: &[Identity]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Per-entity report of a partially converged cycle.
fn partial_report(e: &PartialConvergenceError) -> String {
    let mut out = String::from("Failed:\n");
    for failure in &e.failures {
        out.push_str(&format!("  {}\n", failure));
    }
    if !e.skipped.is_empty() {
        out.push_str(&format!("Skipped: {}\n", join_ids(&e.skipped)));
    }
    if !e.converged.is_empty() {
        out.push_str(&format!("Converged: {}\n", join_ids(&e.converged)));
    }
    out
}

fn print_violations(err: &ValidationError) {
    eprintln!("Rejected {} collection:", err.kind);
    for v in &err.violations {
        eprintln!("  {}", v);
    }
}

async fn run_plan<R>(current: &Path, desired: &Path) -> Result<bool>
where
    R: Resource + DeserializeOwned,
{
    let current = read_collection::<R>(current).await?;
    let desired = read_collection::<R>(desired).await?;

    match reconciler::plan(&current, &desired) {
        Ok(ops) if ops.is_empty() => {
            println!("No changes");
            Ok(true)
        }
        Ok(ops) => {
            let rows: Vec<PlanRow> = ops.operations().map(PlanRow::from).collect();
            println!("{}", Table::new(rows));
            Ok(true)
        }
        Err(e) => {
            print_violations(&e);
            Ok(false)
        }
    }
}

async fn run_apply<R>(
    config: ReconcilerConfig,
    store: PathBuf,
    order: &str,
    desired: &Path,
) -> Result<bool>
where
    R: Resource + Serialize + DeserializeOwned,
{
    let desired = read_collection::<R>(desired).await?;
    let reconciler = Reconciler::new(FileOrderStore::<R>::new(store), config);

    let result = match reconciler.reconcile(order, &desired).await {
        Ok(result) => result,
        Err(ReconcileError::Validation(e)) => {
            print_violations(&e);
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };

    let rows: Vec<PhaseRow> = result
        .phases
        .iter()
        .map(|(phase, outcome)| PhaseRow {
            phase: phase.to_string(),
            outcome: format_outcome(*outcome),
        })
        .collect();
    println!("{}", Table::new(rows));

    match result.partial_error() {
        None => {
            info!("Order {} converged", order);
            Ok(true)
        }
        Some(e) => {
            error!("{}", e);
            eprint!("{}", partial_report(&e));
            Ok(false)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portal_reconciler=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ReconcilerConfig::load(path).await?,
        None => ReconcilerConfig::default(),
    };
    if let Some(ordering) = cli.ordering {
        config.ordering = ordering;
    }

    let ok = match cli.command {
        Commands::Plan {
            kind,
            current,
            desired,
        } => match kind {
            ResourceKind::AddressPolicy => run_plan::<AddressPolicy>(&current, &desired).await?,
            ResourceKind::TechnicalUser => run_plan::<TechnicalUser>(&current, &desired).await?,
            ResourceKind::ConnectorTopic => run_plan::<ConnectorTopic>(&current, &desired).await?,
        },

        Commands::Apply {
            kind,
            store,
            order,
            desired,
        } => match kind {
            ResourceKind::AddressPolicy => {
                run_apply::<AddressPolicy>(config, store, &order, &desired).await?
            }
            ResourceKind::TechnicalUser => {
                run_apply::<TechnicalUser>(config, store, &order, &desired).await?
            }
            ResourceKind::ConnectorTopic => {
                run_apply::<ConnectorTopic>(config, store, &order, &desired).await?
            }
        },
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_reconciler::reconciler::Phase;
    use portal_reconciler::{RemoteCallError, RemoteError};

    #[test]
    fn test_partial_report_lists_failed_skipped_and_converged() {
        let e = PartialConvergenceError {
            order_id: "order-1".to_string(),
            failures: vec![RemoteCallError {
                phase: Phase::Create,
                identities: vec![Identity::new("DC.a")],
                source: RemoteError::cancelled("context cancelled"),
            }],
            skipped: vec![Identity::new("DC.c")],
            converged: vec![Identity::new("DC.b"), Identity::new("DC.d")],
        };

        let report = partial_report(&e);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], "Failed:");
        assert!(lines[1].contains("DC.a"));
        assert_eq!(lines[2], "Skipped: DC.c");
        assert_eq!(lines[3], "Converged: DC.b, DC.d");
    }

    #[test]
    fn test_partial_report_omits_empty_sections() {
        let e = PartialConvergenceError {
            order_id: "order-1".to_string(),
            failures: vec![RemoteCallError {
                phase: Phase::Delete,
                identities: vec![Identity::new("DC.c")],
                source: RemoteError::rejected("address still bound"),
            }],
            skipped: vec![],
            converged: vec![],
        };

        let report = partial_report(&e);
        assert!(!report.contains("Skipped"));
        assert!(!report.contains("Converged"));
    }
}

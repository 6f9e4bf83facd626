//! CLI command definitions.
//!
//! Each subcommand maps to one engine operation: policy CRUD, exemption
//! management, gate evaluation and the approval workflow. The metrics
//! snapshot is read from a JSON file standing in for the external provider;
//! gates are persisted to a JSON state file between invocations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use vigil_core::{MetricsSnapshot, StaticMetricsProvider};
use vigil_notify::{LogChannel, NotificationDispatcher};
use vigil_policy::{DeploymentGate, GateEngine, PolicyRegistry};

pub mod compliance;
pub mod evaluate;
pub mod exemption;
pub mod gate;
pub mod policy;

/// Vigil - security policy and deployment gate engine
#[derive(Parser)]
#[command(name = "vigil")]
#[command(version, about = "Vigil - security policy and deployment gate engine")]
#[command(long_about = r#"
Vigil evaluates declarative security policies against a repository's current
metrics and produces gated deployment decisions (allow / block /
require-approval) with exemptions and an auditable approval workflow.

COMMANDS:
  policy      → List, create, update and delete policies
  exemption   → Add or revoke policy exemptions
  gate        → Create, approve, reject or bypass deployment gates
  evaluate    → Evaluate all enabled policies for a repository
  compliance  → Show a repository's compliance standing

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Gate blocked / non-compliant
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Arguments shared by every subcommand.
#[derive(Args, Clone)]
pub struct CommonArgs {
    /// Metrics snapshot JSON file (stands in for the metrics provider)
    #[arg(long, global = true, env = "VIGIL_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    /// Directory of custom policy YAML files loaded on top of the built-ins
    #[arg(long, global = true, env = "VIGIL_POLICIES")]
    pub policies: Option<PathBuf>,

    /// Gate state file persisted between invocations
    #[arg(long, global = true, env = "VIGIL_STATE", default_value = ".vigil-gates.json")]
    pub state: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage policies
    Policy(policy::PolicyArgs),

    /// Manage policy exemptions
    Exemption(exemption::ExemptionArgs),

    /// Create and act on deployment gates
    Gate(gate::GateArgs),

    /// Evaluate all enabled policies for a repository
    Evaluate(evaluate::EvaluateArgs),

    /// Show a repository's compliance standing
    Compliance(compliance::ComplianceArgs),
}

/// Build the engine from the common arguments: built-in policies plus any
/// custom YAML policies, snapshot file as the metrics provider, log-backed
/// notification channels, and previously persisted gates.
pub fn build_engine(common: &CommonArgs) -> Result<GateEngine> {
    let registry = Arc::new(PolicyRegistry::with_builtins());
    // The directory may not exist yet on a first run; it is created on the
    // first write-back.
    if let Some(dir) = common.policies.as_deref().filter(|dir| dir.is_dir()) {
        let loaded = registry
            .load_dir(dir)
            .with_context(|| format!("Failed to load policies from {:?}", dir))?;
        tracing::info!("Loaded {} custom policies from {:?}", loaded, dir);
    }

    let provider = StaticMetricsProvider::new();
    if let Some(path) = &common.snapshot {
        let snapshot = MetricsSnapshot::from_json_file(path)
            .with_context(|| format!("Failed to read metrics snapshot {:?}", path))?;
        provider.insert(snapshot);
    }

    let mut dispatcher = NotificationDispatcher::new();
    dispatcher.register(Arc::new(LogChannel::new("email")));
    dispatcher.register(Arc::new(LogChannel::new("slack")));

    let engine = GateEngine::new(registry, Arc::new(provider), Arc::new(dispatcher));
    load_gate_state(&engine, &common.state)?;
    Ok(engine)
}

/// Restore gates from the state file, if present.
fn load_gate_state(engine: &GateEngine, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read gate state {:?}", path))?;
    let gates: Vec<DeploymentGate> =
        serde_json::from_str(&content).with_context(|| format!("Malformed gate state {:?}", path))?;
    engine.load_gates(gates);
    Ok(())
}

/// Persist the engine's gates to the state file.
pub fn save_gate_state(engine: &GateEngine, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&engine.gates())?;
    std::fs::write(path, json).with_context(|| format!("Failed to write gate state {:?}", path))?;
    Ok(())
}

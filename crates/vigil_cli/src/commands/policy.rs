//! Policy command - list, inspect and manage policies.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::info;

use vigil_policy::{Policy, PolicyDraft, PolicyRegistry};

use super::{build_engine, CommonArgs};

#[derive(Args, Clone)]
pub struct PolicyArgs {
    #[command(subcommand)]
    command: PolicyCommand,
}

#[derive(Subcommand, Clone)]
enum PolicyCommand {
    /// List all policies, including disabled ones
    List,

    /// Show one policy as YAML
    Show {
        /// Policy id
        id: String,
    },

    /// Create a policy from a YAML draft file
    Create {
        /// Draft file (PolicyDraft YAML)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Delete a policy
    Delete {
        /// Policy id
        id: String,
    },

    /// Re-enable a policy
    Enable {
        /// Policy id
        id: String,
    },

    /// Disable a policy (it stays addressable)
    Disable {
        /// Policy id
        id: String,
    },
}

pub async fn execute(args: PolicyArgs, common: &CommonArgs) -> Result<()> {
    let engine = build_engine(common)?;
    let registry = engine.registry();

    match args.command {
        PolicyCommand::List => {
            for policy in registry.list() {
                let state = if policy.enabled { "enabled" } else { "disabled" };
                println!(
                    "{:<32} {:<10} {:<8} {} rule(s)  [{}]",
                    policy.id,
                    policy.severity.to_string(),
                    state,
                    policy.rules.len(),
                    policy.name
                );
            }
        }
        PolicyCommand::Show { id } => {
            let policy = registry.get(&id)?;
            println!("{}", policy.to_yaml()?);
        }
        PolicyCommand::Create { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read draft {:?}", file))?;
            let draft: PolicyDraft =
                serde_yaml::from_str(&content).context("Malformed policy draft")?;

            let policy = registry.create(draft)?;
            info!("Created policy '{}' ({})", policy.name, policy.id);
            persist_policy(registry, &policy.id, common.policies.as_deref())?;
            println!("{}", policy.to_yaml()?);
        }
        PolicyCommand::Delete { id } => {
            if registry.delete(&id) {
                println!("Deleted policy '{}'", id);
            } else {
                anyhow::bail!("Policy not found: {}", id);
            }
        }
        PolicyCommand::Enable { id } => {
            let policy = registry.set_enabled(&id, true)?;
            persist_policy(registry, &policy.id, common.policies.as_deref())?;
            println!("Enabled policy '{}'", id);
        }
        PolicyCommand::Disable { id } => {
            let policy = registry.set_enabled(&id, false)?;
            persist_policy(registry, &policy.id, common.policies.as_deref())?;
            println!("Disabled policy '{}'", id);
        }
    }

    Ok(())
}

/// Write a policy back to the policies directory so registry changes survive
/// the process. Without a configured directory the change is in-memory only.
pub fn persist_policy(
    registry: &PolicyRegistry,
    policy_id: &str,
    policies_dir: Option<&Path>,
) -> Result<()> {
    let Some(dir) = policies_dir else {
        tracing::warn!(
            "No --policies directory configured; change to '{}' lives only in this invocation",
            policy_id
        );
        return Ok(());
    };

    std::fs::create_dir_all(dir)?;
    let policy: Policy = registry.get(policy_id)?;
    let path = dir.join(format!("{}.yaml", policy_id));
    std::fs::write(&path, policy.to_yaml()?)
        .with_context(|| format!("Failed to write policy file {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_persists_to_policies_dir() {
        let dir = tempfile::tempdir().unwrap();
        let policies_dir = dir.path().join("policies");

        let draft_path = dir.path().join("draft.yaml");
        std::fs::write(
            &draft_path,
            "id: custom-1\nname: Custom Policy\ndescription: from test\n",
        )
        .unwrap();

        let common = CommonArgs {
            snapshot: None,
            policies: Some(policies_dir.clone()),
            state: dir.path().join("gates.json"),
        };
        let args = PolicyArgs {
            command: PolicyCommand::Create { file: draft_path },
        };

        execute(args, &common).await.unwrap();
        assert!(policies_dir.join("custom-1.yaml").exists());

        // A fresh engine picks the custom policy up from the directory
        let engine = build_engine(&common).unwrap();
        assert!(engine.registry().get("custom-1").is_ok());
    }
}

//! Exemption command - add or revoke policy exemptions.

use anyhow::Result;
use chrono::{Duration, Utc};
use clap::{Args, Subcommand};
use tracing::info;

use vigil_policy::Exemption;

use super::policy::persist_policy;
use super::{build_engine, CommonArgs};

#[derive(Args, Clone)]
pub struct ExemptionArgs {
    #[command(subcommand)]
    command: ExemptionCommand,
}

#[derive(Subcommand, Clone)]
enum ExemptionCommand {
    /// Add an exemption to a policy
    Add {
        /// Policy id the exemption applies to
        policy_id: String,

        /// Why the exemption is justified
        #[arg(short, long)]
        reason: String,

        /// Who signed off on the exemption
        #[arg(short, long)]
        approved_by: String,

        /// Limit the exemption to one repository (default: all repositories)
        #[arg(long)]
        repository: Option<String>,

        /// Expire the exemption after this many days (default: never)
        #[arg(long)]
        expires_in_days: Option<i64>,
    },

    /// Revoke an exemption by id
    Revoke {
        /// Policy id the exemption belongs to
        policy_id: String,

        /// Exemption id (printed when the exemption was added)
        exemption_id: String,
    },

    /// List a policy's exemptions
    List {
        /// Policy id
        policy_id: String,
    },
}

pub async fn execute(args: ExemptionArgs, common: &CommonArgs) -> Result<()> {
    let engine = build_engine(common)?;
    let registry = engine.registry();

    match args.command {
        ExemptionCommand::Add {
            policy_id,
            reason,
            approved_by,
            repository,
            expires_in_days,
        } => {
            let mut exemption = Exemption::new(reason, approved_by);
            if let Some(repo) = repository {
                exemption = exemption.for_repository(repo);
            }
            if let Some(days) = expires_in_days {
                exemption = exemption.expiring_at(Utc::now() + Duration::days(days));
            }

            let exemption = registry.add_exemption(&policy_id, exemption)?;
            info!("Added exemption {} to policy '{}'", exemption.id, policy_id);
            persist_policy(registry, &policy_id, common.policies.as_deref())?;
            println!("Exemption id: {}", exemption.id);
        }
        ExemptionCommand::Revoke {
            policy_id,
            exemption_id,
        } => {
            registry.revoke_exemption(&policy_id, &exemption_id)?;
            persist_policy(registry, &policy_id, common.policies.as_deref())?;
            println!("Revoked exemption {} from policy '{}'", exemption_id, policy_id);
        }
        ExemptionCommand::List { policy_id } => {
            let policy = registry.get(&policy_id)?;
            if policy.exemptions.is_empty() {
                println!("Policy '{}' has no exemptions", policy_id);
            }
            for exemption in &policy.exemptions {
                let scope = exemption.repository_id.as_deref().unwrap_or("all repositories");
                let expiry = exemption
                    .expires_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{}  scope={}  expires={}  approved_by={}  reason={}",
                    exemption.id, scope, expiry, exemption.approved_by, exemption.reason
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn common(dir: &Path) -> CommonArgs {
        CommonArgs {
            snapshot: None,
            policies: Some(dir.join("policies")),
            state: dir.join("gates.json"),
        }
    }

    #[tokio::test]
    async fn test_add_exemption_survives_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let common = common(dir.path());

        let args = ExemptionArgs {
            command: ExemptionCommand::Add {
                policy_id: "critical-vulnerabilities".to_string(),
                reason: "accepted risk for legacy repo".to_string(),
                approved_by: "ciso@example.com".to_string(),
                repository: Some("legacy-repo".to_string()),
                expires_in_days: Some(7),
            },
        };
        execute(args, &common).await.unwrap();

        // The exemption was written back as a policy override file
        let engine = build_engine(&common).unwrap();
        let policy = engine.registry().get("critical-vulnerabilities").unwrap();
        assert_eq!(policy.exemptions.len(), 1);
    }

    #[tokio::test]
    async fn test_add_to_unknown_policy_fails() {
        let dir = tempfile::tempdir().unwrap();
        let args = ExemptionArgs {
            command: ExemptionCommand::Add {
                policy_id: "nope".to_string(),
                reason: "r".to_string(),
                approved_by: "a".to_string(),
                repository: None,
                expires_in_days: None,
            },
        };
        assert!(execute(args, &common(dir.path())).await.is_err());
    }
}

//! Gate command - create deployment gates and drive the approval workflow.

use anyhow::Result;
use clap::{Args, Subcommand};
use tracing::info;

use vigil_policy::GateStatus;

use super::{build_engine, save_gate_state, CommonArgs};

#[derive(Args, Clone)]
pub struct GateArgs {
    #[command(subcommand)]
    command: GateCommand,
}

#[derive(Subcommand, Clone)]
enum GateCommand {
    /// Evaluate policies and create (or replace) the gate for a commit
    Create {
        /// Repository id
        repository: String,

        /// Commit SHA the gate covers
        commit: String,
    },

    /// Approve a pending gate
    Approve {
        /// Repository id
        repository: String,

        /// Commit SHA
        commit: String,

        /// Approver email
        #[arg(short, long)]
        approver: String,

        /// Approval reason
        #[arg(short, long)]
        reason: String,
    },

    /// Reject a pending gate (it becomes blocked)
    Reject {
        /// Repository id
        repository: String,

        /// Commit SHA
        commit: String,

        /// Approver email
        #[arg(short, long)]
        approver: String,

        /// Rejection reason
        #[arg(short, long)]
        reason: String,
    },

    /// Administratively bypass a gate, with a mandatory justification
    Bypass {
        /// Repository id
        repository: String,

        /// Commit SHA
        commit: String,

        /// Administrator performing the bypass
        #[arg(long)]
        actor: String,

        /// Why the gate is being bypassed (recorded in the audit trail)
        #[arg(short, long)]
        justification: String,
    },

    /// Show a stored gate
    Show {
        /// Repository id
        repository: String,

        /// Commit SHA
        commit: String,
    },
}

pub async fn execute(args: GateArgs, common: &CommonArgs) -> Result<()> {
    let engine = build_engine(common)?;

    match args.command {
        GateCommand::Create { repository, commit } => {
            let gate = engine.create_deployment_gate(&repository, &commit).await?;
            save_gate_state(&engine, &common.state)?;
            println!("{}", gate.report());

            // Non-zero exit so CI treats anything but an approved gate as
            // not-deployable
            match gate.status {
                GateStatus::Blocked => anyhow::bail!(
                    "Deployment gate is BLOCKED for {} @ {}",
                    repository,
                    commit
                ),
                GateStatus::Pending => anyhow::bail!(
                    "Deployment gate is PENDING approval for {} @ {}",
                    repository,
                    commit
                ),
                GateStatus::Approved | GateStatus::Bypassed => {}
            }
        }
        GateCommand::Approve {
            repository,
            commit,
            approver,
            reason,
        } => {
            let gate =
                engine.approve_deployment_gate(&repository, &commit, &approver, &reason)?;
            save_gate_state(&engine, &common.state)?;
            info!("Gate approved for {} @ {} by {}", repository, commit, approver);
            println!("{}", gate.report());
        }
        GateCommand::Reject {
            repository,
            commit,
            approver,
            reason,
        } => {
            let gate = engine.reject_deployment_gate(&repository, &commit, &approver, &reason)?;
            save_gate_state(&engine, &common.state)?;
            info!("Gate rejected for {} @ {} by {}", repository, commit, approver);
            println!("{}", gate.report());
        }
        GateCommand::Bypass {
            repository,
            commit,
            actor,
            justification,
        } => {
            let gate =
                engine.bypass_deployment_gate(&repository, &commit, &actor, &justification)?;
            save_gate_state(&engine, &common.state)?;
            info!("Gate bypassed for {} @ {} by {}", repository, commit, actor);
            println!("{}", gate.report());
        }
        GateCommand::Show { repository, commit } => {
            let gate = engine.get_gate(&repository, &commit).ok_or_else(|| {
                anyhow::anyhow!("No gate found for {} @ {}", repository, commit)
            })?;
            println!("{}", gate.report());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use vigil_core::MetricsSnapshot;

    fn common_with_snapshot(dir: &Path, snapshot: &MetricsSnapshot) -> CommonArgs {
        let snapshot_path = dir.join("snapshot.json");
        std::fs::write(&snapshot_path, serde_json::to_string(snapshot).unwrap()).unwrap();
        CommonArgs {
            snapshot: Some(snapshot_path),
            policies: None,
            state: dir.join("gates.json"),
        }
    }

    #[tokio::test]
    async fn test_create_clean_gate_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = MetricsSnapshot::new("repo-1", 30)
            .with_metric("critical_vulnerabilities", 0)
            .with_metric("high_vulnerabilities", 0);
        let common = common_with_snapshot(dir.path(), &snapshot);

        let args = GateArgs {
            command: GateCommand::Create {
                repository: "repo-1".to_string(),
                commit: "abc123".to_string(),
            },
        };
        execute(args, &common).await.unwrap();
        assert!(common.state.exists());
    }

    #[tokio::test]
    async fn test_create_blocked_gate_errors_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot =
            MetricsSnapshot::new("repo-1", 30).with_metric("critical_vulnerabilities", 2);
        let common = common_with_snapshot(dir.path(), &snapshot);

        let create = GateArgs {
            command: GateCommand::Create {
                repository: "repo-1".to_string(),
                commit: "abc123".to_string(),
            },
        };
        let err = execute(create, &common).await.unwrap_err();
        assert!(err.to_string().contains("BLOCKED"));

        // The blocked gate was stored before the error was raised
        let show = GateArgs {
            command: GateCommand::Show {
                repository: "repo-1".to_string(),
                commit: "abc123".to_string(),
            },
        };
        execute(show, &common).await.unwrap();
    }

    #[tokio::test]
    async fn test_approve_pending_gate_across_invocations() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = MetricsSnapshot::new("repo-1", 30)
            .with_metric("critical_vulnerabilities", 0)
            .with_metric("high_vulnerabilities", 5);
        let common = common_with_snapshot(dir.path(), &snapshot);

        let create = GateArgs {
            command: GateCommand::Create {
                repository: "repo-1".to_string(),
                commit: "abc123".to_string(),
            },
        };
        let err = execute(create, &common).await.unwrap_err();
        assert!(err.to_string().contains("PENDING"));

        // Second invocation restores the gate from the state file
        let approve = GateArgs {
            command: GateCommand::Approve {
                repository: "repo-1".to_string(),
                commit: "abc123".to_string(),
                approver: "lead@example.com".to_string(),
                reason: "reviewed the findings".to_string(),
            },
        };
        execute(approve, &common).await.unwrap();

        let engine = build_engine(&common).unwrap();
        let gate = engine.get_gate("repo-1", "abc123").unwrap();
        assert_eq!(gate.status, GateStatus::Approved);
    }
}

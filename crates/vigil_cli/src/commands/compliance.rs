//! Compliance command - read-only standing for a repository.

use anyhow::Result;
use clap::Args;

use vigil_policy::ComplianceStatus;

use super::evaluate::OutputFormat;
use super::{build_engine, CommonArgs};

#[derive(Args, Clone)]
pub struct ComplianceArgs {
    /// Repository id
    repository: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Exit non-zero when the repository is non-compliant
    #[arg(long)]
    strict: bool,
}

pub async fn execute(args: ComplianceArgs, common: &CommonArgs) -> Result<()> {
    let engine = build_engine(common)?;
    let summary = engine.get_repository_compliance(&args.repository).await?;

    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Text => {
            println!("Repository: {}", summary.repository_id);
            println!("Status:     {}", summary.overall_status);
            println!("Evaluated:  {}\n", summary.last_evaluated.to_rfc3339());

            for result in &summary.policy_results {
                println!(
                    "[{}] {} - {} active, {} exempted",
                    result.status,
                    result.policy_name,
                    result.active_violations,
                    result.exempted_violations
                );
            }
        }
    }

    if args.strict && summary.overall_status == ComplianceStatus::NonCompliant {
        anyhow::bail!("Repository {} is NON_COMPLIANT", args.repository);
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
    async fn test_strict_fails_on_non_compliant() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot =
            MetricsSnapshot::new("repo-1", 30).with_metric("critical_vulnerabilities", 1);
        let common = common_with_snapshot(dir.path(), &snapshot);

        let args = ComplianceArgs {
            repository: "repo-1".to_string(),
            format: OutputFormat::Text,
            strict: true,
        };
        let err = execute(args, &common).await.unwrap_err();
        assert!(err.to_string().contains("NON_COMPLIANT"));
    }

    #[tokio::test]
    async fn test_compliant_repository_passes_strict() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = MetricsSnapshot::new("repo-1", 30)
            .with_metric("critical_vulnerabilities", 0)
            .with_metric("high_vulnerabilities", 0);
        let common = common_with_snapshot(dir.path(), &snapshot);

        let args = ComplianceArgs {
            repository: "repo-1".to_string(),
            format: OutputFormat::Json,
            strict: true,
        };
        execute(args, &common).await.unwrap();
    }
}

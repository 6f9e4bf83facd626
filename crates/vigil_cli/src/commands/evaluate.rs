//! Evaluate command - run all enabled policies without creating a gate.

use anyhow::Result;
use clap::{Args, ValueEnum};

use vigil_policy::{ViolationStatus, ViolationSummary};

use super::{build_engine, CommonArgs};

#[derive(ValueEnum, Clone, Copy, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
        };
        write!(f, "{}", s)
    }
}

#[derive(Args, Clone)]
pub struct EvaluateArgs {
    /// Repository id to evaluate
    repository: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

pub async fn execute(args: EvaluateArgs, common: &CommonArgs) -> Result<()> {
    let engine = build_engine(common)?;
    let violations = engine.evaluate_repository(&args.repository).await?;

    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&violations)?);
        }
        OutputFormat::Text => {
            let summary = ViolationSummary::from_violations(&violations);
            println!("Repository: {}", args.repository);
            println!(
                "Violations: {} total ({} active, {} exempted)",
                summary.total, summary.active, summary.exempted
            );
            println!(
                "Severity:   {} critical, {} high, {} medium, {} low\n",
                summary.critical, summary.high, summary.medium, summary.low
            );

            for violation in &violations {
                let marker = match violation.status {
                    ViolationStatus::Exempted => " (exempted)",
                    _ => "",
                };
                println!(
                    "[{}] {} / {}: {}{}",
                    violation.severity,
                    violation.policy_id,
                    violation.rule_id,
                    violation.description,
                    marker
                );
                println!(
                    "      {} {} expected {:?}, actual {:?}",
                    violation.details.condition,
                    violation.details.operator,
                    violation.details.expected,
                    violation.details.actual
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::MetricsSnapshot;

    #[tokio::test]
    async fn test_evaluate_without_snapshot_fails() {
        let dir = tempfile::tempdir().unwrap();
        let common = CommonArgs {
            snapshot: None,
            policies: None,
            state: dir.path().join("gates.json"),
        };
        let args = EvaluateArgs {
            repository: "repo-1".to_string(),
            format: OutputFormat::Text,
        };
        assert!(execute(args, &common).await.is_err());
    }

    #[tokio::test]
    async fn test_evaluate_reports_violations() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot_path = dir.path().join("snapshot.json");
        let snapshot =
            MetricsSnapshot::new("repo-1", 30).with_metric("critical_vulnerabilities", 3);
        std::fs::write(&snapshot_path, serde_json::to_string(&snapshot).unwrap()).unwrap();

        let common = CommonArgs {
            snapshot: Some(snapshot_path),
            policies: None,
            state: dir.path().join("gates.json"),
        };
        let args = EvaluateArgs {
            repository: "repo-1".to_string(),
            format: OutputFormat::Json,
        };
        execute(args, &common).await.unwrap();
    }
}

//! Violation records produced by policy evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vigil_core::MetricValue;

use crate::policy::{Policy, PolicySeverity};
use crate::rule::{Rule, RuleOperator, RuleValue};

/// Lifecycle state of a violation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationStatus {
    /// Counts toward gate blocking and approval requirements
    Active,
    /// Suppressed by a matching exemption; recorded but never counted
    Exempted,
    /// Remediated after detection
    Resolved,
    /// Dismissed by an operator without remediation
    Ignored,
}

/// Structured comparison context: what the rule expected versus what the
/// snapshot actually contained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationDetails {
    pub condition: String,
    pub operator: RuleOperator,
    pub expected: RuleValue,
    pub actual: MetricValue,
}

/// One rule firing against one repository's current metrics.
///
/// Violations are recomputed fresh on every evaluation; they are not
/// deduplicated across evaluations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    /// Unique within an evaluation: policy id + rule id + detection time
    pub id: String,
    pub policy_id: String,
    pub repository_id: String,
    pub rule_id: String,
    /// Copied from the owning policy
    pub severity: PolicySeverity,
    pub description: String,
    pub details: ViolationDetails,
    pub status: ViolationStatus,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Violation {
    /// Record a rule firing under a policy, detected at `detected_at`.
    pub fn new(
        policy: &Policy,
        rule: &Rule,
        repository_id: impl Into<String>,
        actual: MetricValue,
        detected_at: DateTime<Utc>,
    ) -> Self {
        let repository_id = repository_id.into();
        let description = if rule.description.is_empty() {
            format!(
                "{}: {} {} {} (observed {})",
                policy.name, rule.condition, rule.operator, rule.value, actual
            )
        } else {
            rule.description.clone()
        };

        Self {
            id: format!(
                "{}:{}:{}",
                policy.id,
                rule.id,
                detected_at.timestamp_millis()
            ),
            policy_id: policy.id.clone(),
            repository_id,
            rule_id: rule.id.clone(),
            severity: policy.severity,
            description,
            details: ViolationDetails {
                condition: rule.condition.clone(),
                operator: rule.operator,
                expected: rule.value.clone(),
                actual,
            },
            status: ViolationStatus::Active,
            detected_at,
            resolved_at: None,
        }
    }

    /// Mark the violation as suppressed by an exemption.
    pub fn exempted(mut self) -> Self {
        self.status = ViolationStatus::Exempted;
        self
    }

    /// Mark the violation as remediated.
    pub fn resolve(&mut self) {
        self.status = ViolationStatus::Resolved;
        self.resolved_at = Some(Utc::now());
    }

    /// Dismiss the violation without remediation.
    pub fn ignore(&mut self) {
        self.status = ViolationStatus::Ignored;
    }

    /// Whether this violation counts toward blocking/approval decisions.
    pub fn is_active(&self) -> bool {
        self.status == ViolationStatus::Active
    }
}

/// Counts of violations by status and severity, for reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViolationSummary {
    pub total: usize,
    pub active: usize,
    pub exempted: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl ViolationSummary {
    /// Summarize a set of violations.
    pub fn from_violations(violations: &[Violation]) -> Self {
        let mut summary = Self {
            total: violations.len(),
            ..Default::default()
        };

        for violation in violations {
            match violation.status {
                ViolationStatus::Active => summary.active += 1,
                ViolationStatus::Exempted => summary.exempted += 1,
                _ => {}
            }
            match violation.severity {
                PolicySeverity::Critical => summary.critical += 1,
                PolicySeverity::High => summary.high += 1,
                PolicySeverity::Medium => summary.medium += 1,
                PolicySeverity::Low => summary.low += 1,
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Policy, PolicyCategory};
    use crate::rule::RuleOperator;

    fn policy_and_rule() -> (Policy, Rule) {
        let rule = Rule::threshold("no-criticals", "critical_vulnerabilities", RuleOperator::Gt, 0.0)
            .unwrap();
        let policy = Policy::new("critical-vulnerabilities", "Critical Vulnerabilities")
            .with_category(PolicyCategory::Vulnerability)
            .with_severity(PolicySeverity::Critical)
            .with_rule(rule.clone());
        (policy, rule)
    }

    #[test]
    fn test_violation_carries_policy_severity() {
        let (policy, rule) = policy_and_rule();
        let violation = Violation::new(&policy, &rule, "repo-1", MetricValue::Number(2.0), Utc::now());

        assert_eq!(violation.severity, PolicySeverity::Critical);
        assert_eq!(violation.policy_id, "critical-vulnerabilities");
        assert!(violation.is_active());
        assert!(violation.description.contains("critical_vulnerabilities"));
    }

    #[test]
    fn test_violation_id_derivation() {
        let (policy, rule) = policy_and_rule();
        let at = Utc::now();
        let violation = Violation::new(&policy, &rule, "repo-1", MetricValue::Number(2.0), at);

        assert!(violation.id.starts_with("critical-vulnerabilities:no-criticals:"));
        assert!(violation.id.ends_with(&at.timestamp_millis().to_string()));
    }

    #[test]
    fn test_status_transitions() {
        let (policy, rule) = policy_and_rule();
        let mut violation =
            Violation::new(&policy, &rule, "repo-1", MetricValue::Number(2.0), Utc::now());

        violation.resolve();
        assert_eq!(violation.status, ViolationStatus::Resolved);
        assert!(violation.resolved_at.is_some());
        assert!(!violation.is_active());

        let exempted = Violation::new(&policy, &rule, "repo-1", MetricValue::Number(2.0), Utc::now())
            .exempted();
        assert_eq!(exempted.status, ViolationStatus::Exempted);
        assert!(!exempted.is_active());

        let mut ignored =
            Violation::new(&policy, &rule, "repo-1", MetricValue::Number(2.0), Utc::now());
        ignored.ignore();
        assert_eq!(ignored.status, ViolationStatus::Ignored);
        assert!(ignored.resolved_at.is_none());
    }

    #[test]
    fn test_summary_counts() {
        let (policy, rule) = policy_and_rule();
        let now = Utc::now();
        let violations = vec![
            Violation::new(&policy, &rule, "repo-1", MetricValue::Number(2.0), now),
            Violation::new(&policy, &rule, "repo-1", MetricValue::Number(3.0), now).exempted(),
        ];

        let summary = ViolationSummary::from_violations(&violations);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.active, 1);
        assert_eq!(summary.exempted, 1);
        assert_eq!(summary.critical, 2);
    }
}

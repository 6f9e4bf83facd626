//! Read-only compliance projection for a repository.
//!
//! Runs the same evaluation as gate construction but without a commit: no
//! gate, no approvals, just the current standing of each enabled policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::Policy;
use crate::violation::Violation;

/// Compliance standing, overall or per policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    /// Active violations exist, none under a blocking enforcement
    Warning,
    /// At least one active violation under a blocking enforcement
    NonCompliant,
}

impl std::fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ComplianceStatus::Compliant => "COMPLIANT",
            ComplianceStatus::Warning => "WARNING",
            ComplianceStatus::NonCompliant => "NON_COMPLIANT",
        };
        write!(f, "{}", s)
    }
}

/// Standing of one enabled policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyComplianceResult {
    pub policy_id: String,
    pub policy_name: String,
    pub status: ComplianceStatus,
    pub active_violations: usize,
    pub exempted_violations: usize,
}

/// Compliance view over all enabled policies for one repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceSummary {
    pub repository_id: String,
    pub overall_status: ComplianceStatus,
    pub policy_results: Vec<PolicyComplianceResult>,
    pub last_evaluated: DateTime<Utc>,
}

impl ComplianceSummary {
    /// Project per-policy violations into a compliance summary.
    ///
    /// `policies` must be the enabled policies the violations were evaluated
    /// against; exempted violations never degrade the status.
    pub fn project(
        repository_id: impl Into<String>,
        policies: &[Policy],
        violations: &[Violation],
    ) -> Self {
        let mut policy_results = Vec::with_capacity(policies.len());
        let mut overall = ComplianceStatus::Compliant;

        for policy in policies {
            let (active, exempted) = violations
                .iter()
                .filter(|v| v.policy_id == policy.id)
                .fold((0, 0), |(a, e), v| {
                    if v.is_active() {
                        (a + 1, e)
                    } else {
                        (a, e + 1)
                    }
                });

            let status = if active == 0 {
                ComplianceStatus::Compliant
            } else if policy.enforcement.blocks_deployment() {
                ComplianceStatus::NonCompliant
            } else {
                ComplianceStatus::Warning
            };

            match status {
                ComplianceStatus::NonCompliant => overall = ComplianceStatus::NonCompliant,
                ComplianceStatus::Warning if overall == ComplianceStatus::Compliant => {
                    overall = ComplianceStatus::Warning
                }
                _ => {}
            }

            policy_results.push(PolicyComplianceResult {
                policy_id: policy.id.clone(),
                policy_name: policy.name.clone(),
                status,
                active_violations: active,
                exempted_violations: exempted,
            });
        }

        Self {
            repository_id: repository_id.into(),
            overall_status: overall,
            policy_results,
            last_evaluated: Utc::now(),
        }
    }
}

//! Deployment gate: the aggregate decision for one (repository, commit) pair.
//!
//! A gate is constructed once per evaluation, then only mutated through the
//! human approval workflow or the administrative bypass. Every human action
//! is captured both in the approval list and in the audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PolicyError, PolicyResult};
use crate::violation::{Violation, ViolationSummary};

/// Overall gate decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    /// Waiting for human approval
    Pending,
    /// Deployment may proceed
    Approved,
    /// Deployment must not proceed
    Blocked,
    /// Administratively overridden, regardless of prior status
    Bypassed,
}

impl std::fmt::Display for GateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GateStatus::Pending => "PENDING",
            GateStatus::Approved => "APPROVED",
            GateStatus::Blocked => "BLOCKED",
            GateStatus::Bypassed => "BYPASSED",
        };
        write!(f, "{}", s)
    }
}

/// Per-policy check result within a gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    /// The policy matched, but every violation is exempted
    Warn,
}

/// Result of one enabled policy's evaluation within a gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateCheck {
    pub policy_id: String,
    pub status: CheckStatus,
    pub message: String,
    /// The violations recorded for this policy, if any
    pub details: Vec<Violation>,
}

/// A human approve/reject decision. Appended immutably.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateApproval {
    pub approver_email: String,
    pub decision: ApprovalDecision,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

/// One entry in a gate's audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor: String,
    pub action: AuditAction,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Evaluated,
    Approved,
    Rejected,
    Bypassed,
}

impl AuditEntry {
    fn new(actor: impl Into<String>, action: AuditAction, reason: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            action,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The gated deployment decision for one (repository, commit) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentGate {
    pub repository_id: String,
    pub commit_sha: String,
    pub status: GateStatus,
    /// All violations across policies, exempted ones included
    pub violations: Vec<Violation>,
    /// One check per enabled policy
    pub gate_checks: Vec<GateCheck>,
    pub approvals: Vec<GateApproval>,
    pub audit: Vec<AuditEntry>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DeploymentGate {
    /// Assemble a gate from evaluation output. The status is derived purely
    /// from the two booleans, with blocking taking precedence.
    pub fn new(
        repository_id: impl Into<String>,
        commit_sha: impl Into<String>,
        violations: Vec<Violation>,
        gate_checks: Vec<GateCheck>,
        should_block: bool,
        requires_approval: bool,
    ) -> Self {
        let now = Utc::now();
        let (status, completed_at) = if should_block {
            (GateStatus::Blocked, None)
        } else if requires_approval {
            (GateStatus::Pending, None)
        } else {
            // Auto-approved, no human action recorded
            (GateStatus::Approved, Some(now))
        };

        let mut gate = Self {
            repository_id: repository_id.into(),
            commit_sha: commit_sha.into(),
            status,
            violations,
            gate_checks,
            approvals: Vec::new(),
            audit: Vec::new(),
            created_at: now,
            completed_at,
        };
        gate.audit.push(AuditEntry::new(
            "engine",
            AuditAction::Evaluated,
            format!("gate evaluated to {}", gate.status),
        ));
        gate
    }

    fn require_pending(&self) -> PolicyResult<()> {
        if self.status != GateStatus::Pending {
            return Err(PolicyError::InvalidGateState {
                repository_id: self.repository_id.clone(),
                commit_sha: self.commit_sha.clone(),
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// Record a human approval. Valid only while the gate is `Pending`.
    pub fn approve(&mut self, approver_email: impl Into<String>, reason: impl Into<String>) -> PolicyResult<()> {
        self.require_pending()?;
        let approver_email = approver_email.into();
        let reason = reason.into();

        self.approvals.push(GateApproval {
            approver_email: approver_email.clone(),
            decision: ApprovalDecision::Approve,
            reason: reason.clone(),
            timestamp: Utc::now(),
        });
        self.audit
            .push(AuditEntry::new(&approver_email, AuditAction::Approved, &reason));
        self.status = GateStatus::Approved;
        self.completed_at = Some(Utc::now());

        info!(
            repository = %self.repository_id,
            commit = %self.commit_sha,
            approver = %approver_email,
            "Deployment gate approved"
        );
        Ok(())
    }

    /// Record a human rejection. The gate becomes `Blocked`; `completed_at`
    /// stays unset because the commit still needs remediation.
    pub fn reject(&mut self, approver_email: impl Into<String>, reason: impl Into<String>) -> PolicyResult<()> {
        self.require_pending()?;
        let approver_email = approver_email.into();
        let reason = reason.into();

        self.approvals.push(GateApproval {
            approver_email: approver_email.clone(),
            decision: ApprovalDecision::Reject,
            reason: reason.clone(),
            timestamp: Utc::now(),
        });
        self.audit
            .push(AuditEntry::new(&approver_email, AuditAction::Rejected, &reason));
        self.status = GateStatus::Blocked;

        info!(
            repository = %self.repository_id,
            commit = %self.commit_sha,
            approver = %approver_email,
            "Deployment gate rejected"
        );
        Ok(())
    }

    /// Administrative override: force the gate to `Bypassed` from any status.
    /// Requires a non-empty justification; always audited.
    pub fn bypass(&mut self, actor: impl Into<String>, justification: impl Into<String>) -> PolicyResult<()> {
        let actor = actor.into();
        let justification = justification.into();
        if justification.trim().is_empty() {
            return Err(PolicyError::ValidationFailed(
                "bypass requires a justification".to_string(),
            ));
        }

        self.audit
            .push(AuditEntry::new(&actor, AuditAction::Bypassed, &justification));
        self.status = GateStatus::Bypassed;
        self.completed_at = Some(Utc::now());

        info!(
            repository = %self.repository_id,
            commit = %self.commit_sha,
            actor = %actor,
            "Deployment gate BYPASSED: {}",
            justification
        );
        Ok(())
    }

    /// Violation counts for reports.
    pub fn summary(&self) -> ViolationSummary {
        ViolationSummary::from_violations(&self.violations)
    }

    /// Generate a human-readable report.
    pub fn report(&self) -> String {
        let mut report = String::new();

        report.push_str(&format!(
            "Deployment gate: {} @ {}\n",
            self.repository_id, self.commit_sha
        ));
        report.push_str(&format!("Status: {}\n\n", self.status));

        report.push_str("Checks:\n");
        for check in &self.gate_checks {
            let marker = match check.status {
                CheckStatus::Pass => "PASS",
                CheckStatus::Fail => "FAIL",
                CheckStatus::Warn => "WARN",
            };
            report.push_str(&format!("  [{}] {} - {}\n", marker, check.policy_id, check.message));
        }

        let summary = self.summary();
        report.push_str(&format!(
            "\nViolations: {} total ({} active, {} exempted)\n",
            summary.total, summary.active, summary.exempted
        ));

        for violation in self.violations.iter().filter(|v| v.is_active()) {
            report.push_str(&format!(
                "  - [{}] {}\n",
                violation.severity, violation.description
            ));
        }

        if !self.approvals.is_empty() {
            report.push_str("\nApprovals:\n");
            for approval in &self.approvals {
                report.push_str(&format!(
                    "  {:?} by {} - {}\n",
                    approval.decision, approval.approver_email, approval.reason
                ));
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_gate() -> DeploymentGate {
        DeploymentGate::new("repo-1", "abc123", vec![], vec![], false, true)
    }

    #[test]
    fn test_status_derivation() {
        let blocked = DeploymentGate::new("r", "c", vec![], vec![], true, false);
        assert_eq!(blocked.status, GateStatus::Blocked);
        assert!(blocked.completed_at.is_none());

        // Blocking wins over approval requirement
        let both = DeploymentGate::new("r", "c", vec![], vec![], true, true);
        assert_eq!(both.status, GateStatus::Blocked);

        let pending = DeploymentGate::new("r", "c", vec![], vec![], false, true);
        assert_eq!(pending.status, GateStatus::Pending);

        let auto = DeploymentGate::new("r", "c", vec![], vec![], false, false);
        assert_eq!(auto.status, GateStatus::Approved);
        assert!(auto.completed_at.is_some());
        assert!(auto.approvals.is_empty());
    }

    #[test]
    fn test_creation_is_audited() {
        let gate = pending_gate();
        assert_eq!(gate.audit.len(), 1);
        assert_eq!(gate.audit[0].action, AuditAction::Evaluated);
    }

    #[test]
    fn test_approve_pending_gate() {
        let mut gate = pending_gate();
        gate.approve("alice@co", "reviewed, acceptable risk").unwrap();

        assert_eq!(gate.status, GateStatus::Approved);
        assert!(gate.completed_at.is_some());
        assert_eq!(gate.approvals.len(), 1);
        assert_eq!(gate.approvals[0].decision, ApprovalDecision::Approve);
        assert!(gate.audit.iter().any(|e| e.action == AuditAction::Approved));
    }

    #[test]
    fn test_reject_pending_gate() {
        let mut gate = pending_gate();
        gate.reject("bob@co", "too risky before release").unwrap();

        assert_eq!(gate.status, GateStatus::Blocked);
        // Rejection is not terminal completion
        assert!(gate.completed_at.is_none());
        assert_eq!(gate.approvals[0].decision, ApprovalDecision::Reject);
    }

    #[test]
    fn test_approve_requires_pending() {
        let mut blocked = DeploymentGate::new("r", "c", vec![], vec![], true, false);
        let before = blocked.status;

        let err = blocked.approve("alice@co", "please");
        assert!(matches!(err, Err(PolicyError::InvalidGateState { .. })));
        assert_eq!(blocked.status, before);
        assert!(blocked.approvals.is_empty());

        let mut approved = pending_gate();
        approved.approve("alice@co", "ok").unwrap();
        let err = approved.reject("bob@co", "changed my mind");
        assert!(matches!(err, Err(PolicyError::InvalidGateState { .. })));
    }

    #[test]
    fn test_bypass_from_any_status() {
        let mut blocked = DeploymentGate::new("r", "c", vec![], vec![], true, false);
        blocked.bypass("admin@co", "incident hotfix, change ticket INC-421").unwrap();

        assert_eq!(blocked.status, GateStatus::Bypassed);
        assert!(blocked.completed_at.is_some());
        assert!(blocked.audit.iter().any(|e| e.action == AuditAction::Bypassed));

        let mut approved = DeploymentGate::new("r", "c", vec![], vec![], false, false);
        approved.bypass("admin@co", "rollback drill").unwrap();
        assert_eq!(approved.status, GateStatus::Bypassed);
    }

    #[test]
    fn test_bypass_requires_justification() {
        let mut gate = pending_gate();
        let err = gate.bypass("admin@co", "   ");
        assert!(matches!(err, Err(PolicyError::ValidationFailed(_))));
        assert_eq!(gate.status, GateStatus::Pending);
    }

    #[test]
    fn test_report_contents() {
        let mut gate = pending_gate();
        gate.gate_checks.push(GateCheck {
            policy_id: "high-vulnerability-threshold".to_string(),
            status: CheckStatus::Fail,
            message: "High Vulnerability Threshold violated".to_string(),
            details: vec![],
        });

        let report = gate.report();
        assert!(report.contains("PENDING"));
        assert!(report.contains("[FAIL] high-vulnerability-threshold"));
    }
}

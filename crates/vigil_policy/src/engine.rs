//! Gate engine: orchestrates evaluation, gate construction, the approval
//! workflow and notification fan-out.
//!
//! Each evaluation works on a point-in-time copy of the policy registry and
//! a freshly fetched metrics snapshot, so concurrent registry edits never
//! leak into an in-flight evaluation. No lock is held across an await.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::{debug, info, warn};

use vigil_core::MetricsProvider;
use vigil_notify::{Notification, NotificationDispatcher};

use crate::compliance::ComplianceSummary;
use crate::error::{PolicyError, PolicyResult};
use crate::gate::{CheckStatus, DeploymentGate, GateCheck};
use crate::policy::Policy;
use crate::registry::PolicyRegistry;
use crate::rule::RuleOutcome;
use crate::violation::Violation;

/// Default trailing window for metrics snapshots, in days.
const DEFAULT_WINDOW_DAYS: u32 = 30;

type GateKey = (String, String);

/// The policy and deployment gate engine.
///
/// Stateless per call apart from the policy registry (read-mostly) and the
/// gate store, which keeps constructed gates addressable for the approval
/// workflow, keyed by `(repository_id, commit_sha)`.
pub struct GateEngine {
    registry: Arc<PolicyRegistry>,
    metrics: Arc<dyn MetricsProvider>,
    dispatcher: Arc<NotificationDispatcher>,
    gates: RwLock<HashMap<GateKey, DeploymentGate>>,
    window_days: u32,
}

impl GateEngine {
    /// Create an engine over a registry, metrics provider and dispatcher.
    pub fn new(
        registry: Arc<PolicyRegistry>,
        metrics: Arc<dyn MetricsProvider>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            registry,
            metrics,
            dispatcher,
            gates: RwLock::new(HashMap::new()),
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }

    /// Set the trailing metrics window.
    pub fn with_window_days(mut self, days: u32) -> Self {
        self.window_days = days;
        self
    }

    /// The registry this engine evaluates against.
    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    fn gates_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<GateKey, DeploymentGate>> {
        self.gates.read().expect("gate lock poisoned")
    }

    fn gates_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<GateKey, DeploymentGate>> {
        self.gates.write().expect("gate lock poisoned")
    }

    /// Evaluate every enabled policy against the repository's current
    /// metrics. Returns all violations, exempted ones included.
    pub async fn evaluate_repository(&self, repository_id: &str) -> PolicyResult<Vec<Violation>> {
        let (_, violations) = self.evaluate_with_policies(repository_id).await?;
        Ok(violations)
    }

    /// Shared evaluation path: fetch snapshot, run enabled policies, apply
    /// exemption filtering. Returns the enabled policies that were evaluated
    /// alongside the violations.
    async fn evaluate_with_policies(
        &self,
        repository_id: &str,
    ) -> PolicyResult<(Vec<Policy>, Vec<Violation>)> {
        // Missing metrics are fatal to this evaluation: never degrade to
        // "zero vulnerabilities" when the provider is down.
        let snapshot = self.metrics.snapshot(repository_id, self.window_days).await?;

        let enabled: Vec<Policy> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|p| p.enabled)
            .collect();

        let now = Utc::now();
        let mut violations = Vec::new();

        for policy in &enabled {
            for rule in &policy.rules {
                match rule.evaluate(&snapshot) {
                    RuleOutcome::NotApplicable => {}
                    RuleOutcome::Evaluated { violated: false, .. } => {}
                    RuleOutcome::Evaluated { actual, violated: true } => {
                        let mut violation =
                            Violation::new(policy, rule, repository_id, actual, now);
                        if policy.active_exemption(repository_id, now).is_some() {
                            violation = violation.exempted();
                            debug!(
                                policy = %policy.id,
                                rule = %rule.id,
                                repository = %repository_id,
                                "Violation suppressed by exemption"
                            );
                        }
                        violations.push(violation);
                    }
                }
            }
        }

        info!(
            repository = %repository_id,
            violations = violations.len(),
            "Repository evaluated against {} enabled policies",
            enabled.len()
        );
        Ok((enabled, violations))
    }

    /// Evaluate the repository and construct the deployment gate for one
    /// commit. The gate is stored for the approval workflow and returned.
    pub async fn create_deployment_gate(
        &self,
        repository_id: &str,
        commit_sha: &str,
    ) -> PolicyResult<DeploymentGate> {
        let (enabled, violations) = self.evaluate_with_policies(repository_id).await?;

        let mut gate_checks = Vec::with_capacity(enabled.len());
        let mut should_block = false;
        let mut requires_approval = false;

        for policy in &enabled {
            let policy_violations: Vec<Violation> = violations
                .iter()
                .filter(|v| v.policy_id == policy.id)
                .cloned()
                .collect();
            let has_active = policy_violations.iter().any(|v| v.is_active());

            let (status, message) = if has_active {
                if policy.enforcement.blocks_deployment() {
                    should_block = true;
                }
                if policy.enforcement.requires_approval() {
                    requires_approval = true;
                }
                (CheckStatus::Fail, format!("{} violated", policy.name))
            } else if !policy_violations.is_empty() {
                (CheckStatus::Warn, format!("{} violations exempted", policy.name))
            } else {
                (CheckStatus::Pass, format!("{} passed", policy.name))
            };

            gate_checks.push(GateCheck {
                policy_id: policy.id.clone(),
                status,
                message,
                details: policy_violations,
            });
        }

        let gate = DeploymentGate::new(
            repository_id,
            commit_sha,
            violations,
            gate_checks,
            should_block,
            requires_approval,
        );
        info!(
            repository = %repository_id,
            commit = %commit_sha,
            status = %gate.status,
            "Deployment gate constructed"
        );

        // Best effort; a failing channel never alters the gate.
        self.notify_active_violations(&enabled, &gate).await;

        self.gates_write().insert(
            (repository_id.to_string(), commit_sha.to_string()),
            gate.clone(),
        );
        Ok(gate)
    }

    async fn notify_active_violations(&self, policies: &[Policy], gate: &DeploymentGate) {
        for violation in gate.violations.iter().filter(|v| v.is_active()) {
            let Some(policy) = policies.iter().find(|p| p.id == violation.policy_id) else {
                continue;
            };
            let channels = policy.enforcement.channels();
            if channels.is_empty() {
                continue;
            }

            let notification = Notification::new(&gate.repository_id, &policy.id, &policy.name)
                .with_commit(&gate.commit_sha)
                .with_severity(violation.severity.to_string())
                .with_message(
                    format!("Policy violated: {}", policy.name),
                    violation.description.clone(),
                );

            let report = self.dispatcher.dispatch(channels, &notification).await;
            if !report.all_delivered() {
                warn!(
                    policy = %policy.id,
                    failed = report.failed,
                    missing = report.missing_channels.len(),
                    "Some violation notifications were not delivered"
                );
            }
        }
    }

    fn mutate_gate<F>(&self, repository_id: &str, commit_sha: &str, f: F) -> PolicyResult<DeploymentGate>
    where
        F: FnOnce(&mut DeploymentGate) -> PolicyResult<()>,
    {
        let mut guard = self.gates_write();
        let gate = guard
            .get_mut(&(repository_id.to_string(), commit_sha.to_string()))
            .ok_or_else(|| PolicyError::GateNotFound {
                repository_id: repository_id.to_string(),
                commit_sha: commit_sha.to_string(),
            })?;

        f(gate)?;
        Ok(gate.clone())
    }

    /// Approve a pending gate.
    pub fn approve_deployment_gate(
        &self,
        repository_id: &str,
        commit_sha: &str,
        approver_email: &str,
        reason: &str,
    ) -> PolicyResult<DeploymentGate> {
        self.mutate_gate(repository_id, commit_sha, |gate| {
            gate.approve(approver_email, reason)
        })
    }

    /// Reject a pending gate. The gate becomes blocked; the commit must be
    /// remediated and re-evaluated.
    pub fn reject_deployment_gate(
        &self,
        repository_id: &str,
        commit_sha: &str,
        approver_email: &str,
        reason: &str,
    ) -> PolicyResult<DeploymentGate> {
        self.mutate_gate(repository_id, commit_sha, |gate| {
            gate.reject(approver_email, reason)
        })
    }

    /// Administratively bypass a gate from any status. Requires a
    /// justification; records an audit entry.
    pub fn bypass_deployment_gate(
        &self,
        repository_id: &str,
        commit_sha: &str,
        actor: &str,
        justification: &str,
    ) -> PolicyResult<DeploymentGate> {
        self.mutate_gate(repository_id, commit_sha, |gate| {
            gate.bypass(actor, justification)
        })
    }

    /// Look up a stored gate.
    pub fn get_gate(&self, repository_id: &str, commit_sha: &str) -> Option<DeploymentGate> {
        self.gates_read()
            .get(&(repository_id.to_string(), commit_sha.to_string()))
            .cloned()
    }

    /// All stored gates.
    pub fn gates(&self) -> Vec<DeploymentGate> {
        self.gates_read().values().cloned().collect()
    }

    /// Restore gates from an external store (e.g. the CLI's state file).
    pub fn load_gates(&self, gates: Vec<DeploymentGate>) {
        let mut guard = self.gates_write();
        for gate in gates {
            guard.insert((gate.repository_id.clone(), gate.commit_sha.clone()), gate);
        }
    }

    /// Read-only compliance view over the enabled policies, no commit
    /// required.
    pub async fn get_repository_compliance(
        &self,
        repository_id: &str,
    ) -> PolicyResult<ComplianceSummary> {
        let (enabled, violations) = self.evaluate_with_policies(repository_id).await?;
        Ok(ComplianceSummary::project(repository_id, &enabled, &violations))
    }
}

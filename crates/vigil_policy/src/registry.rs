//! Policy registry: the single owner of all policy records.
//!
//! The registry serializes writes behind one lock and hands evaluation a
//! point-in-time copy of the policy list, so a concurrent edit never affects
//! an in-flight evaluation. Keys are policy ids; iteration order is the id
//! order and is stable across calls when nothing changes.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use tracing::{debug, info, warn};

use crate::error::{PolicyError, PolicyResult};
use crate::policy::{
    EnforcementAction, Exemption, Policy, PolicyCategory, PolicyDraft, PolicyPatch, PolicySeverity,
};
use crate::rule::{Rule, RuleOperator};

/// Thread-safe store of policies, keyed by id.
#[derive(Default)]
pub struct PolicyRegistry {
    policies: RwLock<BTreeMap<String, Policy>>,
}

impl PolicyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with the five built-in policies.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for policy in builtin_policies() {
            registry.insert(policy);
        }
        info!("Policy registry initialized with built-in policies");
        registry
    }

    fn insert(&self, policy: Policy) {
        self.write_guard().insert(policy.id.clone(), policy);
    }

    fn read_guard(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Policy>> {
        self.policies.read().expect("policy lock poisoned")
    }

    fn write_guard(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Policy>> {
        self.policies.write().expect("policy lock poisoned")
    }

    /// All policies including disabled ones, in id order.
    pub fn list(&self) -> Vec<Policy> {
        self.read_guard().values().cloned().collect()
    }

    /// Point-in-time copy used for one evaluation. Alias of [`list`] kept
    /// separate so call sites state their intent.
    ///
    /// [`list`]: PolicyRegistry::list
    pub fn snapshot(&self) -> Vec<Policy> {
        self.list()
    }

    /// Look up a policy by id.
    pub fn get(&self, id: &str) -> PolicyResult<Policy> {
        self.read_guard()
            .get(id)
            .cloned()
            .ok_or_else(|| PolicyError::PolicyNotFound(id.to_string()))
    }

    /// Create a policy from a draft, filling defaults and generating an id
    /// if none was supplied. Rejects an id that is already taken.
    pub fn create(&self, draft: PolicyDraft) -> PolicyResult<Policy> {
        let policy = draft.into_policy();
        let mut guard = self.write_guard();

        if guard.contains_key(&policy.id) {
            return Err(PolicyError::ValidationFailed(format!(
                "policy id '{}' already exists",
                policy.id
            )));
        }

        debug!("Creating policy: {} ({})", policy.name, policy.id);
        guard.insert(policy.id.clone(), policy.clone());
        Ok(policy)
    }

    /// Shallow-merge a patch over an existing policy, bumping `updated_at`.
    pub fn update(&self, id: &str, patch: PolicyPatch) -> PolicyResult<Policy> {
        let mut guard = self.write_guard();
        let policy = guard
            .get_mut(id)
            .ok_or_else(|| PolicyError::PolicyNotFound(id.to_string()))?;

        patch.apply(policy);
        debug!("Updated policy: {}", id);
        Ok(policy.clone())
    }

    /// Remove a policy. Returns true if it existed.
    pub fn delete(&self, id: &str) -> bool {
        let removed = self.write_guard().remove(id).is_some();
        if removed {
            debug!("Deleted policy: {}", id);
        }
        removed
    }

    /// Enable or disable a policy without touching its other fields.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> PolicyResult<Policy> {
        self.update(
            id,
            PolicyPatch {
                enabled: Some(enabled),
                ..Default::default()
            },
        )
    }

    /// Append an exemption to a policy's exemption list.
    ///
    /// Unknown policy ids are an error here: silently accepting an exemption
    /// for a policy that does not exist would let a waiver vanish without
    /// anyone noticing.
    pub fn add_exemption(&self, policy_id: &str, exemption: Exemption) -> PolicyResult<Exemption> {
        let mut guard = self.write_guard();
        let policy = guard
            .get_mut(policy_id)
            .ok_or_else(|| PolicyError::PolicyNotFound(policy_id.to_string()))?;

        info!(
            policy = %policy_id,
            exemption = %exemption.id,
            repository = exemption.repository_id.as_deref().unwrap_or("*"),
            approved_by = %exemption.approved_by,
            "Exemption added"
        );
        policy.exemptions.push(exemption.clone());
        policy.updated_at = chrono::Utc::now();
        Ok(exemption)
    }

    /// Remove an exemption from a policy.
    pub fn revoke_exemption(&self, policy_id: &str, exemption_id: &str) -> PolicyResult<()> {
        let mut guard = self.write_guard();
        let policy = guard
            .get_mut(policy_id)
            .ok_or_else(|| PolicyError::PolicyNotFound(policy_id.to_string()))?;

        let before = policy.exemptions.len();
        policy.exemptions.retain(|e| e.id != exemption_id);

        if policy.exemptions.len() == before {
            return Err(PolicyError::ExemptionNotFound {
                policy_id: policy_id.to_string(),
                exemption_id: exemption_id.to_string(),
            });
        }

        info!(policy = %policy_id, exemption = %exemption_id, "Exemption revoked");
        policy.updated_at = chrono::Utc::now();
        Ok(())
    }

    /// Load policies from YAML files in a directory.
    ///
    /// Files that fail to parse are skipped with a warning; one bad file must
    /// not take down the rest of the configuration.
    pub fn load_dir(&self, path: &Path) -> PolicyResult<usize> {
        if !path.is_dir() {
            return Err(PolicyError::ValidationFailed(format!(
                "not a directory: {}",
                path.display()
            )));
        }

        let mut loaded = 0;
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let file = entry.path();
            if !file
                .extension()
                .map_or(false, |e| e == "yaml" || e == "yml")
            {
                continue;
            }

            let content = std::fs::read_to_string(&file)?;
            match Policy::from_yaml(&content) {
                Ok(policy) => {
                    debug!("Loaded policy '{}' from {}", policy.id, file.display());
                    self.insert(policy);
                    loaded += 1;
                }
                Err(e) => {
                    warn!("Skipping unparseable policy file {}: {}", file.display(), e);
                }
            }
        }

        Ok(loaded)
    }
}

impl std::fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("policies", &self.read_guard().keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The five built-in policies installed at registry initialization. They are
/// ordinary policies and may be edited or disabled like any other.
pub fn builtin_policies() -> Vec<Policy> {
    vec![
        Policy::new("critical-vulnerabilities", "Critical Vulnerabilities")
            .with_description("Deployments with known critical vulnerabilities are blocked")
            .with_category(PolicyCategory::Vulnerability)
            .with_severity(PolicySeverity::Critical)
            .with_rule(
                Rule::threshold("no-criticals", "critical_vulnerabilities", RuleOperator::Gt, 0.0)
                    .expect("builtin rule")
                    .with_description("No critical vulnerabilities are allowed"),
            )
            .with_enforcement(EnforcementAction::Block {
                channels: vec!["email".into(), "slack".into()],
                escalation: vec!["security-lead".into()],
            }),
        Policy::new("high-vulnerability-threshold", "High Vulnerability Threshold")
            .with_description("More than 3 high-severity vulnerabilities require sign-off")
            .with_category(PolicyCategory::Vulnerability)
            .with_severity(PolicySeverity::High)
            .with_rule(
                Rule::threshold("max-highs", "high_vulnerabilities", RuleOperator::Gt, 3.0)
                    .expect("builtin rule"),
            )
            .with_enforcement(EnforcementAction::RequireApproval {
                channels: vec!["email".into()],
                escalation: vec!["security-lead".into(), "engineering-manager".into()],
            }),
        Policy::new("restricted-licenses", "Restricted Licenses")
            .with_description("Copyleft licenses are not allowed in shipped dependencies")
            .with_category(PolicyCategory::License)
            .with_severity(PolicySeverity::High)
            .with_rule(
                Rule::blocklist(
                    "copyleft",
                    "license_type",
                    ["GPL-2.0", "GPL-3.0", "AGPL-3.0", "LGPL-2.1", "LGPL-3.0", "SSPL-1.0"],
                )
                .expect("builtin rule"),
            )
            .with_enforcement(EnforcementAction::Block {
                channels: vec!["email".into()],
                escalation: vec!["legal".into()],
            }),
        Policy::new("outdated-dependencies", "Outdated Dependencies")
            .with_description("Dependencies older than 24 months should be refreshed")
            .with_category(PolicyCategory::Dependency)
            .with_severity(PolicySeverity::Medium)
            .with_rule(
                Rule::threshold("max-age", "dependency_age_months", RuleOperator::Gt, 24.0)
                    .expect("builtin rule"),
            )
            .with_enforcement(EnforcementAction::Warn {
                channels: vec!["email".into()],
            }),
        Policy::new("code-quality", "Code Quality")
            .with_description("Minimum test coverage and hotspot hygiene")
            .with_category(PolicyCategory::CodeQuality)
            .with_severity(PolicySeverity::Medium)
            .with_rule(
                Rule::threshold("min-coverage", "test_coverage_percentage", RuleOperator::Lt, 80.0)
                    .expect("builtin rule"),
            )
            .with_rule(
                Rule::threshold("max-hotspots", "security_hotspots", RuleOperator::Gt, 5.0)
                    .expect("builtin rule"),
            )
            .with_enforcement(EnforcementAction::Warn { channels: vec![] }),
    ]
}

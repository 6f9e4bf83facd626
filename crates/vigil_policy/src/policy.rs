//! Policy, enforcement and exemption definitions.
//!
//! A policy bundles an ordered list of rules with one enforcement action and
//! a list of exemptions. Policies can be defined in code or loaded from YAML
//! files by the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rule::Rule;

/// Domain a policy belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyCategory {
    Vulnerability,
    License,
    CodeQuality,
    Dependency,
    #[default]
    Compliance,
}

/// Severity attached to a policy; copied onto every violation it produces.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicySeverity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for PolicySeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PolicySeverity::Low => "LOW",
            PolicySeverity::Medium => "MEDIUM",
            PolicySeverity::High => "HIGH",
            PolicySeverity::Critical => "CRITICAL",
        };
        write!(f, "{}", s)
    }
}

/// Consequence of a policy failing, as a tagged enum with payload.
///
/// The variant itself decides blocking and approval semantics, so a policy
/// cannot be configured as "type: block" without actually blocking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnforcementAction {
    /// Deployment is blocked outright.
    Block {
        #[serde(default)]
        channels: Vec<String>,
        #[serde(default)]
        escalation: Vec<String>,
    },
    /// Violation is reported, deployment proceeds.
    Warn {
        #[serde(default)]
        channels: Vec<String>,
    },
    /// Notify only, no gate consequence beyond the check result.
    Notify {
        #[serde(default)]
        channels: Vec<String>,
    },
    /// CI build is failed; gate semantics equal Block.
    FailBuild {
        #[serde(default)]
        channels: Vec<String>,
    },
    /// Deployment pauses until a human approves or rejects.
    RequireApproval {
        #[serde(default)]
        channels: Vec<String>,
        #[serde(default)]
        escalation: Vec<String>,
    },
}

impl Default for EnforcementAction {
    fn default() -> Self {
        EnforcementAction::Warn { channels: Vec::new() }
    }
}

impl EnforcementAction {
    /// Whether a failed check under this action blocks deployment.
    pub fn blocks_deployment(&self) -> bool {
        matches!(
            self,
            EnforcementAction::Block { .. } | EnforcementAction::FailBuild { .. }
        )
    }

    /// Whether a failed check under this action requires human approval.
    pub fn requires_approval(&self) -> bool {
        matches!(self, EnforcementAction::RequireApproval { .. })
    }

    /// Channels that receive violation notifications.
    pub fn channels(&self) -> &[String] {
        match self {
            EnforcementAction::Block { channels, .. }
            | EnforcementAction::Warn { channels }
            | EnforcementAction::Notify { channels }
            | EnforcementAction::FailBuild { channels }
            | EnforcementAction::RequireApproval { channels, .. } => channels,
        }
    }

    /// Roles or contacts to escalate to, in order.
    pub fn escalation(&self) -> &[String] {
        match self {
            EnforcementAction::Block { escalation, .. }
            | EnforcementAction::RequireApproval { escalation, .. } => escalation,
            _ => &[],
        }
    }
}

/// A time-bounded, optionally repository-scoped waiver for a policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exemption {
    pub id: String,
    /// Absent = applies to every repository for this policy
    pub repository_id: Option<String>,
    pub reason: String,
    pub approved_by: String,
    /// Absent = never expires
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Exemption {
    /// Create an exemption approved now.
    pub fn new(reason: impl Into<String>, approved_by: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            repository_id: None,
            reason: reason.into(),
            approved_by: approved_by.into(),
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    /// Scope the exemption to one repository.
    pub fn for_repository(mut self, repository_id: impl Into<String>) -> Self {
        self.repository_id = Some(repository_id.into());
        self
    }

    /// Set an expiry instant.
    pub fn expiring_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Whether the exemption suppresses violations for `repository_id` at
    /// instant `at`. Expiry is checked lazily here, never pruned eagerly.
    pub fn is_active(&self, repository_id: &str, at: DateTime<Utc>) -> bool {
        let scope_matches = self
            .repository_id
            .as_deref()
            .map_or(true, |scoped| scoped == repository_id);
        let not_expired = self.expires_at.map_or(true, |expiry| expiry > at);
        scope_matches && not_expired
    }
}

/// A named, enable/disable-able bundle of rules plus one enforcement action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: PolicyCategory,
    #[serde(default)]
    pub severity: PolicySeverity,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub enforcement: EnforcementAction,
    #[serde(default)]
    pub exemptions: Vec<Exemption>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Policy {
    /// Create a new enabled policy with default severity and enforcement.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category: PolicyCategory::default(),
            severity: PolicySeverity::default(),
            enabled: true,
            rules: Vec::new(),
            enforcement: EnforcementAction::default(),
            exemptions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn with_category(mut self, category: PolicyCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_severity(mut self, severity: PolicySeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_enforcement(mut self, enforcement: EnforcementAction) -> Self {
        self.enforcement = enforcement;
        self
    }

    /// Disable the policy. It stays addressable but is skipped entirely
    /// during evaluation.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// The first exemption active for `repository_id` at instant `at`.
    pub fn active_exemption(&self, repository_id: &str, at: DateTime<Utc>) -> Option<&Exemption> {
        self.exemptions
            .iter()
            .find(|e| e.is_active(repository_id, at))
    }

    /// Parse a policy from a YAML string.
    pub fn from_yaml(yaml: &str) -> crate::error::PolicyResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Serialize the policy to YAML.
    pub fn to_yaml(&self) -> crate::error::PolicyResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Fields for creating a policy. Omitted fields get safe defaults; a missing
/// id is generated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyDraft {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: PolicyCategory,
    #[serde(default)]
    pub severity: Option<PolicySeverity>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub enforcement: Option<EnforcementAction>,
}

impl PolicyDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Materialize the draft into a policy, filling defaults.
    pub fn into_policy(self) -> Policy {
        let now = Utc::now();
        Policy {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: self.name,
            description: self.description,
            category: self.category,
            severity: self.severity.unwrap_or_default(),
            enabled: self.enabled.unwrap_or(true),
            rules: self.rules,
            enforcement: self.enforcement.unwrap_or_default(),
            exemptions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update for a policy. `None` fields are left unchanged; rules are
/// replaced as a whole when supplied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<PolicyCategory>,
    pub severity: Option<PolicySeverity>,
    pub enabled: Option<bool>,
    pub rules: Option<Vec<Rule>>,
    pub enforcement: Option<EnforcementAction>,
}

impl PolicyPatch {
    /// Apply the patch, bumping `updated_at`.
    pub fn apply(self, policy: &mut Policy) {
        if let Some(name) = self.name {
            policy.name = name;
        }
        if let Some(description) = self.description {
            policy.description = description;
        }
        if let Some(category) = self.category {
            policy.category = category;
        }
        if let Some(severity) = self.severity {
            policy.severity = severity;
        }
        if let Some(enabled) = self.enabled {
            policy.enabled = enabled;
        }
        if let Some(rules) = self.rules {
            policy.rules = rules;
        }
        if let Some(enforcement) = self.enforcement {
            policy.enforcement = enforcement;
        }
        policy.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Rule, RuleOperator};
    use chrono::Duration;

    #[test]
    fn test_enforcement_semantics() {
        let block = EnforcementAction::Block {
            channels: vec!["email".into()],
            escalation: vec!["security-lead".into()],
        };
        assert!(block.blocks_deployment());
        assert!(!block.requires_approval());
        assert_eq!(block.channels(), ["email"]);
        assert_eq!(block.escalation(), ["security-lead"]);

        let approval = EnforcementAction::RequireApproval {
            channels: vec![],
            escalation: vec![],
        };
        assert!(!approval.blocks_deployment());
        assert!(approval.requires_approval());

        let warn = EnforcementAction::default();
        assert!(!warn.blocks_deployment());
        assert!(!warn.requires_approval());
        assert!(warn.escalation().is_empty());
    }

    #[test]
    fn test_exemption_scoping() {
        let now = Utc::now();
        let global = Exemption::new("accepted risk", "alice@co");
        assert!(global.is_active("any-repo", now));

        let scoped = Exemption::new("migration window", "bob@co").for_repository("repo-1");
        assert!(scoped.is_active("repo-1", now));
        assert!(!scoped.is_active("repo-2", now));
    }

    #[test]
    fn test_exemption_expiry_is_lazy() {
        let now = Utc::now();
        let expired = Exemption::new("was temporary", "alice@co")
            .expiring_at(now - Duration::days(1));
        assert!(!expired.is_active("repo-1", now));

        let live = Exemption::new("still valid", "alice@co")
            .expiring_at(now + Duration::days(7));
        assert!(live.is_active("repo-1", now));
    }

    #[test]
    fn test_draft_defaults() {
        let policy = PolicyDraft::new("Custom Policy").into_policy();

        assert!(!policy.id.is_empty());
        assert_eq!(policy.severity, PolicySeverity::Medium);
        assert!(policy.enabled);
        assert_eq!(policy.enforcement, EnforcementAction::Warn { channels: vec![] });
        assert!(policy.exemptions.is_empty());
    }

    #[test]
    fn test_patch_is_shallow_merge() {
        let mut policy = Policy::new("p1", "Original")
            .with_severity(PolicySeverity::High)
            .with_description("original description");
        let created = policy.created_at;

        let patch = PolicyPatch {
            name: Some("Renamed".into()),
            enabled: Some(false),
            ..Default::default()
        };
        patch.apply(&mut policy);

        assert_eq!(policy.name, "Renamed");
        assert!(!policy.enabled);
        assert_eq!(policy.description, "original description");
        assert_eq!(policy.severity, PolicySeverity::High);
        assert_eq!(policy.created_at, created);
        assert!(policy.updated_at >= created);
    }

    #[test]
    fn test_policy_yaml_roundtrip() {
        let policy = Policy::new("no-criticals", "Critical Vulnerabilities")
            .with_category(PolicyCategory::Vulnerability)
            .with_severity(PolicySeverity::Critical)
            .with_rule(
                Rule::threshold("r1", "critical_vulnerabilities", RuleOperator::Gt, 0.0).unwrap(),
            )
            .with_enforcement(EnforcementAction::Block {
                channels: vec!["email".into()],
                escalation: vec![],
            });

        let yaml = policy.to_yaml().unwrap();
        let parsed = Policy::from_yaml(&yaml).unwrap();

        assert_eq!(parsed.id, policy.id);
        assert_eq!(parsed.rules.len(), 1);
        assert_eq!(parsed.enforcement, policy.enforcement);
        assert!(parsed.enforcement.blocks_deployment());
    }
}

//! # vigil_policy
//!
//! Security policy and deployment gate engine for Vigil.
//!
//! This crate provides:
//! - **Policy Registry**: named policies (built-in defaults + custom), each
//!   with rules, one enforcement action and a list of exemptions
//! - **Rule Evaluator**: pure evaluation of one rule against a repository's
//!   metrics snapshot
//! - **Deployment Gates**: per-(repository, commit) allow / block /
//!   require-approval decisions with an auditable approval workflow
//! - **Compliance Projection**: read-only per-repository standing
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vigil_core::StaticMetricsProvider;
//! use vigil_notify::NotificationDispatcher;
//! use vigil_policy::{GateEngine, GateStatus, PolicyRegistry};
//!
//! let registry = Arc::new(PolicyRegistry::with_builtins());
//! let metrics = Arc::new(StaticMetricsProvider::new());
//! let dispatcher = Arc::new(NotificationDispatcher::new());
//!
//! let engine = GateEngine::new(registry, metrics, dispatcher);
//! let gate = engine.create_deployment_gate("repo-1", "abc123").await?;
//!
//! if gate.status == GateStatus::Blocked {
//!     eprintln!("{}", gate.report());
//! }
//! ```

pub mod compliance;
pub mod engine;
pub mod error;
pub mod gate;
pub mod policy;
pub mod registry;
pub mod rule;
pub mod violation;

pub use compliance::{ComplianceStatus, ComplianceSummary, PolicyComplianceResult};
pub use engine::GateEngine;
pub use error::{PolicyError, PolicyResult};
pub use gate::{
    ApprovalDecision, AuditAction, AuditEntry, CheckStatus, DeploymentGate, GateApproval,
    GateCheck, GateStatus,
};
pub use policy::{
    EnforcementAction, Exemption, Policy, PolicyCategory, PolicyDraft, PolicyPatch, PolicySeverity,
};
pub use registry::{builtin_policies, PolicyRegistry};
pub use rule::{Rule, RuleOperator, RuleOutcome, RuleType, RuleValue};
pub use violation::{Violation, ViolationDetails, ViolationStatus, ViolationSummary};

//! Rule model and the pure rule evaluator.
//!
//! A rule is one condition over a repository's metrics snapshot: a metric
//! key, a comparison operator and an expected value. Operator/value
//! compatibility is checked when the rule is constructed so that invalid
//! configurations are rejected at creation time instead of silently skipped
//! at evaluation time.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use vigil_core::{MetricValue, MetricsSnapshot};

use crate::error::{PolicyError, PolicyResult};

/// Classification of what a rule expresses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Threshold,
    Blocklist,
    Allowlist,
    Pattern,
    Custom,
}

/// Comparison operator applied to (actual, expected).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    Gt,
    Lt,
    Eq,
    Ne,
    Contains,
    Matches,
    In,
    NotIn,
}

impl std::fmt::Display for RuleOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RuleOperator::Gt => ">",
            RuleOperator::Lt => "<",
            RuleOperator::Eq => "==",
            RuleOperator::Ne => "!=",
            RuleOperator::Contains => "contains",
            RuleOperator::Matches => "matches",
            RuleOperator::In => "in",
            RuleOperator::NotIn => "not in",
        };
        write!(f, "{}", s)
    }
}

/// Expected value of a rule, tagged by shape.
///
/// The shape must fit the operator: thresholds take numbers, membership
/// tests take sets, pattern tests take a regular expression source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RuleValue {
    Number(f64),
    Text(String),
    Set(Vec<String>),
    Pattern(String),
}

impl std::fmt::Display for RuleValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleValue::Number(n) => write!(f, "{}", n),
            RuleValue::Text(s) => write!(f, "{}", s),
            RuleValue::Set(items) => write!(f, "{}", items.join(",")),
            RuleValue::Pattern(p) => write!(f, "/{}/", p),
        }
    }
}

/// A single policy rule. Immutable once created; a policy update replaces
/// its rules wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub rule_type: RuleType,
    /// Metric key looked up in the snapshot (e.g. `critical_vulnerabilities`)
    pub condition: String,
    pub operator: RuleOperator,
    pub value: RuleValue,
    #[serde(default)]
    pub description: String,
}

/// Result of evaluating one rule against a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    /// The snapshot has no value for the rule's condition key, or the value's
    /// type does not fit the operator. The rule contributes nothing.
    NotApplicable,
    /// The rule was evaluated against the observed value.
    Evaluated { actual: MetricValue, violated: bool },
}

impl RuleOutcome {
    /// Whether this outcome is a violation.
    pub fn violated(&self) -> bool {
        matches!(self, RuleOutcome::Evaluated { violated: true, .. })
    }
}

impl Rule {
    /// Create a rule, validating that the value shape fits the operator.
    pub fn new(
        id: impl Into<String>,
        rule_type: RuleType,
        condition: impl Into<String>,
        operator: RuleOperator,
        value: RuleValue,
    ) -> PolicyResult<Self> {
        let id = id.into();

        match (operator, &value) {
            (RuleOperator::Gt | RuleOperator::Lt, RuleValue::Number(_)) => {}
            (RuleOperator::Gt | RuleOperator::Lt, other) => {
                return Err(PolicyError::invalid_rule(
                    &id,
                    format!("operator {} requires a numeric value, got {}", operator, other),
                ));
            }
            (RuleOperator::In | RuleOperator::NotIn, RuleValue::Set(_)) => {}
            (RuleOperator::In | RuleOperator::NotIn, other) => {
                return Err(PolicyError::invalid_rule(
                    &id,
                    format!("operator {} requires a set value, got {}", operator, other),
                ));
            }
            (RuleOperator::Matches, RuleValue::Pattern(pattern)) => {
                Regex::new(pattern).map_err(|e| {
                    PolicyError::invalid_rule(&id, format!("invalid pattern: {}", e))
                })?;
            }
            (RuleOperator::Matches, other) => {
                return Err(PolicyError::invalid_rule(
                    &id,
                    format!("operator matches requires a pattern value, got {}", other),
                ));
            }
            (RuleOperator::Contains, RuleValue::Text(_)) => {}
            (RuleOperator::Contains, other) => {
                return Err(PolicyError::invalid_rule(
                    &id,
                    format!("operator contains requires a text value, got {}", other),
                ));
            }
            (RuleOperator::Eq | RuleOperator::Ne, RuleValue::Number(_) | RuleValue::Text(_)) => {}
            (RuleOperator::Eq | RuleOperator::Ne, other) => {
                return Err(PolicyError::invalid_rule(
                    &id,
                    format!("operator {} requires a scalar value, got {}", operator, other),
                ));
            }
        }

        Ok(Self {
            id,
            rule_type,
            condition: condition.into(),
            operator,
            value,
            description: String::new(),
        })
    }

    /// Threshold rule: `condition <op> n`.
    pub fn threshold(
        id: impl Into<String>,
        condition: impl Into<String>,
        operator: RuleOperator,
        value: f64,
    ) -> PolicyResult<Self> {
        Self::new(id, RuleType::Threshold, condition, operator, RuleValue::Number(value))
    }

    /// Blocklist rule: violated when the observed value is in the set.
    pub fn blocklist<I, S>(id: impl Into<String>, condition: impl Into<String>, items: I) -> PolicyResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = items.into_iter().map(Into::into).collect();
        Self::new(id, RuleType::Blocklist, condition, RuleOperator::In, RuleValue::Set(set))
    }

    /// Allowlist rule: violated when the observed value is outside the set.
    pub fn allowlist<I, S>(id: impl Into<String>, condition: impl Into<String>, items: I) -> PolicyResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = items.into_iter().map(Into::into).collect();
        Self::new(id, RuleType::Allowlist, condition, RuleOperator::NotIn, RuleValue::Set(set))
    }

    /// Pattern rule: violated when the observed value matches the regex.
    pub fn pattern(
        id: impl Into<String>,
        condition: impl Into<String>,
        pattern: impl Into<String>,
    ) -> PolicyResult<Self> {
        Self::new(
            id,
            RuleType::Pattern,
            condition,
            RuleOperator::Matches,
            RuleValue::Pattern(pattern.into()),
        )
    }

    /// Set the description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Evaluate the rule against a metrics snapshot.
    ///
    /// Pure with respect to its inputs. Never fails: an unknown condition
    /// key, a type mismatch or a malformed pattern (possible when rules were
    /// deserialized rather than constructed) yields `NotApplicable` with a
    /// configuration warning in the log.
    pub fn evaluate(&self, snapshot: &MetricsSnapshot) -> RuleOutcome {
        let Some(actual) = snapshot.get(&self.condition) else {
            warn!(
                rule = %self.id,
                condition = %self.condition,
                "Rule condition key not present in snapshot, skipping rule"
            );
            return RuleOutcome::NotApplicable;
        };

        let violated = match (&self.operator, &self.value) {
            (RuleOperator::Gt, RuleValue::Number(expected)) => match actual.as_number() {
                Some(n) => n > *expected,
                None => return self.not_applicable("non-numeric value for numeric comparison"),
            },
            (RuleOperator::Lt, RuleValue::Number(expected)) => match actual.as_number() {
                Some(n) => n < *expected,
                None => return self.not_applicable("non-numeric value for numeric comparison"),
            },
            (RuleOperator::Eq, expected) => Self::scalar_eq(actual, expected),
            (RuleOperator::Ne, expected) => !Self::scalar_eq(actual, expected),
            (RuleOperator::In, RuleValue::Set(set)) => {
                actual.string_forms().iter().any(|form| set.contains(form))
            }
            (RuleOperator::NotIn, RuleValue::Set(set)) => {
                actual.string_forms().iter().any(|form| !set.contains(form))
            }
            (RuleOperator::Contains, RuleValue::Text(needle)) => {
                actual.string_forms().iter().any(|form| form.contains(needle.as_str()))
            }
            (RuleOperator::Matches, RuleValue::Pattern(pattern)) => match Regex::new(pattern) {
                Ok(re) => actual.string_forms().iter().any(|form| re.is_match(form)),
                Err(e) => return self.not_applicable(&format!("invalid pattern: {}", e)),
            },
            // Shape mismatches survive only through hand-edited config files.
            _ => return self.not_applicable("operator/value shape mismatch"),
        };

        RuleOutcome::Evaluated {
            actual: actual.clone(),
            violated,
        }
    }

    fn scalar_eq(actual: &MetricValue, expected: &RuleValue) -> bool {
        match (actual.as_number(), expected) {
            (Some(n), RuleValue::Number(e)) => n == *e,
            _ => actual.coerce_string() == expected.to_string(),
        }
    }

    fn not_applicable(&self, reason: &str) -> RuleOutcome {
        warn!(
            rule = %self.id,
            condition = %self.condition,
            "Rule not applicable: {}",
            reason
        );
        RuleOutcome::NotApplicable
    }
}

//! Repository metrics snapshot model.
//!
//! A snapshot is the read-only input to every policy evaluation: a mapping
//! from metric key (e.g. `critical_vulnerabilities`, `license_type`) to the
//! value observed at evaluation time. Snapshots are produced by an external
//! provider; the engine never computes metrics itself.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A single metric value.
///
/// Rule operators decide how a value is interpreted: numeric comparison for
/// thresholds, string coercion for membership and pattern tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Flag(bool),
    Text(String),
    List(Vec<String>),
}

impl MetricValue {
    /// Numeric view of the value, if it has one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Flag(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// String coercion used by membership, substring and pattern operators.
    ///
    /// Lists coerce to each element separately (see [`Self::string_forms`]); this
    /// method joins them for display and single-value comparison.
    pub fn coerce_string(&self) -> String {
        match self {
            MetricValue::Number(n) => {
                if n.fract() == 0.0 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            MetricValue::Flag(b) => b.to_string(),
            MetricValue::Text(s) => s.clone(),
            MetricValue::List(items) => items.join(","),
        }
    }

    /// The individual string forms a value takes for membership tests.
    ///
    /// A list metric (e.g. all license identifiers found in a repository)
    /// matches if any of its elements does.
    pub fn string_forms(&self) -> Vec<String> {
        match self {
            MetricValue::List(items) => items.clone(),
            other => vec![other.coerce_string()],
        }
    }
}

impl From<f64> for MetricValue {
    fn from(n: f64) -> Self {
        MetricValue::Number(n)
    }
}

impl From<i64> for MetricValue {
    fn from(n: i64) -> Self {
        MetricValue::Number(n as f64)
    }
}

impl From<bool> for MetricValue {
    fn from(b: bool) -> Self {
        MetricValue::Flag(b)
    }
}

impl From<&str> for MetricValue {
    fn from(s: &str) -> Self {
        MetricValue::Text(s.to_string())
    }
}

impl From<Vec<String>> for MetricValue {
    fn from(items: Vec<String>) -> Self {
        MetricValue::List(items)
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.coerce_string())
    }
}

/// Point-in-time security metrics for one repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Repository the metrics belong to
    pub repository_id: String,
    /// Trailing window the counts were aggregated over
    pub window_days: u32,
    /// When the snapshot was captured
    pub captured_at: DateTime<Utc>,
    /// Metric key -> observed value
    pub metrics: BTreeMap<String, MetricValue>,
}

impl MetricsSnapshot {
    /// Create an empty snapshot captured now.
    pub fn new(repository_id: impl Into<String>, window_days: u32) -> Self {
        Self {
            repository_id: repository_id.into(),
            window_days,
            captured_at: Utc::now(),
            metrics: BTreeMap::new(),
        }
    }

    /// Add a metric.
    pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }

    /// Look up a metric by key.
    pub fn get(&self, key: &str) -> Option<&MetricValue> {
        self.metrics.get(key)
    }

    /// Load a snapshot from a JSON file.
    pub fn from_json_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Source of metrics snapshots.
///
/// Implementations wrap whatever produced the repository's current security
/// posture (scan pipeline, warehouse query). A failure here must surface as
/// [`CoreError::MetricsUnavailable`] so callers fail safe instead of
/// evaluating against phantom zeroes.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Fetch the current snapshot for a repository over a trailing window.
    async fn snapshot(&self, repository_id: &str, window_days: u32) -> CoreResult<MetricsSnapshot>;
}

/// In-memory provider keyed by repository id.
///
/// Used by the CLI (snapshots loaded from JSON files) and by tests.
#[derive(Default)]
pub struct StaticMetricsProvider {
    snapshots: RwLock<BTreeMap<String, MetricsSnapshot>>,
}

impl StaticMetricsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a snapshot for its repository.
    pub fn insert(&self, snapshot: MetricsSnapshot) {
        self.snapshots
            .write()
            .expect("snapshot lock poisoned")
            .insert(snapshot.repository_id.clone(), snapshot);
    }
}

#[async_trait]
impl MetricsProvider for StaticMetricsProvider {
    async fn snapshot(&self, repository_id: &str, _window_days: u32) -> CoreResult<MetricsSnapshot> {
        self.snapshots
            .read()
            .expect("snapshot lock poisoned")
            .get(repository_id)
            .cloned()
            .ok_or_else(|| {
                CoreError::metrics_unavailable(repository_id, "no snapshot registered")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(MetricValue::Number(3.0).as_number(), Some(3.0));
        assert_eq!(MetricValue::Flag(true).as_number(), Some(1.0));
        assert_eq!(MetricValue::Text("MIT".into()).as_number(), None);
    }

    #[test]
    fn test_string_coercion() {
        assert_eq!(MetricValue::Number(3.0).coerce_string(), "3");
        assert_eq!(MetricValue::Number(2.5).coerce_string(), "2.5");
        assert_eq!(
            MetricValue::List(vec!["MIT".into(), "GPL-3.0".into()]).coerce_string(),
            "MIT,GPL-3.0"
        );
    }

    #[test]
    fn test_string_forms_for_list() {
        let value = MetricValue::List(vec!["MIT".into(), "Apache-2.0".into()]);
        assert_eq!(value.string_forms(), vec!["MIT", "Apache-2.0"]);

        let single = MetricValue::Text("MIT".into());
        assert_eq!(single.string_forms(), vec!["MIT"]);
    }

    #[test]
    fn test_snapshot_lookup() {
        let snapshot = MetricsSnapshot::new("repo-1", 30)
            .with_metric("critical_vulnerabilities", 2)
            .with_metric("license_type", vec!["MIT".to_string()]);

        assert_eq!(
            snapshot.get("critical_vulnerabilities"),
            Some(&MetricValue::Number(2.0))
        );
        assert!(snapshot.get("nonexistent_metric").is_none());
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticMetricsProvider::new();
        provider.insert(MetricsSnapshot::new("repo-1", 30).with_metric("security_hotspots", 7));

        let snapshot = provider.snapshot("repo-1", 30).await.unwrap();
        assert_eq!(snapshot.repository_id, "repo-1");

        let missing = provider.snapshot("repo-2", 30).await;
        assert!(matches!(
            missing,
            Err(CoreError::MetricsUnavailable { .. })
        ));
    }

    #[test]
    fn test_snapshot_json_roundtrip() {
        let snapshot = MetricsSnapshot::new("repo-1", 30)
            .with_metric("high_vulnerabilities", 5)
            .with_metric("license_type", vec!["MIT".to_string(), "GPL-3.0".to_string()]);

        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: MetricsSnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.repository_id, snapshot.repository_id);
        assert_eq!(parsed.get("high_vulnerabilities"), Some(&MetricValue::Number(5.0)));
    }

    #[test]
    fn test_snapshot_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(
            &path,
            r#"{
                "repository_id": "repo-1",
                "window_days": 30,
                "captured_at": "2026-01-01T00:00:00Z",
                "metrics": {
                    "critical_vulnerabilities": 1,
                    "license_type": ["MIT"]
                }
            }"#,
        )
        .unwrap();

        let snapshot = MetricsSnapshot::from_json_file(&path).unwrap();
        assert_eq!(snapshot.get("critical_vulnerabilities"), Some(&MetricValue::Number(1.0)));
    }
}

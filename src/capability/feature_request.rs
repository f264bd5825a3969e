//! IF-031: Log of requests for capabilities that do not exist yet.
//!
//! Repeats of the same feature bump `count` and `last_requested` instead of
//! adding a record. With a path configured the log is rewritten atomically
//! as YAML after every change.

use crate::core::state;
use crate::error::StateError;
use crate::tripwire::eventlog;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// One unsupported feature and how often it was asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRequestRecord {
    pub feature: String,
    pub requester: String,
    pub first_requested: String,
    pub last_requested: String,
    #[serde(default)]
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempted_pattern: Option<String>,
    pub count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LogFile {
    #[serde(default)]
    requests: Vec<FeatureRequestRecord>,
}

/// Feature name → record, optionally backed by a YAML file.
#[derive(Debug, Clone, Default)]
pub struct FeatureRequestLog {
    path: Option<PathBuf>,
    records: IndexMap<String, FeatureRequestRecord>,
}

fn normalize(feature: &str) -> String {
    feature.trim().to_ascii_lowercase()
}

impl FeatureRequestLog {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the log at `path`, loading existing records if the file exists.
    pub fn open(path: &Path) -> Result<Self, StateError> {
        let mut log = Self {
            path: Some(path.to_path_buf()),
            records: IndexMap::new(),
        };
        if !path.exists() {
            return Ok(log);
        }
        let content = std::fs::read_to_string(path).map_err(|source| StateError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(log);
        }
        let file: LogFile = serde_yaml_ng::from_str(&content).map_err(|e| StateError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        for record in file.requests {
            log.records.insert(normalize(&record.feature), record);
        }
        Ok(log)
    }

    /// Record one request for `feature`.
    pub fn record(
        &mut self,
        feature: &str,
        requester: &str,
        context: &str,
        attempted_pattern: Option<&str>,
    ) -> Result<&FeatureRequestRecord, StateError> {
        let key = normalize(feature);
        let now = eventlog::now_iso8601();
        let record = self
            .records
            .entry(key.clone())
            .and_modify(|r| {
                r.count += 1;
                r.last_requested = now.clone();
                if !context.trim().is_empty() {
                    r.context = context.to_string();
                }
                if let Some(p) = attempted_pattern {
                    r.attempted_pattern = Some(p.to_string());
                }
            })
            .or_insert_with(|| FeatureRequestRecord {
                feature: key.clone(),
                requester: requester.to_string(),
                first_requested: now.clone(),
                last_requested: now.clone(),
                context: context.to_string(),
                attempted_pattern: attempted_pattern.map(String::from),
                count: 1,
            });
        info!(feature = %record.feature, count = record.count, "feature request recorded");

        self.save()?;
        self.records
            .get(&key)
            .ok_or_else(|| StateError::Serialize(format!("record '{}' vanished", key)))
    }

    fn save(&self) -> Result<(), StateError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = LogFile {
            requests: self.records.values().cloned().collect(),
        };
        let yaml =
            serde_yaml_ng::to_string(&file).map_err(|e| StateError::Serialize(e.to_string()))?;
        state::write_atomic(path, &yaml)
    }

    pub fn get(&self, feature: &str) -> Option<&FeatureRequestRecord> {
        self.records.get(&normalize(feature))
    }

    pub fn records(&self) -> impl Iterator<Item = &FeatureRequestRecord> {
        self.records.values()
    }

    /// Records ordered by request count, most requested first.
    pub fn most_requested(&self) -> Vec<&FeatureRequestRecord> {
        let mut out: Vec<_> = self.records.values().collect();
        out.sort_by(|a, b| b.count.cmp(&a.count));
        out
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_if031_repeat_increments() {
        let mut log = FeatureRequestLog::in_memory();
        log.record("provision_k8s", "alice", "need AKS", None).unwrap();
        let r = log
            .record("Provision_K8s ", "bob", "", Some("kubernetes cluster"))
            .unwrap();
        assert_eq!(r.count, 2);
        assert_eq!(r.requester, "alice");
        assert_eq!(r.context, "need AKS");
        assert_eq!(r.attempted_pattern.as_deref(), Some("kubernetes cluster"));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_if031_most_requested() {
        let mut log = FeatureRequestLog::in_memory();
        log.record("a", "x", "", None).unwrap();
        log.record("b", "x", "", None).unwrap();
        log.record("b", "x", "", None).unwrap();
        let order: Vec<_> = log.most_requested().iter().map(|r| r.feature.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn test_if031_persisted_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feature_requests.yaml");
        {
            let mut log = FeatureRequestLog::open(&path).unwrap();
            assert!(log.is_empty());
            log.record("provision_openai", "carol", "chatbot", None).unwrap();
            log.record("provision_openai", "carol", "chatbot", None).unwrap();
        }
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("provision_openai"));
        let log = FeatureRequestLog::open(&path).unwrap();
        assert_eq!(log.get("provision_openai").unwrap().count, 2);
        assert_eq!(log.path(), Some(path.as_path()));
    }

    #[test]
    fn test_if031_open_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feature_requests.yaml");
        std::fs::write(&path, "requests: [unclosed").unwrap();
        assert!(matches!(
            FeatureRequestLog::open(&path),
            Err(StateError::Parse { .. })
        ));
    }
}

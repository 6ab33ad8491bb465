use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tally_core::{CandidateSet, CandidateSetError, PercentageBasis};
use tally_store::{DocumentKey, FieldLayout, LayoutError, RetryPolicy, WriteStrategy};
use thiserror::Error;

const DEFAULT_DOCUMENT: &str = "results";
const DEFAULT_CANDIDATES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSettings {
    /// opaque display key, resolved by the presentation layer
    pub key: String,
    /// field of the tally document holding the counter, `count_<index>`
    /// when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub document: DocumentKey,
    pub candidates: Vec<CandidateSettings>,
    pub basis: PercentageBasis,
    pub write_strategy: WriteStrategy,
    pub retry: RetryPolicy,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read the settings")]
    Io(#[from] std::io::Error),

    #[error("malformed settings")]
    Parse(#[from] serde_yaml::Error),
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            document: DocumentKey::new(DEFAULT_DOCUMENT),
            candidates: (1..=DEFAULT_CANDIDATES)
                .map(|i| CandidateSettings {
                    key: format!("candidate-{}", i),
                    field: None,
                })
                .collect(),
            basis: PercentageBasis::default(),
            write_strategy: WriteStrategy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Settings {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SettingsError> {
        Ok(serde_yaml::from_reader(reader)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        Self::from_reader(File::open(path)?)
    }

    pub fn candidate_set(&self) -> Result<CandidateSet, CandidateSetError> {
        CandidateSet::new(self.candidates.iter().map(|c| c.key.clone()))
    }

    pub fn field_layout(&self) -> Result<FieldLayout, LayoutError> {
        FieldLayout::new(self.candidates.iter().enumerate().map(|(i, c)| {
            c.field
                .clone()
                .unwrap_or_else(|| FieldLayout::default_field(i))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    pub fn empty_document_gives_defaults() {
        let settings = Settings::from_reader("{}".as_bytes()).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.candidate_set().unwrap().len(), 3);
    }

    #[test]
    pub fn reads_a_full_document() {
        let yaml = r#"
document: votes/results
basis: share-of-leader
write_strategy: atomic-increment
candidates:
  - key: first
    field: c1
  - key: second
  - key: third
    field: c3
retry:
  max_attempts: 5
  initial_backoff_ms: 2
  max_backoff_ms: 20
"#;
        let settings = Settings::from_reader(yaml.as_bytes()).unwrap();

        assert_eq!(settings.document, DocumentKey::new("votes/results"));
        assert_eq!(settings.basis, PercentageBasis::ShareOfLeader);
        assert_eq!(settings.write_strategy, WriteStrategy::AtomicIncrement);
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.max_backoff, Duration::from_millis(20));

        let layout = settings.field_layout().unwrap();
        let fields: Vec<_> = (0..3u8)
            .map(|i| layout.field(tally_core::CandidateIndex::new(i)).unwrap().to_owned())
            .collect();
        assert_eq!(fields, vec!["c1", "count_1", "c3"]);
    }

    #[test]
    pub fn unknown_basis_is_malformed() {
        let result = Settings::from_reader("basis: share-of-nothing".as_bytes());
        assert!(matches!(result, Err(SettingsError::Parse(_))));
    }

    #[test]
    pub fn loads_from_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.yaml");
        std::fs::write(&path, "candidates: [{ key: a }, { key: b }]\n").unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.candidates.len(), 2);
        assert!(matches!(
            Settings::load(dir.path().join("missing.yaml")),
            Err(SettingsError::Io(_))
        ));
    }
}

//! On-disk artifact store: a matched (classifier, vectorizer) pair.
//!
//! Writers go through `save_pair`, which writes each file to a temporary
//! sibling and renames it into place, vectorizer first. Readers go through
//! `load_pair`, which refuses pairs produced by different training runs.

use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::classifier::LogisticRegression;
use crate::errors::ArtifactError;
use crate::model::LabelSet;
use crate::tfidf::TfidfVectorizer;

pub const CLASSIFIER_FILE: &str = "classifier.json";
pub const VECTORIZER_FILE: &str = "vectorizer.json";

#[derive(Debug, Clone)]
pub struct ArtifactPair {
    pub classifier: LogisticRegression,
    pub vectorizer: TfidfVectorizer,
}

impl ArtifactPair {
    pub fn fit_id(&self) -> &str {
        &self.classifier.fit_id
    }

    /// Matched-pair and label-set checks.
    pub fn validate(&self, labels: &LabelSet) -> Result<(), ArtifactError> {
        if self.classifier.fit_id != self.vectorizer.fit_id {
            return Err(ArtifactError::FitMismatch {
                vectorizer: self.vectorizer.fit_id.clone(),
                classifier: self.classifier.fit_id.clone(),
            });
        }
        let expected = self.vectorizer.n_features();
        if let Some((_, column)) = self.vectorizer.out_of_range_term() {
            return Err(ArtifactError::InvalidDimension {
                expected,
                actual: column + 1,
            });
        }
        if self.classifier.n_features != expected {
            return Err(ArtifactError::InvalidDimension {
                expected,
                actual: self.classifier.n_features,
            });
        }
        if self.classifier.weights.len() != self.classifier.classes.len()
            || self.classifier.intercepts.len() != self.classifier.classes.len()
        {
            return Err(ArtifactError::InvalidDimension {
                expected: self.classifier.classes.len(),
                actual: self.classifier.weights.len(),
            });
        }
        if let Some(row) = self.classifier.weights.iter().find(|w| w.len() != expected) {
            return Err(ArtifactError::InvalidDimension {
                expected,
                actual: row.len(),
            });
        }
        if let Some(unknown) = self.classifier.classes.iter().find(|c| !labels.contains(c)) {
            return Err(ArtifactError::UnknownLabel(unknown.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn classifier_path(&self) -> PathBuf {
        self.dir.join(CLASSIFIER_FILE)
    }

    pub fn vectorizer_path(&self) -> PathBuf {
        self.dir.join(VECTORIZER_FILE)
    }

    /// Later of the two artifact modification times, or `None` while either
    /// file is missing.
    pub fn modified(&self) -> Option<SystemTime> {
        let classifier = std::fs::metadata(self.classifier_path()).and_then(|m| m.modified());
        let vectorizer = std::fs::metadata(self.vectorizer_path()).and_then(|m| m.modified());
        match (classifier, vectorizer) {
            (Ok(c), Ok(v)) => Some(c.max(v)),
            _ => None,
        }
    }

    pub fn load_pair(&self, labels: &LabelSet) -> Result<ArtifactPair, ArtifactError> {
        let vectorizer: TfidfVectorizer = read_json(&self.vectorizer_path())?;
        let classifier: LogisticRegression = read_json(&self.classifier_path())?;
        let pair = ArtifactPair { classifier, vectorizer };
        pair.validate(labels)?;
        Ok(pair)
    }

    pub fn save_pair(&self, pair: &ArtifactPair) -> Result<(), ArtifactError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| ArtifactError::Io {
            path: self.dir.display().to_string(),
            source,
        })?;
        write_json_atomic(&self.vectorizer_path(), &pair.vectorizer)?;
        write_json_atomic(&self.classifier_path(), &pair.classifier)?;
        tracing::info!(
            dir = %self.dir.display(),
            fit_id = %pair.fit_id(),
            "Artifact pair written"
        );
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let data = std::fs::read(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ArtifactError::NotFound(path.display().to_string())
        } else {
            ArtifactError::Io {
                path: path.display().to_string(),
                source,
            }
        }
    })?;
    serde_json::from_slice(&data).map_err(|source| ArtifactError::Serialization {
        path: path.display().to_string(),
        source,
    })
}

/// Write to `<path>.tmp` then rename over `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let data = serde_json::to_vec(value).map_err(|source| ArtifactError::Serialization {
        path: path.display().to_string(),
        source,
    })?;
    let tmp = tmp_path(path);
    let io_err = |source| ArtifactError::Io {
        path: path.display().to_string(),
        source,
    };
    std::fs::write(&tmp, &data).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

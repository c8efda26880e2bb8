use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};

use crate::artifacts::ArtifactPair;
use crate::errors::ClassifierError;
use crate::text::clean_text;

/// Immutable snapshot of one loaded artifact pair.
#[derive(Debug)]
pub struct ServingModel {
    pair: ArtifactPair,
    pub loaded_at: DateTime<Utc>,
}

impl ServingModel {
    pub fn new(pair: ArtifactPair) -> Self {
        Self {
            pair,
            loaded_at: Utc::now(),
        }
    }

    pub fn fit_id(&self) -> &str {
        self.pair.fit_id()
    }

    pub fn pair(&self) -> &ArtifactPair {
        &self.pair
    }

    pub fn classes(&self) -> &[String] {
        &self.pair.classifier.classes
    }

    /// Normalize, vectorize and classify one ticket.
    pub fn predict(&self, text: &str) -> Result<String, ClassifierError> {
        let cleaned = clean_text(text);
        let row = self.pair.vectorizer.transform(&cleaned);
        let index = self.pair.classifier.predict(&row).ok_or_else(|| {
            ClassifierError::InferenceError("classifier produced no class".to_string())
        })?;
        self.pair
            .classifier
            .classes
            .get(index)
            .cloned()
            .ok_or_else(|| ClassifierError::InferenceError(format!("class index {index} out of range")))
    }
}

/// Shared, swappable reference to the current `ServingModel`.
///
/// Readers clone the inner `Arc` and release the lock immediately; the
/// watcher replaces the whole `Arc` in one store. The lock is never held
/// while loading or predicting.
#[derive(Clone, Default)]
pub struct ModelHandle {
    inner: Arc<RwLock<Option<Arc<ServingModel>>>>,
}

impl ModelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<ServingModel>> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn swap(&self, model: ServingModel) -> Option<Arc<ServingModel>> {
        let next = Some(Arc::new(model));
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }

    pub fn predict(&self, text: &str) -> Result<String, ClassifierError> {
        let model = self.current().ok_or(ClassifierError::ModelUnavailable)?;
        model.predict(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::tests::sample_pair;

    #[test]
    fn test_empty_handle_is_unavailable() {
        let handle = ModelHandle::new();
        assert!(matches!(handle.predict("vpn"), Err(ClassifierError::ModelUnavailable)));
    }

    #[test]
    fn test_predict_maps_to_persisted_classes() {
        let handle = ModelHandle::new();
        handle.swap(ServingModel::new(sample_pair("fit-a")));

        assert_eq!(handle.predict("Need access to VPN").unwrap(), "Access");
        assert_eq!(handle.predict("my printer is BROKEN").unwrap(), "Hardware");
    }

    #[test]
    fn test_swap_returns_previous_and_keeps_old_readers_valid() {
        let handle = ModelHandle::new();
        assert!(handle.swap(ServingModel::new(sample_pair("fit-a"))).is_none());

        let held = handle.current().unwrap();
        let previous = handle.swap(ServingModel::new(sample_pair("fit-b"))).unwrap();

        assert_eq!(previous.fit_id(), "fit-a");
        assert_eq!(held.fit_id(), "fit-a");
        assert_eq!(handle.current().unwrap().fit_id(), "fit-b");
    }
}

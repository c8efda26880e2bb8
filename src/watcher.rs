use std::time::{Duration, SystemTime};

use crate::artifacts::ArtifactStore;
use crate::model::LabelSet;
use crate::serving::{ModelHandle, ServingModel};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Artifact files are absent.
    Missing,
    Unchanged,
    Reloaded { fit_id: String },
    /// Load failed; the previous pair stays in service.
    ReloadFailed,
}

/// Polls the artifact store and hot-swaps the serving pair on change.
///
/// The only writer of the `ModelHandle` it holds.
pub struct ModelWatcher {
    store: ArtifactStore,
    labels: LabelSet,
    handle: ModelHandle,
    last_modified: Option<SystemTime>,
}

impl ModelWatcher {
    pub fn new(store: ArtifactStore, labels: LabelSet, handle: ModelHandle) -> Self {
        Self {
            store,
            labels,
            handle,
            last_modified: None,
        }
    }

    pub fn last_modified(&self) -> Option<SystemTime> {
        self.last_modified
    }

    pub async fn tick(&mut self) -> WatchOutcome {
        let Some(modified) = self.store.modified() else {
            if self.last_modified.is_some() {
                tracing::warn!(dir = %self.store.dir().display(), "Artifacts disappeared, keeping current model");
            }
            return WatchOutcome::Missing;
        };
        if self.last_modified == Some(modified) {
            return WatchOutcome::Unchanged;
        }

        let _measurement = crate::measure_operation!("watcher.reload");
        tracing::info!(
            event = "watcher_transition",
            state = "reloading",
            dir = %self.store.dir().display(),
            "Artifact change detected"
        );

        let store = self.store.clone();
        let labels = self.labels.clone();
        let loaded = tokio::task::spawn_blocking(move || store.load_pair(&labels)).await;

        match loaded {
            Ok(Ok(pair)) => {
                let fit_id = pair.fit_id().to_string();
                let previous = self.handle.swap(ServingModel::new(pair));
                self.last_modified = Some(modified);
                tracing::info!(
                    event = "watcher_transition",
                    state = "loaded",
                    fit_id = %fit_id,
                    previous_fit_id = previous.as_ref().map(|m| m.fit_id()).unwrap_or("none"),
                    "Model reloaded"
                );
                WatchOutcome::Reloaded { fit_id }
            }
            Ok(Err(e)) => {
                tracing::error!(
                    event = "watcher_transition",
                    state = "reload_failed",
                    error = %e,
                    "Failed to load artifacts, keeping previous model"
                );
                WatchOutcome::ReloadFailed
            }
            Err(e) => {
                tracing::error!(
                    event = "watcher_transition",
                    state = "reload_failed",
                    error = %e,
                    "Artifact load task panicked, keeping previous model"
                );
                WatchOutcome::ReloadFailed
            }
        }
    }

    /// Tick forever on `interval`.
    pub async fn run(mut self, interval: Duration) {
        tracing::info!(interval_s = interval.as_secs(), "Model watcher started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::tests::sample_pair;
    use crate::artifacts::write_json_atomic;

    fn bump_mtime(path: &std::path::Path, secs: u64) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(secs)).unwrap();
    }

    #[tokio::test]
    async fn test_initial_load_then_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let handle = ModelHandle::new();
        let mut watcher = ModelWatcher::new(store.clone(), LabelSet::default(), handle.clone());

        assert_eq!(watcher.tick().await, WatchOutcome::Missing);
        assert!(handle.current().is_none());

        store.save_pair(&sample_pair("fit-a")).unwrap();
        assert_eq!(
            watcher.tick().await,
            WatchOutcome::Reloaded { fit_id: "fit-a".into() }
        );
        assert_eq!(watcher.tick().await, WatchOutcome::Unchanged);
        assert_eq!(handle.current().unwrap().fit_id(), "fit-a");
    }

    #[tokio::test]
    async fn test_reload_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let handle = ModelHandle::new();
        let mut watcher = ModelWatcher::new(store.clone(), LabelSet::default(), handle.clone());

        store.save_pair(&sample_pair("fit-a")).unwrap();
        watcher.tick().await;

        store.save_pair(&sample_pair("fit-b")).unwrap();
        bump_mtime(&store.classifier_path(), 5);
        assert_eq!(
            watcher.tick().await,
            WatchOutcome::Reloaded { fit_id: "fit-b".into() }
        );
        assert_eq!(handle.current().unwrap().fit_id(), "fit-b");
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_and_retries() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let handle = ModelHandle::new();
        let mut watcher = ModelWatcher::new(store.clone(), LabelSet::default(), handle.clone());

        store.save_pair(&sample_pair("fit-a")).unwrap();
        watcher.tick().await;
        let held = watcher.last_modified();

        // Half-finished swap: new vectorizer next to the old classifier.
        let newer = sample_pair("fit-b");
        write_json_atomic(&store.vectorizer_path(), &newer.vectorizer).unwrap();
        bump_mtime(&store.vectorizer_path(), 5);

        assert_eq!(watcher.tick().await, WatchOutcome::ReloadFailed);
        assert_eq!(handle.current().unwrap().fit_id(), "fit-a");
        assert_eq!(watcher.last_modified(), held);

        // The classifier lands; the next tick picks up the completed pair.
        write_json_atomic(&store.classifier_path(), &newer.classifier).unwrap();
        bump_mtime(&store.classifier_path(), 10);
        assert_eq!(
            watcher.tick().await,
            WatchOutcome::Reloaded { fit_id: "fit-b".into() }
        );
    }

    #[tokio::test]
    async fn test_concurrent_readers_see_matched_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let handle = ModelHandle::new();
        let mut watcher = ModelWatcher::new(store.clone(), LabelSet::default(), handle.clone());
        store.save_pair(&sample_pair("fit-0")).unwrap();
        watcher.tick().await;

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move {
                    for _ in 0..200 {
                        let model = handle.current().unwrap();
                        let pair = model.pair();
                        assert_eq!(pair.vectorizer.fit_id, pair.classifier.fit_id);
                        assert!(model.predict("vpn access").is_ok());
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        for round in 1..=5u64 {
            store.save_pair(&sample_pair(&format!("fit-{round}"))).unwrap();
            bump_mtime(&store.classifier_path(), round * 10);
            watcher.tick().await;
        }

        for result in futures::future::join_all(readers).await {
            result.unwrap();
        }
        assert_eq!(handle.current().unwrap().fit_id(), "fit-5");
    }
}

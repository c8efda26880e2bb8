use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tower::ServiceExt;

use ticket_classifier::api::{router, AppState, PredictBackend};
use ticket_classifier::artifacts::ArtifactStore;
use ticket_classifier::dataset::Dataset;
use ticket_classifier::feedback::FeedbackLog;
use ticket_classifier::retrain::{RetrainOutcome, RetrainTrigger, TrainingOutcome};
use ticket_classifier::serving::ModelHandle;
use ticket_classifier::trainer::{train_artifacts, Trainer, TrainingOptions, TrainingRun};
use ticket_classifier::watcher::{ModelWatcher, WatchOutcome};
use ticket_classifier::LabelSet;

/// Trains in-process and pushes the artifact mtime forward so the watcher
/// sees the change regardless of filesystem timestamp granularity.
struct InProcessTrainer {
    store: ArtifactStore,
}

impl Trainer for InProcessTrainer {
    async fn train(&self, dataset: &Path) -> anyhow::Result<TrainingRun> {
        let start = Instant::now();
        let result = train_artifacts(dataset, &self.store, &LabelSet::default(), &TrainingOptions::default());
        if result.is_ok() {
            for path in [self.store.classifier_path(), self.store.vectorizer_path()] {
                let file = std::fs::File::options().write(true).open(path)?;
                file.set_modified(SystemTime::now() + Duration::from_secs(60))?;
            }
        }
        Ok(TrainingRun {
            success: result.is_ok(),
            exit_code: Some(if result.is_ok() { 0 } else { 1 }),
            stdout: String::new(),
            stderr: result.err().map(|e| format!("{e:#}")).unwrap_or_default(),
            duration_ms: start.elapsed().as_millis(),
        })
    }
}

fn seed_dataset(path: &PathBuf) {
    let mut dataset = Dataset::default();
    for doc in [
        "need access to vpn",
        "cannot log in to my account",
        "reset my password",
        "grant me access to the shared drive",
        "account locked out",
        "vpn access request",
    ] {
        dataset.push(doc, "Access");
    }
    for doc in [
        "printer broken",
        "laptop screen broken",
        "keyboard not working",
        "mouse stopped working",
        "monitor flickering",
        "docking station broken",
    ] {
        dataset.push(doc, "Hardware");
    }
    dataset.write_atomic(path).unwrap();
}

async fn post_feedback(state: &AppState, text: &str, label: &str) -> StatusCode {
    let body = serde_json::json!({ "text": text, "prediction": "Hardware", "true_label": label });
    let request = Request::builder()
        .method(Method::POST)
        .uri("/feedback")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    router(state.clone()).oneshot(request).await.unwrap().status()
}

#[tokio::test]
async fn test_feedback_reaches_served_model() {
    let dir = tempfile::tempdir().unwrap();
    let dataset_path = dir.path().join("data/tickets.csv");
    std::fs::create_dir_all(dataset_path.parent().unwrap()).unwrap();
    seed_dataset(&dataset_path);

    let store = ArtifactStore::new(dir.path().join("artifacts"));
    train_artifacts(&dataset_path, &store, &LabelSet::default(), &TrainingOptions::default()).unwrap();

    let handle = ModelHandle::new();
    let mut watcher = ModelWatcher::new(store.clone(), LabelSet::default(), handle.clone());
    let WatchOutcome::Reloaded { fit_id: first_fit } = watcher.tick().await else {
        panic!("initial artifacts should load");
    };
    assert_eq!(handle.current().unwrap().classes(), &["Access", "Hardware"]);

    let feedback = FeedbackLog::new(dir.path().join("logs/feedback.jsonl"));
    let state = AppState {
        backend: PredictBackend::Local(handle.clone()),
        feedback: feedback.clone(),
    };
    let corrections = ["order a new monitor", "buy software license", "purchase request for headset"];
    for text in corrections {
        assert_eq!(post_feedback(&state, text, "Purchase").await, StatusCode::OK);
    }

    let mut trigger = RetrainTrigger::new(
        feedback.clone(),
        &dataset_path,
        3,
        InProcessTrainer { store: store.clone() },
    );
    let outcome = trigger.tick().await;
    let RetrainOutcome::Retrained { merge, training } = outcome else {
        panic!("threshold reached, expected a retrain, got {outcome:?}");
    };
    assert_eq!(merge.rows_before, 12);
    assert_eq!(merge.rows_after, 15);
    assert!(matches!(training, TrainingOutcome::Succeeded { .. }));
    assert!(feedback.read_batch().unwrap().is_empty());

    let WatchOutcome::Reloaded { fit_id: second_fit } = watcher.tick().await else {
        panic!("retrained artifacts should be picked up");
    };
    assert_ne!(first_fit, second_fit);

    let model = handle.current().unwrap();
    assert_eq!(model.fit_id(), second_fit);
    assert!(model.classes().iter().any(|c| c == "Purchase"));
    assert_eq!(handle.predict("order a new monitor").unwrap(), "Purchase");
}

#[tokio::test]
async fn test_below_threshold_leaves_dataset_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let dataset_path = dir.path().join("tickets.csv");
    seed_dataset(&dataset_path);
    let before = std::fs::read(&dataset_path).unwrap();

    let store = ArtifactStore::new(dir.path().join("artifacts"));
    let feedback = FeedbackLog::new(dir.path().join("feedback.jsonl"));
    let state = AppState {
        backend: PredictBackend::Local(ModelHandle::new()),
        feedback: feedback.clone(),
    };
    assert_eq!(post_feedback(&state, "order a new monitor", "Purchase").await, StatusCode::OK);

    let mut trigger = RetrainTrigger::new(feedback.clone(), &dataset_path, 2, InProcessTrainer { store: store.clone() });
    assert_eq!(trigger.tick().await, RetrainOutcome::Waiting { count: 1, threshold: 2 });
    assert_eq!(std::fs::read(&dataset_path).unwrap(), before);
    assert_eq!(feedback.read_batch().unwrap().len(), 1);
    assert!(store.modified().is_none());
}

use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::defaults::LABELS;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FeedbackRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub prediction: Option<String>,
    #[serde(default)]
    pub true_label: Option<String>,
}

/// One line of the feedback log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub text: String,
    #[serde(default)]
    pub prediction: String,
    pub true_label: String,
    #[serde(serialize_with = "serialize_timestamp", deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn new(text: String, prediction: String, true_label: String) -> Self {
        Self {
            text,
            prediction,
            true_label,
            timestamp: Utc::now().trunc_subsecs(6),
        }
    }
}

fn serialize_timestamp<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Accepts RFC 3339 as well as offset-less ISO-8601, which is read as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

/// Ordered category names shared by training and serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::new(LABELS.iter().map(|l| l.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_set_default_order() {
        let labels = LabelSet::default();
        assert_eq!(labels.len(), 8);
        assert_eq!(labels.get(0), Some("Access"));
        assert_eq!(labels.get(7), Some("Storage"));
        assert_eq!(labels.index_of("Hardware"), Some(3));
        assert!(!labels.contains("Printers"));

        let mut sorted = labels.as_slice().to_vec();
        sorted.sort();
        assert_eq!(sorted, labels.as_slice());
    }

    #[test]
    fn test_feedback_record_accepts_naive_timestamp() {
        let line = r#"{"text":"vpn down","prediction":"Access","true_label":"Access","timestamp":"2024-05-01T12:00:00.123456"}"#;
        let record: FeedbackRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.timestamp.to_rfc3339(), "2024-05-01T12:00:00.123456+00:00");
    }

    #[test]
    fn test_feedback_record_roundtrips_through_json_line() {
        let record = FeedbackRecord::new("printer broken".into(), "".into(), "Hardware".into());
        let line = serde_json::to_string(&record).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        let ts = value["timestamp"].as_str().unwrap();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2024-05-01T12:00:00.123456Z".len());
        let parsed: FeedbackRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_feedback_record_missing_prediction_defaults_empty() {
        let line = r#"{"text":"a","true_label":"Storage","timestamp":"2024-05-01T12:00:00Z"}"#;
        let record: FeedbackRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.prediction, "");
    }
}

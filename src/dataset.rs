//! Training dataset: a CSV table with at least `Document` and `Topic_group`.
//!
//! Every column is handled as nullable UTF-8 so that extra columns survive a
//! merge untouched. The file is rewritten in full through a temporary sibling
//! and a rename.

use anyhow::{anyhow, Context, Result};
use arrow::array::{Array, ArrayRef, RecordBatch, StringArray};
use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use std::collections::HashSet;
use std::fs::File;
use std::io::Seek;
use std::path::Path;
use std::sync::Arc;

use crate::artifacts::tmp_path;
use crate::model::FeedbackRecord;

pub const DOCUMENT_COLUMN: &str = "Document";
pub const LABEL_COLUMN: &str = "Topic_group";

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
    document_idx: usize,
    label_idx: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeStats {
    pub rows_before: usize,
    pub feedback_rows: usize,
    pub rows_after: usize,
}

impl MergeStats {
    pub fn duplicates_dropped(&self) -> usize {
        self.rows_before + self.feedback_rows - self.rows_after
    }
}

impl Default for Dataset {
    fn default() -> Self {
        Self {
            columns: vec![DOCUMENT_COLUMN.to_string(), LABEL_COLUMN.to_string()],
            rows: Vec::new(),
            document_idx: 0,
            label_idx: 1,
        }
    }
}

impl Dataset {
    pub fn from_columns(columns: Vec<String>) -> Result<Self> {
        let find = |name: &str| {
            columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| anyhow!("Dataset is missing column {name}"))
        };
        let document_idx = find(DOCUMENT_COLUMN)?;
        let label_idx = find(LABEL_COLUMN)?;
        Ok(Self {
            columns,
            rows: Vec::new(),
            document_idx,
            label_idx,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row given as `(Document, Topic_group)`; other columns stay empty.
    pub fn push(&mut self, document: &str, label: &str) {
        let mut row = vec![None; self.columns.len()];
        row[self.document_idx] = Some(document.to_string());
        row[self.label_idx] = Some(label.to_string());
        self.rows.push(row);
    }

    /// `(Document, Topic_group)` pairs, skipping rows where either is empty.
    pub fn examples(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rows.iter().filter_map(|row| {
            let doc = row[self.document_idx].as_deref().filter(|d| !d.trim().is_empty())?;
            let label = row[self.label_idx].as_deref().filter(|l| !l.trim().is_empty())?;
            Some((doc, label))
        })
    }

    /// Append feedback as `text -> Document`, `true_label -> Topic_group`,
    /// then drop repeated (Document, Topic_group) pairs keeping the first.
    pub fn merge_feedback(&mut self, records: &[FeedbackRecord]) -> MergeStats {
        let rows_before = self.rows.len();
        for record in records {
            self.push(&record.text, &record.true_label);
        }
        self.drop_duplicates();
        MergeStats {
            rows_before,
            feedback_rows: records.len(),
            rows_after: self.rows.len(),
        }
    }

    pub fn drop_duplicates(&mut self) {
        let (doc, label) = (self.document_idx, self.label_idx);
        let mut seen: HashSet<(Option<String>, Option<String>)> = HashSet::new();
        self.rows
            .retain(|row| seen.insert((row[doc].clone(), row[label].clone())));
    }

    /// Read a dataset from CSV. A missing or zero-length file is an empty
    /// dataset with the two required columns.
    pub fn read(path: &Path) -> Result<Self> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e).with_context(|| format!("Failed to open {}", path.display())),
        };
        if file.metadata()?.len() == 0 {
            return Ok(Self::default());
        }

        let (inferred, _) = Format::default()
            .with_header(true)
            .infer_schema(&mut file, Some(100))
            .context("Failed to read dataset header")?;
        file.rewind()?;

        let columns: Vec<String> = inferred.fields().iter().map(|f| f.name().clone()).collect();
        let mut dataset = Self::from_columns(columns)?;
        let schema = Arc::new(utf8_schema(&dataset.columns));

        let reader = ReaderBuilder::new(schema)
            .with_header(true)
            .build(file)
            .context("Failed to open dataset reader")?;

        for batch in reader {
            let batch = batch.context("Failed to parse dataset")?;
            let arrays: Vec<&StringArray> = (0..batch.num_columns())
                .map(|i| {
                    batch
                        .column(i)
                        .as_any()
                        .downcast_ref::<StringArray>()
                        .ok_or_else(|| anyhow!("Dataset column {i} is not text"))
                })
                .collect::<Result<_>>()?;

            for row in 0..batch.num_rows() {
                dataset.rows.push(
                    arrays
                        .iter()
                        .map(|a| {
                            (!a.is_null(row))
                                .then(|| a.value(row).to_string())
                                .filter(|v| !v.is_empty())
                        })
                        .collect(),
                );
            }
        }

        tracing::debug!(path = %path.display(), rows = dataset.len(), "Dataset loaded");
        Ok(dataset)
    }

    /// Rewrite the whole file via `<path>.tmp` and rename.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let schema = Arc::new(utf8_schema(&self.columns));
        let arrays: Vec<ArrayRef> = (0..self.columns.len())
            .map(|col| {
                let values: Vec<Option<&str>> = self.rows.iter().map(|r| r[col].as_deref()).collect();
                Arc::new(StringArray::from(values)) as ArrayRef
            })
            .collect();
        let batch = RecordBatch::try_new(schema, arrays).context("Failed to build dataset batch")?;

        let tmp = tmp_path(path);
        {
            let file = File::create(&tmp).with_context(|| format!("Failed to create {}", tmp.display()))?;
            let mut writer = WriterBuilder::new().with_header(true).build(file);
            writer.write(&batch).context("Failed to write dataset")?;
        }
        File::open(&tmp)?.sync_all()?;
        std::fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;

        tracing::debug!(path = %path.display(), rows = self.len(), "Dataset written");
        Ok(())
    }
}

fn utf8_schema(columns: &[String]) -> Schema {
    Schema::new(
        columns
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feedback(text: &str, label: &str) -> FeedbackRecord {
        FeedbackRecord::new(text.to_string(), String::new(), label.to_string())
    }

    #[test]
    fn test_missing_file_is_empty_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = Dataset::read(&dir.path().join("tickets.csv")).unwrap();
        assert!(dataset.is_empty());
        assert_eq!(dataset.columns(), &["Document", "Topic_group"]);
    }

    #[test]
    fn test_read_write_preserves_extra_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickets.csv");
        std::fs::write(
            &path,
            "Document,Topic_group,Source\nreset my password,Access,email\n\"printer, 2nd floor\",Hardware,phone\n",
        )
        .unwrap();

        let mut dataset = Dataset::read(&path).unwrap();
        assert_eq!(dataset.len(), 2);
        dataset.push("new laptop", "Purchase");
        dataset.write_atomic(&path).unwrap();

        let reread = Dataset::read(&path).unwrap();
        assert_eq!(reread.columns(), &["Document", "Topic_group", "Source"]);
        let examples: Vec<_> = reread.examples().collect();
        assert_eq!(
            examples,
            vec![
                ("reset my password", "Access"),
                ("printer, 2nd floor", "Hardware"),
                ("new laptop", "Purchase"),
            ]
        );
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn test_missing_required_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickets.csv");
        std::fs::write(&path, "Text,Label\nfoo,Access\n").unwrap();
        assert!(Dataset::read(&path).is_err());
    }

    #[test]
    fn test_merge_drops_duplicate_pairs() {
        let mut dataset = Dataset::default();
        dataset.push("reset my password", "Access");
        dataset.push("printer broken", "Hardware");

        let stats = dataset.merge_feedback(&[
            feedback("reset my password", "Access"),
            feedback("reset my password", "Storage"),
        ]);
        assert_eq!(stats.rows_after, 3);
        assert_eq!(stats.duplicates_dropped(), 1);

        let count = dataset
            .examples()
            .filter(|&pair| pair == ("reset my password", "Access"))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_merging_same_batch_twice_is_idempotent() {
        let mut dataset = Dataset::default();
        let batch = vec![feedback("vpn down", "Access"), feedback("need monitor", "Hardware")];
        dataset.merge_feedback(&batch);
        let once = dataset.clone();
        dataset.merge_feedback(&batch);
        assert_eq!(dataset, once);
    }

    #[test]
    fn test_examples_skip_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickets.csv");
        std::fs::write(&path, "Document,Topic_group\n,Access\nvpn,\nvpn down,Access\n").unwrap();
        let dataset = Dataset::read(&path).unwrap();
        let examples: Vec<_> = dataset.examples().collect();
        assert_eq!(examples, vec![("vpn down", "Access")]);
    }
}

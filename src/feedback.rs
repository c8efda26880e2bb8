//! Append-only JSON Lines feedback log.
//!
//! Writers open the file in append mode and issue one write per record, so
//! concurrent submissions never interleave inside a line. The retrain loop
//! reads a snapshot, and after merging removes exactly the bytes it read.
//! Appends and clears hold an exclusive lock on a `.lock` sidecar, which
//! also serialises the serving and retrain processes.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::artifacts::tmp_path;
use crate::model::FeedbackRecord;

/// Lines read from the log at one point in time.
#[derive(Debug, Default)]
pub struct FeedbackBatch {
    pub records: Vec<FeedbackRecord>,
    /// Lines that failed to parse, as raw bytes without the newline.
    pub rejected: Vec<Vec<u8>>,
    /// Byte length of the log covered by this batch.
    pub consumed_bytes: u64,
}

impl FeedbackBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Held for the duration of one append or clear.
struct LogLock(File);

impl Drop for LogLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.0);
    }
}

#[derive(Debug, Clone)]
pub struct FeedbackLog {
    path: PathBuf,
}

impl FeedbackLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rejected_path(&self) -> PathBuf {
        self.sidecar("rejected")
    }

    fn sidecar(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".");
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn lock(&self) -> Result<LogLock> {
        let path = self.sidecar("lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        FileExt::lock_exclusive(&file).with_context(|| format!("Failed to lock {}", path.display()))?;
        Ok(LogLock(file))
    }

    pub async fn append(&self, record: &FeedbackRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let log = self.clone();
        tokio::task::spawn_blocking(move || log.append_line(&line))
            .await
            .context("Feedback writer task failed")?
    }

    fn append_line(&self, line: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let _lock = self.lock()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.write_all(line).context("Failed to append feedback")?;
        Ok(())
    }

    /// Read every record. A missing log is an empty batch.
    pub fn read_batch(&self) -> Result<FeedbackBatch> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(FeedbackBatch::default());
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        };

        // A trailing partial line belongs to a writer still in flight.
        let complete = match data.iter().rposition(|&b| b == b'\n') {
            Some(last) => &data[..=last],
            None => &data[..0],
        };

        let mut batch = FeedbackBatch {
            consumed_bytes: complete.len() as u64,
            ..Default::default()
        };
        for raw in complete[..complete.len().saturating_sub(1)].split(|&b| b == b'\n') {
            if raw.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<FeedbackRecord>(raw) {
                Ok(record) => batch.records.push(record),
                Err(e) => {
                    tracing::warn!(
                        line = %String::from_utf8_lossy(raw),
                        error = %e,
                        "Skipping malformed feedback line"
                    );
                    batch.rejected.push(raw.to_vec());
                }
            }
        }
        Ok(batch)
    }

    /// Remove the first `batch.consumed_bytes` bytes of the log, keeping
    /// anything appended since the batch was read. Rejected lines are moved to
    /// the `.rejected` sidecar first.
    pub fn clear_batch(&self, batch: &FeedbackBatch) -> Result<()> {
        if batch.consumed_bytes == 0 {
            return Ok(());
        }
        let _lock = self.lock()?;

        if !batch.rejected.is_empty() {
            let mut sidecar = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.rejected_path())
                .context("Failed to open rejected feedback file")?;
            let mut out = Vec::new();
            for line in &batch.rejected {
                out.extend_from_slice(line);
                out.push(b'\n');
            }
            sidecar.write_all(&out)?;
        }

        let mut file = match OpenOptions::new().read(true).write(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e).with_context(|| format!("Failed to open {}", self.path.display())),
        };

        let len = file.metadata()?.len();
        if len <= batch.consumed_bytes {
            file.set_len(0).context("Failed to truncate feedback log")?;
            return Ok(());
        }

        let mut tail = Vec::new();
        file.seek(SeekFrom::Start(batch.consumed_bytes))?;
        file.read_to_end(&mut tail)?;
        let tmp = tmp_path(&self.path);
        std::fs::write(&tmp, &tail)?;
        std::fs::rename(&tmp, &self.path).context("Failed to replace feedback log")?;
        tracing::info!(kept_bytes = tail.len(), "Kept feedback appended during merge");
        Ok(())
    }
}

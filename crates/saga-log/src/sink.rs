//! Line-delimited JSON persistence for log entries.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::{LogEntry, Result};

/// Append-only JSONL file sink.
///
/// Writes are best-effort: an entry that cannot be encoded or written is
/// traced and dropped, never surfaced to the caller recording it. Reads for
/// restart recovery go through [`read_entries`].
pub struct JsonlSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlSink {
    /// Opens `path` for appending, creating the file if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// The file this sink appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry as a single JSON line, best-effort.
    pub(crate) fn write(&self, entry: &LogEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(error) => {
                tracing::warn!(%error, "failed to encode log entry for sink");
                return;
            }
        };

        let mut writer = self.writer.lock().unwrap();
        let written = writeln!(writer, "{line}").and_then(|()| writer.flush());
        if let Err(error) = written {
            tracing::warn!(
                %error,
                path = %self.path.display(),
                "failed to append log entry to sink"
            );
        }
    }
}

/// Reads every entry from a JSONL file written by [`JsonlSink`].
///
/// Entries come back in file order, which is append order.
pub fn read_entries(path: impl AsRef<Path>) -> Result<Vec<LogEntry>> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);

    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(&line)?);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SagaLog;
    use common::{OnboardingStep, PartnerId, SagaId};

    #[test]
    fn test_sink_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saga.jsonl");

        let log = SagaLog::new().with_sink(JsonlSink::open(&path).unwrap());
        let saga_id = SagaId::new();
        let partner_id = PartnerId::new();

        log.saga_started(saga_id, partner_id);
        log.step_started(saga_id, partner_id, OnboardingStep::RegisterPartner);
        log.step_completed(saga_id, partner_id, OnboardingStep::RegisterPartner);

        let persisted = read_entries(&path).unwrap();
        assert_eq!(persisted.len(), 3);
        assert_eq!(persisted, log.entries_for_saga(saga_id));
    }

    #[test]
    fn test_restore_does_not_rewrite_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saga.jsonl");

        {
            let log = SagaLog::new().with_sink(JsonlSink::open(&path).unwrap());
            let saga_id = SagaId::new();
            let partner_id = PartnerId::new();
            log.saga_started(saga_id, partner_id);
            log.step_started(saga_id, partner_id, OnboardingStep::RegisterPartner);
        }

        let persisted = read_entries(&path).unwrap();
        assert_eq!(persisted.len(), 2);

        // Restart: restore into a fresh log attached to the same file.
        let log = SagaLog::new().with_sink(JsonlSink::open(&path).unwrap());
        log.restore(persisted.clone());
        assert_eq!(log.len(), 2);

        // The file still holds exactly the original entries.
        let after = read_entries(&path).unwrap();
        assert_eq!(after, persisted);
    }

    #[test]
    fn test_read_entries_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saga.jsonl");

        let log = SagaLog::new().with_sink(JsonlSink::open(&path).unwrap());
        log.saga_started(SagaId::new(), PartnerId::new());
        drop(log);

        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push('\n');
        std::fs::write(&path, content).unwrap();

        assert_eq!(read_entries(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_read_entries_rejects_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saga.jsonl");
        std::fs::write(&path, "{not json}\n").unwrap();

        assert!(read_entries(&path).is_err());
    }
}

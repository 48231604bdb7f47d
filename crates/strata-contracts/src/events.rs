//! Session event log: one `EventRecord` per line in `events.jsonl`.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Where a submission took its base image from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseSource {
    Upload,
    LastOutput,
}

/// What the orchestrator reports about a session. Image payloads never
/// appear here; submissions carry a digest of the base reference instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        localize_outputs: bool,
        poll_interval_s: f64,
        poll_timeout_s: f64,
    },
    SubmissionStarted {
        base_source: BaseSource,
        base_digest: String,
        has_mask: bool,
    },
    PredictionAppended {
        prediction_id: String,
        chain_len: usize,
        output_local: bool,
    },
    SubmissionFailed {
        kind: String,
        detail: String,
        chain_len: usize,
    },
    SessionReset {
        chain_len: usize,
        released: usize,
    },
}

/// One line of the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub session_id: String,
    pub ts: String,
    #[serde(flatten)]
    pub event: SessionEvent,
}

/// Appends `EventRecord`s for one session. Clones share the file handle,
/// which is opened on the first emit.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    session_id: String,
    file: Mutex<Option<File>>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                session_id: session_id.into(),
                file: Mutex::new(None),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event: SessionEvent) -> Result<EventRecord> {
        let record = EventRecord {
            session_id: self.inner.session_id.clone(),
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            event,
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = self
            .inner
            .file
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        if file.is_none() {
            *file = Some(open_append(&self.inner.path)?);
        }
        if let Some(file) = file.as_mut() {
            file.write_all(line.as_bytes())
                .with_context(|| format!("failed to append to {}", self.inner.path.display()))?;
        }
        Ok(record)
    }
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))
}

/// Reads a log back, skipping blank lines.
pub fn read_events(path: &Path) -> Result<Vec<EventRecord>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut records = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .with_context(|| format!("bad event on line {} of {}", idx + 1, path.display()))?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;
    use serde_json::Value;

    use super::*;

    fn all_events() -> Vec<SessionEvent> {
        vec![
            SessionEvent::SessionStarted {
                localize_outputs: true,
                poll_interval_s: 1.0,
                poll_timeout_s: 120.0,
            },
            SessionEvent::SubmissionStarted {
                base_source: BaseSource::Upload,
                base_digest: "0011223344556677".to_string(),
                has_mask: false,
            },
            SessionEvent::PredictionAppended {
                prediction_id: "local-1".to_string(),
                chain_len: 1,
                output_local: true,
            },
            SessionEvent::SubmissionFailed {
                kind: "inference".to_string(),
                detail: "no person detected".to_string(),
                chain_len: 1,
            },
            SessionEvent::SessionReset {
                chain_len: 1,
                released: 1,
            },
        ]
    }

    #[test]
    fn emit_writes_tagged_row_with_session_fields() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-1");

        writer.emit(SessionEvent::SubmissionStarted {
            base_source: BaseSource::LastOutput,
            base_digest: "abcd".to_string(),
            has_mask: true,
        })?;

        let content = fs::read_to_string(&path)?;
        let row: Value = serde_json::from_str(content.lines().next().unwrap_or(""))?;
        assert_eq!(row["type"], "submission_started");
        assert_eq!(row["session_id"], "session-1");
        assert_eq!(row["base_source"], "last_output");
        assert_eq!(row["has_mask"], true);
        DateTime::parse_from_rfc3339(row["ts"].as_str().unwrap_or(""))?;
        Ok(())
    }

    #[test]
    fn every_session_event_reads_back_in_order() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-1");
        for event in all_events() {
            writer.clone().emit(event)?;
        }

        let records = read_events(&path)?;
        let events: Vec<SessionEvent> = records.iter().map(|row| row.event.clone()).collect();
        assert_eq!(events, all_events());
        assert!(records.iter().all(|row| row.session_id == "session-1"));
        Ok(())
    }

    #[test]
    fn writers_create_parent_dirs_and_append() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");

        EventWriter::new(&path, "first").emit(SessionEvent::SessionReset {
            chain_len: 2,
            released: 2,
        })?;
        EventWriter::new(&path, "second").emit(SessionEvent::SessionReset {
            chain_len: 0,
            released: 0,
        })?;

        let sessions: Vec<String> = read_events(&path)?
            .into_iter()
            .map(|row| row.session_id)
            .collect();
        assert_eq!(sessions, vec!["first".to_string(), "second".to_string()]);
        Ok(())
    }

    #[test]
    fn read_events_names_the_bad_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        EventWriter::new(&path, "s").emit(SessionEvent::SessionReset {
            chain_len: 1,
            released: 0,
        })?;
        let mut content = fs::read_to_string(&path)?;
        content.push_str("\n{\"type\":\"unknown\"}\n");
        fs::write(&path, content)?;

        let err = read_events(&path).err().map(|err| err.to_string());
        assert!(err.unwrap_or_default().contains("line 3"));
        Ok(())
    }
}

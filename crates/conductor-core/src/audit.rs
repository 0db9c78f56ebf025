//! Append-only NDJSON audit log.
//!
//! One JSON object per line, `{"event": ..., "ts": ..., ...payload}`,
//! flushed on every append so a tailing reader never sees a torn record.
//! Reads memory-map the file for zero-copy tailing; the mapping is a
//! snapshot and never observes in-place mutation because the file is only
//! ever appended to.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use memmap2::Mmap;
use serde_json::Value;
use tracing::warn;

use conductor_types::ConductorError;

/// The audit sink. When disabled, every record is a no-op.
pub struct AuditLog {
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

impl AuditLog {
    /// Open (or create) the log file for appending, creating parent
    /// directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConductorError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConductorError::Audit(format!("create {}: {e}", parent.display())))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ConductorError::Audit(format!("open {}: {e}", path.display())))?;
        Ok(Self {
            writer: Some(BufWriter::new(file)),
            path: Some(path),
        })
    }

    /// A sink that records nothing (audit disabled by configuration).
    pub fn disabled() -> Self {
        Self {
            writer: None,
            path: None,
        }
    }

    /// Append one event. `payload` must be a JSON object; its fields are
    /// merged beside `event` and `ts`. Write failures are logged and
    /// swallowed so an unwritable disk cannot take down the loop.
    pub fn record(&mut self, event: &str, payload: Value) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };

        let mut record = serde_json::Map::new();
        record.insert("event".into(), Value::String(event.to_string()));
        record.insert("ts".into(), Value::String(Utc::now().to_rfc3339()));
        if let Value::Object(fields) = payload {
            record.extend(fields);
        }

        let result = serde_json::to_writer(&mut *writer, &Value::Object(record))
            .map_err(std::io::Error::other)
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush());
        if let Err(e) = result {
            warn!("audit append failed: {e}");
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flush and drop the write handle. Later records are no-ops.
    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}

/// Memory-mapped tail reader for the audit log.
pub struct AuditReader {
    mmap: Option<Mmap>,
}

impl AuditReader {
    /// Map the file's current contents. An empty or missing file yields a
    /// reader that returns no lines.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConductorError> {
        let file = match File::open(path.as_ref()) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self { mmap: None });
            }
            Err(e) => return Err(ConductorError::Audit(e.to_string())),
        };
        let len = file
            .metadata()
            .map_err(|e| ConductorError::Audit(e.to_string()))?
            .len();
        if len == 0 {
            return Ok(Self { mmap: None });
        }
        // SAFETY: read-only mapping of an append-only file; bytes inside the
        // mapped range are never rewritten, and appends land beyond it.
        let mmap = unsafe {
            Mmap::map(&file).map_err(|e| ConductorError::Audit(e.to_string()))?
        };
        Ok(Self { mmap: Some(mmap) })
    }

    /// The last `n` records, oldest first, as raw JSON lines.
    pub fn tail(&self, n: usize) -> Vec<&str> {
        let Some(mmap) = &self.mmap else {
            return Vec::new();
        };
        let Ok(data) = std::str::from_utf8(mmap.as_ref()) else {
            return Vec::new();
        };

        let mut lines: Vec<&str> = data.lines().filter(|l| !l.is_empty()).collect();
        if lines.len() > n {
            lines.drain(..lines.len() - n);
        }
        lines
    }

    /// Total number of records in the mapped snapshot.
    pub fn count(&self) -> usize {
        match &self.mmap {
            Some(mmap) => mmap.iter().filter(|&&b| b == b'\n').count(),
            None => 0,
        }
    }
}

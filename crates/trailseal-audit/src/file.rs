//! JSON Lines file implementation of `AuditStore`.
//!
//! Storage format: one `AuditEntry` per line, serialized with `serde_json`
//! (which never emits a raw newline inside a value), terminated by `\n`.
//!
//! Appends write the whole line with a single `write_all` and, when
//! `sync_writes` is set, `sync_data` before returning.  A line is committed
//! once its trailing newline is durable:
//!
//! - on a failed write the file is truncated back to the last committed
//!   length, so a partial line is never left behind by this process;
//! - on open, a final line without its newline (a crash mid-append) is
//!   truncated away, since its append never reported success.
//!
//! Readers only ever see the committed prefix of the file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Take, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use trailseal_contracts::{
    entry::AuditEntry,
    error::{AuditError, AuditResult},
};
use trailseal_core::traits::{AuditStore, EntryStream};

struct FileState {
    file: File,
    /// Length of the file up to and including the last complete line.
    committed_len: u64,
    latest: Option<AuditEntry>,
    /// Set when the scan on open could not tell which entry is the latest.
    ambiguity: Option<String>,
}

/// An append-only audit store backed by a single JSON Lines file.
pub struct FileStore {
    path: PathBuf,
    sync_writes: bool,
    state: Mutex<FileState>,
}

impl FileStore {
    /// Open (or create) the store at `path` and scan it.
    ///
    /// Fails with `ChainContinuity` when a complete line cannot be parsed.
    /// Duplicate or out-of-order maximal indices do not fail the open; they
    /// make `latest()` and `append()` return `BootstrapAmbiguity` while
    /// streams stay readable for inspection.
    pub fn open(path: impl AsRef<Path>, sync_writes: bool) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        let scan = scan(&file, &path)?;
        if scan.torn_bytes > 0 {
            warn!(
                path = %path.display(),
                torn_bytes = scan.torn_bytes,
                "discarding incomplete trailing line from an interrupted append"
            );
            file.set_len(scan.committed_len)?;
            file.sync_data()?;
        }

        info!(
            path = %path.display(),
            entries = scan.entries,
            latest = ?scan.latest.as_ref().map(|e| e.sequence_index),
            "opened audit file store"
        );

        Ok(Self {
            path,
            sync_writes,
            state: Mutex::new(FileState {
                file,
                committed_len: scan.committed_len,
                latest: scan.latest,
                ambiguity: scan.ambiguity,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditStore for FileStore {
    fn append(&self, entry: &AuditEntry) -> AuditResult<()> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.ambiguity {
            return Err(AuditError::BootstrapAmbiguity {
                reason: reason.clone(),
            });
        }

        let expected = state.latest.as_ref().map_or(0, |e| e.sequence_index + 1);
        if entry.sequence_index != expected {
            return Err(AuditError::SequenceConflict {
                expected,
                offered: entry.sequence_index,
            });
        }

        let mut line = serde_json::to_vec(entry)
            .map_err(|e| AuditError::transient(format!("failed to encode entry: {}", e)))?;
        line.push(b'\n');

        let mut written = state.file.write_all(&line);
        if written.is_ok() && self.sync_writes {
            written = state.file.sync_data();
        }

        if let Err(e) = written {
            let committed = state.committed_len;
            if let Err(rollback) = state.file.set_len(committed) {
                warn!(
                    path = %self.path.display(),
                    error = %rollback,
                    "could not roll back partial append; it will be discarded on next open"
                );
            }
            return Err(AuditError::transient(format!(
                "append to {} failed: {}",
                self.path.display(),
                e
            )));
        }

        state.committed_len += line.len() as u64;
        state.latest = Some(entry.clone());
        debug!(sequence_index = entry.sequence_index, bytes = line.len(), "line appended");
        Ok(())
    }

    fn latest(&self) -> AuditResult<Option<AuditEntry>> {
        let state = self.state.lock();
        match &state.ambiguity {
            Some(reason) => Err(AuditError::BootstrapAmbiguity {
                reason: reason.clone(),
            }),
            None => Ok(state.latest.clone()),
        }
    }

    fn stream_from(&self, index: u64) -> AuditResult<EntryStream<'_>> {
        let committed = self.state.lock().committed_len;
        let reader = BufReader::new(File::open(&self.path)?.take(committed));
        Ok(Box::new(FileEntryStream {
            reader,
            from: index,
            line_no: 0,
            last_index: None,
            buf: String::new(),
        }))
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// Lazy line-by-line reader over the committed prefix of the file.
struct FileEntryStream {
    reader: BufReader<Take<File>>,
    from: u64,
    line_no: u64,
    last_index: Option<u64>,
    buf: String,
}

impl Iterator for FileEntryStream {
    type Item = AuditResult<AuditEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.line_no += 1;
            let line = self.buf.trim();
            if line.is_empty() {
                continue;
            }
            let entry: AuditEntry = match serde_json::from_str(line) {
                Ok(entry) => entry,
                Err(e) => {
                    return Some(Err(AuditError::ChainContinuity {
                        index: self.last_index.map_or(0, |i| i + 1),
                        reason: format!("line {} is not a valid entry: {}", self.line_no, e),
                    }))
                }
            };
            self.last_index = Some(entry.sequence_index);
            if entry.sequence_index >= self.from {
                return Some(Ok(entry));
            }
        }
    }
}

struct Scan {
    entries: u64,
    committed_len: u64,
    torn_bytes: u64,
    latest: Option<AuditEntry>,
    ambiguity: Option<String>,
}

/// Read the whole file once to find the latest entry and the committed length.
fn scan(file: &File, path: &Path) -> AuditResult<Scan> {
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut offset = 0u64;
    let mut line_no = 0u64;

    let mut entries = 0u64;
    let mut max: Option<AuditEntry> = None;
    let mut max_seen_twice = false;
    let mut last: Option<u64> = None;

    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf)? as u64;
        if n == 0 {
            break;
        }
        line_no += 1;

        if buf.last() != Some(&b'\n') {
            return Ok(finish(entries, offset, n, max, max_seen_twice, last));
        }
        offset += n;

        let text = std::str::from_utf8(&buf).map_err(|e| AuditError::ChainContinuity {
            index: last.map_or(0, |i| i + 1),
            reason: format!("{} line {} is not UTF-8: {}", path.display(), line_no, e),
        })?;
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let entry: AuditEntry =
            serde_json::from_str(text).map_err(|e| AuditError::ChainContinuity {
                index: last.map_or(0, |i| i + 1),
                reason: format!("{} line {} is not a valid entry: {}", path.display(), line_no, e),
            })?;

        entries += 1;
        last = Some(entry.sequence_index);
        match max.as_ref().map(|m| m.sequence_index) {
            Some(m) if entry.sequence_index < m => {}
            Some(m) if entry.sequence_index == m => max_seen_twice = true,
            _ => {
                max = Some(entry);
                max_seen_twice = false;
            }
        }
    }

    Ok(finish(entries, offset, 0, max, max_seen_twice, last))
}

fn finish(
    entries: u64,
    committed_len: u64,
    torn_bytes: u64,
    max: Option<AuditEntry>,
    max_seen_twice: bool,
    last: Option<u64>,
) -> Scan {
    let ambiguity = match (&max, last) {
        (Some(m), _) if max_seen_twice => Some(format!(
            "two entries claim the highest index {}",
            m.sequence_index
        )),
        (Some(m), Some(last)) if last != m.sequence_index => Some(format!(
            "highest index {} is not the last line (last line has index {})",
            m.sequence_index, last
        )),
        _ => None,
    };
    Scan {
        entries,
        committed_len,
        torn_bytes,
        latest: max,
        ambiguity,
    }
}

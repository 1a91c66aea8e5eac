/*!
Durable per-conversation deletion log with crash-tolerant finalization

While a log is active its content is a deliberately unclosed JSON array
(`"[" entry ",\n" entry ",\n" ...`), so an append never rereads or parses
the file. Finalization strips the trailing separator and closes the array,
turning the file into valid JSON. A file left unfinalized by a crash stays
recoverable: every entry before the crash is intact, and the reader closes
the array itself.
*/

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::error::{LoggerError, Result};
use crate::core::record::Message;

/// Separator written after every entry while a log is in progress.
const ENTRY_SEPARATOR: &str = ",\n";

fn io_error(path: &Path, source: std::io::Error) -> LoggerError {
    LoggerError::LogIo {
        path: path.to_path_buf(),
        source,
    }
}

/// One logged deletion: the full message snapshot plus the wall-clock time
/// it was intercepted, in unix milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: Message,
    pub timestamp: i64,
}

/// Append-only writer owning a directory of per-conversation log files,
/// one `<conversation_id>.json` each.
pub struct DeletionLog {
    directory: PathBuf,
}

impl DeletionLog {
    /// Open the log directory, creating it if needed.
    pub fn new<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).map_err(|source| io_error(&directory, source))?;
        info!(directory = %directory.display(), "deletion log ready");
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_path(&self, conversation_id: &str) -> PathBuf {
        self.directory.join(format!("{conversation_id}.json"))
    }

    /// Append one message snapshot to the conversation's log, creating the
    /// file in incomplete-array form on first use. O(entry): existing
    /// content is never parsed. A log finalized by an earlier session is
    /// detected by its closing bracket (a single-byte tail peek) and
    /// reopened into append-incomplete form.
    pub fn append(&self, conversation_id: &str, message: &Message) -> Result<()> {
        let path = self.file_path(conversation_id);
        let entry = LogEntry {
            message: message.clone(),
            timestamp: Utc::now().timestamp_millis(),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push_str(ENTRY_SEPARATOR);

        if path.exists() {
            self.append_existing(&path, &line)
                .map_err(|source| io_error(&path, source))?;
        } else {
            fs::write(&path, format!("[{line}")).map_err(|source| io_error(&path, source))?;
        }

        debug!(conversation_id, message_id = %message.id, "logged deleted message");
        Ok(())
    }

    fn append_existing(&self, path: &Path, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.seek(SeekFrom::End(0))?;
        if len > 0 {
            file.seek(SeekFrom::End(-1))?;
            let mut tail = [0u8; 1];
            file.read_exact(&mut tail)?;
            if tail[0] == b']' {
                // Reopen a finalized log: the closing bracket becomes the
                // separator after the last entry.
                file.seek(SeekFrom::End(-1))?;
                file.write_all(ENTRY_SEPARATOR.as_bytes())?;
            }
        }
        file.write_all(line.as_bytes())?;
        file.flush()
    }

    /// Close the conversation's log if it is still in progress. Returns true
    /// when the file was rewritten, false when it was absent or already
    /// valid JSON.
    pub fn finalize(&self, conversation_id: &str) -> Result<bool> {
        let path = self.file_path(conversation_id);
        if !path.exists() {
            return Ok(false);
        }
        let content = fs::read_to_string(&path).map_err(|source| io_error(&path, source))?;
        let Some(head) = content.strip_suffix(ENTRY_SEPARATOR) else {
            return Ok(false);
        };
        let mut fixed = head.to_string();
        fixed.push(']');
        fs::write(&path, fixed).map_err(|source| io_error(&path, source))?;
        debug!(conversation_id, "finalized deletion log");
        Ok(true)
    }

    /// Finalize every log in the directory; returns how many files were
    /// rewritten.
    pub fn finalize_all(&self) -> Result<usize> {
        let entries =
            fs::read_dir(&self.directory).map_err(|source| io_error(&self.directory, source))?;

        let mut repaired = 0;
        for entry in entries {
            let entry = entry.map_err(|source| io_error(&self.directory, source))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(conversation_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if self.finalize(conversation_id)? {
                repaired += 1;
            }
        }

        if repaired > 0 {
            info!(repaired, "finalized deletion logs");
        }
        Ok(repaired)
    }

    /// Read back a conversation's entries. Tolerates a log left unfinalized
    /// by a crash by trimming the trailing separator and closing the array
    /// before parsing.
    pub fn entries(&self, conversation_id: &str) -> Result<Vec<LogEntry>> {
        let path = self.file_path(conversation_id);
        let content = fs::read_to_string(&path).map_err(|source| io_error(&path, source))?;
        let entries = match content.strip_suffix(ENTRY_SEPARATOR) {
            Some(head) => serde_json::from_str(&format!("{head}]"))?,
            None => serde_json::from_str(&content)?,
        };
        Ok(entries)
    }
}

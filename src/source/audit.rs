use crate::cursor::CursorStore;
use crate::event::{LogEvent, Origin};
use chrono::Utc;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Payload keys carried from an audit record into the event fields.
const AUDIT_KEYS: [&str; 8] = [
    "id",
    "user",
    "audit_level",
    "verb",
    "request_uri",
    "response_status_code",
    "source_ip",
    "user_agent",
];

/// Tails the OpenWebUI audit log: one JSON object per line, append-only.
///
/// Each call reads from the stored byte offset to end-of-file and advances
/// the cursor to the post-read position. Malformed lines are skipped and not
/// retried; the offset still moves past them. An I/O error leaves the offset
/// where it was, so the next cycle re-reads the same region (safe, since
/// append is the only expected mutation).
pub struct AuditLogExtractor {
    path: Option<PathBuf>,
}

impl AuditLogExtractor {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn extract(&self, cursor: &mut CursorStore) -> Vec<LogEvent> {
        let Some(path) = &self.path else {
            return Vec::new();
        };
        if !path.exists() {
            debug!(path = %path.display(), "audit log not present, skipping");
            return Vec::new();
        }

        match read_new_lines(path, cursor.audit_offset()) {
            Ok((events, end_offset)) => {
                cursor.advance_audit(end_offset);
                events
            }
            Err(e) => {
                error!(
                    error = %e,
                    path = %path.display(),
                    "failed to read audit log, will retry from the same offset"
                );
                Vec::new()
            }
        }
    }
}

fn read_new_lines(path: &Path, offset: u64) -> std::io::Result<(Vec<LogEvent>, u64)> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(offset))?;

    let mut events = Vec::new();
    let mut position = offset;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            break;
        }
        position += bytes_read as u64;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<Map<String, Value>>(line) {
            Ok(record) => events.push(normalize(record)),
            Err(e) => warn!(error = %e, "skipping malformed audit log line"),
        }
    }

    Ok((events, position))
}

fn normalize(mut record: Map<String, Value>) -> LogEvent {
    let timestamp = record
        .get("timestamp")
        .and_then(Value::as_i64)
        .unwrap_or_else(|| Utc::now().timestamp());

    let mut fields = Map::new();
    for key in AUDIT_KEYS {
        fields.insert(key.to_string(), record.remove(key).unwrap_or(Value::Null));
    }

    LogEvent {
        timestamp_ns: timestamp * 1_000_000_000,
        origin: Origin::AuditLog,
        category: "api_request",
        fields,
    }
}

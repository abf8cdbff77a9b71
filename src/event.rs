use serde_json::{Map, Value};
use std::fmt;

/// Which of the two sources produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Database,
    AuditLog,
}

impl Origin {
    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Database => "database",
            Origin::AuditLog => "audit_log",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized activity record, ready for stream grouping.
///
/// `fields` is the payload only: `timestamp`, origin and category are
/// structural and never appear in it.
#[derive(Debug, Clone)]
pub struct LogEvent {
    /// Nanoseconds since the epoch, as Loki expects.
    pub timestamp_ns: i64,
    pub origin: Origin,
    pub category: &'static str,
    pub fields: Map<String, Value>,
}

impl LogEvent {
    /// Bucket key for stream grouping: two events with the same key land in
    /// the same stream entry within a batch.
    pub fn stream_key(&self) -> String {
        format!("{}_{}", self.origin.as_str(), self.category)
    }
}

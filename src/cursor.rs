use chrono::Utc;

/// In-memory read positions for the two sources.
///
/// The database cursor is the highest `last_active_at` / `updated_at` epoch
/// second already shipped; the audit cursor is the byte offset after the last
/// read. Neither survives a restart: a fresh process starts the database
/// watermark at "now" and the audit log at the beginning, so restarts can
/// re-deliver audit lines but never lose them.
#[derive(Debug, Clone)]
pub struct CursorStore {
    database_watermark: i64,
    audit_offset: u64,
}

impl CursorStore {
    pub fn new() -> Self {
        Self {
            database_watermark: Utc::now().timestamp(),
            audit_offset: 0,
        }
    }

    /// Start the database watermark at a fixed point in time (backfill).
    pub fn starting_at(database_watermark: i64) -> Self {
        Self {
            database_watermark,
            audit_offset: 0,
        }
    }

    pub fn database_watermark(&self) -> i64 {
        self.database_watermark
    }

    pub fn audit_offset(&self) -> u64 {
        self.audit_offset
    }

    /// Advance the database watermark. Never moves backwards.
    pub fn advance_database(&mut self, candidate: i64) {
        self.database_watermark = self.database_watermark.max(candidate);
    }

    /// Advance the audit log offset. Never moves backwards.
    pub fn advance_audit(&mut self, candidate: u64) {
        self.audit_offset = self.audit_offset.max(candidate);
    }
}

impl Default for CursorStore {
    fn default() -> Self {
        Self::new()
    }
}

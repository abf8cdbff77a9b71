use crate::cursor::CursorStore;
use crate::event::{LogEvent, Origin};
use chrono::{DateTime, NaiveDateTime};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags};
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Pulls user and chat activity out of the OpenWebUI SQLite database.
///
/// Both sub-queries run against one watermark snapshot taken at the start of
/// the cycle; the cursor is advanced once afterwards, to the maximum
/// timestamp observed across both. Advancing between the queries would let a
/// chat row older than the newest user row slip through the gap.
pub struct DatabaseExtractor {
    path: PathBuf,
}

impl DatabaseExtractor {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Extract all activity newer than the cursor's watermark, in ascending
    /// source-timestamp order per category.
    ///
    /// Query and connection errors are not fatal to the run: they are logged
    /// and the cycle continues with an empty result, leaving the watermark
    /// untouched so the next cycle retries the same window.
    pub fn extract(&self, cursor: &mut CursorStore) -> Vec<LogEvent> {
        let watermark = cursor.database_watermark();
        match self.query_since(watermark) {
            Ok((events, max_seen)) => {
                cursor.advance_database(max_seen);
                events
            }
            Err(e) => {
                error!(
                    error = %e,
                    db = %self.path.display(),
                    "failed to extract from database"
                );
                Vec::new()
            }
        }
    }

    fn query_since(&self, watermark: i64) -> Result<(Vec<LogEvent>, i64), DatabaseError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let mut events = Vec::new();
        let mut max_seen = watermark;

        collect_user_activity(&conn, watermark, &mut events, &mut max_seen)?;
        collect_chat_activity(&conn, watermark, &mut events, &mut max_seen)?;

        Ok((events, max_seen))
    }
}

fn collect_user_activity(
    conn: &Connection,
    watermark: i64,
    events: &mut Vec<LogEvent>,
    max_seen: &mut i64,
) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, email, role, last_active_at, created_at, updated_at
         FROM user
         WHERE last_active_at > ?1
         ORDER BY last_active_at ASC",
    )?;

    let rows = stmt.query_map([watermark], |row| {
        Ok((
            row.get::<_, SqlValue>(0)?,
            row.get::<_, SqlValue>(1)?,
            row.get::<_, SqlValue>(2)?,
            row.get::<_, SqlValue>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, SqlValue>(5)?,
            row.get::<_, SqlValue>(6)?,
        ))
    })?;

    for row in rows {
        let (id, name, email, role, last_active_at, created_at, updated_at) = row?;

        let mut fields = Map::new();
        fields.insert("user_id".to_string(), sql_to_json(id));
        fields.insert("user_name".to_string(), sql_to_json(name));
        fields.insert("user_email".to_string(), sql_to_json(email));
        fields.insert("user_role".to_string(), sql_to_json(role));
        fields.insert("created_at".to_string(), sql_to_json(created_at));
        fields.insert("updated_at".to_string(), sql_to_json(updated_at));

        events.push(LogEvent {
            timestamp_ns: last_active_at * 1_000_000_000,
            origin: Origin::Database,
            category: "user_activity",
            fields,
        });
        *max_seen = (*max_seen).max(last_active_at);
    }

    Ok(())
}

fn collect_chat_activity(
    conn: &Connection,
    watermark: i64,
    events: &mut Vec<LogEvent>,
    max_seen: &mut i64,
) -> Result<(), DatabaseError> {
    // chat.updated_at is ISO-8601 text, so the epoch watermark cannot be
    // bound in SQL; rows are ordered here (lexicographic == chronological
    // for a uniform format) and filtered after parsing.
    let mut stmt = conn.prepare(
        "SELECT c.id, c.user_id, c.title, c.created_at, c.updated_at,
                u.name, u.email
         FROM chat c
         JOIN user u ON c.user_id = u.id
         ORDER BY c.updated_at ASC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, SqlValue>(0)?,
            row.get::<_, SqlValue>(1)?,
            row.get::<_, SqlValue>(2)?,
            row.get::<_, SqlValue>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, SqlValue>(5)?,
            row.get::<_, SqlValue>(6)?,
        ))
    })?;

    for row in rows {
        let (id, user_id, title, created_at, updated_at, user_name, user_email) = row?;

        let Some(updated_epoch) = parse_iso_epoch(&updated_at) else {
            warn!(updated_at = %updated_at, "skipping chat row with unparseable timestamp");
            continue;
        };
        if updated_epoch <= watermark {
            continue;
        }

        let mut fields = Map::new();
        fields.insert("chat_id".to_string(), sql_to_json(id));
        fields.insert("user_id".to_string(), sql_to_json(user_id));
        fields.insert("user_name".to_string(), sql_to_json(user_name));
        fields.insert("user_email".to_string(), sql_to_json(user_email));
        fields.insert("title".to_string(), sql_to_json(title));
        fields.insert("created_at".to_string(), sql_to_json(created_at));

        events.push(LogEvent {
            timestamp_ns: updated_epoch * 1_000_000_000,
            origin: Origin::Database,
            category: "chat_activity",
            fields,
        });
        *max_seen = (*max_seen).max(updated_epoch);
    }

    Ok(())
}

/// Parse an ISO-8601 timestamp to epoch seconds. Accepts RFC 3339 and the
/// offset-less form OpenWebUI writes, which is treated as UTC.
fn parse_iso_epoch(value: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp());
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc().timestamp())
        .ok()
}

fn sql_to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(b) => Value::String(String::from_utf8_lossy(&b).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_db(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("webui.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE user (
                 id TEXT PRIMARY KEY,
                 name TEXT,
                 email TEXT,
                 role TEXT,
                 last_active_at INTEGER,
                 created_at INTEGER,
                 updated_at INTEGER
             );
             CREATE TABLE chat (
                 id TEXT PRIMARY KEY,
                 user_id TEXT,
                 title TEXT,
                 created_at INTEGER,
                 updated_at TEXT
             );",
        )
        .unwrap();
        path
    }

    fn insert_user(path: &PathBuf, id: &str, last_active_at: i64) {
        let conn = Connection::open(path).unwrap();
        conn.execute(
            "INSERT INTO user (id, name, email, role, last_active_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'user', ?4, 100, ?4)",
            rusqlite::params![id, format!("name-{id}"), format!("{id}@example.com"), last_active_at],
        )
        .unwrap();
    }

    fn insert_chat(path: &PathBuf, id: &str, user_id: &str, updated_at: &str) {
        let conn = Connection::open(path).unwrap();
        conn.execute(
            "INSERT INTO chat (id, user_id, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, 100, ?4)",
            rusqlite::params![id, user_id, format!("chat {id}"), updated_at],
        )
        .unwrap();
    }

    #[test]
    fn test_user_activity_extraction() {
        let dir = TempDir::new().unwrap();
        let path = create_test_db(&dir);
        insert_user(&path, "u1", 1000);

        let extractor = DatabaseExtractor::new(path);
        let mut cursors = CursorStore::starting_at(500);

        let events = extractor.extract(&mut cursors);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp_ns, 1000 * 1_000_000_000);
        assert_eq!(events[0].origin, Origin::Database);
        assert_eq!(events[0].category, "user_activity");
        assert_eq!(events[0].fields["user_id"], json!("u1"));
        assert_eq!(events[0].fields["user_email"], json!("u1@example.com"));
        assert!(!events[0].fields.contains_key("timestamp"));
        assert_eq!(cursors.database_watermark(), 1000);

        // No new rows: the second cycle is empty and the watermark holds
        let events = extractor.extract(&mut cursors);
        assert!(events.is_empty());
        assert_eq!(cursors.database_watermark(), 1000);
    }

    #[test]
    fn test_rows_at_watermark_are_excluded() {
        let dir = TempDir::new().unwrap();
        let path = create_test_db(&dir);
        insert_user(&path, "u1", 500);

        let extractor = DatabaseExtractor::new(path);
        let mut cursors = CursorStore::starting_at(500);

        // Predicate is strictly greater-than
        assert!(extractor.extract(&mut cursors).is_empty());
    }

    #[test]
    fn test_chat_activity_with_join() {
        let dir = TempDir::new().unwrap();
        let path = create_test_db(&dir);
        insert_user(&path, "u1", 0);
        insert_chat(&path, "c1", "u1", "2024-05-01T10:00:00");

        let expected_epoch = NaiveDateTime::parse_from_str("2024-05-01T10:00:00", "%Y-%m-%dT%H:%M:%S")
            .unwrap()
            .and_utc()
            .timestamp();

        let extractor = DatabaseExtractor::new(path);
        let mut cursors = CursorStore::starting_at(500);

        let events = extractor.extract(&mut cursors);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, "chat_activity");
        assert_eq!(events[0].timestamp_ns, expected_epoch * 1_000_000_000);
        assert_eq!(events[0].fields["chat_id"], json!("c1"));
        assert_eq!(events[0].fields["user_name"], json!("name-u1"));
        assert_eq!(events[0].fields["user_email"], json!("u1@example.com"));
        assert_eq!(cursors.database_watermark(), expected_epoch);
    }

    #[test]
    fn test_chat_row_not_hidden_by_newer_user_row() {
        // A user row newer than a chat row in the same cycle must not advance
        // the watermark past the chat row: both queries see one snapshot.
        let dir = TempDir::new().unwrap();
        let path = create_test_db(&dir);
        insert_user(&path, "u1", 2000);
        // 1500 epoch, between the watermark (1000) and the user row (2000)
        insert_chat(&path, "c1", "u1", "1970-01-01T00:25:00");

        let extractor = DatabaseExtractor::new(path);
        let mut cursors = CursorStore::starting_at(1000);

        let events = extractor.extract(&mut cursors);
        let categories: Vec<&str> = events.iter().map(|e| e.category).collect();
        assert_eq!(categories, vec!["user_activity", "chat_activity"]);
        assert_eq!(cursors.database_watermark(), 2000);
    }

    #[test]
    fn test_ascending_emission_order() {
        let dir = TempDir::new().unwrap();
        let path = create_test_db(&dir);
        insert_user(&path, "u2", 3000);
        insert_user(&path, "u1", 2000);

        let extractor = DatabaseExtractor::new(path);
        let mut cursors = CursorStore::starting_at(1000);

        let events = extractor.extract(&mut cursors);
        let stamps: Vec<i64> = events.iter().map(|e| e.timestamp_ns).collect();
        assert_eq!(stamps, vec![2000 * 1_000_000_000, 3000 * 1_000_000_000]);
    }

    #[test]
    fn test_unparseable_chat_timestamp_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = create_test_db(&dir);
        insert_user(&path, "u1", 0);
        insert_chat(&path, "c1", "u1", "not-a-timestamp");
        insert_chat(&path, "c2", "u1", "2024-05-01T10:00:00");

        let extractor = DatabaseExtractor::new(path);
        let mut cursors = CursorStore::starting_at(500);

        let events = extractor.extract(&mut cursors);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].fields["chat_id"], json!("c2"));
    }

    #[test]
    fn test_missing_database_yields_empty_result() {
        let dir = TempDir::new().unwrap();
        let extractor = DatabaseExtractor::new(dir.path().join("nope.db"));
        let mut cursors = CursorStore::starting_at(500);

        assert!(extractor.extract(&mut cursors).is_empty());
        assert_eq!(cursors.database_watermark(), 500);
    }

    #[test]
    fn test_parse_iso_epoch_formats() {
        assert_eq!(parse_iso_epoch("1970-01-01T00:00:10"), Some(10));
        assert_eq!(parse_iso_epoch("1970-01-01T00:00:10.500"), Some(10));
        assert_eq!(parse_iso_epoch("1970-01-01T00:00:10+00:00"), Some(10));
        assert_eq!(parse_iso_epoch("1970-01-01T01:00:10+01:00"), Some(10));
        assert_eq!(parse_iso_epoch("garbage"), None);
    }
}

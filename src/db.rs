use crate::error::StoreError;
use crate::parser::{Dataset, SourceKind};
use crate::record::Record;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

// ============================================================================
// FILE SLOTS
// ============================================================================

/// Fixed keys the session is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileSlot {
    De,
    Product,
    Barcode,
}

impl FileSlot {
    pub const ALL: [FileSlot; 3] = [FileSlot::De, FileSlot::Product, FileSlot::Barcode];

    pub fn id(&self) -> &'static str {
        match self {
            FileSlot::De => "deFile",
            FileSlot::Product => "productFile",
            FileSlot::Barcode => "barcodeFile",
        }
    }
}

impl FromStr for FileSlot {
    type Err = StoreError;

    /// Accepts the slot id (`deFile`) or the short source code (`de`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deFile" | "de" => Ok(FileSlot::De),
            "productFile" | "product" => Ok(FileSlot::Product),
            "barcodeFile" | "barcode" => Ok(FileSlot::Barcode),
            other => Err(StoreError::UnknownSlot(other.to_string())),
        }
    }
}

impl From<SourceKind> for FileSlot {
    fn from(kind: SourceKind) -> Self {
        match kind {
            SourceKind::De => FileSlot::De,
            SourceKind::Product => FileSlot::Product,
            SourceKind::Barcode => FileSlot::Barcode,
        }
    }
}

// ============================================================================
// STORED FILE
// ============================================================================

/// An uploaded file as kept between sessions.
/// `merged_data` is only ever set on the DE slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: String,
    pub name: String,
    pub file_type: String,
    pub size: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<Record>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_data: Option<Vec<Record>>,

    /// SHA-256 of the JSON-encoded content, to spot re-uploads of the same data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    pub saved_at: DateTime<Utc>,
}

impl StoredFile {
    /// File metadata only, content not parsed yet.
    pub fn new(slot: FileSlot, name: &str, file_type: &str, size: u64) -> Self {
        StoredFile {
            id: slot.id().to_string(),
            name: name.to_string(),
            file_type: file_type.to_string(),
            size,
            content: None,
            merged_data: None,
            content_hash: None,
            saved_at: Utc::now(),
        }
    }

    pub fn from_dataset(slot: FileSlot, dataset: &Dataset) -> Self {
        StoredFile::new(slot, &dataset.name, dataset.file_type.as_str(), dataset.size)
            .with_content(dataset.records.clone())
    }

    /// Builder pattern: attach parsed content
    pub fn with_content(mut self, content: Vec<Record>) -> Self {
        self.content_hash = Some(content_hash(&content));
        self.content = Some(content);
        self
    }

    pub fn slot(&self) -> Option<FileSlot> {
        self.id.parse().ok()
    }

    pub fn row_count(&self) -> usize {
        self.content.as_ref().map_or(0, Vec::len)
    }
}

/// SHA-256 over the JSON encoding of a record list.
pub fn content_hash(records: &[Record]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        // Record serialization cannot fail: keys are strings, values are scalars.
        if let Ok(json) = serde_json::to_vec(record) {
            hasher.update(&json);
        }
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// EVENTS (audit trail)
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(event_type: &str, entity_id: &str, data: serde_json::Value, actor: &str) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open session database {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery (in-memory databases silently stay in "memory" mode)
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS files (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            file_type TEXT NOT NULL,
            size INTEGER NOT NULL,
            content TEXT,
            merged_data TEXT,
            content_hash TEXT,
            saved_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// FILE OPERATIONS
// ============================================================================

/// Insert or replace the file stored under `file.id`.
pub fn save_file(conn: &Connection, file: &StoredFile) -> Result<()> {
    let content_json = file
        .content
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let merged_json = file
        .merged_data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO files (id, name, file_type, size, content, merged_data, content_hash, saved_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            file_type = excluded.file_type,
            size = excluded.size,
            content = excluded.content,
            merged_data = excluded.merged_data,
            content_hash = excluded.content_hash,
            saved_at = excluded.saved_at",
        params![
            file.id,
            file.name,
            file.file_type,
            file.size as i64,
            content_json,
            merged_json,
            file.content_hash,
            file.saved_at.to_rfc3339(),
        ],
    )
    .with_context(|| format!("Failed to save {}", file.id))?;

    debug!(slot = %file.id, name = %file.name, rows = file.row_count(), "saved file");
    Ok(())
}

pub fn get_file(conn: &Connection, slot: FileSlot) -> Result<Option<StoredFile>> {
    let row = conn
        .query_row(
            "SELECT id, name, file_type, size, content, merged_data, content_hash, saved_at
             FROM files WHERE id = ?1",
            params![slot.id()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, String>(7)?,
                ))
            },
        )
        .optional()?;

    let Some((id, name, file_type, size, content, merged, content_hash, saved_at)) = row else {
        return Ok(None);
    };

    let content = content
        .map(|json| serde_json::from_str(&json))
        .transpose()
        .with_context(|| format!("Corrupt content stored for {}", id))?;
    let merged_data = merged
        .map(|json| serde_json::from_str(&json))
        .transpose()
        .with_context(|| format!("Corrupt merged data stored for {}", id))?;
    let saved_at = DateTime::parse_from_rfc3339(&saved_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(Some(StoredFile {
        id,
        name,
        file_type,
        size: size.max(0) as u64,
        content,
        merged_data,
        content_hash,
        saved_at,
    }))
}

/// Returns true when something was deleted.
pub fn delete_file(conn: &Connection, slot: FileSlot) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM files WHERE id = ?1", params![slot.id()])?;
    Ok(deleted > 0)
}

/// Forget every stored file ("Clear All").
pub fn clear_session(conn: &Connection) -> Result<usize> {
    let deleted = conn.execute("DELETE FROM files", [])?;

    let event = Event::new(
        "session_cleared",
        "session",
        serde_json::json!({ "files_deleted": deleted }),
        "user",
    );
    insert_event(conn, &event)?;

    info!(deleted, "session cleared");
    Ok(deleted)
}

/// Attach merged rows to the stored DE file. Returns false when no DE file
/// is stored (nothing to attach to).
pub fn save_merged(conn: &Connection, records: &[Record]) -> Result<bool> {
    let Some(mut de_file) = get_file(conn, FileSlot::De)? else {
        return Ok(false);
    };

    de_file.merged_data = Some(records.to_vec());
    de_file.saved_at = Utc::now();
    save_file(conn, &de_file)?;

    let event = Event::new(
        "merge_saved",
        FileSlot::De.id(),
        serde_json::json!({
            "rows": records.len(),
            "content_hash": content_hash(records),
        }),
        "merge_engine",
    );
    insert_event(conn, &event)?;

    Ok(true)
}

pub fn load_merged(conn: &Connection) -> Result<Option<Vec<Record>>> {
    Ok(get_file(conn, FileSlot::De)?.and_then(|f| f.merged_data))
}

// ============================================================================
// EVENT OPERATIONS
// ============================================================================

pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (event_id, timestamp, event_type, entity_id, data, actor)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

pub fn get_events_for_entity(conn: &Connection, entity_id: &str) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_id, data, actor
         FROM events WHERE entity_id = ?1 ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![entity_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut events = Vec::new();
    for row in rows {
        let (event_id, timestamp, event_type, entity_id, data, actor) = row?;
        events.push(Event {
            event_id,
            timestamp: DateTime::parse_from_rfc3339(&timestamp)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            event_type,
            entity_id,
            data: serde_json::from_str(&data).unwrap_or(serde_json::Value::Null),
            actor,
        });
    }

    Ok(events)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CellValue;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn rows() -> Vec<Record> {
        vec![Record::from_pairs([
            ("SKU", CellValue::from("AAA001")),
            ("Price", CellValue::from(10)),
        ])]
    }

    #[test]
    fn test_slot_ids() {
        assert_eq!(FileSlot::De.id(), "deFile");
        assert_eq!(FileSlot::Product.id(), "productFile");
        assert_eq!("productFile".parse::<FileSlot>().unwrap(), FileSlot::Product);
        assert_eq!("barcode".parse::<FileSlot>().unwrap(), FileSlot::Barcode);
        assert!("other".parse::<FileSlot>().is_err());
    }

    #[test]
    fn test_save_and_get_file_roundtrip() {
        let conn = memory_db();
        let file = StoredFile::new(FileSlot::De, "de.csv", "csv", 2048).with_content(rows());

        save_file(&conn, &file).unwrap();
        let loaded = get_file(&conn, FileSlot::De).unwrap().unwrap();

        assert_eq!(loaded.name, "de.csv");
        assert_eq!(loaded.size, 2048);
        assert_eq!(loaded.content, Some(rows()));
        assert_eq!(loaded.content_hash, file.content_hash);
        assert_eq!(loaded.slot(), Some(FileSlot::De));
        assert!(get_file(&conn, FileSlot::Product).unwrap().is_none());
    }

    #[test]
    fn test_save_file_replaces_existing_slot() {
        let conn = memory_db();
        save_file(&conn, &StoredFile::new(FileSlot::Product, "old.csv", "csv", 1)).unwrap();
        save_file(&conn, &StoredFile::new(FileSlot::Product, "new.xlsx", "xlsx", 2)).unwrap();

        let loaded = get_file(&conn, FileSlot::Product).unwrap().unwrap();
        assert_eq!(loaded.name, "new.xlsx");
        assert_eq!(loaded.content, None);
    }

    #[test]
    fn test_merged_data_lives_on_de_slot() {
        let conn = memory_db();
        assert!(!save_merged(&conn, &rows()).unwrap());

        save_file(&conn, &StoredFile::new(FileSlot::De, "de.csv", "csv", 10)).unwrap();
        assert!(save_merged(&conn, &rows()).unwrap());

        assert_eq!(load_merged(&conn).unwrap(), Some(rows()));
        let events = get_events_for_entity(&conn, "deFile").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "merge_saved");
        assert_eq!(events[0].data["rows"], 1);
    }

    #[test]
    fn test_delete_and_clear() {
        let conn = memory_db();
        for slot in FileSlot::ALL {
            save_file(&conn, &StoredFile::new(slot, "f.csv", "csv", 1)).unwrap();
        }

        assert!(delete_file(&conn, FileSlot::Barcode).unwrap());
        assert!(!delete_file(&conn, FileSlot::Barcode).unwrap());
        assert_eq!(clear_session(&conn).unwrap(), 2);
        assert!(get_file(&conn, FileSlot::De).unwrap().is_none());
    }

    #[test]
    fn test_content_hash_changes_with_content() {
        let mut other = rows();
        other[0].set("Price", 11);

        assert_eq!(content_hash(&rows()), content_hash(&rows()));
        assert_ne!(content_hash(&rows()), content_hash(&other));
    }

    #[test]
    fn test_open_database_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.db");

        {
            let conn = open_database(&path).unwrap();
            save_file(&conn, &StoredFile::new(FileSlot::De, "de.csv", "csv", 1)).unwrap();
        }

        let conn = open_database(&path).unwrap();
        assert!(get_file(&conn, FileSlot::De).unwrap().is_some());
    }
}

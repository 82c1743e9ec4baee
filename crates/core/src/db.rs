use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::materialize::NoteSink;
use crate::models::{CardOptions, CardRecord, NoteId};

/// Flashcard notes persisted in a standalone SQLite database.
pub struct SqliteNoteStore {
    conn: Connection,
    note_type: String,
}

#[derive(Debug, Clone)]
pub struct StoredNote {
    pub id: NoteId,
    pub note_type: String,
    pub card: CardRecord,
    pub created_at: SystemTime,
}

impl SqliteNoteStore {
    pub fn open(path: &Path, options: &CardOptions) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, options)
    }

    pub fn open_in_memory(options: &CardOptions) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, options)
    }

    fn from_connection(conn: Connection, options: &CardOptions) -> Result<Self> {
        let store = Self {
            conn,
            note_type: options.note_type.clone(),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS notes (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              note_type TEXT NOT NULL,
              front TEXT NOT NULL,
              back TEXT NOT NULL,
              tag TEXT,
              created_at_secs INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_notes_back ON notes(back);
            "#,
        )?;
        Ok(())
    }

    pub fn note_type(&self) -> &str {
        &self.note_type
    }

    pub fn count_notes(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM notes", [], |r| r.get(0))?;
        Ok(count.max(0) as u64)
    }

    pub fn list_notes(&self) -> Result<Vec<StoredNote>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, note_type, front, back, tag, created_at_secs
            FROM notes
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map([], |r| {
            let created_at_secs: Option<i64> = r.get(5)?;
            Ok(StoredNote {
                id: r.get(0)?,
                note_type: r.get(1)?,
                card: CardRecord {
                    front: r.get(2)?,
                    back: r.get(3)?,
                    tag: r.get(4)?,
                },
                created_at: created_at_secs
                    .map(|v| secs_to_system_time(v.max(0) as u64))
                    .unwrap_or(UNIX_EPOCH),
            })
        })?;

        let mut notes = Vec::new();
        for row in rows {
            notes.push(row?);
        }
        Ok(notes)
    }
}

impl NoteSink for SqliteNoteStore {
    fn add_note(&mut self, card: &CardRecord) -> Result<NoteId> {
        self.conn.execute(
            r#"
            INSERT INTO notes (note_type, front, back, tag, created_at_secs)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                self.note_type,
                card.front,
                card.back,
                card.tag,
                system_time_to_secs(SystemTime::now()) as i64,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }
}

fn system_time_to_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}

fn secs_to_system_time(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

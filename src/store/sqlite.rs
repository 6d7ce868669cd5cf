//! SQLite-backed note store.
//!
//! A single connection sits behind a mutex; every call hops onto the blocking
//! pool so request handlers never block the async runtime on disk IO.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{NoteStore, StoreError};
use crate::domain::{Category, NewNote, Note, User, UserId, UserStats, DEFAULT_STORAGE_LIMIT_BYTES};
use crate::retention::SweepHook;

/// Tables, indexes and built-in categories. Safe to run on every open.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL,
    email TEXT UNIQUE NOT NULL,
    storage_limit_bytes INTEGER NOT NULL DEFAULT 262144000 CHECK (storage_limit_bytes >= 0),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER REFERENCES users (id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    color TEXT NOT NULL DEFAULT '#007bff'
);

CREATE TABLE IF NOT EXISTS notes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    category_id INTEGER REFERENCES categories (id) ON DELETE SET NULL,
    title TEXT NOT NULL,
    original_filename TEXT,
    transcription_text TEXT,
    summary_text TEXT,
    file_size INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notes_user_id ON notes (user_id);
CREATE INDEX IF NOT EXISTS idx_notes_category_id ON notes (category_id);
CREATE INDEX IF NOT EXISTS idx_notes_original_filename ON notes (original_filename);
CREATE INDEX IF NOT EXISTS idx_categories_user_id ON categories (user_id);

INSERT OR IGNORE INTO categories (id, user_id, name, color) VALUES
    (1, NULL, 'General', '#007bff'),
    (2, NULL, 'Lectures', '#28a745'),
    (3, NULL, 'Meetings', '#ffc107'),
    (4, NULL, 'Presentations', '#dc3545'),
    (5, NULL, 'Study Notes', '#6f42c1');
"#;

const NOTE_SELECT: &str = "SELECT n.id, n.user_id, n.category_id, c.name, c.color, n.title, \
     n.original_filename, n.transcription_text, n.summary_text, n.file_size, \
     n.created_at, n.updated_at \
     FROM notes n LEFT JOIN categories c ON n.category_id = c.id";

/// Note store over a SQLite database file
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and bootstrap the schema
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Open a private in-memory database (tests, dry runs)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn call<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Task("connection mutex poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Create a user with the given quota (default 250 MB)
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        storage_limit_bytes: Option<i64>,
    ) -> Result<User, StoreError> {
        let username = username.to_string();
        let email = email.to_string();
        let limit = storage_limit_bytes.unwrap_or(DEFAULT_STORAGE_LIMIT_BYTES);

        self.call(move |conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO users (username, email, storage_limit_bytes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![username, email, limit, now],
            )?;
            let id = conn.last_insert_rowid();
            load_user(conn, id)?.ok_or(StoreError::UserNotFound(id))
        })
        .await
    }

    // ========================================================================
    // Notes
    // ========================================================================

    /// Persist a new note for `user_id`
    pub async fn create_note(&self, user_id: UserId, note: NewNote) -> Result<Note, StoreError> {
        self.call(move |conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO notes (user_id, category_id, title, original_filename,
                    transcription_text, summary_text, file_size, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    user_id,
                    note.category_id,
                    note.title,
                    note.original_filename,
                    note.transcription_text,
                    note.summary_text,
                    note.file_size,
                    now
                ],
            )?;
            let id = conn.last_insert_rowid();
            load_note(conn, id, user_id)?
                .ok_or_else(|| StoreError::Task(format!("note {} vanished after insert", id)))
        })
        .await
    }

    /// List a user's notes, newest first
    pub async fn notes_for_user(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Note>, StoreError> {
        self.call(move |conn| {
            let sql = format!(
                "{} WHERE n.user_id = ?1 ORDER BY n.created_at DESC, n.id DESC LIMIT ?2 OFFSET ?3",
                NOTE_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let notes = stmt
                .query_map(params![user_id, limit, offset], note_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(notes)
        })
        .await
    }

    /// Fetch one of the user's notes
    pub async fn get_note(&self, note_id: i64, user_id: UserId) -> Result<Option<Note>, StoreError> {
        self.call(move |conn| load_note(conn, note_id, user_id)).await
    }

    /// Delete one of the user's notes, returning the removed row
    pub async fn delete_note(&self, note_id: i64, user_id: UserId) -> Result<Option<Note>, StoreError> {
        self.call(move |conn| {
            let Some(note) = load_note(conn, note_id, user_id)? else {
                return Ok(None);
            };
            conn.execute(
                "DELETE FROM notes WHERE id = ?1 AND user_id = ?2",
                params![note_id, user_id],
            )?;
            Ok(Some(note))
        })
        .await
    }

    /// Case-insensitive substring search over title, transcript and summary
    pub async fn search_notes(&self, user_id: UserId, term: &str) -> Result<Vec<Note>, StoreError> {
        let pattern = format!("%{}%", escape_like(term));
        self.call(move |conn| {
            let sql = format!(
                "{} WHERE n.user_id = ?1 AND (n.title LIKE ?2 ESCAPE '\\' \
                 OR n.transcription_text LIKE ?2 ESCAPE '\\' \
                 OR n.summary_text LIKE ?2 ESCAPE '\\') ORDER BY n.created_at DESC, n.id DESC",
                NOTE_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let notes = stmt
                .query_map(params![user_id, pattern], note_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(notes)
        })
        .await
    }

    /// Null out `file_size` on every note referencing one of `filenames`.
    /// Returns the number of notes updated.
    pub async fn detach_audio_files(&self, filenames: &[String]) -> Result<usize, StoreError> {
        let filenames = filenames.to_vec();
        self.call(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let now = Utc::now();
            let mut updated = 0;
            {
                let mut stmt = tx.prepare(
                    "UPDATE notes SET file_size = NULL, updated_at = ?1
                     WHERE original_filename = ?2 AND file_size IS NOT NULL",
                )?;
                for name in &filenames {
                    updated += stmt.execute(params![now, name])?;
                }
            }
            tx.commit()?;
            Ok(updated)
        })
        .await
    }

    // ========================================================================
    // Categories and stats
    // ========================================================================

    /// The user's categories plus the built-in ones, by name
    pub async fn categories_for_user(&self, user_id: UserId) -> Result<Vec<Category>, StoreError> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, name, color FROM categories
                 WHERE user_id = ?1 OR user_id IS NULL ORDER BY name",
            )?;
            let categories = stmt
                .query_map(params![user_id], category_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(categories)
        })
        .await
    }

    /// Create a category owned by `user_id`
    pub async fn create_category(
        &self,
        user_id: UserId,
        name: &str,
        color: &str,
    ) -> Result<Category, StoreError> {
        let name = name.to_string();
        let color = color.to_string();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO categories (user_id, name, color) VALUES (?1, ?2, ?3)",
                params![user_id, name, color],
            )?;
            Ok(Category {
                id: conn.last_insert_rowid(),
                user_id: Some(user_id),
                name,
                color,
            })
        })
        .await
    }

    /// Aggregate note statistics for a user
    pub async fn user_stats(&self, user_id: UserId) -> Result<UserStats, StoreError> {
        self.call(move |conn| {
            let stats = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(file_size), 0), COUNT(DISTINCT category_id),
                        MAX(created_at)
                 FROM notes WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserStats {
                        total_notes: row.get(0)?,
                        total_size: row.get(1)?,
                        categories_used: row.get(2)?,
                        last_note_date: row.get::<_, Option<DateTime<Utc>>>(3)?,
                    })
                },
            )?;
            Ok(stats)
        })
        .await
    }
}

#[async_trait]
impl NoteStore for SqliteStore {
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        self.call(move |conn| load_user(conn, user_id)).await
    }

    async fn sum_file_sizes_for_user(&self, user_id: UserId) -> Result<i64, StoreError> {
        self.call(move |conn| {
            let used = conn.query_row(
                "SELECT COALESCE(SUM(file_size), 0) FROM notes WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )?;
            Ok(used)
        })
        .await
    }

    async fn set_user_limit(&self, user_id: UserId, limit_bytes: i64) -> Result<(), StoreError> {
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE users SET storage_limit_bytes = ?1, updated_at = ?2 WHERE id = ?3",
                params![limit_bytes, Utc::now(), user_id],
            )?;
            if changed == 0 {
                return Err(StoreError::UserNotFound(user_id));
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl SweepHook for SqliteStore {
    async fn files_deleted(&self, names: &[String]) -> anyhow::Result<()> {
        let detached = self.detach_audio_files(names).await?;
        tracing::debug!(detached, "released quota for swept audio files");
        Ok(())
    }
}

fn load_user(conn: &Connection, user_id: UserId) -> Result<Option<User>, StoreError> {
    let user = conn
        .query_row(
            "SELECT id, username, email, storage_limit_bytes, created_at, updated_at
             FROM users WHERE id = ?1",
            params![user_id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    email: row.get(2)?,
                    storage_limit_bytes: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

fn load_note(conn: &Connection, note_id: i64, user_id: UserId) -> Result<Option<Note>, StoreError> {
    let sql = format!("{} WHERE n.id = ?1 AND n.user_id = ?2", NOTE_SELECT);
    let note = conn
        .query_row(&sql, params![note_id, user_id], note_from_row)
        .optional()?;
    Ok(note)
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category_id: row.get(2)?,
        category_name: row.get(3)?,
        category_color: row.get(4)?,
        title: row.get(5)?,
        original_filename: row.get(6)?,
        transcription_text: row.get(7)?,
        summary_text: row.get(8)?,
        file_size: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

/// Make `%`, `_` and `\` in a search term match literally
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        color: row.get(3)?,
    })
}

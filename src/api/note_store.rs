// Copyright 2025 mobile_rag_engine contributors
// SPDX-License-Identifier: MIT
//
// Licensed under the MIT License. You may obtain a copy of the License at
// https://opensource.org/licenses/MIT
//
// This software is provided "AS IS", without warranty of any kind, express or
// implied, including but not limited to the warranties of merchantability,
// fitness for a particular purpose, and noninfringement. In no event shall the
// authors or copyright holders be liable for any claim, damages, or other
// liability arising from the use of this software.
//
// CONTRIBUTOR GUIDELINES:
// This file is part of the core engine. Any modifications require owner approval.
// Please submit a PR with detailed explanation of changes before modifying.
//
//! Note storage: the records retrieval reads from.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};
use async_trait::async_trait;
use log::{debug, info};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::api::db_pool::{create_pool, SqliteConnection, SqlitePool};
use crate::api::error::RagError;

/// A stored note with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredItem {
    pub id: i64,
    pub text: String,
    pub vector: Vec<f32>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

#[async_trait]
pub trait NoteStore: Send + Sync {
    /// All notes, newest first.
    async fn list_all(&self) -> Result<Vec<StoredItem>, RagError>;
    async fn get_by_id(&self, id: i64) -> Result<Option<StoredItem>, RagError>;
    /// Persist a note and return its id.
    async fn insert(&self, text: String, vector: Vec<f32>) -> Result<i64, RagError>;
    /// Returns true if a note was removed.
    async fn delete_by_id(&self, id: i64) -> Result<bool, RagError>;
    async fn count(&self) -> Result<usize, RagError>;
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn ensure_vector(vector: &[f32]) -> Result<(), RagError> {
    if vector.is_empty() {
        return Err(RagError::InvalidInput("Embedding vector is empty".to_string()));
    }
    Ok(())
}

fn newest_first(items: &mut [StoredItem]) {
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

/// Volatile store for hosts without a database.
pub struct MemoryNoteStore {
    items: RwLock<Vec<StoredItem>>,
    next_id: AtomicI64,
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        Self { items: RwLock::new(Vec::new()), next_id: AtomicI64::new(1) }
    }
}

impl Default for MemoryNoteStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> RagError {
    RagError::InternalError(format!("Lock error: {}", e))
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    async fn list_all(&self) -> Result<Vec<StoredItem>, RagError> {
        let mut items = self.items.read().map_err(poisoned)?.clone();
        newest_first(&mut items);
        Ok(items)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<StoredItem>, RagError> {
        Ok(self.items.read().map_err(poisoned)?.iter().find(|i| i.id == id).cloned())
    }

    async fn insert(&self, text: String, vector: Vec<f32>) -> Result<i64, RagError> {
        ensure_vector(&vector)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.items.write().map_err(poisoned)?.push(StoredItem { id, text, vector, created_at: now_millis() });
        debug!("[note_store] Inserted note {} (memory)", id);
        Ok(id)
    }

    async fn delete_by_id(&self, id: i64) -> Result<bool, RagError> {
        let mut items = self.items.write().map_err(poisoned)?;
        let before = items.len();
        items.retain(|i| i.id != id);
        Ok(items.len() < before)
    }

    async fn count(&self) -> Result<usize, RagError> {
        Ok(self.items.read().map_err(poisoned)?.len())
    }
}

/// SQLite-backed store. Vectors are persisted as JSON arrays.
pub struct SqliteNoteStore {
    pool: SqlitePool,
}

impl SqliteNoteStore {
    /// Open (or create) the database at `db_path` and ensure the schema exists.
    pub fn open(db_path: &str, pool_size: u32) -> Result<Self, RagError> {
        let store = Self { pool: create_pool(db_path, pool_size)? };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<SqliteConnection, RagError> {
        Ok(self.pool.get()?)
    }

    fn init_schema(&self) -> Result<(), RagError> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS notes (
                id INTEGER PRIMARY KEY,
                content TEXT NOT NULL,
                embedding TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_notes_created_at ON notes(created_at)", [])?;
        info!("[note_store] Schema ready");
        Ok(())
    }

    fn decode_rows(rows: Vec<(i64, String, String, i64)>) -> Result<Vec<StoredItem>, RagError> {
        rows.into_iter()
            .map(|(id, text, embedding_json, created_at)| {
                let vector: Vec<f32> = serde_json::from_str(&embedding_json)?;
                Ok(StoredItem { id, text, vector, created_at })
            })
            .collect()
    }
}

#[async_trait]
impl NoteStore for SqliteNoteStore {
    async fn list_all(&self) -> Result<Vec<StoredItem>, RagError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, content, embedding, created_at FROM notes ORDER BY created_at DESC, id DESC"
        )?;
        let rows: Vec<(i64, String, String, i64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
            .collect::<Result<_, _>>()?;
        debug!("[note_store] Listed {} notes", rows.len());
        Self::decode_rows(rows)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<StoredItem>, RagError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, content, embedding, created_at FROM notes WHERE id = ?1")?;
        let rows: Vec<(i64, String, String, i64)> = stmt
            .query_map(params![id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
            .collect::<Result<_, _>>()?;
        Ok(Self::decode_rows(rows)?.into_iter().next())
    }

    async fn insert(&self, text: String, vector: Vec<f32>) -> Result<i64, RagError> {
        ensure_vector(&vector)?;
        let embedding_json = serde_json::to_string(&vector)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO notes (content, embedding, created_at) VALUES (?1, ?2, ?3)",
            params![text, embedding_json, now_millis()],
        )?;
        let id = conn.last_insert_rowid();
        info!("[note_store] Note saved (id={}, dims={})", id, vector.len());
        Ok(id)
    }

    async fn delete_by_id(&self, id: i64) -> Result<bool, RagError> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM notes WHERE id = ?1", params![id])?;
        info!("[note_store] Delete note {}: {}", id, deleted > 0);
        Ok(deleted > 0)
    }

    async fn count(&self) -> Result<usize, RagError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

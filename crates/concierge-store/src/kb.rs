//! Knowledge base entries and their chunks.

use rusqlite::{params, OptionalExtension, Row};

use crate::error::StoreError;
use crate::types::{Chunk, KbEntry, NewChunk};
use crate::{now_rfc3339, Result, Store};

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<KbEntry> {
    Ok(KbEntry {
        id: row.get(0)?,
        category: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        active: row.get::<_, i64>(4)? != 0,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const ENTRY_COLS: &str = "id, category, title, content, is_active, created_at, updated_at";

impl Store {
    pub fn add_kb_entry(&self, category: &str, title: &str, content: &str) -> Result<i64> {
        validate_entry(category, title)?;
        let conn = self.lock();
        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO kb_entries (category, title, content, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?4)",
            params![category.trim(), title.trim(), content, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_kb_entry(
        &self,
        id: i64,
        category: &str,
        title: &str,
        content: &str,
        active: bool,
    ) -> Result<()> {
        validate_entry(category, title)?;
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE kb_entries
             SET category = ?1, title = ?2, content = ?3, is_active = ?4, updated_at = ?5
             WHERE id = ?6",
            params![category.trim(), title.trim(), content, active as i64, now_rfc3339(), id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound {
                what: "kb entry",
                id,
            });
        }
        Ok(())
    }

    /// Delete an entry; its chunks go with it via the foreign-key cascade.
    pub fn delete_kb_entry(&self, id: i64) -> Result<()> {
        let conn = self.lock();
        let n = conn.execute("DELETE FROM kb_entries WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(StoreError::NotFound {
                what: "kb entry",
                id,
            });
        }
        Ok(())
    }

    pub fn get_kb_entry(&self, id: i64) -> Result<Option<KbEntry>> {
        let conn = self.lock();
        let entry = conn
            .query_row(
                &format!("SELECT {ENTRY_COLS} FROM kb_entries WHERE id = ?1"),
                params![id],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn list_kb_entries(&self, active_only: bool, category: Option<&str>) -> Result<Vec<KbEntry>> {
        let conn = self.lock();
        let mut sql = format!("SELECT {ENTRY_COLS} FROM kb_entries WHERE 1=1");
        if active_only {
            sql.push_str(" AND is_active = 1");
        }
        if category.is_some() {
            sql.push_str(" AND category = ?1");
        }
        sql.push_str(" ORDER BY category, title");

        let mut stmt = conn.prepare(&sql)?;
        let rows = match category {
            Some(cat) => stmt.query_map(params![cat], row_to_entry)?,
            None => stmt.query_map([], row_to_entry)?,
        };
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn kb_categories(&self) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT category FROM kb_entries WHERE is_active = 1 ORDER BY category",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count_kb_entries(&self, active_only: bool) -> Result<i64> {
        let conn = self.lock();
        let sql = if active_only {
            "SELECT COUNT(*) FROM kb_entries WHERE is_active = 1"
        } else {
            "SELECT COUNT(*) FROM kb_entries"
        };
        Ok(conn.query_row(sql, [], |row| row.get(0))?)
    }

    /// Replace all stored chunks for one entry in a single transaction.
    pub fn save_chunks(&self, entry_id: i64, chunks: &[NewChunk]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM kb_chunks WHERE entry_id = ?1", params![entry_id])?;
        let now = now_rfc3339();
        for chunk in chunks {
            tx.execute(
                "INSERT INTO kb_chunks (entry_id, chunk_index, chunk_text, embedding, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![entry_id, chunk.chunk_index, chunk.text, chunk.embedding, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// All chunks for active entries, ordered by entry then chunk index —
    /// the rebuild's view of what is currently cached.
    pub fn all_chunks(&self) -> Result<Vec<Chunk>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT c.id, c.entry_id, c.chunk_index, c.chunk_text, c.embedding
             FROM kb_chunks c
             JOIN kb_entries e ON c.entry_id = e.id
             WHERE e.is_active = 1
             ORDER BY c.entry_id, c.chunk_index",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Chunk {
                id: row.get(0)?,
                entry_id: row.get(1)?,
                chunk_index: row.get(2)?,
                text: row.get(3)?,
                embedding: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count_chunks(&self) -> Result<i64> {
        let conn = self.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM kb_chunks", [], |row| row.get(0))?)
    }
}

fn validate_entry(category: &str, title: &str) -> Result<()> {
    if category.trim().is_empty() {
        return Err(StoreError::invalid("category", "must not be empty"));
    }
    if title.trim().is_empty() {
        return Err(StoreError::invalid("title", "must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kb_crud_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let id = store.add_kb_entry("Pricing", "Summer 2025", "Haircut: $65").unwrap();

        let entry = store.get_kb_entry(id).unwrap().unwrap();
        assert_eq!(entry.title, "Summer 2025");
        assert!(entry.active);

        store
            .update_kb_entry(id, "Pricing", "Summer 2025", "Haircut: $70", true)
            .unwrap();
        let entry = store.get_kb_entry(id).unwrap().unwrap();
        assert_eq!(entry.content, "Haircut: $70");

        store.delete_kb_entry(id).unwrap();
        assert!(store.get_kb_entry(id).unwrap().is_none());
    }

    #[test]
    fn empty_title_rejected() {
        let store = Store::open_in_memory().unwrap();
        let err = store.add_kb_entry("Pricing", "  ", "text").unwrap_err();
        assert!(matches!(err, StoreError::Invalid { field: "title", .. }));
    }

    #[test]
    fn delete_cascades_to_chunks() {
        let store = Store::open_in_memory().unwrap();
        let id = store.add_kb_entry("Info", "Hours", "Open daily").unwrap();
        store
            .save_chunks(
                id,
                &[NewChunk {
                    chunk_index: 0,
                    text: "[Info — Hours]\nOpen daily".into(),
                    embedding: None,
                }],
            )
            .unwrap();
        assert_eq!(store.count_chunks().unwrap(), 1);

        store.delete_kb_entry(id).unwrap();
        assert_eq!(store.count_chunks().unwrap(), 0);
    }

    #[test]
    fn save_chunks_replaces_existing() {
        let store = Store::open_in_memory().unwrap();
        let id = store.add_kb_entry("Info", "Hours", "text").unwrap();
        let mk = |i: i64, t: &str| NewChunk {
            chunk_index: i,
            text: t.to_string(),
            embedding: Some(vec![0u8; 8]),
        };
        store.save_chunks(id, &[mk(0, "a"), mk(1, "b")]).unwrap();
        store.save_chunks(id, &[mk(0, "c")]).unwrap();

        let chunks = store.all_chunks().unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "c");
    }

    #[test]
    fn inactive_entries_hidden_from_active_listing() {
        let store = Store::open_in_memory().unwrap();
        let id = store.add_kb_entry("Info", "Old", "text").unwrap();
        store.update_kb_entry(id, "Info", "Old", "text", false).unwrap();

        assert!(store.list_kb_entries(true, None).unwrap().is_empty());
        assert_eq!(store.list_kb_entries(false, None).unwrap().len(), 1);
    }
}

//! Live-chat session rows. At most one active row per user, enforced by
//! ending any prior active row inside the same transaction that starts a
//! new one.

use rusqlite::{params, OptionalExtension, Row};

use crate::types::LiveChatSession;
use crate::{now_rfc3339, Result, Store};

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<LiveChatSession> {
    Ok(LiveChatSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        active: row.get::<_, i64>(3)? != 0,
        started_at: row.get(4)?,
        ended_at: row.get(5)?,
    })
}

const SESSION_COLS: &str = "id, user_id, username, is_active, started_at, ended_at";

impl Store {
    pub fn is_live_chat_active(&self, user_id: &str) -> Result<bool> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM live_chat_sessions WHERE user_id = ?1 AND is_active = 1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn active_live_chat(&self, user_id: &str) -> Result<Option<LiveChatSession>> {
        let conn = self.lock();
        let session = conn
            .query_row(
                &format!(
                    "SELECT {SESSION_COLS} FROM live_chat_sessions
                     WHERE user_id = ?1 AND is_active = 1 ORDER BY id DESC LIMIT 1"
                ),
                params![user_id],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    /// Insert a fresh active session, closing any stale active rows for this
    /// user first so the one-active-row invariant holds.
    pub fn start_live_chat(&self, user_id: &str, username: &str) -> Result<i64> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let now = now_rfc3339();
        tx.execute(
            "UPDATE live_chat_sessions SET is_active = 0, ended_at = ?1
             WHERE user_id = ?2 AND is_active = 1",
            params![now, user_id],
        )?;
        tx.execute(
            "INSERT INTO live_chat_sessions (user_id, username, is_active, started_at)
             VALUES (?1, ?2, 1, ?3)",
            params![user_id, username, now],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    pub fn end_live_chat(&self, user_id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE live_chat_sessions SET is_active = 0, ended_at = ?1
             WHERE user_id = ?2 AND is_active = 1",
            params![now_rfc3339(), user_id],
        )?;
        Ok(())
    }

    pub fn list_active_live_chats(&self) -> Result<Vec<LiveChatSession>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLS} FROM live_chat_sessions
             WHERE is_active = 1 ORDER BY started_at DESC"
        ))?;
        let rows = stmt.query_map([], row_to_session)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count_active_live_chats(&self) -> Result<i64> {
        let conn = self.lock();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM live_chat_sessions WHERE is_active = 1",
            [],
            |row| row.get(0),
        )?)
    }

    /// Startup sweep: close sessions left active by a previous run.
    pub fn end_all_live_chats(&self) -> Result<usize> {
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE live_chat_sessions SET is_active = 0, ended_at = ?1 WHERE is_active = 1",
            params![now_rfc3339()],
        )?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_most_one_active_row_per_user() {
        let store = Store::open_in_memory().unwrap();
        store.start_live_chat("u1", "Dana").unwrap();
        store.start_live_chat("u1", "Dana").unwrap();

        let conn = store.lock();
        let active: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM live_chat_sessions WHERE user_id = 'u1' AND is_active = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(active, 1);
    }

    #[test]
    fn end_stamps_ended_at() {
        let store = Store::open_in_memory().unwrap();
        store.start_live_chat("u1", "Dana").unwrap();
        store.end_live_chat("u1").unwrap();

        assert!(!store.is_live_chat_active("u1").unwrap());
        let conn = store.lock();
        let ended: Option<String> = conn
            .query_row(
                "SELECT ended_at FROM live_chat_sessions WHERE user_id = 'u1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(ended.is_some());
    }

    #[test]
    fn sweep_ends_every_active_session() {
        let store = Store::open_in_memory().unwrap();
        store.start_live_chat("u1", "Dana").unwrap();
        store.start_live_chat("u2", "Noa").unwrap();
        assert_eq!(store.end_all_live_chats().unwrap(), 2);
        assert_eq!(store.count_active_live_chats().unwrap(), 0);
    }
}

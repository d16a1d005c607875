//! Broadcast progress rows and the subscription list they fan out to.

use rusqlite::{params, OptionalExtension, Row};

use crate::types::{Broadcast, BroadcastStatus};
use crate::{now_rfc3339, Result, Store};

fn row_to_broadcast(row: &Row<'_>) -> rusqlite::Result<Broadcast> {
    let status: String = row.get(6)?;
    Ok(Broadcast {
        id: row.get(0)?,
        text: row.get(1)?,
        audience_label: row.get(2)?,
        recipient_count: row.get(3)?,
        sent_count: row.get(4)?,
        failed_count: row.get(5)?,
        status: status.parse().unwrap_or(BroadcastStatus::Queued),
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

const BROADCAST_COLS: &str = "id, message, audience_label, recipient_count, sent_count, \
                              failed_count, status, created_at, updated_at";

impl Store {
    pub fn create_broadcast(
        &self,
        text: &str,
        audience_label: &str,
        recipient_count: i64,
    ) -> Result<i64> {
        let conn = self.lock();
        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO broadcasts
             (message, audience_label, recipient_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![text, audience_label, recipient_count, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_broadcast(&self, id: i64) -> Result<Option<Broadcast>> {
        let conn = self.lock();
        let broadcast = conn
            .query_row(
                &format!("SELECT {BROADCAST_COLS} FROM broadcasts WHERE id = ?1"),
                params![id],
                row_to_broadcast,
            )
            .optional()?;
        Ok(broadcast)
    }

    pub fn list_broadcasts(&self, limit: usize) -> Result<Vec<Broadcast>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BROADCAST_COLS} FROM broadcasts ORDER BY id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], row_to_broadcast)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn mark_broadcast_sending(&self, id: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE broadcasts SET status = 'sending', updated_at = ?1 WHERE id = ?2",
            params![now_rfc3339(), id],
        )?;
        Ok(())
    }

    pub fn update_broadcast_progress(&self, id: i64, sent: i64, failed: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE broadcasts SET sent_count = ?1, failed_count = ?2, updated_at = ?3
             WHERE id = ?4",
            params![sent, failed, now_rfc3339(), id],
        )?;
        Ok(())
    }

    pub fn complete_broadcast(&self, id: i64, sent: i64, failed: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE broadcasts
             SET status = 'completed', sent_count = ?1, failed_count = ?2, updated_at = ?3
             WHERE id = ?4",
            params![sent, failed, now_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Terminal failure. Counts are left as last checkpointed so partial
    /// progress survives a cancelled or crashed worker.
    pub fn fail_broadcast(&self, id: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE broadcasts SET status = 'failed', updated_at = ?1 WHERE id = ?2",
            params![now_rfc3339(), id],
        )?;
        Ok(())
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Called on every inbound message: first contact subscribes the user.
    pub fn ensure_subscribed(&self, user_id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO subscriptions (user_id, subscribed) VALUES (?1, 1)",
            params![user_id],
        )?;
        Ok(())
    }

    pub fn unsubscribe_user(&self, user_id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO subscriptions (user_id, subscribed) VALUES (?1, 0)
             ON CONFLICT(user_id) DO UPDATE SET subscribed = 0",
            params![user_id],
        )?;
        Ok(())
    }

    pub fn is_subscribed(&self, user_id: &str) -> Result<bool> {
        let conn = self.lock();
        let subscribed: Option<i64> = conn
            .query_row(
                "SELECT subscribed FROM subscriptions WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(subscribed.map(|s| s != 0).unwrap_or(true))
    }

    pub fn subscribed_user_ids(&self) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT c.user_id FROM conversations c
             LEFT JOIN subscriptions s ON s.user_id = c.user_id
             WHERE COALESCE(s.subscribed, 1) = 1
             ORDER BY c.user_id",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn all_known_user_ids(&self) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT DISTINCT user_id FROM conversations ORDER BY user_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn broadcast_lifecycle_preserves_counts_on_failure() {
        let store = Store::open_in_memory().unwrap();
        let id = store.create_broadcast("sale!", "all subscribers", 40).unwrap();
        store.mark_broadcast_sending(id).unwrap();
        store.update_broadcast_progress(id, 25, 3).unwrap();
        store.fail_broadcast(id).unwrap();

        let b = store.get_broadcast(id).unwrap().unwrap();
        assert_eq!(b.status, BroadcastStatus::Failed);
        assert_eq!(b.sent_count, 25);
        assert_eq!(b.failed_count, 3);
    }

    #[test]
    fn completion_writes_final_counts() {
        let store = Store::open_in_memory().unwrap();
        let id = store.create_broadcast("sale!", "all", 10).unwrap();
        store.complete_broadcast(id, 9, 1).unwrap();

        let b = store.get_broadcast(id).unwrap().unwrap();
        assert_eq!(b.status, BroadcastStatus::Completed);
        assert_eq!(b.sent_count + b.failed_count, 10);
    }

    #[test]
    fn unknown_users_default_to_subscribed() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.is_subscribed("nobody").unwrap());

        store.unsubscribe_user("nobody").unwrap();
        assert!(!store.is_subscribed("nobody").unwrap());
    }

    #[test]
    fn subscribed_list_excludes_blocked_users() {
        let store = Store::open_in_memory().unwrap();
        for user in ["u1", "u2", "u3"] {
            store.save_message(user, "", Role::User, "hi", "").unwrap();
            store.ensure_subscribed(user).unwrap();
        }
        store.unsubscribe_user("u2").unwrap();

        let ids = store.subscribed_user_ids().unwrap();
        assert_eq!(ids, vec!["u1".to_string(), "u3".to_string()]);
        assert_eq!(store.all_known_user_ids().unwrap().len(), 3);
    }
}

//! Conversation history, summaries, and knowledge-gap questions.
//!
//! History ordering rides the autoincrement id cursor, never timestamps, so
//! rapid writes within the same second keep arrival order. The summarizer's
//! high-water mark (`last_summarized_message_id`) is a strict cursor into the
//! same id space, which keeps the unsummarized count correct even if old rows
//! are deleted.

use rusqlite::{params, OptionalExtension, Row};

use crate::types::{ConversationMessage, ConversationSummary, Role, UnansweredQuestion, UserSummary};
use crate::{now_rfc3339, Result, Store};

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<ConversationMessage> {
    let role_str: String = row.get(3)?;
    Ok(ConversationMessage {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        role: role_str.parse().unwrap_or(Role::User),
        text: row.get(4)?,
        sources: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const MSG_COLS: &str = "id, user_id, username, role, message, sources, created_at";

impl Store {
    pub fn save_message(
        &self,
        user_id: &str,
        username: &str,
        role: Role,
        text: &str,
        sources: &str,
    ) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO conversations (user_id, username, role, message, sources, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![user_id, username, role.as_str(), text, sources, now_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Last `limit` messages for a user, oldest first.
    pub fn history(&self, user_id: &str, limit: usize) -> Result<Vec<ConversationMessage>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MSG_COLS} FROM conversations
             WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2"
        ))?;
        let mut msgs = stmt
            .query_map(params![user_id, limit as i64], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        msgs.reverse();
        Ok(msgs)
    }

    /// Most recent messages across all users, newest first (admin view).
    pub fn all_recent(&self, limit: usize) -> Result<Vec<ConversationMessage>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MSG_COLS} FROM conversations ORDER BY id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], row_to_message)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_users(&self) -> Result<Vec<UserSummary>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT user_id, username, MAX(created_at), COUNT(*)
             FROM conversations GROUP BY user_id ORDER BY MAX(created_at) DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(UserSummary {
                user_id: row.get(0)?,
                username: row.get(1)?,
                last_active: row.get(2)?,
                message_count: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count_unique_users(&self) -> Result<i64> {
        let conn = self.lock();
        Ok(conn.query_row(
            "SELECT COUNT(DISTINCT user_id) FROM conversations",
            [],
            |row| row.get(0),
        )?)
    }

    /// Latest display name seen for a user, if any.
    pub fn username_for(&self, user_id: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let name = conn
            .query_row(
                "SELECT username FROM conversations
                 WHERE user_id = ?1 AND username != '' ORDER BY id DESC LIMIT 1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    /// Count of this user's messages with role 'user' created at or after
    /// `since` (RFC 3339). Drives the referral engagement trigger.
    pub fn user_message_count_since(&self, user_id: &str, since: &str) -> Result<i64> {
        let conn = self.lock();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM conversations
             WHERE user_id = ?1 AND role = 'user' AND created_at >= ?2",
            params![user_id, since],
            |row| row.get(0),
        )?)
    }

    // ── Summaries ────────────────────────────────────────────────────

    pub fn latest_summary(&self, user_id: &str) -> Result<Option<ConversationSummary>> {
        let conn = self.lock();
        let summary = conn
            .query_row(
                "SELECT user_id, summary_text, cumulative_message_count,
                        last_summarized_message_id, created_at
                 FROM conversation_summaries WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(ConversationSummary {
                        user_id: row.get(0)?,
                        summary_text: row.get(1)?,
                        cumulative_message_count: row.get(2)?,
                        last_summarized_message_id: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(summary)
    }

    /// Messages newer than the user's high-water mark.
    pub fn unsummarized_count(&self, user_id: &str) -> Result<i64> {
        let conn = self.lock();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM conversations
             WHERE user_id = ?1
               AND id > COALESCE(
                   (SELECT last_summarized_message_id FROM conversation_summaries
                    WHERE user_id = ?1), 0)",
            params![user_id],
            |row| row.get(0),
        )?)
    }

    /// Oldest `limit` unsummarized messages, ids included, oldest first.
    pub fn oldest_unsummarized(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MSG_COLS} FROM conversations
             WHERE user_id = ?1
               AND id > COALESCE(
                   (SELECT last_summarized_message_id FROM conversation_summaries
                    WHERE user_id = ?1), 0)
             ORDER BY id ASC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![user_id, limit as i64], row_to_message)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Replace the user's summary row, advancing the high-water mark and
    /// adding `new_message_count` to the cumulative total.
    pub fn save_summary(
        &self,
        user_id: &str,
        summary_text: &str,
        new_message_count: i64,
        last_summarized_message_id: i64,
    ) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let prior: i64 = tx
            .query_row(
                "SELECT cumulative_message_count FROM conversation_summaries WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        tx.execute(
            "INSERT INTO conversation_summaries
             (user_id, summary_text, cumulative_message_count,
              last_summarized_message_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                summary_text = excluded.summary_text,
                cumulative_message_count = excluded.cumulative_message_count,
                last_summarized_message_id = excluded.last_summarized_message_id,
                created_at = excluded.created_at",
            params![
                user_id,
                summary_text,
                prior + new_message_count,
                last_summarized_message_id,
                now_rfc3339()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ── Knowledge gaps ───────────────────────────────────────────────

    pub fn save_unanswered(&self, user_id: &str, username: &str, question: &str) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO unanswered_questions (user_id, username, question, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, username, question, now_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_unanswered(&self, open_only: bool) -> Result<Vec<UnansweredQuestion>> {
        let conn = self.lock();
        let sql = if open_only {
            "SELECT id, user_id, username, question, status, created_at, resolved_at
             FROM unanswered_questions WHERE status = 'open' ORDER BY id DESC"
        } else {
            "SELECT id, user_id, username, question, status, created_at, resolved_at
             FROM unanswered_questions ORDER BY id DESC"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(UnansweredQuestion {
                id: row.get(0)?,
                user_id: row.get(1)?,
                username: row.get(2)?,
                question: row.get(3)?,
                status: row.get(4)?,
                created_at: row.get(5)?,
                resolved_at: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn resolve_unanswered(&self, id: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE unanswered_questions SET status = 'resolved', resolved_at = ?1 WHERE id = ?2",
            params![now_rfc3339(), id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_ordered_by_id_cursor() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..5 {
            store
                .save_message("u1", "Dana", Role::User, &format!("msg {i}"), "")
                .unwrap();
        }
        let history = store.history("u1", 3).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].text, "msg 2");
        assert_eq!(history[2].text, "msg 4");
        assert!(history.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn unsummarized_count_uses_high_water_mark() {
        let store = Store::open_in_memory().unwrap();
        let mut last_id = 0;
        for i in 0..10 {
            last_id = store
                .save_message("u1", "Dana", Role::User, &format!("m{i}"), "")
                .unwrap();
        }
        assert_eq!(store.unsummarized_count("u1").unwrap(), 10);

        store.save_summary("u1", "summary v1", 10, last_id).unwrap();
        assert_eq!(store.unsummarized_count("u1").unwrap(), 0);

        store.save_message("u1", "Dana", Role::User, "new", "").unwrap();
        assert_eq!(store.unsummarized_count("u1").unwrap(), 1);
    }

    #[test]
    fn summary_row_is_single_and_cumulative() {
        let store = Store::open_in_memory().unwrap();
        store.save_summary("u1", "first", 10, 10).unwrap();
        store.save_summary("u1", "merged", 10, 20).unwrap();

        let summary = store.latest_summary("u1").unwrap().unwrap();
        assert_eq!(summary.summary_text, "merged");
        assert_eq!(summary.cumulative_message_count, 20);
        assert_eq!(summary.last_summarized_message_id, 20);
    }

    #[test]
    fn oldest_unsummarized_starts_after_mark() {
        let store = Store::open_in_memory().unwrap();
        let ids: Vec<i64> = (0..6)
            .map(|i| {
                store
                    .save_message("u1", "Dana", Role::User, &format!("m{i}"), "")
                    .unwrap()
            })
            .collect();
        store.save_summary("u1", "s", 3, ids[2]).unwrap();

        let window = store.oldest_unsummarized("u1", 2).unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].id, ids[3]);
        assert_eq!(window[1].id, ids[4]);
    }

    #[test]
    fn unanswered_question_lifecycle() {
        let store = Store::open_in_memory().unwrap();
        let id = store.save_unanswered("u1", "Dana", "do you do manicures?").unwrap();
        assert_eq!(store.list_unanswered(true).unwrap().len(), 1);

        store.resolve_unanswered(id).unwrap();
        assert!(store.list_unanswered(true).unwrap().is_empty());
        assert_eq!(store.list_unanswered(false).unwrap().len(), 1);
    }
}

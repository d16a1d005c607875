use rusqlite::Connection;

use crate::Result;

/// Create all tables and indexes. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS kb_entries (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            category    TEXT NOT NULL,
            title       TEXT NOT NULL,
            content     TEXT NOT NULL,
            is_active   INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_kb_entries_category ON kb_entries(category);

        CREATE TABLE IF NOT EXISTS kb_chunks (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            entry_id    INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            chunk_text  TEXT NOT NULL,
            embedding   BLOB,
            created_at  TEXT NOT NULL,
            UNIQUE(entry_id, chunk_index),
            FOREIGN KEY (entry_id) REFERENCES kb_entries(id) ON DELETE CASCADE
        );
        CREATE INDEX IF NOT EXISTS idx_kb_chunks_entry ON kb_chunks(entry_id);

        CREATE TABLE IF NOT EXISTS conversations (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     TEXT NOT NULL,
            username    TEXT NOT NULL DEFAULT '',
            role        TEXT NOT NULL CHECK(role IN ('user', 'assistant')),
            message     TEXT NOT NULL,
            sources     TEXT NOT NULL DEFAULT '',
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id, id);

        CREATE TABLE IF NOT EXISTS conversation_summaries (
            user_id                    TEXT PRIMARY KEY,
            summary_text               TEXT NOT NULL,
            cumulative_message_count   INTEGER NOT NULL DEFAULT 0,
            last_summarized_message_id INTEGER NOT NULL DEFAULT 0,
            created_at                 TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS agent_requests (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id         TEXT NOT NULL,
            username        TEXT NOT NULL DEFAULT '',
            platform_handle TEXT NOT NULL DEFAULT '',
            reason          TEXT NOT NULL DEFAULT '',
            status          TEXT NOT NULL DEFAULT 'pending'
                            CHECK(status IN ('pending', 'handled', 'dismissed')),
            created_at      TEXT NOT NULL,
            handled_at      TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_agent_requests_status ON agent_requests(status);

        CREATE TABLE IF NOT EXISTS appointments (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id         TEXT NOT NULL,
            username        TEXT NOT NULL DEFAULT '',
            platform_handle TEXT NOT NULL DEFAULT '',
            service         TEXT NOT NULL DEFAULT '',
            preferred_date  TEXT NOT NULL DEFAULT '',
            preferred_time  TEXT NOT NULL DEFAULT '',
            notes           TEXT NOT NULL DEFAULT '',
            status          TEXT NOT NULL DEFAULT 'pending'
                            CHECK(status IN ('pending', 'confirmed', 'cancelled')),
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_appointments_status ON appointments(status);

        CREATE TABLE IF NOT EXISTS live_chat_sessions (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     TEXT NOT NULL,
            username    TEXT NOT NULL DEFAULT '',
            is_active   INTEGER NOT NULL DEFAULT 1,
            started_at  TEXT NOT NULL,
            ended_at    TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_live_chat_active
            ON live_chat_sessions(user_id, is_active);

        CREATE TABLE IF NOT EXISTS unanswered_questions (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     TEXT NOT NULL,
            username    TEXT NOT NULL DEFAULT '',
            question    TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'open'
                        CHECK(status IN ('open', 'resolved')),
            created_at  TEXT NOT NULL,
            resolved_at TEXT
        );

        CREATE TABLE IF NOT EXISTS business_hours (
            day_of_week INTEGER PRIMARY KEY CHECK(day_of_week BETWEEN 0 AND 6),
            open_time   TEXT,
            close_time  TEXT,
            is_closed   INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS special_days (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            date        TEXT NOT NULL UNIQUE,
            name        TEXT NOT NULL,
            open_time   TEXT,
            close_time  TEXT,
            is_closed   INTEGER NOT NULL DEFAULT 1,
            notes       TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS vacation_mode (
            id             INTEGER PRIMARY KEY CHECK(id = 1),
            is_active      INTEGER NOT NULL DEFAULT 0,
            end_date       TEXT,
            custom_message TEXT
        );

        CREATE TABLE IF NOT EXISTS referrals (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            referrer_id  TEXT NOT NULL UNIQUE,
            referred_id  TEXT UNIQUE,
            code         TEXT NOT NULL UNIQUE,
            status       TEXT NOT NULL DEFAULT 'pending'
                         CHECK(status IN ('pending', 'completed')),
            created_at   TEXT NOT NULL,
            completed_at TEXT,
            sent         INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS credits (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     TEXT NOT NULL,
            amount      INTEGER NOT NULL,
            credit_type TEXT NOT NULL CHECK(credit_type IN ('referrer', 'referred')),
            reason      TEXT NOT NULL DEFAULT '',
            used        INTEGER NOT NULL DEFAULT 0,
            expires_at  TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_credits_user ON credits(user_id);

        CREATE TABLE IF NOT EXISTS broadcasts (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            message         TEXT NOT NULL,
            audience_label  TEXT NOT NULL DEFAULT '',
            recipient_count INTEGER NOT NULL DEFAULT 0,
            sent_count      INTEGER NOT NULL DEFAULT 0,
            failed_count    INTEGER NOT NULL DEFAULT 0,
            status          TEXT NOT NULL DEFAULT 'queued'
                            CHECK(status IN ('queued', 'sending', 'completed', 'failed')),
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS subscriptions (
            user_id    TEXT PRIMARY KEY,
            subscribed INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS bot_settings (
            id               INTEGER PRIMARY KEY CHECK(id = 1),
            tone             TEXT NOT NULL DEFAULT 'friendly'
                             CHECK(tone IN ('friendly', 'formal', 'sales', 'luxury')),
            custom_phrases   TEXT NOT NULL DEFAULT '',
            follow_up_enabled INTEGER NOT NULL DEFAULT 0
        );",
    )?;
    Ok(())
}

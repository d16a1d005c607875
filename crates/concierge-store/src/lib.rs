//! SQLite storage for the whole system.
//!
//! One [`Store`] wraps a single connection behind a mutex (WAL mode, 30 s
//! busy timeout, foreign keys on) and exposes typed repositories per area.
//! Row-to-struct conversion happens here and nowhere else — every other
//! crate speaks in the record types from [`types`].

mod booking;
mod broadcast;
mod conversation;
mod db;
pub mod error;
mod hours;
mod kb;
mod live_chat;
mod referral;
mod settings;
pub mod types;

pub use referral::{ReferralStats, TopReferrer};

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;

pub use error::{Result, StoreError};

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_secs(30))?;
        db::init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }
}

/// Current UTC timestamp in the text format every table uses.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

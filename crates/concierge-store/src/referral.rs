//! Referral rows and the credits they mint.
//!
//! Constraints live in the schema (unique referrer, unique referred, unique
//! code) and the guarded statements here, so the service layer can treat
//! every operation as atomic.

use rusqlite::{params, OptionalExtension, Row};

use crate::types::{Credit, CreditType, Referral, ReferralStatus};
use crate::{now_rfc3339, Result, Store};

fn row_to_referral(row: &Row<'_>) -> rusqlite::Result<Referral> {
    let status: String = row.get(4)?;
    Ok(Referral {
        id: row.get(0)?,
        referrer_id: row.get(1)?,
        referred_id: row.get(2)?,
        code: row.get(3)?,
        status: status.parse().unwrap_or(ReferralStatus::Pending),
        created_at: row.get(5)?,
        completed_at: row.get(6)?,
        sent: row.get::<_, i64>(7)? != 0,
    })
}

fn row_to_credit(row: &Row<'_>) -> rusqlite::Result<Credit> {
    let credit_type: String = row.get(3)?;
    Ok(Credit {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: row.get(2)?,
        credit_type: credit_type.parse().unwrap_or(CreditType::Referred),
        reason: row.get(4)?,
        used: row.get::<_, i64>(5)? != 0,
        expires_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const REFERRAL_COLS: &str =
    "id, referrer_id, referred_id, code, status, created_at, completed_at, sent";
const CREDIT_COLS: &str =
    "id, user_id, amount, credit_type, reason, used, expires_at, created_at";

/// Aggregate numbers for the admin referrals page.
#[derive(Debug, Clone, Default)]
pub struct ReferralStats {
    pub total: i64,
    pub pending: i64,
    pub completed: i64,
    pub codes_sent: i64,
    pub active_credits: i64,
}

#[derive(Debug, Clone)]
pub struct TopReferrer {
    pub referrer_id: String,
    pub completed: i64,
}

impl Store {
    pub fn referral_by_referrer(&self, user_id: &str) -> Result<Option<Referral>> {
        let conn = self.lock();
        let referral = conn
            .query_row(
                &format!("SELECT {REFERRAL_COLS} FROM referrals WHERE referrer_id = ?1"),
                params![user_id],
                row_to_referral,
            )
            .optional()?;
        Ok(referral)
    }

    pub fn referral_by_code(&self, code: &str) -> Result<Option<Referral>> {
        let conn = self.lock();
        let referral = conn
            .query_row(
                &format!("SELECT {REFERRAL_COLS} FROM referrals WHERE code = ?1"),
                params![code],
                row_to_referral,
            )
            .optional()?;
        Ok(referral)
    }

    pub fn referral_for_referred(&self, user_id: &str) -> Result<Option<Referral>> {
        let conn = self.lock();
        let referral = conn
            .query_row(
                &format!("SELECT {REFERRAL_COLS} FROM referrals WHERE referred_id = ?1"),
                params![user_id],
                row_to_referral,
            )
            .optional()?;
        Ok(referral)
    }

    pub fn insert_referral(&self, referrer_id: &str, code: &str) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO referrals (referrer_id, code, created_at) VALUES (?1, ?2, ?3)",
            params![referrer_id, code, now_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn referral_code_exists(&self, code: &str) -> Result<bool> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM referrals WHERE code = ?1",
            params![code],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Attach `new_user` to the referral identified by `code`. All four
    /// guards (code exists, not self, slot free, user not already referred)
    /// are folded into one statement; returns whether the row was claimed.
    pub fn register_referred(&self, code: &str, new_user: &str) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE referrals SET referred_id = ?2
             WHERE code = ?1
               AND referred_id IS NULL
               AND referrer_id != ?2
               AND NOT EXISTS (SELECT 1 FROM referrals WHERE referred_id = ?2)",
            params![code, new_user],
        )?;
        Ok(n == 1)
    }

    /// Mark the referred user's referral completed and mint both credits in
    /// one transaction. Returns the completed referral, or `None` when the
    /// user has no pending referral.
    pub fn complete_referral(
        &self,
        referred_user: &str,
        credit_amount: i64,
        expires_at: &str,
    ) -> Result<Option<Referral>> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let referral = tx
            .query_row(
                &format!(
                    "SELECT {REFERRAL_COLS} FROM referrals
                     WHERE referred_id = ?1 AND status = 'pending'"
                ),
                params![referred_user],
                row_to_referral,
            )
            .optional()?;

        let Some(referral) = referral else {
            return Ok(None);
        };

        let now = now_rfc3339();
        tx.execute(
            "UPDATE referrals SET status = 'completed', completed_at = ?1 WHERE id = ?2",
            params![now, referral.id],
        )?;
        tx.execute(
            "INSERT INTO credits (user_id, amount, credit_type, reason, expires_at, created_at)
             VALUES (?1, ?2, 'referrer', ?3, ?4, ?5)",
            params![
                referral.referrer_id,
                credit_amount,
                format!("referral {} completed", referral.code),
                expires_at,
                now
            ],
        )?;
        tx.execute(
            "INSERT INTO credits (user_id, amount, credit_type, reason, expires_at, created_at)
             VALUES (?1, ?2, 'referred', ?3, ?4, ?5)",
            params![
                referred_user,
                credit_amount,
                format!("joined via referral {}", referral.code),
                expires_at,
                now
            ],
        )?;
        tx.commit()?;

        Ok(Some(Referral {
            status: ReferralStatus::Completed,
            completed_at: Some(now),
            ..referral
        }))
    }

    /// Flip the sent flag. True only for the first caller — the guard that
    /// makes the shared send flow idempotent.
    pub fn mark_referral_sent(&self, referrer_id: &str) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE referrals SET sent = 1 WHERE referrer_id = ?1 AND sent = 0",
            params![referrer_id],
        )?;
        Ok(n == 1)
    }

    /// Reset the sent flag after a failed delivery so a later attempt can retry.
    pub fn unmark_referral_sent(&self, referrer_id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE referrals SET sent = 0 WHERE referrer_id = ?1",
            params![referrer_id],
        )?;
        Ok(())
    }

    pub fn list_referrals(&self) -> Result<Vec<Referral>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare(&format!("SELECT {REFERRAL_COLS} FROM referrals ORDER BY id DESC"))?;
        let rows = stmt.query_map([], row_to_referral)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn referral_stats(&self) -> Result<ReferralStats> {
        let conn = self.lock();
        let (total, pending, completed, codes_sent) = conn.query_row(
            "SELECT COUNT(*),
                    SUM(status = 'pending'),
                    SUM(status = 'completed'),
                    SUM(sent)
             FROM referrals",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                    row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                    row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                ))
            },
        )?;
        let active_credits: i64 = conn.query_row(
            "SELECT COUNT(*) FROM credits WHERE used = 0 AND expires_at > ?1",
            params![now_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(ReferralStats {
            total,
            pending,
            completed,
            codes_sent,
            active_credits,
        })
    }

    pub fn top_referrers(&self, limit: usize) -> Result<Vec<TopReferrer>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT referrer_id, COUNT(*) AS completed
             FROM referrals WHERE status = 'completed'
             GROUP BY referrer_id ORDER BY completed DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(TopReferrer {
                referrer_id: row.get(0)?,
                completed: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn credits_for_user(&self, user_id: &str) -> Result<Vec<Credit>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CREDIT_COLS} FROM credits WHERE user_id = ?1 ORDER BY id DESC"
        ))?;
        let rows = stmt.query_map(params![user_id], row_to_credit)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_guards_self_referral_and_double_attribution() {
        let store = Store::open_in_memory().unwrap();
        store.insert_referral("alice", "REF_AAAAAA").unwrap();
        store.insert_referral("bob", "REF_BBBBBB").unwrap();

        // Self-referral refused.
        assert!(!store.register_referred("REF_AAAAAA", "alice").unwrap());
        // First registration succeeds.
        assert!(store.register_referred("REF_AAAAAA", "carol").unwrap());
        // Slot now taken.
        assert!(!store.register_referred("REF_AAAAAA", "dave").unwrap());
        // carol cannot be referred twice, even by another code.
        assert!(!store.register_referred("REF_BBBBBB", "carol").unwrap());
        // Unknown code is a no-op.
        assert!(!store.register_referred("REF_ZZZZZZ", "dave").unwrap());
    }

    #[test]
    fn completion_mints_both_credits_once() {
        let store = Store::open_in_memory().unwrap();
        store.insert_referral("alice", "REF_AAAAAA").unwrap();
        store.register_referred("REF_AAAAAA", "carol").unwrap();

        let completed = store
            .complete_referral("carol", 10, "2099-01-01T00:00:00+00:00")
            .unwrap()
            .unwrap();
        assert_eq!(completed.status, ReferralStatus::Completed);
        assert!(completed.completed_at.is_some());

        let referrer_credits = store.credits_for_user("alice").unwrap();
        let referred_credits = store.credits_for_user("carol").unwrap();
        assert_eq!(referrer_credits.len(), 1);
        assert_eq!(referred_credits.len(), 1);
        assert_eq!(referrer_credits[0].credit_type, CreditType::Referrer);
        assert_eq!(referred_credits[0].credit_type, CreditType::Referred);
        assert_eq!(referrer_credits[0].amount, 10);

        // Second completion is a no-op.
        assert!(store
            .complete_referral("carol", 10, "2099-01-01T00:00:00+00:00")
            .unwrap()
            .is_none());
        assert_eq!(store.credits_for_user("alice").unwrap().len(), 1);
    }

    #[test]
    fn mark_sent_is_exactly_once() {
        let store = Store::open_in_memory().unwrap();
        store.insert_referral("alice", "REF_AAAAAA").unwrap();

        assert!(store.mark_referral_sent("alice").unwrap());
        assert!(!store.mark_referral_sent("alice").unwrap());

        store.unmark_referral_sent("alice").unwrap();
        assert!(store.mark_referral_sent("alice").unwrap());
    }

    #[test]
    fn stats_count_by_status() {
        let store = Store::open_in_memory().unwrap();
        store.insert_referral("alice", "REF_AAAAAA").unwrap();
        store.insert_referral("bob", "REF_BBBBBB").unwrap();
        store.register_referred("REF_AAAAAA", "carol").unwrap();
        store
            .complete_referral("carol", 10, "2099-01-01T00:00:00+00:00")
            .unwrap();

        let stats = store.referral_stats().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.active_credits, 2);

        let top = store.top_referrers(5).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].referrer_id, "alice");
    }
}

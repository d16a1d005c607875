//! Weekly business hours, special days, and the vacation-mode singleton.

use rusqlite::{params, OptionalExtension, Row};

use crate::error::StoreError;
use crate::types::{BusinessHours, SpecialDay, VacationMode};
use crate::{Result, Store};

fn row_to_hours(row: &Row<'_>) -> rusqlite::Result<BusinessHours> {
    Ok(BusinessHours {
        day_of_week: row.get::<_, i64>(0)? as u8,
        open_time: row.get(1)?,
        close_time: row.get(2)?,
        closed: row.get::<_, i64>(3)? != 0,
    })
}

fn row_to_special(row: &Row<'_>) -> rusqlite::Result<SpecialDay> {
    Ok(SpecialDay {
        id: row.get(0)?,
        date: row.get(1)?,
        name: row.get(2)?,
        open_time: row.get(3)?,
        close_time: row.get(4)?,
        closed: row.get::<_, i64>(5)? != 0,
        notes: row.get(6)?,
    })
}

impl Store {
    /// Hours for an Israeli day-of-week (0 = Sunday).
    pub fn hours_for_day(&self, day_of_week: u8) -> Result<Option<BusinessHours>> {
        let conn = self.lock();
        let hours = conn
            .query_row(
                "SELECT day_of_week, open_time, close_time, is_closed
                 FROM business_hours WHERE day_of_week = ?1",
                params![day_of_week as i64],
                row_to_hours,
            )
            .optional()?;
        Ok(hours)
    }

    pub fn all_hours(&self) -> Result<Vec<BusinessHours>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT day_of_week, open_time, close_time, is_closed
             FROM business_hours ORDER BY day_of_week",
        )?;
        let rows = stmt.query_map([], row_to_hours)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn upsert_hours(&self, hours: &BusinessHours) -> Result<()> {
        if hours.day_of_week > 6 {
            return Err(StoreError::invalid("day_of_week", "must be 0..=6"));
        }
        let conn = self.lock();
        conn.execute(
            "INSERT INTO business_hours (day_of_week, open_time, close_time, is_closed)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(day_of_week) DO UPDATE SET
                open_time = excluded.open_time,
                close_time = excluded.close_time,
                is_closed = excluded.is_closed",
            params![
                hours.day_of_week as i64,
                hours.open_time,
                hours.close_time,
                hours.closed as i64
            ],
        )?;
        Ok(())
    }

    // ── Special days ─────────────────────────────────────────────────

    pub fn special_day_on(&self, date: &str) -> Result<Option<SpecialDay>> {
        let conn = self.lock();
        let day = conn
            .query_row(
                "SELECT id, date, name, open_time, close_time, is_closed, notes
                 FROM special_days WHERE date = ?1",
                params![date],
                row_to_special,
            )
            .optional()?;
        Ok(day)
    }

    pub fn list_special_days(&self) -> Result<Vec<SpecialDay>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, date, name, open_time, close_time, is_closed, notes
             FROM special_days ORDER BY date",
        )?;
        let rows = stmt.query_map([], row_to_special)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn upsert_special_day(&self, day: &SpecialDay) -> Result<i64> {
        if day.date.trim().is_empty() {
            return Err(StoreError::invalid("date", "must not be empty"));
        }
        let conn = self.lock();
        conn.execute(
            "INSERT INTO special_days (date, name, open_time, close_time, is_closed, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(date) DO UPDATE SET
                name = excluded.name,
                open_time = excluded.open_time,
                close_time = excluded.close_time,
                is_closed = excluded.is_closed,
                notes = excluded.notes",
            params![
                day.date,
                day.name,
                day.open_time,
                day.close_time,
                day.closed as i64,
                day.notes
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn delete_special_day(&self, id: i64) -> Result<()> {
        let conn = self.lock();
        let n = conn.execute("DELETE FROM special_days WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(StoreError::NotFound {
                what: "special day",
                id,
            });
        }
        Ok(())
    }

    // ── Vacation mode ────────────────────────────────────────────────

    pub fn vacation_mode(&self) -> Result<VacationMode> {
        let conn = self.lock();
        let mode = conn
            .query_row(
                "SELECT is_active, end_date, custom_message FROM vacation_mode WHERE id = 1",
                [],
                |row| {
                    Ok(VacationMode {
                        active: row.get::<_, i64>(0)? != 0,
                        end_date: row.get(1)?,
                        custom_message: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(mode.unwrap_or_default())
    }

    pub fn set_vacation_mode(&self, mode: &VacationMode) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO vacation_mode (id, is_active, end_date, custom_message)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                is_active = excluded.is_active,
                end_date = excluded.end_date,
                custom_message = excluded.custom_message",
            params![mode.active as i64, mode.end_date, mode.custom_message],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hours_upsert_overwrites_day() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_hours(&BusinessHours {
                day_of_week: 0,
                open_time: Some("09:00".into()),
                close_time: Some("19:00".into()),
                closed: false,
            })
            .unwrap();
        store
            .upsert_hours(&BusinessHours {
                day_of_week: 0,
                open_time: None,
                close_time: None,
                closed: true,
            })
            .unwrap();

        let hours = store.hours_for_day(0).unwrap().unwrap();
        assert!(hours.closed);
        assert_eq!(store.all_hours().unwrap().len(), 1);
    }

    #[test]
    fn special_day_unique_per_date() {
        let store = Store::open_in_memory().unwrap();
        let day = SpecialDay {
            id: 0,
            date: "2026-09-23".into(),
            name: "יום כיפור".into(),
            open_time: None,
            close_time: None,
            closed: true,
            notes: String::new(),
        };
        store.upsert_special_day(&day).unwrap();
        store.upsert_special_day(&day).unwrap();
        assert_eq!(store.list_special_days().unwrap().len(), 1);
        assert!(store.special_day_on("2026-09-23").unwrap().is_some());
    }

    #[test]
    fn vacation_mode_defaults_inactive() {
        let store = Store::open_in_memory().unwrap();
        assert!(!store.vacation_mode().unwrap().active);

        store
            .set_vacation_mode(&VacationMode {
                active: true,
                end_date: Some("2026-08-20".into()),
                custom_message: None,
            })
            .unwrap();
        let mode = store.vacation_mode().unwrap();
        assert!(mode.active);
        assert_eq!(mode.end_date.as_deref(), Some("2026-08-20"));
    }
}

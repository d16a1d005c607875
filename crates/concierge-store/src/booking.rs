//! Agent requests and appointments.

use rusqlite::{params, OptionalExtension, Row};

use crate::error::StoreError;
use crate::types::{AgentRequest, AgentRequestStatus, Appointment, AppointmentStatus};
use crate::{now_rfc3339, Result, Store};

fn row_to_request(row: &Row<'_>) -> rusqlite::Result<AgentRequest> {
    let status: String = row.get(5)?;
    Ok(AgentRequest {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        platform_handle: row.get(3)?,
        reason: row.get(4)?,
        status: status.parse().unwrap_or(AgentRequestStatus::Pending),
        created_at: row.get(6)?,
        handled_at: row.get(7)?,
    })
}

fn row_to_appointment(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    let status: String = row.get(8)?;
    Ok(Appointment {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        platform_handle: row.get(3)?,
        service: row.get(4)?,
        preferred_date: row.get(5)?,
        preferred_time: row.get(6)?,
        notes: row.get(7)?,
        status: status.parse().unwrap_or(AppointmentStatus::Pending),
        created_at: row.get(9)?,
    })
}

const REQUEST_COLS: &str =
    "id, user_id, username, platform_handle, reason, status, created_at, handled_at";
const APPT_COLS: &str = "id, user_id, username, platform_handle, service, preferred_date, \
                         preferred_time, notes, status, created_at";

impl Store {
    pub fn create_agent_request(
        &self,
        user_id: &str,
        username: &str,
        platform_handle: &str,
        reason: &str,
    ) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO agent_requests (user_id, username, platform_handle, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, username, platform_handle, reason, now_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_agent_request(&self, id: i64) -> Result<Option<AgentRequest>> {
        let conn = self.lock();
        let req = conn
            .query_row(
                &format!("SELECT {REQUEST_COLS} FROM agent_requests WHERE id = ?1"),
                params![id],
                row_to_request,
            )
            .optional()?;
        Ok(req)
    }

    pub fn list_agent_requests(
        &self,
        status: Option<AgentRequestStatus>,
    ) -> Result<Vec<AgentRequest>> {
        let conn = self.lock();
        let mut sql = format!("SELECT {REQUEST_COLS} FROM agent_requests");
        if status.is_some() {
            sql.push_str(" WHERE status = ?1");
        }
        sql.push_str(" ORDER BY id DESC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = match status {
            Some(s) => stmt.query_map(params![s.to_string()], row_to_request)?,
            None => stmt.query_map([], row_to_request)?,
        };
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn update_agent_request_status(&self, id: i64, status: AgentRequestStatus) -> Result<()> {
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE agent_requests SET status = ?1, handled_at = ?2 WHERE id = ?3",
            params![status.to_string(), now_rfc3339(), id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound {
                what: "agent request",
                id,
            });
        }
        Ok(())
    }

    pub fn count_agent_requests(&self, status: AgentRequestStatus) -> Result<i64> {
        let conn = self.lock();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM agent_requests WHERE status = ?1",
            params![status.to_string()],
            |row| row.get(0),
        )?)
    }

    // ── Appointments ─────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub fn create_appointment(
        &self,
        user_id: &str,
        username: &str,
        platform_handle: &str,
        service: &str,
        preferred_date: &str,
        preferred_time: &str,
        notes: &str,
    ) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO appointments
             (user_id, username, platform_handle, service, preferred_date,
              preferred_time, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user_id,
                username,
                platform_handle,
                service,
                preferred_date,
                preferred_time,
                notes,
                now_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_appointment(&self, id: i64) -> Result<Option<Appointment>> {
        let conn = self.lock();
        let appt = conn
            .query_row(
                &format!("SELECT {APPT_COLS} FROM appointments WHERE id = ?1"),
                params![id],
                row_to_appointment,
            )
            .optional()?;
        Ok(appt)
    }

    pub fn list_appointments(&self, status: Option<AppointmentStatus>) -> Result<Vec<Appointment>> {
        let conn = self.lock();
        let mut sql = format!("SELECT {APPT_COLS} FROM appointments");
        if status.is_some() {
            sql.push_str(" WHERE status = ?1");
        }
        sql.push_str(" ORDER BY id DESC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = match status {
            Some(s) => stmt.query_map(params![s.to_string()], row_to_appointment)?,
            None => stmt.query_map([], row_to_appointment)?,
        };
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn update_appointment_status(&self, id: i64, status: AppointmentStatus) -> Result<()> {
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE appointments SET status = ?1 WHERE id = ?2",
            params![status.to_string(), id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound {
                what: "appointment",
                id,
            });
        }
        Ok(())
    }

    pub fn count_appointments(&self, status: AppointmentStatus) -> Result<i64> {
        let conn = self.lock();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM appointments WHERE status = ?1",
            params![status.to_string()],
            |row| row.get(0),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_request_status_transitions() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .create_agent_request("u1", "Dana", "@dana", "asked for a human")
            .unwrap();
        assert_eq!(store.count_agent_requests(AgentRequestStatus::Pending).unwrap(), 1);

        store
            .update_agent_request_status(id, AgentRequestStatus::Handled)
            .unwrap();
        let req = store.get_agent_request(id).unwrap().unwrap();
        assert_eq!(req.status, AgentRequestStatus::Handled);
        assert!(req.handled_at.is_some());
    }

    #[test]
    fn unknown_appointment_update_errors() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .update_appointment_status(999, AppointmentStatus::Confirmed)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn appointment_fields_stored_verbatim() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .create_appointment("u1", "Dana", "@dana", "צבע שיער", "מחר", "אחה\"צ", "")
            .unwrap();
        let appt = store.get_appointment(id).unwrap().unwrap();
        assert_eq!(appt.preferred_date, "מחר");
        assert_eq!(appt.status, AppointmentStatus::Pending);
    }
}

//! Appointment management. Confirming an appointment completes any pending
//! referral for the customer (minting both credits) and attempts the
//! referral-code send to them.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, Redirect};
use axum::Form;
use serde::Deserialize;
use tracing::{info, warn};

use concierge_store::types::AppointmentStatus;

use crate::app::AdminState;

use super::{check_csrf, csrf_field, escape_html, layout, page_csrf};

pub async fn list(State(state): State<Arc<AdminState>>, headers: HeaderMap) -> Html<String> {
    let appointments = state.store.list_appointments(None).unwrap_or_default();
    let csrf = page_csrf(&state, &headers);
    let csrf_input = csrf_field(&csrf);

    let mut rows = String::new();
    for appt in &appointments {
        rows.push_str(&format!(
            "<tr><td>{id}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td><form class=\"inline\" method=\"post\" action=\"/appointments/{id}/update\">{csrf_input}\
             <select name=\"status\"><option value=\"confirmed\">מאושר</option>\
             <option value=\"cancelled\">מבוטל</option><option value=\"pending\">ממתין</option></select>\
             <button>עדכון</button></form></td></tr>",
            escape_html(&appt.username),
            escape_html(&appt.service),
            escape_html(&appt.preferred_date),
            escape_html(&appt.preferred_time),
            appt.status,
            id = appt.id,
        ));
    }

    let body = format!(
        "<table><tr><th>#</th><th>לקוח</th><th>שירות</th><th>תאריך</th><th>שעה</th>\
         <th>מצב</th><th></th></tr>{rows}</table>"
    );
    layout(&state.business.name, "תורים", &body)
}

#[derive(Deserialize)]
pub struct UpdateForm {
    #[serde(default)]
    pub csrf_token: String,
    pub status: String,
}

pub async fn update(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Form(form): Form<UpdateForm>,
) -> Result<Redirect, StatusCode> {
    check_csrf(&state, &headers, &form.csrf_token)?;
    let status = AppointmentStatus::from_str(&form.status).map_err(|_| StatusCode::BAD_REQUEST)?;

    let appointment = state
        .store
        .get_appointment(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    state
        .store
        .update_appointment_status(id, status)
        .map_err(|_| StatusCode::NOT_FOUND)?;
    info!(id, %status, "appointment status updated");

    // A confirmed visit completes the customer's referral and earns them
    // their own code to share.
    if status == AppointmentStatus::Confirmed {
        match state.referral.complete(&appointment.user_id) {
            Ok(Some(referral)) => {
                info!(code = %referral.code, user_id = %appointment.user_id, "referral completed")
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "referral completion failed"),
        }
        if let Err(e) = state.referral.try_send_code(&appointment.user_id).await {
            warn!(error = %e, user_id = %appointment.user_id, "referral code send failed");
        }
    }

    Ok(Redirect::to("/appointments"))
}

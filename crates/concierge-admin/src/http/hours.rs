//! Weekly hours and special days.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, Redirect};
use axum::Form;
use serde::Deserialize;

use concierge_store::types::{BusinessHours, SpecialDay};

use crate::app::AdminState;

use super::{check_csrf, csrf_field, escape_html, layout, page_csrf};

const DAY_NAMES: [&str; 7] = ["ראשון", "שני", "שלישי", "רביעי", "חמישי", "שישי", "שבת"];

pub async fn view(State(state): State<Arc<AdminState>>, headers: HeaderMap) -> Html<String> {
    let hours = state.store.all_hours().unwrap_or_default();
    let special_days = state.store.list_special_days().unwrap_or_default();
    let csrf = page_csrf(&state, &headers);
    let csrf_input = csrf_field(&csrf);

    let mut week_rows = String::new();
    for dow in 0..7u8 {
        let existing = hours.iter().find(|h| h.day_of_week == dow);
        let (open, close, closed) = existing
            .map(|h| {
                (
                    h.open_time.clone().unwrap_or_default(),
                    h.close_time.clone().unwrap_or_default(),
                    h.closed,
                )
            })
            .unwrap_or((String::new(), String::new(), true));
        week_rows.push_str(&format!(
            "<tr><td>{day}</td><td><form class=\"inline\" method=\"post\" action=\"/business-hours\">\
             {csrf_input}<input type=\"hidden\" name=\"day_of_week\" value=\"{dow}\">\
             <input name=\"open_time\" value=\"{open}\" size=\"6\" placeholder=\"09:00\">\
             <input name=\"close_time\" value=\"{close}\" size=\"6\" placeholder=\"19:00\">\
             <label><input type=\"checkbox\" name=\"closed\" value=\"1\"{checked}> סגור</label>\
             <button>שמירה</button></form></td></tr>",
            day = DAY_NAMES[dow as usize],
            checked = if closed { " checked" } else { "" },
        ));
    }

    let mut special_rows = String::new();
    for day in &special_days {
        special_rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td>\
             <td><form class=\"inline\" method=\"post\" \
             action=\"/business-hours/special-days/{}/delete\">{csrf_input}\
             <button>מחיקה</button></form></td></tr>",
            escape_html(&day.date),
            escape_html(&day.name),
            if day.closed {
                "סגור".to_string()
            } else {
                format!(
                    "{} - {}",
                    day.open_time.as_deref().unwrap_or("?"),
                    day.close_time.as_deref().unwrap_or("?")
                )
            },
            day.id,
        ));
    }

    let body = format!(
        "<h2>שעות שבועיות</h2><table>{week_rows}</table>\
         <h2>ימים מיוחדים</h2>\
         <form method=\"post\" action=\"/business-hours/special-days/add\">{csrf_input}\
         <input name=\"date\" placeholder=\"2026-09-21\" required>\
         <input name=\"name\" placeholder=\"שם\" required>\
         <input name=\"open_time\" size=\"6\" placeholder=\"פתיחה\">\
         <input name=\"close_time\" size=\"6\" placeholder=\"סגירה\">\
         <label><input type=\"checkbox\" name=\"closed\" value=\"1\" checked> סגור</label>\
         <input name=\"notes\" placeholder=\"הערות\">\
         <button>הוספה</button></form>\
         <table><tr><th>תאריך</th><th>שם</th><th>שעות</th><th></th></tr>{special_rows}</table>"
    );
    layout(&state.business.name, "שעות פעילות", &body)
}

#[derive(Deserialize)]
pub struct HoursForm {
    #[serde(default)]
    pub csrf_token: String,
    pub day_of_week: u8,
    #[serde(default)]
    pub open_time: String,
    #[serde(default)]
    pub close_time: String,
    #[serde(default)]
    pub closed: Option<String>,
}

pub async fn upsert(
    State(state): State<Arc<AdminState>>,
    headers: HeaderMap,
    Form(form): Form<HoursForm>,
) -> Result<Redirect, StatusCode> {
    check_csrf(&state, &headers, &form.csrf_token)?;
    let closed = form.closed.is_some();
    let hours = BusinessHours {
        day_of_week: form.day_of_week,
        open_time: (!closed && !form.open_time.trim().is_empty())
            .then(|| form.open_time.trim().to_string()),
        close_time: (!closed && !form.close_time.trim().is_empty())
            .then(|| form.close_time.trim().to_string()),
        closed,
    };
    state
        .store
        .upsert_hours(&hours)
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok(Redirect::to("/business-hours"))
}

#[derive(Deserialize)]
pub struct SpecialDayForm {
    #[serde(default)]
    pub csrf_token: String,
    pub date: String,
    pub name: String,
    #[serde(default)]
    pub open_time: String,
    #[serde(default)]
    pub close_time: String,
    #[serde(default)]
    pub closed: Option<String>,
    #[serde(default)]
    pub notes: String,
}

pub async fn add_special_day(
    State(state): State<Arc<AdminState>>,
    headers: HeaderMap,
    Form(form): Form<SpecialDayForm>,
) -> Result<Redirect, StatusCode> {
    check_csrf(&state, &headers, &form.csrf_token)?;
    let closed = form.closed.is_some();
    let day = SpecialDay {
        id: 0,
        date: form.date.trim().to_string(),
        name: form.name.trim().to_string(),
        open_time: (!closed && !form.open_time.trim().is_empty())
            .then(|| form.open_time.trim().to_string()),
        close_time: (!closed && !form.close_time.trim().is_empty())
            .then(|| form.close_time.trim().to_string()),
        closed,
        notes: form.notes.trim().to_string(),
    };
    state
        .store
        .upsert_special_day(&day)
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok(Redirect::to("/business-hours"))
}

#[derive(Deserialize)]
pub struct CsrfOnly {
    #[serde(default)]
    pub csrf_token: String,
}

pub async fn delete_special_day(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Form(form): Form<CsrfOnly>,
) -> Result<Redirect, StatusCode> {
    check_csrf(&state, &headers, &form.csrf_token)?;
    state
        .store
        .delete_special_day(id)
        .map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(Redirect::to("/business-hours"))
}

//! Vacation-mode toggle.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, Redirect};
use axum::Form;
use serde::Deserialize;

use concierge_store::types::VacationMode;

use crate::app::AdminState;

use super::{check_csrf, csrf_field, escape_html, layout, page_csrf};

pub async fn view(State(state): State<Arc<AdminState>>, headers: HeaderMap) -> Html<String> {
    let mode = state.vacation.settings().unwrap_or_default();
    let csrf = page_csrf(&state, &headers);

    let body = format!(
        "<form method=\"post\" action=\"/vacation-mode\">{csrf_input}\
         <p><label><input type=\"checkbox\" name=\"active\" value=\"1\"{checked}> מצב חופשה פעיל</label></p>\
         <p><label>תאריך חזרה <input name=\"end_date\" value=\"{end}\" placeholder=\"2026-08-20\"></label></p>\
         <p><label>הודעה מותאמת<br><textarea name=\"custom_message\" rows=\"4\" cols=\"60\">{msg}</textarea></label></p>\
         <p><button>שמירה</button></p></form>",
        csrf_input = csrf_field(&csrf),
        checked = if mode.active { " checked" } else { "" },
        end = escape_html(mode.end_date.as_deref().unwrap_or("")),
        msg = escape_html(mode.custom_message.as_deref().unwrap_or("")),
    );
    layout(&state.business.name, "מצב חופשה", &body)
}

#[derive(Deserialize)]
pub struct VacationForm {
    #[serde(default)]
    pub csrf_token: String,
    #[serde(default)]
    pub active: Option<String>,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub custom_message: String,
}

pub async fn update(
    State(state): State<Arc<AdminState>>,
    headers: HeaderMap,
    Form(form): Form<VacationForm>,
) -> Result<Redirect, StatusCode> {
    check_csrf(&state, &headers, &form.csrf_token)?;
    let mode = VacationMode {
        active: form.active.is_some(),
        end_date: (!form.end_date.trim().is_empty()).then(|| form.end_date.trim().to_string()),
        custom_message: (!form.custom_message.trim().is_empty())
            .then(|| form.custom_message.trim().to_string()),
    };
    state
        .vacation
        .update(&mode)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Redirect::to("/vacation-mode"))
}

//! Admin HTTP handlers, grouped by area.

pub mod appointments;
pub mod auth_routes;
pub mod broadcast;
pub mod conversations;
pub mod dashboard;
pub mod hours;
pub mod kb;
pub mod personality;
pub mod referrals;
pub mod requests;
pub mod vacation;

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::Html;

use crate::app::{session_from_headers, AdminState};
use crate::auth;

pub(crate) fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Minimal shared page shell. The panel is plain server-rendered HTML;
/// styling lives in the one embedded stylesheet.
pub(crate) fn layout(business_name: &str, title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html dir=\"rtl\" lang=\"he\"><head><meta charset=\"utf-8\">\
         <title>{title} — {name}</title>\
         <style>body{{font-family:sans-serif;margin:2rem;max-width:72rem}}\
         nav a{{margin-left:1rem}}table{{border-collapse:collapse;width:100%}}\
         td,th{{border:1px solid #ccc;padding:.4rem;text-align:right}}\
         form.inline{{display:inline}}</style></head><body>\
         <nav><a href=\"/\">ראשי</a><a href=\"/kb\">מאגר ידע</a>\
         <a href=\"/conversations\">שיחות</a><a href=\"/requests\">בקשות נציג</a>\
         <a href=\"/appointments\">תורים</a><a href=\"/knowledge-gaps\">פערי ידע</a>\
         <a href=\"/business-hours\">שעות פעילות</a><a href=\"/vacation-mode\">חופשה</a>\
         <a href=\"/bot-personality\">אישיות הבוט</a><a href=\"/referrals\">הפניות</a>\
         <a href=\"/broadcast\">שידור</a><a href=\"/logout\">יציאה</a></nav>\
         <h1>{title}</h1>\n{body}\n</body></html>",
        name = escape_html(business_name),
    ))
}

/// The CSRF token for the caller's session, for embedding in forms.
pub(crate) fn page_csrf(state: &AdminState, headers: &HeaderMap) -> String {
    session_from_headers(headers)
        .map(|session| auth::csrf_token(&state.admin.secret_key, &session))
        .unwrap_or_default()
}

/// Validate the double-submit CSRF token on a form post.
pub(crate) fn check_csrf(
    state: &Arc<AdminState>,
    headers: &HeaderMap,
    token: &str,
) -> Result<(), StatusCode> {
    let session = session_from_headers(headers).ok_or(StatusCode::FORBIDDEN)?;
    if auth::verify_csrf(&state.admin.secret_key, &session, token) {
        Ok(())
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}

pub(crate) fn csrf_field(token: &str) -> String {
    format!("<input type=\"hidden\" name=\"csrf_token\" value=\"{token}\">")
}

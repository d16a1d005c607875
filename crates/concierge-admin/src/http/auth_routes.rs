//! Login and logout.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;
use tracing::{info, warn};

use crate::app::AdminState;
use crate::auth;

use super::escape_html;

pub async fn login_form(State(state): State<Arc<AdminState>>) -> Html<String> {
    Html(format!(
        "<!doctype html><html dir=\"rtl\" lang=\"he\"><head><meta charset=\"utf-8\">\
         <title>התחברות — {name}</title></head><body>\
         <h1>{name} — פאנל ניהול</h1>\
         <form method=\"post\" action=\"/login\">\
         <p><label>שם משתמש <input name=\"username\" autofocus></label></p>\
         <p><label>סיסמה <input name=\"password\" type=\"password\"></label></p>\
         <p><button type=\"submit\">התחברות</button></p>\
         </form></body></html>",
        name = escape_html(&state.business.name),
    ))
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

pub async fn login_submit(
    State(state): State<Arc<AdminState>>,
    Form(form): Form<LoginForm>,
) -> Response {
    if !auth::verify_credentials(&state.admin, &form.username, &form.password) {
        warn!(username = %form.username, "failed admin login");
        return Redirect::to("/login").into_response();
    }

    info!(username = %form.username, "admin logged in");
    let token = auth::issue_session(&state.admin.secret_key);
    let cookie = format!(
        "{}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        auth::SESSION_COOKIE,
        30 * 24 * 60 * 60
    );
    ([(SET_COOKIE, cookie)], Redirect::to("/")).into_response()
}

pub async fn logout() -> Response {
    let cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        auth::SESSION_COOKIE
    );
    ([(SET_COOKIE, cookie)], Redirect::to("/login")).into_response()
}

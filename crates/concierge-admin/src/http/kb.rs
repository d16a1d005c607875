//! Knowledge-base CRUD. Every mutation flags the vector index stale; the
//! rebuild button runs the incremental rebuild inline.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, Redirect};
use axum::Form;
use serde::Deserialize;
use tracing::{info, warn};

use crate::app::AdminState;

use super::{check_csrf, csrf_field, escape_html, layout, page_csrf};

#[derive(Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
}

pub async fn list(
    State(state): State<Arc<AdminState>>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> Html<String> {
    let entries = state
        .store
        .list_kb_entries(false, query.category.as_deref())
        .unwrap_or_default();
    let csrf = page_csrf(&state, &headers);

    let mut rows = String::new();
    for entry in &entries {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td><a href=\"/kb/edit/{id}\">{}</a></td>\
             <td>{}</td>\
             <td><form class=\"inline\" method=\"post\" action=\"/kb/delete/{id}\">{csrf_input}\
             <button>מחיקה</button></form></td></tr>",
            entry.id,
            escape_html(&entry.category),
            escape_html(&entry.title),
            if entry.active { "פעיל" } else { "כבוי" },
            id = entry.id,
            csrf_input = csrf_field(&csrf),
        ));
    }

    let stale = if state.index.is_stale() {
        "<p><strong>⚠️ האינדקס אינו מעודכן.</strong></p>"
    } else {
        ""
    };
    let body = format!(
        "{stale}<p><a href=\"/kb/add\">הוספת רשומה</a></p>\
         <form method=\"post\" action=\"/kb/rebuild\">{csrf_input}\
         <button>בניית אינדקס מחדש</button></form>\
         <table><tr><th>#</th><th>קטגוריה</th><th>כותרת</th><th>מצב</th><th></th></tr>{rows}</table>",
        csrf_input = csrf_field(&csrf),
    );
    layout(&state.business.name, "מאגר ידע", &body)
}

fn entry_form(csrf: &str, action: &str, category: &str, title: &str, content: &str) -> String {
    format!(
        "<form method=\"post\" action=\"{action}\">{csrf_input}\
         <p><label>קטגוריה <input name=\"category\" value=\"{cat}\" required></label></p>\
         <p><label>כותרת <input name=\"title\" value=\"{title}\" required></label></p>\
         <p><label>תוכן<br><textarea name=\"content\" rows=\"12\" cols=\"80\" required>{content}</textarea></label></p>\
         <p><button type=\"submit\">שמירה</button></p></form>",
        csrf_input = csrf_field(csrf),
        cat = escape_html(category),
        title = escape_html(title),
        content = escape_html(content),
    )
}

#[derive(Deserialize)]
pub struct EntryForm {
    #[serde(default)]
    pub csrf_token: String,
    pub category: String,
    pub title: String,
    pub content: String,
}

pub async fn add_form(State(state): State<Arc<AdminState>>, headers: HeaderMap) -> Html<String> {
    let csrf = page_csrf(&state, &headers);
    layout(
        &state.business.name,
        "הוספת רשומה",
        &entry_form(&csrf, "/kb/add", "", "", ""),
    )
}

pub async fn add(
    State(state): State<Arc<AdminState>>,
    headers: HeaderMap,
    Form(form): Form<EntryForm>,
) -> Result<Redirect, StatusCode> {
    check_csrf(&state, &headers, &form.csrf_token)?;
    state
        .store
        .add_kb_entry(&form.category, &form.title, &form.content)
        .map_err(|e| {
            warn!(error = %e, "kb add failed");
            StatusCode::BAD_REQUEST
        })?;
    mark_stale(&state);
    Ok(Redirect::to("/kb"))
}

pub async fn edit_form(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Html<String>, StatusCode> {
    let entry = state
        .store
        .get_kb_entry(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    let csrf = page_csrf(&state, &headers);
    Ok(layout(
        &state.business.name,
        "עריכת רשומה",
        &entry_form(
            &csrf,
            &format!("/kb/edit/{id}"),
            &entry.category,
            &entry.title,
            &entry.content,
        ),
    ))
}

pub async fn edit(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Form(form): Form<EntryForm>,
) -> Result<Redirect, StatusCode> {
    check_csrf(&state, &headers, &form.csrf_token)?;
    state
        .store
        .update_kb_entry(id, &form.category, &form.title, &form.content, true)
        .map_err(|e| {
            warn!(error = %e, id, "kb update failed");
            StatusCode::BAD_REQUEST
        })?;
    mark_stale(&state);
    Ok(Redirect::to("/kb"))
}

#[derive(Deserialize)]
pub struct CsrfOnly {
    #[serde(default)]
    pub csrf_token: String,
}

pub async fn delete(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Form(form): Form<CsrfOnly>,
) -> Result<Redirect, StatusCode> {
    check_csrf(&state, &headers, &form.csrf_token)?;
    state.store.delete_kb_entry(id).map_err(|e| {
        warn!(error = %e, id, "kb delete failed");
        StatusCode::NOT_FOUND
    })?;
    mark_stale(&state);
    Ok(Redirect::to("/kb"))
}

pub async fn rebuild(
    State(state): State<Arc<AdminState>>,
    headers: HeaderMap,
    Form(form): Form<CsrfOnly>,
) -> Result<Redirect, StatusCode> {
    check_csrf(&state, &headers, &form.csrf_token)?;
    match state.index.rebuild().await {
        Ok(report) => {
            info!(
                chunks = report.chunks,
                embedded = report.embedded,
                reused = report.reused,
                "index rebuilt from admin"
            );
            Ok(Redirect::to("/kb"))
        }
        Err(e) => {
            warn!(error = %e, "admin-triggered rebuild failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn mark_stale(state: &AdminState) {
    if let Err(e) = state.index.mark_stale() {
        warn!(error = %e, "failed to flag index stale");
    }
}

//! Agent requests and the knowledge-gaps view.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, Redirect};
use axum::Form;
use serde::Deserialize;

use concierge_store::types::AgentRequestStatus;

use crate::app::AdminState;

use super::{check_csrf, csrf_field, escape_html, layout, page_csrf};

pub async fn list(State(state): State<Arc<AdminState>>, headers: HeaderMap) -> Html<String> {
    let requests = state.store.list_agent_requests(None).unwrap_or_default();
    let csrf = page_csrf(&state, &headers);
    let csrf_input = csrf_field(&csrf);

    let mut rows = String::new();
    for req in &requests {
        rows.push_str(&format!(
            "<tr><td>{id}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td><form class=\"inline\" method=\"post\" action=\"/requests/{id}/handle\">{csrf_input}\
             <select name=\"status\"><option value=\"handled\">טופל</option>\
             <option value=\"dismissed\">נדחה</option><option value=\"pending\">ממתין</option></select>\
             <button>עדכון</button></form></td></tr>",
            escape_html(&req.username),
            escape_html(&req.reason),
            req.status,
            escape_html(&req.created_at),
            id = req.id,
        ));
    }

    let body = format!(
        "<table><tr><th>#</th><th>לקוח</th><th>סיבה</th><th>מצב</th><th>נוצר</th><th></th></tr>{rows}</table>"
    );
    layout(&state.business.name, "בקשות נציג", &body)
}

#[derive(Deserialize)]
pub struct HandleForm {
    #[serde(default)]
    pub csrf_token: String,
    pub status: String,
}

pub async fn handle(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Form(form): Form<HandleForm>,
) -> Result<Redirect, StatusCode> {
    check_csrf(&state, &headers, &form.csrf_token)?;
    let status =
        AgentRequestStatus::from_str(&form.status).map_err(|_| StatusCode::BAD_REQUEST)?;
    state
        .store
        .update_agent_request_status(id, status)
        .map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(Redirect::to("/requests"))
}

pub async fn knowledge_gaps(
    State(state): State<Arc<AdminState>>,
    headers: HeaderMap,
) -> Html<String> {
    let gaps = state.store.list_unanswered(false).unwrap_or_default();
    let csrf = page_csrf(&state, &headers);
    let csrf_input = csrf_field(&csrf);

    let mut rows = String::new();
    for gap in &gaps {
        let action = if gap.status == "open" {
            format!(
                "<form class=\"inline\" method=\"post\" action=\"/knowledge-gaps/{}/resolve\">\
                 {csrf_input}<button>סומן כנפתר</button></form>",
                gap.id,
            )
        } else {
            String::new()
        };
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{action}</td></tr>",
            gap.id,
            escape_html(&gap.question),
            escape_html(&gap.username),
            gap.status,
        ));
    }

    let body = format!(
        "<p>שאלות שהבוט לא ידע לענות עליהן — הוסיפו להן תוכן במאגר הידע.</p>\
         <table><tr><th>#</th><th>שאלה</th><th>לקוח</th><th>מצב</th><th></th></tr>{rows}</table>"
    );
    layout(&state.business.name, "פערי ידע", &body)
}

#[derive(Deserialize)]
pub struct CsrfOnly {
    #[serde(default)]
    pub csrf_token: String,
}

pub async fn resolve_gap(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Form(form): Form<CsrfOnly>,
) -> Result<Redirect, StatusCode> {
    check_csrf(&state, &headers, &form.csrf_token)?;
    state
        .store
        .resolve_unanswered(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Redirect::to("/knowledge-gaps"))
}

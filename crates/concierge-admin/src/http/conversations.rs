//! Conversation browsing and live-chat supervision.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, Redirect};
use axum::{Form, Json};
use serde::Deserialize;
use tracing::info;

use concierge_services::live_chat::SendOutcome;

use crate::app::AdminState;

use super::{check_csrf, csrf_field, escape_html, layout, page_csrf};

#[derive(Deserialize)]
pub struct ListQuery {
    pub user_id: Option<String>,
}

pub async fn list(
    State(state): State<Arc<AdminState>>,
    Query(query): Query<ListQuery>,
) -> Html<String> {
    let users = state.store.list_users().unwrap_or_default();
    let messages = match &query.user_id {
        Some(user_id) => state.store.history(user_id, 100).unwrap_or_default(),
        None => state.store.all_recent(200).unwrap_or_default(),
    };

    let mut user_list = String::from("<ul>");
    for user in &users {
        user_list.push_str(&format!(
            "<li><a href=\"/conversations?user_id={id}\">{name}</a> ({count}) \
             — <a href=\"/live-chat/{id}\">שיחה חיה</a></li>",
            id = escape_html(&user.user_id),
            name = escape_html(&user.username),
            count = user.message_count,
        ));
    }
    user_list.push_str("</ul>");

    let mut rows = String::new();
    for msg in &messages {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&msg.created_at),
            escape_html(&msg.username),
            msg.role.as_str(),
            escape_html(&msg.text),
        ));
    }

    let body = format!(
        "{user_list}<table><tr><th>זמן</th><th>לקוח</th><th>צד</th><th>הודעה</th></tr>{rows}</table>"
    );
    layout(&state.business.name, "שיחות", &body)
}

pub async fn live_chat_view(
    State(state): State<Arc<AdminState>>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Html<String> {
    let active = state.live_chat.is_active(&user_id).unwrap_or(false);
    let messages = state.store.history(&user_id, 50).unwrap_or_default();
    let csrf = page_csrf(&state, &headers);
    let csrf_input = csrf_field(&csrf);
    let user = escape_html(&user_id);

    let controls = if active {
        format!(
            "<form class=\"inline\" method=\"post\" action=\"/live-chat/{user}/send\">{csrf_input}\
             <input name=\"message\" size=\"60\" placeholder=\"הודעה ללקוח\">\
             <button>שליחה</button></form>\
             <form class=\"inline\" method=\"post\" action=\"/live-chat/{user}/end\">{csrf_input}\
             <button>סיום שיחה חיה</button></form>"
        )
    } else {
        format!(
            "<form class=\"inline\" method=\"post\" action=\"/live-chat/{user}/start\">{csrf_input}\
             <button>התחלת שיחה חיה</button></form>"
        )
    };

    let mut rows = String::new();
    for msg in &messages {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&msg.created_at),
            msg.role.as_str(),
            escape_html(&msg.text),
        ));
    }

    let body = format!(
        "<p>מצב: {}</p>{controls}\
         <table><tr><th>זמן</th><th>צד</th><th>הודעה</th></tr>{rows}</table>",
        if active { "שיחה חיה פעילה" } else { "בוט פעיל" },
    );
    layout(&state.business.name, &format!("שיחה חיה — {user}"), &body)
}

#[derive(Deserialize)]
pub struct CsrfOnly {
    #[serde(default)]
    pub csrf_token: String,
}

pub async fn live_chat_start(
    State(state): State<Arc<AdminState>>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Form(form): Form<CsrfOnly>,
) -> Result<Redirect, StatusCode> {
    check_csrf(&state, &headers, &form.csrf_token)?;
    let outcome = state
        .live_chat
        .start(&user_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    info!(user_id, ?outcome, "live chat start requested");
    Ok(Redirect::to(&format!("/live-chat/{user_id}")))
}

pub async fn live_chat_end(
    State(state): State<Arc<AdminState>>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Form(form): Form<CsrfOnly>,
) -> Result<Redirect, StatusCode> {
    check_csrf(&state, &headers, &form.csrf_token)?;
    let outcome = state
        .live_chat
        .end(&user_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    info!(user_id, ?outcome, "live chat end requested");
    Ok(Redirect::to(&format!("/live-chat/{user_id}")))
}

#[derive(Deserialize)]
pub struct SendForm {
    #[serde(default)]
    pub csrf_token: String,
    #[serde(default)]
    pub message: String,
}

pub async fn live_chat_send(
    State(state): State<Arc<AdminState>>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Form(form): Form<SendForm>,
) -> Result<Redirect, StatusCode> {
    check_csrf(&state, &headers, &form.csrf_token)?;
    match state
        .live_chat
        .send(&user_id, &form.message)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
    {
        SendOutcome::EmptyMessage => Err(StatusCode::BAD_REQUEST),
        SendOutcome::SessionEnded => Err(StatusCode::CONFLICT),
        SendOutcome::DeliveryFailed => Err(StatusCode::BAD_GATEWAY),
        SendOutcome::Sent => Ok(Redirect::to(&format!("/live-chat/{user_id}"))),
    }
}

pub async fn api_messages(
    State(state): State<Arc<AdminState>>,
    Path(user_id): Path<String>,
) -> Json<serde_json::Value> {
    let messages = state.store.history(&user_id, 50).unwrap_or_default();
    Json(serde_json::json!({
        "active": state.live_chat.is_active(&user_id).unwrap_or(false),
        "messages": messages,
    }))
}

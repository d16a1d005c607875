//! Broadcast creation and status. The worker itself runs on the chat
//! runtime via the dispatcher; this surface only enqueues and reports.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, Redirect};
use axum::Form;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use concierge_services::broadcast::{run_broadcast, BroadcastInput};

use crate::app::AdminState;

use super::{check_csrf, csrf_field, escape_html, layout, page_csrf};

pub async fn view(State(state): State<Arc<AdminState>>, headers: HeaderMap) -> Html<String> {
    let broadcasts = state.store.list_broadcasts(50).unwrap_or_default();
    let subscriber_count = state
        .store
        .subscribed_user_ids()
        .map(|ids| ids.len())
        .unwrap_or(0);
    let csrf = page_csrf(&state, &headers);

    let mut rows = String::new();
    for b in &broadcasts {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}/{}/{}</td><td>{}</td></tr>",
            b.id,
            escape_html(&b.text),
            escape_html(&b.audience_label),
            b.sent_count,
            b.failed_count,
            b.recipient_count,
            b.status,
        ));
    }

    let body = format!(
        "<p>מנויים פעילים: {subscriber_count}</p>\
         <form method=\"post\" action=\"/broadcast\">{csrf_input}\
         <p><label>הודעה<br><textarea name=\"message\" rows=\"5\" cols=\"60\" required></textarea></label></p>\
         <p><label>קהל <select name=\"audience\">\
         <option value=\"subscribers\">מנויים בלבד</option>\
         <option value=\"all\">כל הלקוחות</option></select></label></p>\
         <p><button>שליחה</button></p></form>\
         <h2>שידורים אחרונים</h2>\
         <table><tr><th>#</th><th>הודעה</th><th>קהל</th><th>נשלח/נכשל/סה\"כ</th><th>מצב</th></tr>{rows}</table>",
        csrf_input = csrf_field(&csrf),
    );
    layout(&state.business.name, "שידור ללקוחות", &body)
}

#[derive(Deserialize)]
pub struct BroadcastForm {
    #[serde(default)]
    pub csrf_token: String,
    pub message: String,
    #[serde(default)]
    pub audience: String,
}

pub async fn create(
    State(state): State<Arc<AdminState>>,
    headers: HeaderMap,
    Form(form): Form<BroadcastForm>,
) -> Result<Redirect, StatusCode> {
    check_csrf(&state, &headers, &form.csrf_token)?;
    let text = form.message.trim().to_string();
    if text.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let (audience_label, recipients) = if form.audience == "all" {
        (
            "כל הלקוחות",
            state
                .store
                .all_known_user_ids()
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?,
        )
    } else {
        (
            "מנויים",
            state
                .store
                .subscribed_user_ids()
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?,
        )
    };

    let broadcast_id = state
        .store
        .create_broadcast(&text, audience_label, recipients.len() as i64)
        .map_err(|e| {
            warn!(error = %e, "broadcast insert failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    info!(broadcast_id, recipients = recipients.len(), "broadcast enqueued");

    let store = Arc::clone(&state.store);
    let transport = Arc::clone(&state.transport);
    state.dispatcher.schedule(run_broadcast(
        store,
        transport,
        BroadcastInput {
            broadcast_id,
            text,
            recipients,
        },
        CancellationToken::new(),
    ));

    Ok(Redirect::to("/broadcast"))
}

//! Dashboard and the stats JSON polled by the page header.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Html;
use axum::Json;

use concierge_store::types::{AgentRequestStatus, AppointmentStatus};

use crate::app::AdminState;

use super::layout;

pub async fn index(State(state): State<Arc<AdminState>>) -> Html<String> {
    let kb_entries = state.store.count_kb_entries(true).unwrap_or(0);
    let users = state.store.count_unique_users().unwrap_or(0);
    let pending_requests = state
        .store
        .count_agent_requests(AgentRequestStatus::Pending)
        .unwrap_or(0);
    let pending_appointments = state
        .store
        .count_appointments(AppointmentStatus::Pending)
        .unwrap_or(0);
    let live_chats = state.store.count_active_live_chats().unwrap_or(0);
    let stale_notice = if state.index.is_stale() {
        "<p><strong>⚠️ מאגר הידע השתנה — יש לבנות מחדש את האינדקס.</strong></p>"
    } else {
        ""
    };

    let body = format!(
        "{stale_notice}<table>\
         <tr><th>רשומות ידע פעילות</th><td>{kb_entries}</td></tr>\
         <tr><th>לקוחות</th><td>{users}</td></tr>\
         <tr><th>בקשות נציג ממתינות</th><td>{pending_requests}</td></tr>\
         <tr><th>תורים ממתינים</th><td>{pending_appointments}</td></tr>\
         <tr><th>שיחות חיות פעילות</th><td>{live_chats}</td></tr>\
         </table>"
    );
    layout(&state.business.name, "לוח בקרה", &body)
}

pub async fn api_stats(State(state): State<Arc<AdminState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "pending_requests": state
            .store
            .count_agent_requests(AgentRequestStatus::Pending)
            .unwrap_or(0),
        "pending_appointments": state
            .store
            .count_appointments(AppointmentStatus::Pending)
            .unwrap_or(0),
        "active_live_chats": state.store.count_active_live_chats().unwrap_or(0),
        "index_stale": state.index.is_stale(),
    }))
}

//! Referral program overview.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Html;

use crate::app::AdminState;

use super::{escape_html, layout};

pub async fn view(State(state): State<Arc<AdminState>>) -> Html<String> {
    let stats = state.store.referral_stats().unwrap_or_default();
    let top = state.store.top_referrers(10).unwrap_or_default();
    let referrals = state.store.list_referrals().unwrap_or_default();

    let mut top_rows = String::new();
    for referrer in &top {
        top_rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td></tr>",
            escape_html(&referrer.referrer_id),
            referrer.completed,
        ));
    }

    let mut rows = String::new();
    for referral in &referrals {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&referral.code),
            escape_html(&referral.referrer_id),
            escape_html(referral.referred_id.as_deref().unwrap_or("—")),
            referral.status,
            if referral.sent { "נשלח" } else { "לא נשלח" },
        ));
    }

    let body = format!(
        "<table>\
         <tr><th>סה\"כ הפניות</th><td>{}</td></tr>\
         <tr><th>ממתינות</th><td>{}</td></tr>\
         <tr><th>הושלמו</th><td>{}</td></tr>\
         <tr><th>קודים שנשלחו</th><td>{}</td></tr>\
         <tr><th>הטבות פעילות</th><td>{}</td></tr>\
         </table>\
         <h2>מפנים מובילים</h2>\
         <table><tr><th>לקוח</th><th>הפניות שהושלמו</th></tr>{top_rows}</table>\
         <h2>כל ההפניות</h2>\
         <table><tr><th>קוד</th><th>מפנה</th><th>מופנה</th><th>מצב</th><th>שליחה</th></tr>{rows}</table>",
        stats.total, stats.pending, stats.completed, stats.codes_sent, stats.active_credits,
    );
    layout(&state.business.name, "תוכנית הפניות", &body)
}

//! Bot persona settings: tone, business DNA phrases, follow-up toggle.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, Redirect};
use axum::Form;
use serde::Deserialize;

use concierge_store::types::{BotSettings, Tone};

use crate::app::AdminState;

use super::{check_csrf, csrf_field, escape_html, layout, page_csrf};

const TONES: [(Tone, &str); 4] = [
    (Tone::Friendly, "ידידותי"),
    (Tone::Formal, "רשמי"),
    (Tone::Sales, "מכירתי"),
    (Tone::Luxury, "יוקרתי"),
];

pub async fn view(State(state): State<Arc<AdminState>>, headers: HeaderMap) -> Html<String> {
    let settings = state.store.bot_settings().unwrap_or_default();
    let csrf = page_csrf(&state, &headers);

    let mut options = String::new();
    for (tone, label) in TONES {
        options.push_str(&format!(
            "<option value=\"{tone}\"{selected}>{label}</option>",
            selected = if settings.tone == tone { " selected" } else { "" },
        ));
    }

    let body = format!(
        "<form method=\"post\" action=\"/bot-personality\">{csrf_input}\
         <p><label>טון דיבור <select name=\"tone\">{options}</select></label></p>\
         <p><label>משפטים ייחודיים לעסק (DNA)<br>\
         <textarea name=\"custom_phrases\" rows=\"5\" cols=\"60\">{phrases}</textarea></label></p>\
         <p><label><input type=\"checkbox\" name=\"follow_up_enabled\" value=\"1\"{fu}> \
         הצעת שאלות המשך אחרי תשובות</label></p>\
         <p><button>שמירה</button></p></form>",
        csrf_input = csrf_field(&csrf),
        phrases = escape_html(&settings.custom_phrases),
        fu = if settings.follow_up_enabled { " checked" } else { "" },
    );
    layout(&state.business.name, "אישיות הבוט", &body)
}

#[derive(Deserialize)]
pub struct PersonalityForm {
    #[serde(default)]
    pub csrf_token: String,
    pub tone: String,
    #[serde(default)]
    pub custom_phrases: String,
    #[serde(default)]
    pub follow_up_enabled: Option<String>,
}

pub async fn update(
    State(state): State<Arc<AdminState>>,
    headers: HeaderMap,
    Form(form): Form<PersonalityForm>,
) -> Result<Redirect, StatusCode> {
    check_csrf(&state, &headers, &form.csrf_token)?;
    let tone = Tone::from_str(&form.tone).map_err(|_| StatusCode::BAD_REQUEST)?;
    let settings = BotSettings {
        tone,
        custom_phrases: form.custom_phrases.trim().to_string(),
        follow_up_enabled: form.follow_up_enabled.is_some(),
    };
    state
        .store
        .update_bot_settings(&settings)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Redirect::to("/bot-personality"))
}

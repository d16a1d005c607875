//! Reply and inline keyboards for the customer chat.

use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup,
};

pub const BTN_PRICE_LIST: &str = "📋 מחירון";
pub const BTN_BOOK: &str = "📅 קביעת תור";
pub const BTN_LOCATION: &str = "📍 מיקום";
pub const BTN_AGENT: &str = "👤 דברו עם נציג";

pub const CB_CANCEL_YES: &str = "cancel_confirm_yes";
pub const CB_CANCEL_NO: &str = "cancel_confirm_no";
/// Follow-up callback data prefix; the suffix is the question text.
pub const CB_FOLLOW_UP_PREFIX: &str = "fu:";

/// Persistent main-menu reply keyboard.
pub fn main_menu() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![
            KeyboardButton::new(BTN_PRICE_LIST),
            KeyboardButton::new(BTN_BOOK),
        ],
        vec![
            KeyboardButton::new(BTN_LOCATION),
            KeyboardButton::new(BTN_AGENT),
        ],
    ])
    .resize_keyboard()
}

pub fn is_menu_button(text: &str) -> bool {
    matches!(text, BTN_PRICE_LIST | BTN_BOOK | BTN_LOCATION | BTN_AGENT)
}

/// yes/no confirmation for the cancellation intent.
pub fn cancel_confirm() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("כן, לבטל תור", CB_CANCEL_YES),
        InlineKeyboardButton::callback("לא", CB_CANCEL_NO),
    ]])
}

/// One button per follow-up suggestion. Telegram caps callback data at 64
/// bytes, so long questions are truncated on a char boundary.
pub fn follow_ups(questions: &[String]) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = questions
        .iter()
        .map(|q| {
            let mut data = format!("{CB_FOLLOW_UP_PREFIX}{q}");
            while data.len() > 64 {
                data.pop();
            }
            vec![InlineKeyboardButton::callback(q.clone(), data)]
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_buttons_recognized() {
        assert!(is_menu_button(BTN_PRICE_LIST));
        assert!(is_menu_button(BTN_AGENT));
        assert!(!is_menu_button("sometext"));
    }

    #[test]
    fn follow_up_callback_data_fits_telegram_limit() {
        let long = "ש".repeat(100);
        let markup = follow_ups(&[long]);
        let button = &markup.inline_keyboard[0][0];
        if let teloxide::types::InlineKeyboardButtonKind::CallbackData(data) = &button.kind {
            assert!(data.len() <= 64);
            assert!(data.starts_with(CB_FOLLOW_UP_PREFIX));
        } else {
            panic!("expected callback button");
        }
    }
}

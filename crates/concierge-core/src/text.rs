//! Canned customer-facing texts.
//!
//! Single source of truth for every fixed phrase the bot or the admin panel
//! sends to customers, so the bot path and the admin path never drift apart.
//! All texts are Hebrew-first, matching the business audience.

/// Fixed reply for a bare greeting — no retrieval, no LLM call.
pub const GREETING_REPLY: &str = "שלום! 👋 ברוכים הבאים. איך אפשר לעזור לכם היום?";

/// Fixed reply for thanks / goodbye.
pub const FAREWELL_REPLY: &str = "תודה שפניתם אלינו! 😊 אם תצטרכו עוד משהו, אנחנו כאן.\n\n\
נשמח לשמוע מכם — איך הייתה החוויה שלכם?";

/// The safe answer used whenever the pipeline cannot ground a reply in the
/// knowledge base. Also the trigger for creating an agent request.
pub const FALLBACK_RESPONSE: &str = "אין לי את המידע הזה כרגע. \
תנו לי להעביר אתכם לנציג אנושי שיוכל לעזור. \
נציג אנושי יחזור אליכם בקרוב!";

pub const RATE_LIMIT_MINUTE: &str = "קצב ההודעות מהיר מדי. אנא המתינו כחצי דקה ונסו שוב";

pub const RATE_LIMIT_HOUR: &str =
    "הגעתם למגבלת ההודעות לשעה הקרובה. ניתן יהיה להמשיך את השיחה בתום השעה";

pub const RATE_LIMIT_DAY: &str = "הגעתם למכסת ההודעות היומית של הבוט. \
ניתן להמשיך מול נציג אנושי בלחיצה על הכפתור למטה";

/// Sent to the customer when a human operator takes over.
pub const LIVE_CHAT_JOINED: &str = "👤 נציג אנושי הצטרף לשיחה. כעת תקבלו מענה ישיר.";

/// Sent to the customer when the operator hands the conversation back.
pub const LIVE_CHAT_ENDED: &str =
    "🤖 הבוט חזר לנהל את השיחה. אם תרצו לדבר עם נציג שוב, לחצו על 'דברו עם נציג'.";

/// Vacation-mode reply for a booking attempt.
pub fn vacation_booking_message(custom: Option<&str>, end_date: Option<&str>) -> String {
    if let Some(msg) = custom.map(str::trim).filter(|m| !m.is_empty()) {
        return msg.to_string();
    }
    match end_date.map(str::trim).filter(|d| !d.is_empty()) {
        Some(date) => format!(
            "אנחנו בחופשה עד {date}.\nניתן לקבוע תורים החל מ-{date}.\n\
             בינתיים, אתם מוזמנים לשאול אותי כל שאלה על השירותים שלנו!"
        ),
        None => "אנחנו כרגע בחופשה.\nנחזור בקרוב — עקבו אחרי העדכונים שלנו.\n\
                 בינתיים, אתם מוזמנים לשאול אותי כל שאלה על השירותים שלנו!"
            .to_string(),
    }
}

/// Vacation-mode reply for a "talk to agent" request.
pub fn vacation_agent_message(end_date: Option<&str>) -> String {
    match end_date.map(str::trim).filter(|d| !d.is_empty()) {
        Some(date) => format!(
            "אנחנו בחופשה עד {date}.\nניצור קשר כשנחזור.\n\
             בינתיים, אני יכול לענות על שאלות לגבי השירותים שלנו!"
        ),
        None => "אנחנו כרגע בחופשה.\nניצור קשר כשנחזור.\n\
                 בינתיים, אני יכול לענות על שאלות לגבי השירותים שלנו!"
            .to_string(),
    }
}

/// The referral-code message, shared by the bot and admin send paths.
/// `link` is a deep link when the bot username is configured, or a bare code.
pub fn referral_message(link: &str) -> String {
    format!(
        "🎁 רוצים לשתף עם חבר/ה?\n\nשלחו להם את הלינק הזה:\n{link}\n\n\
         כשהם יקבעו וישלימו תור — גם אתם וגם הם תקבלו 10% הנחה לחודשיים!"
    )
}

/// Welcome text for /start.
pub fn welcome_message(business_name: &str) -> String {
    format!(
        "👋 ברוכים הבאים ל-{business_name}!\n\n\
         אני העוזר הווירטואלי שלכם. אפשר לשאול אותי על:\n\
         • השירותים והמחירים שלנו\n\
         • קביעת תורים\n\
         • כל שאלה אחרת\n\
         • חיבור לנציג אנושי\n\n\
         פשוט כתבו שאלה או השתמשו בכפתורים למטה! 👇"
    )
}

pub const HELP_MESSAGE: &str = "🤖 איך משתמשים בבוט:\n\n\
• פשוט כתבו כל שאלה ואענה כמיטב יכולתי\n\
• 📋 מחירון — הצגת השירותים והמחירים\n\
• 📅 קביעת תור — תיאום ביקור\n\
• 📍 מיקום — הכתובת ודרכי הגעה\n\
• 👤 דברו עם נציג — שיחה עם אדם אמיתי";

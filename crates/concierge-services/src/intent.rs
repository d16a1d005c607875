//! Regex-based intent classification, bilingual (Hebrew + English).
//!
//! Patterns are tried in priority order; first match wins. Greeting and
//! farewell are anchored full-string (trailing punctuation allowed) so a
//! greeting followed by a real question never short-circuits. Pricing is
//! evaluated before booking so "how much to book" reads as a price question.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    Farewell,
    BusinessHours,
    AppointmentBooking,
    AppointmentCancel,
    Pricing,
    General,
}

static PATTERNS: LazyLock<Vec<(Intent, Regex)>> = LazyLock::new(|| {
    vec![
        (
            Intent::Greeting,
            Regex::new(concat!(
                r"(?i)^(hi|hello|hey|hiya|good morning|good evening|good afternoon",
                r"|שלום|היי|הי|בוקר טוב|ערב טוב|צהריים טובים|מה נשמע|מה קורה|אהלן|הלו",
                r")[.!?\s]*$",
            ))
            .unwrap(),
        ),
        (
            Intent::Farewell,
            Regex::new(concat!(
                r"(?i)^(thanks|thank you|bye|goodbye|see you|have a good day|good night",
                r"|תודה|תודה רבה|ביי|ביביי|להתראות|יום טוב|לילה טוב|שבוע טוב|יאללה ביי",
                r")[.!?\s]*$",
            ))
            .unwrap(),
        ),
        (
            Intent::BusinessHours,
            Regex::new(concat!(
                r"(?i)(opening\s*hours|business\s*hours|are\s*you\s*open|when\s*are\s*you\s*open",
                r"|what\s*time\s*do\s*you\s*(open|close)",
                r"|שעות\s*(ה)?פתיחה|שעות\s*(ה)?פעילות|מתי\s*אתם\s*פתוחים|אתם\s*פתוחים",
                r"|עד\s*מתי\s*פתוח|מתי\s*נפתחים|מתי\s*סוגרים)",
            ))
            .unwrap(),
        ),
        (
            Intent::AppointmentCancel,
            Regex::new(concat!(
                r"(?i)(cancel\s*(my\s*)?appointment|cancel\s*(my\s*)?booking",
                r"|i\s*want\s*to\s*cancel\s*(my\s*)?(appointment|booking|the\s*appointment)",
                r"|לבטל\s*(את\s*)?ה?תור|ביטול\s*(ה)?תור|רוצה\s*לבטל\s*(את\s*)?ה?תור",
                r"|אני\s*מבטל\s*(את\s*)?ה?תור|אני\s*רוצה\s*לבטל\s*את\s*התור",
                r"|אני\s*צריך\s*לבטל\s*(את\s*)?ה?תור)",
            ))
            .unwrap(),
        ),
        (
            Intent::Pricing,
            Regex::new(concat!(
                r"(?i)(how\s*much|what.*price\b|what.*cost\b|pricing|price\s*list",
                r"|כמה\s*עולה|כמה\s*זה\s*עולה|מה\s*המחיר|מה\s*העלות|מחיר|מחירון|מחירים",
                r"|כמה\s*יעלה|כמה\s*כסף|עלות|תעריף|תעריפים)",
            ))
            .unwrap(),
        ),
        (
            Intent::AppointmentBooking,
            Regex::new(concat!(
                r"(?i)(book\s*(an?\s*)?appointment|make\s*(an?\s*)?appointment",
                r"|schedule\s*(an?\s*)?appointment|set\s*up\s*(an?\s*)?appointment",
                r"|i\s*want\s*(an?\s*)?appointment|i\s*want\s*to\s*book",
                r"|רוצה\s*תור|רוצה\s*לקבוע\s*תור|לקבוע\s*תור|אפשר\s*תור|אפשר\s*לקבוע\s*תור",
                r"|קביעת\s*תור|לזמן\s*תור|אני\s*רוצה\s*לקבוע\s*תור",
                r"|בואו\s*נקבע\s*תור|יש\s*תורים\s*פנויים|מתי\s*אפשר\s*לקבוע\s*תור)",
            ))
            .unwrap(),
        ),
    ]
});

/// Classify one user message. Empty or whitespace input is `General`.
pub fn detect_intent(message: &str) -> Intent {
    let text = message.trim();
    if text.is_empty() {
        return Intent::General;
    }

    for (intent, pattern) in PATTERNS.iter() {
        if pattern.is_match(text) {
            debug!(?intent, preview = %text.chars().take(60).collect::<String>(), "intent detected");
            return *intent;
        }
    }
    Intent::General
}

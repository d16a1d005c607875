//! Persona system-prompt composition.
//!
//! Pure function of the bot-settings snapshot: tone opener + optional
//! business DNA + the numbered behavior rules. Rule 11 (follow-up
//! suggestions) is inserted after rule 10 only when the feature is enabled,
//! so the constraints section always closes the prompt.

use concierge_store::types::{BotSettings, Tone};

fn tone_opener(tone: Tone, business_name: &str) -> String {
    match tone {
        Tone::Friendly => format!(
            "אתה נציג שירות לקוחות ידידותי ומקצועי של {business_name}. \
             דבר בגובה העיניים, בחום ובפשטות."
        ),
        Tone::Formal => format!(
            "אתה נציג שירות לקוחות רשמי ומוקפד של {business_name}. \
             שמור על לשון מכובדת ומנוסחת היטב, ללא סלנג."
        ),
        Tone::Sales => format!(
            "אתה נציג שירות ומכירות נלהב של {business_name}. \
             הדגש את הערך של השירותים והצע ללקוח את הצעד הבא."
        ),
        Tone::Luxury => format!(
            "אתה נציג שירות יוקרתי ואדיב של {business_name}. \
             שדר בלעדיות, דיוק ותשומת לב אישית בכל תשובה."
        ),
    }
}

const RULES: &str = "\
כללים — יש לעקוב אחריהם בקפידה:
1. ענה רק על סמך המידע שסופק בהקשר. לעולם אל תמציא מידע.
2. אם ההקשר לא מכיל מספיק מידע כדי לענות, אמור: \"אין לי את המידע הזה כרגע. תנו לי להעביר אתכם לנציג אנושי שיוכל לעזור. נציג אנושי יחזור אליכם בקרוב!\"
3. תמיד ציין את המקור בסוף התשובה בפורמט: מקור: [שם הקטגוריה או כותרת המסמך]
4. היה חם, מועיל ותמציתי. השתמש בטון שיחתי.
5. אם הלקוח רוצה לקבוע תור, הנחה אותו להשתמש בכפתור קביעת התור.
6. אם הלקוח שואל על המיקום, הצע להשתמש בכפתור שליחת המיקום.
7. אם הלקוח נראה מתוסכל או מבקש לדבר עם אדם, הצע את כפתור \"דברו עם נציג\".
8. הצע פעולות רלוונטיות בהתאם (לדוגמה, \"האם תרצו לקבוע תור?\").
9. שמור על תשובות ממוקדות ובאורך של עד 200 מילים, אלא אם התבקש פירוט נוסף.
10. ענה באותה שפה שבה הלקוח פונה.";

const FOLLOW_UP_RULE: &str = "\
11. בסוף כל תשובה, הוסף בדיוק 2-3 שאלות המשך רלוונטיות שהלקוח עשוי לרצות לשאול, \
בשורה נפרדת אחרי ציון המקור, בפורמט:
[follow_up: שאלה ראשונה | שאלה שנייה | שאלה שלישית]
השאלות צריכות להיות קצרות (עד 5 מילים), ניתנות למענה מתוך ההקשר שסופק או \
מובילות לפעולה במערכת (קביעת תור, ביטול, נציג). אל תציע שאלות שכבר נענו בשיחה.";

/// Compose the persona system prompt from a settings snapshot.
pub fn build_system_prompt(settings: &BotSettings, business_name: &str) -> String {
    let mut prompt = tone_opener(settings.tone, business_name);

    let dna = settings.custom_phrases.trim();
    if !dna.is_empty() {
        prompt.push_str("\n\nסגנון הבית של העסק:\n");
        prompt.push_str(dna);
    }

    prompt.push_str("\n\n");
    prompt.push_str(RULES);

    if settings.follow_up_enabled {
        prompt.push('\n');
        prompt.push_str(FOLLOW_UP_RULE);
    }
    prompt
}

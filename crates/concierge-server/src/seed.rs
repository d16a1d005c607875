//! Demo seed data for a fresh installation: a starter knowledge base,
//! a default weekly schedule, and default bot settings.

use concierge_store::types::{BotSettings, BusinessHours};
use concierge_store::{Result, Store};
use tracing::info;

const SEED_ENTRIES: &[(&str, &str, &str)] = &[
    (
        "מחירון",
        "מחירון קיץ 2025",
        "תספורת נשים: 120 ש\"ח\n\
         תספורת גברים: 65 ש\"ח\n\
         צבע שיער: 250 ש\"ח\n\
         גוונים: 350 ש\"ח\n\
         פן: 80 ש\"ח\n\
         החלקה יפנית: 900 ש\"ח\n\
         טיפול קרטין: 650 ש\"ח",
    ),
    (
        "שירותים",
        "השירותים שלנו",
        "אנחנו מציעים: תספורות נשים וגברים, צבע וגוונים, פן ועיצוב שיער, \
         החלקות (יפנית וקרטין), טיפולי שיקום לשיער, ואיפור ערב בתיאום מראש.\n\n\
         כל שירות מתבצע על ידי צוות מקצועי ומנוסה.",
    ),
    (
        "מידע כללי",
        "כתובת והגעה",
        "אנחנו נמצאים ברחוב הרצל 12, תל אביב.\n\
         חניה ציבורית זמינה בחניון הסמוך (רחוב אלנבי 5).\n\
         תחנת האוטובוס הקרובה: הרצל/אלנבי — קווים 4, 18, 61.",
    ),
    (
        "מידע כללי",
        "יצירת קשר",
        "טלפון: 03-1234567\n\
         וואטסאפ: 050-1234567\n\
         אימייל: hello@salon.example\n\
         הדרך הנוחה ביותר לקבוע תור היא כאן בצ'אט, בכפתור קביעת התור.",
    ),
    (
        "מדיניות",
        "ביטולים ואיחורים",
        "ביטול תור ללא חיוב — עד 24 שעות לפני מועד התור.\n\
         ביטול באותו היום מחויב ב-50% ממחיר השירות.\n\
         איחור של יותר מ-15 דקות עשוי לקצר את הטיפול או לדחות את התור.",
    ),
    (
        "מדיניות",
        "אמצעי תשלום",
        "אנחנו מקבלים מזומן, אשראי, ביט ופייבוקס.\n\
         אין אפשרות לתשלום בצ'קים.",
    ),
    (
        "מבצעים",
        "הטבת חבר מביא חבר",
        "חבר/ה שמגיעים דרך לינק ההפניה שלכם ומשלימים תור ראשון — \
         גם הם וגם אתם מקבלים 10% הנחה לחודשיים.",
    ),
];

pub fn load_seed_data(store: &Store) -> Result<()> {
    for (category, title, content) in SEED_ENTRIES {
        store.add_kb_entry(category, title, content)?;
    }
    info!(entries = SEED_ENTRIES.len(), "seeded knowledge base");

    // Sunday–Thursday 09:00–19:00, Friday 09:00–14:00, Saturday closed.
    for dow in 0..=4u8 {
        store.upsert_hours(&BusinessHours {
            day_of_week: dow,
            open_time: Some("09:00".into()),
            close_time: Some("19:00".into()),
            closed: false,
        })?;
    }
    store.upsert_hours(&BusinessHours {
        day_of_week: 5,
        open_time: Some("09:00".into()),
        close_time: Some("14:00".into()),
        closed: false,
    })?;
    store.upsert_hours(&BusinessHours {
        day_of_week: 6,
        open_time: None,
        close_time: None,
        closed: true,
    })?;

    store.update_bot_settings(&BotSettings::default())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_populates_kb_hours_and_settings() {
        let store = Store::open_in_memory().unwrap();
        load_seed_data(&store).unwrap();

        assert_eq!(store.count_kb_entries(true).unwrap(), SEED_ENTRIES.len() as i64);
        assert_eq!(store.all_hours().unwrap().len(), 7);
        assert!(store.hours_for_day(6).unwrap().unwrap().closed);

        let settings = store.bot_settings().unwrap();
        assert_eq!(settings.tone, concierge_store::types::Tone::Friendly);
    }

    #[test]
    fn seeding_twice_duplicates_nothing_critical() {
        let store = Store::open_in_memory().unwrap();
        load_seed_data(&store).unwrap();
        load_seed_data(&store).unwrap();
        // Hours and settings are singletons; KB entries do duplicate, which
        // the admin can prune — assert the singletons stayed single.
        assert_eq!(store.all_hours().unwrap().len(), 7);
    }
}

//! Bot-settings singleton (persona tone, business DNA, follow-up flag).

use rusqlite::{params, OptionalExtension};

use crate::types::{BotSettings, Tone};
use crate::{Result, Store};

impl Store {
    pub fn bot_settings(&self) -> Result<BotSettings> {
        let conn = self.lock();
        let settings = conn
            .query_row(
                "SELECT tone, custom_phrases, follow_up_enabled FROM bot_settings WHERE id = 1",
                [],
                |row| {
                    let tone: String = row.get(0)?;
                    Ok(BotSettings {
                        tone: tone.parse().unwrap_or(Tone::Friendly),
                        custom_phrases: row.get(1)?,
                        follow_up_enabled: row.get::<_, i64>(2)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(settings.unwrap_or_default())
    }

    pub fn update_bot_settings(&self, settings: &BotSettings) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO bot_settings (id, tone, custom_phrases, follow_up_enabled)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                tone = excluded.tone,
                custom_phrases = excluded.custom_phrases,
                follow_up_enabled = excluded.follow_up_enabled",
            params![
                settings.tone.to_string(),
                settings.custom_phrases,
                settings.follow_up_enabled as i64
            ],
        )?;
        Ok(())
    }
}

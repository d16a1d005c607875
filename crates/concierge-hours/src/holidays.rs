//! Bundled Israeli holiday calendar.
//!
//! Static data covering 2025–2027; special-day rows in the store override
//! these, so the table only has to catch the default case. Dates are the
//! Gregorian days the business is closed (first/last days of multi-day
//! festivals, not the intermediate days).

use chrono::NaiveDate;

const HOLIDAYS: &[(&str, &str)] = &[
    // 2025
    ("2025-04-13", "פסח"),
    ("2025-04-19", "שביעי של פסח"),
    ("2025-05-01", "יום העצמאות"),
    ("2025-06-02", "שבועות"),
    ("2025-09-23", "ראש השנה"),
    ("2025-09-24", "ראש השנה (יום שני)"),
    ("2025-10-02", "יום כיפור"),
    ("2025-10-07", "סוכות"),
    ("2025-10-14", "שמחת תורה"),
    // 2026
    ("2026-04-02", "פסח"),
    ("2026-04-08", "שביעי של פסח"),
    ("2026-04-22", "יום העצמאות"),
    ("2026-05-22", "שבועות"),
    ("2026-09-12", "ראש השנה"),
    ("2026-09-13", "ראש השנה (יום שני)"),
    ("2026-09-21", "יום כיפור"),
    ("2026-09-26", "סוכות"),
    ("2026-10-03", "שמחת תורה"),
    // 2027
    ("2027-04-22", "פסח"),
    ("2027-04-28", "שביעי של פסח"),
    ("2027-05-12", "יום העצמאות"),
    ("2027-06-11", "שבועות"),
    ("2027-10-02", "ראש השנה"),
    ("2027-10-03", "ראש השנה (יום שני)"),
    ("2027-10-11", "יום כיפור"),
    ("2027-10-16", "סוכות"),
    ("2027-10-23", "שמחת תורה"),
];

/// Holiday name for `date`, if it is a bundled holiday.
pub fn holiday_on(date: NaiveDate) -> Option<&'static str> {
    let key = date.format("%Y-%m-%d").to_string();
    HOLIDAYS
        .iter()
        .find(|(d, _)| *d == key)
        .map(|(_, name)| *name)
}

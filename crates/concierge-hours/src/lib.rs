//! Business-hours resolution for the fixed Asia/Jerusalem business timezone.
//!
//! Resolution order for a date: special-day row → bundled holiday calendar →
//! weekly hours (with erev-chag annotation when tomorrow is a holiday and
//! the day is regularly open). Live status additionally handles overnight
//! shifts, where the early-morning tail belongs to yesterday's shift.

pub mod holidays;

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Asia::Jerusalem;

use concierge_store::{Result, Store};

/// Hebrew day names, Israeli convention: 0 = Sunday .. 6 = Saturday.
pub const DAY_NAMES_HE: [&str; 7] = ["ראשון", "שני", "שלישי", "רביעי", "חמישי", "שישי", "שבת"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSource {
    SpecialDay,
    Holiday,
    ErevChag,
    Regular,
}

#[derive(Debug, Clone)]
pub struct DayStatus {
    pub open: bool,
    pub open_time: Option<String>,
    pub close_time: Option<String>,
    pub reason: String,
    pub notes: String,
    pub source: StatusSource,
    pub day_name: String,
}

#[derive(Debug, Clone)]
pub struct OpenNow {
    pub open: bool,
    pub message: String,
    pub next_opening: Option<String>,
}

pub struct HoursService {
    store: Arc<Store>,
}

/// Map chrono's Monday-based weekday to the Israeli Sunday-based one.
fn israeli_dow(date: NaiveDate) -> u8 {
    ((date.weekday().num_days_from_monday() + 1) % 7) as u8
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

impl HoursService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    fn now_israel() -> chrono::DateTime<chrono_tz::Tz> {
        Utc::now().with_timezone(&Jerusalem)
    }

    /// Resolve the business status for a calendar date.
    pub fn status_for(&self, date: NaiveDate) -> Result<DayStatus> {
        let dow = israeli_dow(date);
        let day_name = DAY_NAMES_HE[dow as usize].to_string();
        let date_str = date.format("%Y-%m-%d").to_string();

        if let Some(special) = self.store.special_day_on(&date_str)? {
            if special.closed {
                return Ok(DayStatus {
                    open: false,
                    open_time: None,
                    close_time: None,
                    reason: special.name,
                    notes: special.notes,
                    source: StatusSource::SpecialDay,
                    day_name,
                });
            }
            return Ok(DayStatus {
                open: true,
                open_time: special.open_time,
                close_time: special.close_time,
                reason: format!("{} (שעות מיוחדות)", special.name),
                notes: special.notes,
                source: StatusSource::SpecialDay,
                day_name,
            });
        }

        if let Some(holiday) = holidays::holiday_on(date) {
            return Ok(DayStatus {
                open: false,
                open_time: None,
                close_time: None,
                reason: holiday.to_string(),
                notes: String::new(),
                source: StatusSource::Holiday,
                day_name,
            });
        }

        let hours = self.store.hours_for_day(dow)?;
        let regularly_closed = hours.as_ref().map(|h| h.closed).unwrap_or(true);

        // Erev chag only applies when the business is normally open that day.
        let tomorrow = date + Duration::days(1);
        if let Some(holiday) = holidays::holiday_on(tomorrow) {
            if !regularly_closed {
                let hours = hours.expect("regularly_closed checked above");
                return Ok(DayStatus {
                    open: true,
                    open_time: hours.open_time,
                    close_time: hours.close_time,
                    reason: format!("ערב {holiday}"),
                    notes: "ייתכן שעות מקוצרות — מומלץ לבדוק מראש".to_string(),
                    source: StatusSource::ErevChag,
                    day_name,
                });
            }
        }

        if regularly_closed {
            return Ok(DayStatus {
                open: false,
                open_time: None,
                close_time: None,
                reason: "סגור ביום זה".to_string(),
                notes: String::new(),
                source: StatusSource::Regular,
                day_name,
            });
        }

        let hours = hours.expect("regularly_closed checked above");
        Ok(DayStatus {
            open: true,
            open_time: hours.open_time,
            close_time: hours.close_time,
            reason: String::new(),
            notes: String::new(),
            source: StatusSource::Regular,
            day_name,
        })
    }

    pub fn is_currently_open(&self) -> Result<OpenNow> {
        let now = Self::now_israel();
        self.open_status_at(now.date_naive(), now.time())
    }

    /// Live status at an explicit local date and time.
    pub fn open_status_at(&self, date: NaiveDate, time: NaiveTime) -> Result<OpenNow> {
        // An overnight shift that started yesterday may still be running.
        let yesterday = date - Duration::days(1);
        let y_status = self.status_for(yesterday)?;
        if y_status.open {
            if let (Some(open), Some(close)) = (
                y_status.open_time.as_deref().and_then(parse_time),
                y_status.close_time.as_deref().and_then(parse_time),
            ) {
                if close <= open && time < close {
                    return Ok(OpenNow {
                        open: true,
                        message: format!(
                            "✅ כן! אנחנו פתוחים עד {}.",
                            y_status.close_time.as_deref().unwrap_or("")
                        ),
                        next_opening: None,
                    });
                }
            }
        }

        let status = self.status_for(date)?;
        if !status.open {
            let next = self.next_opening(date)?;
            return Ok(OpenNow {
                open: false,
                message: closed_message(&status, next.as_deref()),
                next_opening: next,
            });
        }

        let (Some(open_str), Some(close_str)) = (status.open_time.clone(), status.close_time.clone())
        else {
            // Open today without specific hours (special day without times).
            return Ok(OpenNow {
                open: true,
                message: "אנחנו פתוחים היום!".to_string(),
                next_opening: None,
            });
        };
        let (Some(open), Some(close)) = (parse_time(&open_str), parse_time(&close_str)) else {
            return Ok(OpenNow {
                open: true,
                message: "אנחנו פתוחים היום!".to_string(),
                next_opening: None,
            });
        };

        let overnight = close <= open;
        let within = if overnight {
            // Evening tail of today's shift; the morning tail was yesterday's.
            time >= open
        } else {
            open <= time && time < close
        };

        if within {
            let erev_note = if status.source == StatusSource::ErevChag {
                format!("\n⚠️ {} — {}", status.reason, status.notes)
            } else {
                String::new()
            };
            return Ok(OpenNow {
                open: true,
                message: format!("✅ כן! אנחנו פתוחים עד {close_str}.{erev_note}"),
                next_opening: None,
            });
        }

        if time < open {
            return Ok(OpenNow {
                open: false,
                message: format!("🔴 עדיין לא פתחנו — נפתח היום בשעה {open_str}."),
                next_opening: Some(format!("היום בשעה {open_str}")),
            });
        }

        let next = self.next_opening(date)?;
        let closed_today = DayStatus {
            open: false,
            open_time: None,
            close_time: None,
            reason: "סגרנו להיום".to_string(),
            notes: String::new(),
            source: StatusSource::Regular,
            day_name: status.day_name,
        };
        Ok(OpenNow {
            open: false,
            message: closed_message(&closed_today, next.as_deref()),
            next_opening: next,
        })
    }

    /// First day within a week of `from_date` that opens with known hours.
    pub fn next_opening(&self, from_date: NaiveDate) -> Result<Option<String>> {
        for i in 1..=7 {
            let date = from_date + Duration::days(i);
            let status = self.status_for(date)?;
            if status.open {
                if let Some(open_time) = status.open_time {
                    let label = if i == 1 {
                        format!("מחר ({}) בשעה {}", status.day_name, open_time)
                    } else {
                        format!("יום {} בשעה {}", status.day_name, open_time)
                    };
                    return Ok(Some(label));
                }
            }
        }
        Ok(None)
    }

    pub fn weekly_schedule_text(&self) -> Result<String> {
        let all = self.store.all_hours()?;
        if all.is_empty() {
            return Ok("לא הוגדרו שעות פעילות.".to_string());
        }
        let mut lines = vec!["שעות פעילות:".to_string()];
        for h in all {
            let day = DAY_NAMES_HE
                .get(h.day_of_week as usize)
                .copied()
                .unwrap_or("?");
            if h.closed {
                lines.push(format!("  {day}: סגור"));
            } else {
                lines.push(format!(
                    "  {day}: {} - {}",
                    h.open_time.as_deref().unwrap_or("?"),
                    h.close_time.as_deref().unwrap_or("?")
                ));
            }
        }
        Ok(lines.join("\n"))
    }

    /// Context block injected into the system prompt so the model can give
    /// time-aware answers without a retrieval hop.
    pub fn llm_context(&self) -> Result<String> {
        let now = Self::now_israel();
        let today = now.date_naive();
        let status = self.open_status_at(today, now.time())?;
        let schedule = self.weekly_schedule_text()?;

        let mut upcoming = Vec::new();
        for i in 0..7 {
            let date = today + Duration::days(i);
            let day_status = self.status_for(date)?;
            if matches!(
                day_status.source,
                StatusSource::SpecialDay | StatusSource::Holiday | StatusSource::ErevChag
            ) {
                upcoming.push(format!(
                    "  {} ({}): {}",
                    date.format("%d/%m"),
                    day_status.day_name,
                    day_status.reason
                ));
            }
        }

        let mut parts = vec![
            format!(
                "תאריך ושעה נוכחיים: {} (יום {})",
                now.format("%d/%m/%Y %H:%M"),
                DAY_NAMES_HE[israeli_dow(today) as usize]
            ),
            format!("סטטוס כרגע: {}", status.message),
            String::new(),
            schedule,
        ];
        if !upcoming.is_empty() {
            parts.push(String::new());
            parts.push("ימים מיוחדים קרובים:".to_string());
            parts.extend(upcoming);
        }
        Ok(parts.join("\n"))
    }
}

fn closed_message(status: &DayStatus, next_opening: Option<&str>) -> String {
    let mut msg = match status.source {
        StatusSource::Holiday | StatusSource::SpecialDay => {
            format!("🔴 סגור היום ({}).", status.reason)
        }
        _ if status.reason == "סגרנו להיום" => "🔴 סגרנו להיום.".to_string(),
        _ => "🔴 סגור כעת.".to_string(),
    };
    if let Some(next) = next_opening {
        msg.push_str(&format!("\nנפתח שוב: {next}"));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_store::types::{BusinessHours, SpecialDay};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    /// Sun–Thu 09:00–19:00, Fri 09:00–14:00, Sat closed.
    fn service_with_default_week() -> HoursService {
        let store = Arc::new(Store::open_in_memory().unwrap());
        for dow in 0..=4u8 {
            store
                .upsert_hours(&BusinessHours {
                    day_of_week: dow,
                    open_time: Some("09:00".into()),
                    close_time: Some("19:00".into()),
                    closed: false,
                })
                .unwrap();
        }
        store
            .upsert_hours(&BusinessHours {
                day_of_week: 5,
                open_time: Some("09:00".into()),
                close_time: Some("14:00".into()),
                closed: false,
            })
            .unwrap();
        store
            .upsert_hours(&BusinessHours {
                day_of_week: 6,
                open_time: None,
                close_time: None,
                closed: true,
            })
            .unwrap();
        HoursService::new(store)
    }

    #[test]
    fn israeli_dow_starts_on_sunday() {
        assert_eq!(israeli_dow(date(2026, 2, 15)), 0); // Sunday
        assert_eq!(israeli_dow(date(2026, 2, 16)), 1); // Monday
        assert_eq!(israeli_dow(date(2026, 2, 21)), 6); // Saturday
    }

    #[test]
    fn regular_day_uses_weekly_hours() {
        let svc = service_with_default_week();
        let status = svc.status_for(date(2026, 2, 16)).unwrap();
        assert!(status.open);
        assert_eq!(status.source, StatusSource::Regular);
        assert_eq!(status.open_time.as_deref(), Some("09:00"));
        assert_eq!(status.day_name, "שני");
    }

    #[test]
    fn special_day_overrides_everything() {
        let svc = service_with_default_week();
        // Overrides even a holiday date.
        svc.store
            .upsert_special_day(&SpecialDay {
                id: 0,
                date: "2026-09-21".into(),
                name: "פתוח חריג".into(),
                open_time: Some("10:00".into()),
                close_time: Some("13:00".into()),
                closed: false,
                notes: String::new(),
            })
            .unwrap();
        let status = svc.status_for(date(2026, 9, 21)).unwrap();
        assert!(status.open);
        assert_eq!(status.source, StatusSource::SpecialDay);
        assert!(status.reason.contains("שעות מיוחדות"));
    }

    #[test]
    fn holiday_closes_the_business() {
        let svc = service_with_default_week();
        let status = svc.status_for(date(2026, 9, 21)).unwrap();
        assert!(!status.open);
        assert_eq!(status.source, StatusSource::Holiday);
        assert_eq!(status.reason, "יום כיפור");
    }

    #[test]
    fn erev_chag_open_with_note() {
        let svc = service_with_default_week();
        // 2026-09-20 is a Sunday, the eve of Yom Kippur.
        let status = svc.status_for(date(2026, 9, 20)).unwrap();
        assert!(status.open);
        assert_eq!(status.source, StatusSource::ErevChag);
        assert!(status.reason.starts_with("ערב"));
        assert!(!status.notes.is_empty());
    }

    #[test]
    fn erev_chag_on_closed_day_stays_closed() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        // Monday closed; Sukkot 2025-10-07 falls on Tuesday.
        store
            .upsert_hours(&BusinessHours {
                day_of_week: 1,
                open_time: None,
                close_time: None,
                closed: true,
            })
            .unwrap();
        let svc = HoursService::new(store);
        let status = svc.status_for(date(2025, 10, 6)).unwrap();
        assert!(!status.open);
        assert_eq!(status.source, StatusSource::Regular);
    }

    #[test]
    fn open_within_regular_hours() {
        let svc = service_with_default_week();
        let now = svc.open_status_at(date(2026, 2, 16), time(12, 0)).unwrap();
        assert!(now.open);
        assert!(now.message.contains("19:00"));
    }

    #[test]
    fn before_opening_reports_todays_open_time() {
        let svc = service_with_default_week();
        let now = svc.open_status_at(date(2026, 2, 16), time(8, 0)).unwrap();
        assert!(!now.open);
        assert_eq!(now.next_opening.as_deref(), Some("היום בשעה 09:00"));
    }

    #[test]
    fn after_close_points_to_next_opening() {
        let svc = service_with_default_week();
        let now = svc.open_status_at(date(2026, 2, 16), time(21, 0)).unwrap();
        assert!(!now.open);
        let next = now.next_opening.unwrap();
        assert!(next.contains("מחר"));
        assert!(next.contains("09:00"));
    }

    #[test]
    fn overnight_shift_spans_midnight() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        // Monday 22:00–02:00, everything else closed.
        for dow in 0..=6u8 {
            store
                .upsert_hours(&BusinessHours {
                    day_of_week: dow,
                    open_time: if dow == 1 { Some("22:00".into()) } else { None },
                    close_time: if dow == 1 { Some("02:00".into()) } else { None },
                    closed: dow != 1,
                })
                .unwrap();
        }
        let svc = HoursService::new(store);

        // 23:00 Monday — evening tail of today's shift.
        let evening = svc.open_status_at(date(2026, 2, 16), time(23, 0)).unwrap();
        assert!(evening.open);

        // 01:00 Tuesday — still inside Monday's shift.
        let small_hours = svc.open_status_at(date(2026, 2, 17), time(1, 0)).unwrap();
        assert!(small_hours.open, "01:00 belongs to yesterday's overnight shift");

        // 03:00 Tuesday — shift over.
        let after = svc.open_status_at(date(2026, 2, 17), time(3, 0)).unwrap();
        assert!(!after.open);
    }

    #[test]
    fn saturday_closed_with_next_opening_sunday() {
        let svc = service_with_default_week();
        let now = svc.open_status_at(date(2026, 2, 21), time(12, 0)).unwrap();
        assert!(!now.open);
        let next = now.next_opening.unwrap();
        assert!(next.contains("ראשון"));
    }

    #[test]
    fn weekly_schedule_lists_all_days() {
        let svc = service_with_default_week();
        let text = svc.weekly_schedule_text().unwrap();
        assert!(text.contains("ראשון: 09:00 - 19:00"));
        assert!(text.contains("שבת: סגור"));
    }
}

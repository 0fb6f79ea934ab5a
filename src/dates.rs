//! Day-first parsing of the date tokens the portal prints, plus the clock
//! that decides what "today" is.

use regex::Regex;
use std::sync::LazyLock;
use time::{Date, Month, OffsetDateTime, UtcOffset};

/// `D/M/Y` with slash, dash or dot separators and a 2-4 digit year.
pub const NUMERIC_DATE: &str = r"\d{1,2}[/\-.]\d{1,2}[/\-.]\d{2,4}";
/// `D Month Y`, month spelled out or abbreviated.
pub const WORDED_DATE: &str = r"\d{1,2}\s+\w+\s+\d{4}";

static NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})[/\-.](\d{1,2})[/\-.](\d{2,4})$").expect("static regex")
});
static WORDED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})\s+(\w+)\s+(\d{4})$").expect("static regex"));

const MONTHS: [(&str, Month); 12] = [
    ("january", Month::January),
    ("february", Month::February),
    ("march", Month::March),
    ("april", Month::April),
    ("may", Month::May),
    ("june", Month::June),
    ("july", Month::July),
    ("august", Month::August),
    ("september", Month::September),
    ("october", Month::October),
    ("november", Month::November),
    ("december", Month::December),
];

/// Parse a single date token, day first.
///
/// A numeric token whose day-first reading is impossible but whose
/// month-first reading is valid (`03/15/2024`) is accepted month-first.
/// Two-digit years land in 2000-2099. Anything else yields `None`.
pub fn parse_day_first(token: &str) -> Option<Date> {
    let token = token.trim();

    if let Some(caps) = NUMERIC.captures(token) {
        let a: u8 = caps[1].parse().ok()?;
        let b: u8 = caps[2].parse().ok()?;
        let year = expand_year(&caps[3])?;
        return calendar_date(year, b, a).or_else(|| {
            if b > 12 {
                calendar_date(year, a, b)
            } else {
                None
            }
        });
    }

    if let Some(caps) = WORDED.captures(token) {
        let day: u8 = caps[1].parse().ok()?;
        let month = month_from_name(&caps[2])?;
        let year: i32 = caps[3].parse().ok()?;
        return Date::from_calendar_date(year, month, day).ok();
    }

    None
}

fn expand_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    Some(if raw.len() == 2 { 2000 + year } else { year })
}

fn calendar_date(year: i32, month: u8, day: u8) -> Option<Date> {
    let month = Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

fn month_from_name(name: &str) -> Option<Month> {
    let name = name.to_ascii_lowercase();
    if name.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .find(|(full, _)| full.starts_with(&name))
        .map(|(_, m)| *m)
}

/// Canonical `D/M/Y` rendering, the inverse of [`parse_day_first`].
pub fn format_day_first(date: Date) -> String {
    format!(
        "{:02}/{:02}/{:04}",
        date.day(),
        u8::from(date.month()),
        date.year()
    )
}

/// Source of "today" for the hearing-date filter.
pub trait Clock {
    fn today(&self) -> Date;
}

/// Wall clock at a fixed offset, or at the host's local offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    offset: Option<UtcOffset>,
}

impl SystemClock {
    pub fn with_offset_minutes(minutes: Option<i32>) -> Self {
        let offset = minutes
            .and_then(|m| m.checked_mul(60))
            .and_then(|secs| UtcOffset::from_whole_seconds(secs).ok());
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn today(&self) -> Date {
        match self.offset {
            Some(offset) => OffsetDateTime::now_utc().to_offset(offset).date(),
            None => OffsetDateTime::now_local()
                .unwrap_or_else(|_| OffsetDateTime::now_utc())
                .date(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Date);

impl Clock for FixedClock {
    fn today(&self) -> Date {
        self.0
    }
}

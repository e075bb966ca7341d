//! Day-type buckets and the holiday calendar used to assign them.
//!
//! Reference statistics and rules are always scoped to one bucket: trips run
//! on a holiday are compared with other holiday trips, never with an ordinary
//! weekday, even when the holiday falls on a Wednesday.

use chrono::{Datelike, Days, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Day-of-week bucket a trip belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayBucket {
    #[serde(alias = "SEG_SEX")]
    Weekday,
    #[serde(alias = "SABADO")]
    Saturday,
    #[serde(alias = "DOMINGO")]
    Sunday,
    #[serde(alias = "FERIADO")]
    Holiday,
}

impl DayBucket {
    pub const ALL: [DayBucket; 4] = [
        DayBucket::Weekday,
        DayBucket::Saturday,
        DayBucket::Sunday,
        DayBucket::Holiday,
    ];

    /// Resolves the bucket for `day`. A holiday wins over the day of week.
    pub fn of(day: NaiveDate, calendar: &HolidayCalendar) -> Self {
        if calendar.is_holiday(day) {
            return DayBucket::Holiday;
        }

        match day.weekday() {
            Weekday::Sat => DayBucket::Saturday,
            Weekday::Sun => DayBucket::Sunday,
            _ => DayBucket::Weekday,
        }
    }
}

impl fmt::Display for DayBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DayBucket::Weekday => "weekday",
            DayBucket::Saturday => "saturday",
            DayBucket::Sunday => "sunday",
            DayBucket::Holiday => "holiday",
        };
        f.write_str(s)
    }
}

impl FromStr for DayBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "WEEKDAY" | "SEG_SEX" => Ok(DayBucket::Weekday),
            "SATURDAY" | "SABADO" => Ok(DayBucket::Saturday),
            "SUNDAY" | "DOMINGO" => Ok(DayBucket::Sunday),
            "HOLIDAY" | "FERIADO" => Ok(DayBucket::Holiday),
            _ => Err(format!(
                "Invalid day bucket: {}. Use weekday, saturday, sunday or holiday",
                s
            )),
        }
    }
}

#[derive(Debug, Clone)]
struct FixedHoliday {
    month: u32,
    day: u32,
    name: &'static str,
}

#[derive(Debug, Clone)]
struct MovableHoliday {
    /// Days relative to Easter Sunday.
    easter_offset: i64,
    name: &'static str,
}

/// National fixed-date holidays.
static NATIONAL_FIXED: &[(u32, u32, &str)] = &[
    (1, 1, "Confraternização Universal"),
    (4, 21, "Tiradentes"),
    (5, 1, "Dia do Trabalho"),
    (9, 7, "Independência"),
    (10, 12, "Nossa Senhora Aparecida"),
    (11, 2, "Finados"),
    (11, 15, "Proclamação da República"),
    (11, 20, "Consciência Negra"),
    (12, 25, "Natal"),
];

static NATIONAL_MOVABLE: &[(i64, &str)] = &[
    (-48, "Carnaval (segunda)"),
    (-47, "Carnaval (terça)"),
    (-2, "Sexta-feira Santa"),
    (60, "Corpus Christi"),
];

/// Goiás state and Goiânia municipal holidays.
static REGIONAL_FIXED: &[(u32, u32, &str)] = &[
    (5, 24, "Nossa Senhora Auxiliadora"),
    (7, 26, "Fundação de Goiás"),
    (10, 24, "Aniversário de Goiânia"),
];

/// Fixed holiday calendar. Dates are derived per year, so the calendar never
/// needs refreshing; `with_extra_dates` covers one-off decrees.
#[derive(Debug, Clone)]
pub struct HolidayCalendar {
    fixed: Vec<FixedHoliday>,
    movable: Vec<MovableHoliday>,
    extra: BTreeSet<NaiveDate>,
}

impl HolidayCalendar {
    /// Brazilian national holidays only.
    pub fn national() -> Self {
        Self {
            fixed: NATIONAL_FIXED
                .iter()
                .map(|&(month, day, name)| FixedHoliday { month, day, name })
                .collect(),
            movable: NATIONAL_MOVABLE
                .iter()
                .map(|&(easter_offset, name)| MovableHoliday {
                    easter_offset,
                    name,
                })
                .collect(),
            extra: BTreeSet::new(),
        }
    }

    /// National holidays plus the Goiás state and Goiânia municipal ones.
    pub fn goiania() -> Self {
        let mut calendar = Self::national();
        calendar.fixed.extend(
            REGIONAL_FIXED
                .iter()
                .map(|&(month, day, name)| FixedHoliday { month, day, name }),
        );
        calendar
    }

    /// Adds ad-hoc holiday dates (decreed optional days, local events).
    pub fn with_extra_dates(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.extra.extend(dates);
        self
    }

    pub fn is_holiday(&self, day: NaiveDate) -> bool {
        self.holiday_name(day).is_some()
    }

    /// Name of the holiday on `day`, if any.
    pub fn holiday_name(&self, day: NaiveDate) -> Option<&str> {
        if let Some(h) = self
            .fixed
            .iter()
            .find(|h| h.month == day.month() && h.day == day.day())
        {
            return Some(h.name);
        }

        if let Some(easter) = easter_sunday(day.year()) {
            let offset = (day - easter).num_days();
            if let Some(h) = self.movable.iter().find(|h| h.easter_offset == offset) {
                return Some(h.name);
            }
        }

        if self.extra.contains(&day) {
            return Some("extra");
        }

        None
    }

    /// All holidays that fall in `year`, sorted by date.
    pub fn holidays_in(&self, year: i32) -> Vec<(NaiveDate, &str)> {
        let mut days: Vec<(NaiveDate, &str)> = self
            .fixed
            .iter()
            .filter_map(|h| NaiveDate::from_ymd_opt(year, h.month, h.day).map(|d| (d, h.name)))
            .collect();

        if let Some(easter) = easter_sunday(year) {
            days.extend(
                self.movable
                    .iter()
                    .filter_map(|h| {
                        easter
                            .checked_add_signed(Duration::days(h.easter_offset))
                            .map(|d| (d, h.name))
                    }),
            );
        }

        days.extend(
            self.extra
                .iter()
                .filter(|d| d.year() == year)
                .map(|d| (*d, "extra")),
        );

        days.sort();
        days.dedup_by_key(|(d, _)| *d);
        days
    }
}

impl Default for HolidayCalendar {
    fn default() -> Self {
        Self::goiania()
    }
}

/// Easter Sunday for the Gregorian `year` (anonymous Gregorian algorithm).
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year.rem_euclid(19);
    let b = year.div_euclid(100);
    let c = year.rem_euclid(100);
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;

    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

/// Longest lookback or reference window accepted, about ten years.
pub const MAX_WINDOW_DAYS: u32 = 3660;

/// `day - days`, clamped to the earliest date chrono can represent.
pub fn days_before(day: NaiveDate, days: u32) -> NaiveDate {
    day.checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN)
}

/// Start of the 30-minute slot containing `at`, formatted `HH:MM`.
pub fn time_slot(at: NaiveDateTime) -> String {
    let minute = if at.minute() < 30 { 0 } else { 30 };
    format!("{:02}:{:02}", at.hour(), minute)
}

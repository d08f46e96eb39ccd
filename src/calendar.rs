// Week and month windows in a fixed civil calendar.
//
// Weeks start on Monday. Labels use ISO week numbering.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Denver;

/// Calendar arithmetic pinned to one named timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarWindow {
    tz: Tz,
}

impl Default for CalendarWindow {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEZONE)
    }
}

impl CalendarWindow {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    fn local_date(&self, t: DateTime<Utc>) -> NaiveDate {
        t.with_timezone(&self.tz).date_naive()
    }

    /// First instant of a local calendar day.
    ///
    /// When midnight falls inside a DST gap, the first valid wall-clock time
    /// after it is used; when it is ambiguous, the earlier instant.
    fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_time(NaiveTime::MIN);
        (0..=96)
            .find_map(|step| {
                self.tz
                    .from_local_datetime(&(midnight + Duration::minutes(15 * step)))
                    .earliest()
            })
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or_else(|| midnight.and_utc())
    }

    fn monday_of(date: NaiveDate) -> NaiveDate {
        date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
    }

    fn first_of_month(date: NaiveDate) -> NaiveDate {
        date.with_day(1).unwrap_or(date)
    }

    fn first_of_next_month(year: i32, month: u32) -> Option<NaiveDate> {
        if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
    }

    /// Monday 00:00:00.000 local of the week containing `t`.
    pub fn week_start(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        self.start_of_day(Self::monday_of(self.local_date(t)))
    }

    /// Sunday 23:59:59.999 local of the week containing `t`.
    pub fn week_end(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let next_monday = Self::monday_of(self.local_date(t)) + Duration::days(7);
        self.start_of_day(next_monday) - Duration::milliseconds(1)
    }

    /// First of the month, 00:00:00.000 local.
    pub fn month_start(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        self.start_of_day(Self::first_of_month(self.local_date(t)))
    }

    /// Last day of the month, 23:59:59.999 local.
    pub fn month_end(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let date = self.local_date(t);
        match Self::first_of_next_month(date.year(), date.month()) {
            Some(next) => self.start_of_day(next) - Duration::milliseconds(1),
            None => DateTime::<Utc>::MAX_UTC,
        }
    }

    /// Inclusive bounds of a calendar month. `None` for an invalid month.
    pub fn month_bounds(&self, year: i32, month: u32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = Self::first_of_next_month(year, month)?;
        Some((
            self.start_of_day(first),
            self.start_of_day(next) - Duration::milliseconds(1),
        ))
    }

    /// Local `(year, month)` containing `t`.
    pub fn year_month(&self, t: DateTime<Utc>) -> (i32, u32) {
        let date = self.local_date(t);
        (date.year(), date.month())
    }

    /// `"<ISO year>-W<ww>"`.
    pub fn week_label(&self, t: DateTime<Utc>) -> String {
        let week = self.local_date(t).iso_week();
        format!("{}-W{:02}", week.year(), week.week())
    }

    /// `"<year>-<mm>"`.
    pub fn month_label(&self, t: DateTime<Utc>) -> String {
        let (year, month) = self.year_month(t);
        format!("{year}-{month:02}")
    }
}

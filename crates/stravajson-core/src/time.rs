//! Time window resolution for activity queries.
//!
//! Windows are expressed as epoch seconds: `after` is inclusive, `before` is
//! exclusive and optional (the caller substitutes "now" when absent). Bounds
//! can be given either as raw epoch seconds or as local `YYYY-MM-DD` dates,
//! which resolve against a time zone (normally [`chrono::Local`]).

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

/// Date format accepted for `--after` / `--before`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Errors raised while resolving a time window.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeError {
    /// A date flag was not a valid `YYYY-MM-DD` date.
    #[error("{flag} must be in YYYY-MM-DD format (got {value:?})")]
    InvalidDate { flag: String, value: String },

    /// Both forms of the same bound were given.
    #[error("use either {first} or {second}, not both")]
    Conflicting {
        first: &'static str,
        second: &'static str,
    },

    /// No lower bound was provided.
    #[error("please provide --after or --after-epoch")]
    MissingLowerBound,

    /// Local midnight does not exist and no later instant on that day could be found.
    #[error("no valid local time exists at the start of {0}")]
    NonexistentLocalTime(NaiveDate),
}

/// Result type for time window operations.
pub type TimeResult<T> = Result<T, TimeError>;

/// One side of a time window, as provided by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowBound {
    /// A local calendar date.
    Date(NaiveDate),
    /// Epoch seconds (UTC).
    Epoch(i64),
}

/// The bounds requested by the user, before resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowRequest {
    /// Lower bound (required for resolution).
    pub after: Option<WindowBound>,
    /// Upper bound; `None` means "up to now".
    pub before: Option<WindowBound>,
}

impl WindowRequest {
    /// Builds a request from the four CLI flag forms, rejecting conflicts.
    pub fn from_flags(
        after_date: Option<NaiveDate>,
        after_epoch: Option<i64>,
        before_date: Option<NaiveDate>,
        before_epoch: Option<i64>,
    ) -> TimeResult<Self> {
        let after = pick("--after", after_date, "--after-epoch", after_epoch)?;
        let before = pick("--before", before_date, "--before-epoch", before_epoch)?;
        Ok(Self { after, before })
    }

    /// Returns true if the caller supplied an explicit upper bound.
    pub fn has_explicit_before(&self) -> bool {
        self.before.is_some()
    }

    /// Resolves the request to epoch seconds in the given time zone.
    ///
    /// A date `after` resolves to local midnight of that day; a date `before`
    /// resolves to local midnight of the following day (exclusive end).
    pub fn resolve<Tz: TimeZone>(&self, tz: &Tz) -> TimeResult<TimeWindow> {
        let after = match self.after.ok_or(TimeError::MissingLowerBound)? {
            WindowBound::Epoch(secs) => secs,
            WindowBound::Date(date) => day_start_epoch(date, tz)?,
        };
        let before = match self.before {
            None => None,
            Some(WindowBound::Epoch(secs)) => Some(secs),
            Some(WindowBound::Date(date)) => Some(day_end_exclusive_epoch(date, tz)?),
        };
        Ok(TimeWindow { after, before })
    }

    /// Resolves the request against the system's local time zone.
    pub fn resolve_local(&self) -> TimeResult<TimeWindow> {
        self.resolve(&Local)
    }
}

fn pick(
    date_flag: &'static str,
    date: Option<NaiveDate>,
    epoch_flag: &'static str,
    epoch: Option<i64>,
) -> TimeResult<Option<WindowBound>> {
    match (date, epoch) {
        (Some(_), Some(_)) => Err(TimeError::Conflicting {
            first: date_flag,
            second: epoch_flag,
        }),
        (Some(d), None) => Ok(Some(WindowBound::Date(d))),
        (None, Some(e)) => Ok(Some(WindowBound::Epoch(e))),
        (None, None) => Ok(None),
    }
}

/// A resolved query window in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Inclusive lower bound.
    pub after: i64,
    /// Exclusive upper bound, if the caller gave one.
    pub before: Option<i64>,
}

impl TimeWindow {
    /// Creates a window.
    pub fn new(after: i64, before: Option<i64>) -> Self {
        Self { after, before }
    }

    /// Returns the upper bound, substituting `now` when absent.
    pub fn before_or(&self, now: i64) -> i64 {
        self.before.unwrap_or(now)
    }
}

/// Parses a `YYYY-MM-DD` date, naming `flag` in the error.
pub fn parse_local_date(flag: &str, value: &str) -> TimeResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| TimeError::InvalidDate {
        flag: flag.to_string(),
        value: value.to_string(),
    })
}

/// Epoch seconds of the first instant of `date` in `tz`.
///
/// When midnight is skipped by a DST transition, the first whole hour that
/// exists on that day is used instead.
pub fn day_start_epoch<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> TimeResult<i64> {
    let midnight = date.and_hms_opt(0, 0, 0).ok_or(TimeError::NonexistentLocalTime(date))?;
    (0..24)
        .map(|hours| midnight + Duration::hours(hours))
        .take_while(|candidate: &NaiveDateTime| candidate.date() == date)
        .find_map(|candidate| tz.from_local_datetime(&candidate).earliest())
        .map(|dt| dt.timestamp())
        .ok_or(TimeError::NonexistentLocalTime(date))
}

/// Epoch seconds of the first instant of the day after `date` in `tz`.
pub fn day_end_exclusive_epoch<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> TimeResult<i64> {
    let next = date.succ_opt().ok_or(TimeError::NonexistentLocalTime(date))?;
    day_start_epoch(next, tz)
}

/// Current time in epoch seconds.
pub fn now_epoch() -> i64 {
    Utc::now().timestamp()
}

/// Local timestamp suitable for file names, e.g. `20240305_071500`.
pub fn now_stamp() -> String {
    stamp(Local::now())
}

fn stamp<Tz: TimeZone>(at: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn utc_minus_5() -> FixedOffset {
        FixedOffset::west_opt(5 * 3600).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn utc_epoch(y: i32, m: u32, d: u32, h: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap().timestamp()
    }

    #[test]
    fn after_date_resolves_to_local_midnight() {
        let date = parse_local_date("--after", "2024-01-01").unwrap();
        let request = WindowRequest::from_flags(Some(date), None, None, None).unwrap();
        let window = request.resolve(&utc_minus_5()).unwrap();

        assert_eq!(window.after, utc_epoch(2024, 1, 1, 5));
        assert_eq!(window.before, None);
        assert!(!request.has_explicit_before());
    }

    #[test]
    fn before_date_resolves_to_next_local_midnight() {
        let request = WindowRequest::from_flags(
            Some(ymd(2024, 3, 1)),
            None,
            Some(ymd(2024, 3, 5)),
            None,
        )
        .unwrap();
        let window = request.resolve(&utc_minus_5()).unwrap();

        assert_eq!(window.before, Some(utc_epoch(2024, 3, 6, 5)));
        assert!(request.has_explicit_before());
    }

    #[test]
    fn epoch_bounds_pass_through() {
        let request = WindowRequest::from_flags(None, Some(100), None, Some(200)).unwrap();
        let window = request.resolve(&Utc).unwrap();
        assert_eq!(window, TimeWindow::new(100, Some(200)));
    }

    #[test]
    fn conflicting_forms_are_rejected() {
        let err = WindowRequest::from_flags(Some(ymd(2024, 1, 1)), Some(5), None, None).unwrap_err();
        assert_eq!(
            err,
            TimeError::Conflicting {
                first: "--after",
                second: "--after-epoch"
            }
        );

        let err = WindowRequest::from_flags(None, Some(5), Some(ymd(2024, 1, 1)), Some(9))
            .unwrap_err();
        assert!(err.to_string().contains("--before-epoch"));
    }

    #[test]
    fn missing_lower_bound_is_an_error() {
        let request = WindowRequest::from_flags(None, None, None, Some(10)).unwrap();
        assert_eq!(request.resolve(&Utc), Err(TimeError::MissingLowerBound));
    }

    #[test]
    fn malformed_dates_are_rejected() {
        let err = parse_local_date("--before", "03/05/2024").unwrap_err();
        assert!(err.to_string().contains("--before must be in YYYY-MM-DD format"));
        assert!(parse_local_date("--after", "2024-02-30").is_err());
    }

    #[test]
    fn day_end_rolls_over_month_and_year() {
        assert_eq!(
            day_end_exclusive_epoch(ymd(2023, 12, 31), &Utc).unwrap(),
            utc_epoch(2024, 1, 1, 0)
        );
    }

    #[test]
    fn before_or_substitutes_now() {
        assert_eq!(TimeWindow::new(0, None).before_or(99), 99);
        assert_eq!(TimeWindow::new(0, Some(5)).before_or(99), 5);
    }

    #[test]
    fn stamp_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 7, 15, 0).unwrap();
        assert_eq!(stamp(at), "20240305_071500");
    }
}

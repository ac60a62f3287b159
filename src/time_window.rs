//! Time-window resolution
//!
//! Turns a symbolic period (`this_month`, `last_quarter`, `ytd`, ...) or an
//! explicit `YYYY-MM-DD to YYYY-MM-DD` range into a concrete filter, relative
//! to a reference date taken in the business timezone. Anything that cannot be
//! resolved degrades to "no time filter" with a warning.

use chrono::{Datelike, FixedOffset, Months, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A resolved time filter on `sale_date`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    /// Inclusive date range
    Between { start: NaiveDate, end: NaiveDate },
    /// Year component of `sale_date` equals this year
    Year(i32),
}

/// A period expression as supplied by a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimePeriod {
    ThisMonth,
    LastMonth,
    ThisQuarter,
    LastQuarter,
    YearToDate,
    AllTime,
    Explicit { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PeriodParseError {
    #[error("unsupported time period '{0}'")]
    Unsupported(String),

    #[error("invalid date range '{0}'")]
    InvalidRange(String),
}

impl FromStr for TimePeriod {
    type Err = PeriodParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let token = raw.trim();
        match token.to_ascii_lowercase().as_str() {
            "this_month" => return Ok(Self::ThisMonth),
            "last_month" => return Ok(Self::LastMonth),
            "this_quarter" => return Ok(Self::ThisQuarter),
            "last_quarter" => return Ok(Self::LastQuarter),
            "ytd" => return Ok(Self::YearToDate),
            "all_time" => return Ok(Self::AllTime),
            _ => {}
        }

        if !token.contains(" to ") {
            return Err(PeriodParseError::Unsupported(token.to_string()));
        }

        let parts: Vec<&str> = token.split(" to ").map(str::trim).collect();
        match parts.as_slice() {
            [start, end] => {
                let start = NaiveDate::parse_from_str(start, DATE_FORMAT)
                    .map_err(|_| PeriodParseError::InvalidRange(token.to_string()))?;
                let end = NaiveDate::parse_from_str(end, DATE_FORMAT)
                    .map_err(|_| PeriodParseError::InvalidRange(token.to_string()))?;
                Ok(Self::Explicit { start, end })
            }
            _ => Err(PeriodParseError::InvalidRange(token.to_string())),
        }
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThisMonth => f.write_str("this_month"),
            Self::LastMonth => f.write_str("last_month"),
            Self::ThisQuarter => f.write_str("this_quarter"),
            Self::LastQuarter => f.write_str("last_quarter"),
            Self::YearToDate => f.write_str("ytd"),
            Self::AllTime => f.write_str("all_time"),
            Self::Explicit { start, end } => write!(
                f,
                "{} to {}",
                start.format(DATE_FORMAT),
                end.format(DATE_FORMAT)
            ),
        }
    }
}

impl TimePeriod {
    /// Concrete window for this period relative to `today`.
    /// `None` means no filter (`all_time`).
    pub fn window(&self, today: NaiveDate) -> Option<TimeWindow> {
        match *self {
            Self::ThisMonth => month_bounds(today).map(between),
            Self::LastMonth => {
                let end = today.with_day(1)?.pred_opt()?;
                Some(TimeWindow::Between { start: end.with_day(1)?, end })
            }
            Self::ThisQuarter => quarter_bounds(today).map(between),
            Self::LastQuarter => {
                let shifted = today.checked_sub_months(Months::new(3))?;
                quarter_bounds(shifted).map(between)
            }
            Self::YearToDate => Some(TimeWindow::Year(today.year())),
            Self::AllTime => None,
            Self::Explicit { start, end } => Some(TimeWindow::Between { start, end }),
        }
    }
}

/// Resolve a raw period token against `today`.
///
/// Unsupported tokens and malformed explicit ranges are logged and ignored.
pub fn resolve_time_window(token: &str, today: NaiveDate) -> Option<TimeWindow> {
    match token.parse::<TimePeriod>() {
        Ok(period) => period.window(today),
        Err(PeriodParseError::InvalidRange(range)) => {
            warn!(time_period = %range, "Invalid date range format. Ignoring time filter.");
            None
        }
        Err(PeriodParseError::Unsupported(other)) => {
            warn!(time_period = %other, "Unsupported time_period. Ignoring time filter.");
            None
        }
    }
}

/// Current date in the business timezone, independent of the host's local zone
pub fn business_today(offset: FixedOffset) -> NaiveDate {
    Utc::now().with_timezone(&offset).date_naive()
}

/// Where "today" comes from when resolving periods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceDate {
    /// Wall clock in the business timezone
    Business(FixedOffset),
    /// Pinned date, for replays and tests
    Fixed(NaiveDate),
}

impl ReferenceDate {
    pub fn today(&self) -> NaiveDate {
        match self {
            Self::Business(offset) => business_today(*offset),
            Self::Fixed(date) => *date,
        }
    }
}

/// Quarter number (1-4) of a month (1-12)
pub fn quarter_of(month: u32) -> u32 {
    (month - 1) / 3 + 1
}

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)?
        .checked_add_months(Months::new(1))?
        .pred_opt()
}

fn month_bounds(date: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    Some((date.with_day(1)?, last_day_of_month(date.year(), date.month())?))
}

fn quarter_bounds(date: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let quarter = quarter_of(date.month());
    let start_month = (quarter - 1) * 3 + 1;
    let end_month = quarter * 3;
    let start = NaiveDate::from_ymd_opt(date.year(), start_month, 1)?;
    let end = last_day_of_month(date.year(), end_month)?;
    Some((start, end))
}

fn between((start, end): (NaiveDate, NaiveDate)) -> TimeWindow {
    TimeWindow::Between { start, end }
}

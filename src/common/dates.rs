use std::fmt;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;

/// Parse a strict ISO `YYYY-MM-DD` calendar date.
pub fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date {text:?}, expected YYYY-MM-DD"))
}

/// Parse the date formats seen in observation exports.
///
/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, `DD/MM/YYYY`, `DD-MM-YYYY` and RFC 3339 timestamps.
/// Any time-of-day component is dropped.
pub fn parse_loose_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() { return None }

    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.date_naive());
    }

    static LEADING: OnceLock<Option<Regex>> = OnceLock::new();
    let leading = LEADING.get_or_init(|| {
        Regex::new(r"^(\d{4})[-/](\d{1,2})[-/](\d{1,2})|^(\d{1,2})[-/](\d{1,2})[-/](\d{4})").ok()
    });

    let caps = leading.as_ref()?.captures(text)?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

    match (num(1), num(2), num(3)) {
        (Some(y), Some(m), Some(d)) => NaiveDate::from_ymd_opt(y as i32, m, d),
        _ => NaiveDate::from_ymd_opt(num(6)? as i32, num(5)?, num(4)?),
    }
}

/// An inclusive calendar-day range with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Build a range from two dates in either order.
    pub fn new(a: NaiveDate, b: NaiveDate) -> Self {
        if a <= b { Self { start: a, end: b } } else { Self { start: b, end: a } }
    }

    /// A one-day range.
    #[inline] pub fn single(day: NaiveDate) -> Self { Self { start: day, end: day } }

    /// Parse a range from ISO strings, swapping the bounds if they are reversed.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Ok(Self::new(parse_date(start)?, parse_date(end)?))
    }

    #[inline] pub fn start(&self) -> NaiveDate { self.start }

    #[inline] pub fn end(&self) -> NaiveDate { self.end }

    /// Number of calendar days covered, counting both ends.
    #[inline]
    pub fn num_days(&self) -> usize { (self.end - self.start).num_days() as usize + 1 }

    #[inline]
    pub fn contains(&self, day: NaiveDate) -> bool { self.start <= day && day <= self.end }

    #[inline] pub fn is_single_day(&self) -> bool { self.start == self.end }

    /// Every calendar day in the range, in order.
    pub fn days(&self) -> Vec<NaiveDate> {
        self.start.iter_days().take_while(|d| *d <= self.end).collect()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_day() {
            write!(f, "{}", self.start.format("%Y-%m-%d"))
        } else {
            write!(f, "{} to {}", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
        }
    }
}

/// The time part of a user selection: one day or a start/end pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSelector {
    Single(NaiveDate),
    Range { start: NaiveDate, end: NaiveDate },
}

impl DateSelector {
    /// Parse `start` and an optional `end`; a missing or identical end yields a single day.
    pub fn parse(start: &str, end: Option<&str>) -> Result<Self> {
        let start = parse_date(start)?;
        match end.map(parse_date).transpose()? {
            Some(end) if end != start => Ok(Self::Range { start, end }),
            _ => Ok(Self::Single(start)),
        }
    }

    /// Resolve to a normalized inclusive range.
    pub fn to_range(self) -> DateRange {
        match self {
            Self::Single(day) => DateRange::single(day),
            Self::Range { start, end } => DateRange::new(start, end),
        }
    }
}

/// Compact `YYYYMMDD` form used by some upstream file names.
pub(crate) fn compact_date(day: NaiveDate) -> String {
    format!("{:04}{:02}{:02}", day.year(), day.month(), day.day())
}

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Timelike};
use std::fmt;

use crate::error::{ParseError, RegularizeError};
use crate::process::utils::clean_str;

/// Date separator detected in a timestamp literal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DateSeparator {
    Dot,
    Dash,
    Slash,
}

impl DateSeparator {
    pub fn as_char(self) -> char {
        match self {
            DateSeparator::Dot => '.',
            DateSeparator::Dash => '-',
            DateSeparator::Slash => '/',
        }
    }

    fn as_byte(self) -> u8 {
        self.as_char() as u8
    }
}

/// Textual layout a timestamp was read in, so it can be written back the same way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimestampLayout {
    pub separator: DateSeparator,
    pub seconds: bool,
}

impl TimestampLayout {
    /// `YYYY.MM.DD HH:MM`, the platform's native export layout.
    pub const DOTTED: TimestampLayout = TimestampLayout {
        separator: DateSeparator::Dot,
        seconds: false,
    };

    /// `YYYY-MM-DD HH:MM:SS`
    pub const ISO_SECONDS: TimestampLayout = TimestampLayout {
        separator: DateSeparator::Dash,
        seconds: true,
    };

    pub fn format(&self, instant: &NaiveDateTime) -> String {
        let sep = self.separator.as_char();
        let pattern = if self.seconds {
            format!("%Y{sep}%m{sep}%d %H:%M:%S")
        } else {
            format!("%Y{sep}%m{sep}%d %H:%M")
        };
        instant.format(&pattern).to_string()
    }
}

/// A parsed instant plus the layout it came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ParsedStamp {
    pub instant: NaiveDateTime,
    pub layout: TimestampLayout,
}

impl ParsedStamp {
    pub fn new(instant: NaiveDateTime, layout: TimestampLayout) -> Self {
        Self { instant, layout }
    }

    /// Re-serialize in the original layout.
    pub fn render(&self) -> String {
        self.layout.format(&self.instant)
    }
}

impl fmt::Display for ParsedStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Grid step. Always a positive divisor of one hour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Cadence {
    minutes: u32,
}

impl Cadence {
    pub const FIFTEEN_MINUTES: Cadence = Cadence { minutes: 15 };

    pub fn from_minutes(minutes: u32) -> Result<Self, RegularizeError> {
        if minutes == 0 || 60 % minutes != 0 {
            return Err(RegularizeError::InvalidCadence { minutes });
        }
        Ok(Self { minutes })
    }

    pub fn minutes(self) -> u32 {
        self.minutes
    }

    pub fn as_duration(self) -> Duration {
        Duration::minutes(i64::from(self.minutes))
    }

    /// True when `instant` sits exactly on a cadence boundary.
    pub fn is_aligned(self, instant: &NaiveDateTime) -> bool {
        instant.second() == 0 && instant.nanosecond() == 0 && instant.minute() % self.minutes == 0
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Cadence::FIFTEEN_MINUTES
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}min", self.minutes)
    }
}

/// Primary layouts, in priority order.
const PRIMARY_SEPARATORS: [DateSeparator; 2] = [DateSeparator::Dot, DateSeparator::Dash];

/// Fallback formats for anything the fixed-width fast path rejects.
const PERMISSIVE_FORMATS: &[(&str, DateSeparator, bool)] = &[
    ("%Y.%m.%d %H:%M:%S%.f", DateSeparator::Dot, true),
    ("%Y.%m.%d %H:%M", DateSeparator::Dot, false),
    ("%Y-%m-%d %H:%M:%S%.f", DateSeparator::Dash, true),
    ("%Y-%m-%d %H:%M", DateSeparator::Dash, false),
    ("%Y-%m-%dT%H:%M:%S%.f", DateSeparator::Dash, true),
    ("%Y-%m-%dT%H:%M", DateSeparator::Dash, false),
    ("%Y/%m/%d %H:%M:%S%.f", DateSeparator::Slash, true),
    ("%Y/%m/%d %H:%M", DateSeparator::Slash, false),
];

const DATE_ONLY_FORMATS: &[(&str, DateSeparator)] = &[
    ("%Y.%m.%d", DateSeparator::Dot),
    ("%Y-%m-%d", DateSeparator::Dash),
    ("%Y/%m/%d", DateSeparator::Slash),
];

/// Parse a timestamp cell.
///
/// Tries `YYYY.MM.DD HH:MM[:SS]`, then `YYYY-MM-DD HH:MM[:SS]`, then a permissive
/// set of formats before giving up with the offending literal.
pub fn parse_timestamp(text: &str) -> Result<ParsedStamp, ParseError> {
    let s = clean_str(text);
    PRIMARY_SEPARATORS
        .iter()
        .find_map(|&sep| parse_fixed(&s, sep))
        .or_else(|| parse_permissive(&s))
        .ok_or_else(|| ParseError::Timestamp {
            literal: text.to_string(),
        })
}

/// Fast path for `YYYY<sep>MM<sep>DD HH:MM[:SS]`.
fn parse_fixed(s: &str, sep: DateSeparator) -> Option<ParsedStamp> {
    let b = s.as_bytes();
    // minimal length + separators check
    if !(b.len() == 16 || b.len() == 19) {
        return None;
    }
    let sep_byte = sep.as_byte();
    if b[4] != sep_byte || b[7] != sep_byte || b[10] != b' ' || b[13] != b':' {
        return None;
    }
    let seconds = b.len() == 19;
    if seconds && b[16] != b':' {
        return None;
    }

    let year = digits(s, 0, 4)? as i32;
    let month = digits(s, 5, 7)?;
    let day = digits(s, 8, 10)?;
    let hour = digits(s, 11, 13)?;
    let min = digits(s, 14, 16)?;
    let sec = if seconds { digits(s, 17, 19)? } else { 0 };

    let instant = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, min, sec)?;
    Some(ParsedStamp::new(
        instant,
        TimestampLayout {
            separator: sep,
            seconds,
        },
    ))
}

fn digits(s: &str, start: usize, end: usize) -> Option<u32> {
    let part = s.get(start..end)?;
    if !part.bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

fn parse_permissive(s: &str) -> Option<ParsedStamp> {
    for &(fmt, separator, seconds) in PERMISSIVE_FORMATS {
        if let Ok(instant) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ParsedStamp::new(instant, TimestampLayout { separator, seconds }));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(ParsedStamp::new(dt.naive_local(), TimestampLayout::ISO_SECONDS));
    }

    for &(fmt, separator) in DATE_ONLY_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            let instant = date.and_hms_opt(0, 0, 0)?;
            return Some(ParsedStamp::new(
                instant,
                TimestampLayout {
                    separator,
                    seconds: false,
                },
            ));
        }
    }

    None
}

/// Round to the nearest cadence boundary, ties toward the later boundary.
///
/// Only the minute drives the decision; seconds and sub-seconds are discarded, so
/// `10:07:59` still rounds down to `10:00` at a 15 minute cadence.
pub fn round_to_cadence(instant: NaiveDateTime, cadence: Cadence) -> NaiveDateTime {
    let step = cadence.minutes();
    let minute = instant.minute();
    let rounded = ((minute + step / 2) / step) * step;

    let hour_start = instant
        - Duration::minutes(i64::from(minute))
        - Duration::seconds(i64::from(instant.second()))
        - Duration::nanoseconds(i64::from(instant.nanosecond()));
    // rounded == 60 lands on the next hour
    hour_start + Duration::minutes(i64::from(rounded))
}

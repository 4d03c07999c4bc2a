//! Internal value representation.
//!
//! Every value type converts its external (JSON) and database forms into a
//! [`Value`]. Calendar values are kept as plain counters so they order and
//! step like integers:
//!
//! - dates are days since 1970-01-01
//! - datetimes are seconds since the epoch, UTC
//! - time fields (`day_of_week`, `days_since_epoch`, ...) are `Int`
//! - enum values are their code, as `Text`

use std::cmp::Ordering;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

pub const SECS_PER_DAY: i64 = 86_400;
pub const SECS_PER_HALF_HOUR: i64 = 1_800;
pub const HALF_HOURS_PER_DAY: i64 = 48;
pub const DAYS_PER_WEEK: i64 = 7;
pub const EPOCH_YEAR: i64 = 1970;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Decimal kept in its validated textual form.
    Decimal(String),
    Text(String),
    /// Days since 1970-01-01.
    Date(i64),
    /// Seconds since 1970-01-01T00:00:00Z.
    DateTime(i64),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Counter view used for stepping through ranges.
    pub fn as_counter(&self) -> Option<i64> {
        match self {
            Value::Int(n) | Value::Date(n) | Value::DateTime(n) => Some(*n),
            _ => None,
        }
    }

    /// Lossy numeric view.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            Value::Decimal(s) | Value::Text(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Int(b))
            | (Value::Date(a), Value::Date(b))
            | (Value::DateTime(a), Value::DateTime(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
            (Value::Decimal(_), Value::Decimal(_)) => self.as_f64()?.partial_cmp(&other.as_f64()?),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Decimal(s) | Value::Text(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", format_date(*d)),
            Value::DateTime(s) => write!(f, "{}", format_datetime(*s)),
        }
    }
}

/// Inclusive range of internal values, as carried by a `between` filter.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    pub start: Value,
    pub end: Value,
}

impl ValueRange {
    pub fn new(start: Value, end: Value) -> Self {
        Self { start, end }
    }

    /// Number of counter steps from start to end inclusive, if the range is
    /// over counters. Saturates at `u64::MAX`.
    pub fn len(&self) -> Option<u64> {
        let (lo, hi) = (self.start.as_counter()?, self.end.as_counter()?);
        let steps = (i128::from(hi) - i128::from(lo) + 1).max(0);
        Some(u64::try_from(steps).unwrap_or(u64::MAX))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

// =============================================================================
// Civil calendar arithmetic (proleptic Gregorian, UTC)
// =============================================================================

/// Days since 1970-01-01 for a calendar date.
pub fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let m = month as i64;
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Calendar date for a count of days since 1970-01-01.
pub fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

fn days_in_month(year: i64, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        _ => 28,
    }
}

fn checked_civil(year: i64, month: u32, day: u32) -> Option<i64> {
    if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
        return None;
    }
    Some(days_from_civil(year, month, day))
}

static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("static regex"));

static DATETIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4})-(\d{2})-(\d{2})[T ](\d{2}):(\d{2})(?::(\d{2})(?:\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?$",
    )
    .expect("static regex")
});

/// Parse `YYYY-MM-DD` into days since the epoch.
pub fn parse_date(s: &str) -> Option<i64> {
    let caps = DATE_RE.captures(s.trim())?;
    checked_civil(caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?)
}

/// Parse an ISO-8601 datetime into seconds since the epoch.
///
/// A missing offset is read as UTC. A plain date is midnight UTC.
pub fn parse_datetime(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Some(days) = parse_date(s) {
        return Some(days * SECS_PER_DAY);
    }
    let caps = DATETIME_RE.captures(s)?;
    let days = checked_civil(caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?)?;
    let hour: i64 = caps[4].parse().ok()?;
    let minute: i64 = caps[5].parse().ok()?;
    let second: i64 = caps.get(6).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    if hour > 23 || minute > 59 || second > 60 {
        return None;
    }
    let offset = match caps.get(7).map(|m| m.as_str()) {
        None | Some("Z") => 0,
        Some(tz) => {
            let sign = if tz.starts_with('-') { -1 } else { 1 };
            let digits: String = tz[1..].chars().filter(|c| *c != ':').collect();
            let hh: i64 = digits[..2].parse().ok()?;
            let mm: i64 = digits[2..].parse().ok()?;
            sign * (hh * 3600 + mm * 60)
        }
    };
    Some(days * SECS_PER_DAY + hour * 3600 + minute * 60 + second - offset)
}

/// `YYYY-MM-DD`
pub fn format_date(days: i64) -> String {
    let (y, m, d) = civil_from_days(days);
    format!("{:04}-{:02}-{:02}", y, m, d)
}

/// `YYYY-MM-DDTHH:MM:SSZ`
pub fn format_datetime(secs: i64) -> String {
    let days = secs.div_euclid(SECS_PER_DAY);
    let rem = secs.rem_euclid(SECS_PER_DAY);
    format!(
        "{}T{:02}:{:02}:{:02}Z",
        format_date(days),
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

/// `YYYY-MM-DD HH:MM:SS`, the form datetimes are stored in.
pub fn format_datetime_sql(secs: i64) -> String {
    let days = secs.div_euclid(SECS_PER_DAY);
    let rem = secs.rem_euclid(SECS_PER_DAY);
    format!(
        "{} {:02}:{:02}:{:02}",
        format_date(days),
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

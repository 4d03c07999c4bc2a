//! Value types: the leaf domains of the schema graph.
//!
//! A value type knows three representations of its values and converts
//! between them:
//!
//! - external: JSON, for caller input and output
//! - internal: [`Value`], used while compiling queries
//! - database: a SQL literal going in, a backend scalar coming out
//!
//! A fixed catalog of value types is built once and registered into every
//! [`Schema`](super::Schema); schemas may add enumerations of their own.

use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as Json;

use super::value::{
    format_date, format_datetime, format_datetime_sql, parse_date, parse_datetime, Value,
    ValueRange, DAYS_PER_WEEK, EPOCH_YEAR, HALF_HOURS_PER_DAY, SECS_PER_DAY, SECS_PER_HALF_HOUR,
};
use crate::backend::BackendError;
use crate::error::{Error, Result};
use crate::sql::{DataType, Literal};

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

static DECIMAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]*(\.[0-9]*)?$").expect("static regex"));

static HALF_HOUR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2}):(00|30)$").expect("static regex"));

/// Calendar counters derived from dates and datetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeField {
    HalfHoursSinceEpoch,
    DaysSinceEpoch,
    WeeksSinceEpoch,
    YearSinceEpoch,
    DayOfWeek,
    HalfHourOfDay,
    MonthOfYear,
}

impl TimeField {
    pub const ALL: [TimeField; 7] = [
        TimeField::HalfHoursSinceEpoch,
        TimeField::DaysSinceEpoch,
        TimeField::WeeksSinceEpoch,
        TimeField::YearSinceEpoch,
        TimeField::DayOfWeek,
        TimeField::HalfHourOfDay,
        TimeField::MonthOfYear,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TimeField::HalfHoursSinceEpoch => "half_hours_since_epoch",
            TimeField::DaysSinceEpoch => "days_since_epoch",
            TimeField::WeeksSinceEpoch => "weeks_since_epoch",
            TimeField::YearSinceEpoch => "year_since_epoch",
            TimeField::DayOfWeek => "day_of_week",
            TimeField::HalfHourOfDay => "half_hour_of_day",
            TimeField::MonthOfYear => "month_of_year",
        }
    }

    /// Every value, for the cyclic fields.
    pub fn all(self) -> Option<RangeInclusive<i64>> {
        match self {
            TimeField::DayOfWeek => Some(0..=DAYS_PER_WEEK - 1),
            TimeField::HalfHourOfDay => Some(0..=HALF_HOURS_PER_DAY - 1),
            TimeField::MonthOfYear => Some(1..=12),
            _ => None,
        }
    }

    /// Counter for an instant, in seconds since the epoch.
    pub fn from_epoch_seconds(self, secs: i64) -> i64 {
        let days = secs.div_euclid(SECS_PER_DAY);
        match self {
            TimeField::HalfHoursSinceEpoch => secs.div_euclid(SECS_PER_HALF_HOUR),
            TimeField::HalfHourOfDay => secs.rem_euclid(SECS_PER_DAY) / SECS_PER_HALF_HOUR,
            _ => self.from_days(days),
        }
    }

    /// Counter for a date, in days since the epoch.
    pub fn from_days(self, days: i64) -> i64 {
        match self {
            TimeField::HalfHoursSinceEpoch => days * HALF_HOURS_PER_DAY,
            TimeField::DaysSinceEpoch => days,
            TimeField::WeeksSinceEpoch => days.div_euclid(DAYS_PER_WEEK),
            TimeField::YearSinceEpoch => super::value::civil_from_days(days).0 - EPOCH_YEAR,
            // 1970-01-01 was a Thursday
            TimeField::DayOfWeek => (days + 4).rem_euclid(DAYS_PER_WEEK),
            TimeField::HalfHourOfDay => 0,
            TimeField::MonthOfYear => i64::from(super::value::civil_from_days(days).1),
        }
    }

    fn to_external(self, n: i64) -> Json {
        let text = match self {
            TimeField::HalfHoursSinceEpoch => format_datetime(n * SECS_PER_HALF_HOUR),
            TimeField::DaysSinceEpoch => format_datetime(n * SECS_PER_DAY),
            TimeField::WeeksSinceEpoch => format_datetime(n * DAYS_PER_WEEK * SECS_PER_DAY),
            TimeField::YearSinceEpoch => (EPOCH_YEAR + n).to_string(),
            TimeField::DayOfWeek => match usize::try_from(n).ok().and_then(|i| DAY_NAMES.get(i)) {
                Some(name) => name.to_string(),
                None => return Json::from(n),
            },
            TimeField::MonthOfYear => {
                match usize::try_from(n - 1).ok().and_then(|i| MONTH_NAMES.get(i)) {
                    Some(name) => name.to_string(),
                    None => return Json::from(n),
                }
            }
            TimeField::HalfHourOfDay => {
                format!("{:02}:{}", n / 2, if n % 2 == 0 { "00" } else { "30" })
            }
        };
        Json::String(text)
    }

    fn from_external(self, json: &Json) -> Option<i64> {
        match (self, json) {
            (TimeField::DayOfWeek, Json::String(s)) => {
                DAY_NAMES.iter().position(|d| d.eq_ignore_ascii_case(s)).map(|i| i as i64)
            }
            (TimeField::MonthOfYear, Json::String(s)) => MONTH_NAMES
                .iter()
                .position(|m| m.eq_ignore_ascii_case(s))
                .map(|i| i as i64 + 1),
            (TimeField::HalfHourOfDay, Json::String(s)) => {
                let caps = HALF_HOUR_RE.captures(s)?;
                let hour: i64 = caps[1].parse().ok()?;
                (hour < 24).then(|| hour * 2 + i64::from(&caps[2] == "30"))
            }
            (TimeField::YearSinceEpoch, Json::String(s)) => match s.parse::<i64>() {
                Ok(year) => year.checked_sub(EPOCH_YEAR),
                Err(_) => parse_datetime(s).map(|secs| self.from_epoch_seconds(secs)),
            },
            (TimeField::YearSinceEpoch, Json::Number(n)) => n.as_i64().and_then(|y| y.checked_sub(EPOCH_YEAR)),
            (_, Json::String(s)) => parse_datetime(s).map(|secs| self.from_epoch_seconds(secs)),
            (_, Json::Number(n)) => n.as_i64(),
            _ => None,
        }
        .filter(|n| self.all().map_or(true, |all| all.contains(n)))
    }
}

/// What a value type is, and so how its values convert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Integer,
    Float,
    Decimal,
    Date,
    Time,
    DateTime,
    Boolean,
    /// `(external name, code)` pairs in declaration order.
    Enum(Arc<[(String, String)]>),
    TimeField(TimeField),
}

/// A named value type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueType {
    name: String,
    kind: ValueKind,
}

static CATALOG: Lazy<Vec<ValueType>> = Lazy::new(|| {
    let mut types = vec![
        ValueType::new("string", ValueKind::String),
        ValueType::new("integer", ValueKind::Integer),
        ValueType::new("float", ValueKind::Float),
        ValueType::new("decimal", ValueKind::Decimal),
        ValueType::new("date", ValueKind::Date),
        ValueType::new("time", ValueKind::Time),
        ValueType::new("datetime", ValueKind::DateTime),
        ValueType::new("boolean", ValueKind::Boolean),
    ];
    types.extend(
        TimeField::ALL
            .iter()
            .map(|f| ValueType::new(f.name(), ValueKind::TimeField(*f))),
    );
    types
});

/// The value types available to every schema.
pub fn catalog() -> &'static [ValueType] {
    &CATALOG
}

impl ValueType {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn integer() -> Self {
        Self::new("integer", ValueKind::Integer)
    }

    pub fn float() -> Self {
        Self::new("float", ValueKind::Float)
    }

    /// An enumeration from `(external name, code)` pairs.
    pub fn enumeration<N, C>(name: impl Into<String>, mapping: impl IntoIterator<Item = (N, C)>) -> Self
    where
        N: Into<String>,
        C: Into<String>,
    {
        let pairs: Vec<(String, String)> = mapping
            .into_iter()
            .map(|(n, c)| (n.into(), c.into()))
            .collect();
        Self::new(name, ValueKind::Enum(pairs.into()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    /// Meaningful to sum, average and bucket.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self.kind,
            ValueKind::Integer | ValueKind::Float | ValueKind::Decimal
        )
    }

    /// Whether the domain is too large to enumerate without a range.
    pub fn is_infinite(&self) -> bool {
        match &self.kind {
            ValueKind::Boolean | ValueKind::Enum(_) => false,
            ValueKind::TimeField(f) => f.all().is_none(),
            _ => true,
        }
    }

    /// Column type used when values are materialized into a temporary table.
    pub fn data_type(&self) -> DataType {
        match &self.kind {
            ValueKind::String => DataType::Varchar(255),
            ValueKind::Integer => DataType::Int64,
            ValueKind::Float => DataType::Float64,
            ValueKind::Decimal => DataType::Decimal(18, 4),
            ValueKind::Date => DataType::Date,
            ValueKind::Time | ValueKind::DateTime => DataType::Timestamp,
            ValueKind::Boolean => DataType::Bool,
            ValueKind::Enum(pairs) => {
                let width = pairs.iter().map(|(_, c)| c.len()).max().unwrap_or(1);
                DataType::Char(u16::try_from(width).unwrap_or(u16::MAX))
            }
            ValueKind::TimeField(TimeField::HalfHoursSinceEpoch) => DataType::Int32,
            ValueKind::TimeField(_) => DataType::Int16,
        }
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    pub fn external_to_internal(&self, json: &Json) -> Result<Value> {
        if json.is_null() {
            return Ok(Value::Null);
        }
        let converted = match (&self.kind, json) {
            (ValueKind::String, Json::String(s)) => Some(Value::Text(s.clone())),
            (ValueKind::Integer, Json::Number(n)) => n.as_i64().map(Value::Int),
            (ValueKind::Float, Json::Number(n)) => n.as_f64().map(Value::Float),
            (ValueKind::Decimal, Json::String(s)) if !s.is_empty() && DECIMAL_RE.is_match(s) => {
                Some(Value::Decimal(s.clone()))
            }
            (ValueKind::Date, Json::String(s)) => parse_date(s).map(Value::Date),
            (ValueKind::Time | ValueKind::DateTime, Json::String(s)) => {
                parse_datetime(s).map(Value::DateTime)
            }
            (ValueKind::Boolean, Json::Bool(b)) => Some(Value::Bool(*b)),
            (ValueKind::Enum(pairs), Json::String(s)) => {
                match pairs.iter().find(|(name, _)| name == s) {
                    Some((_, code)) => Some(Value::Text(code.clone())),
                    None => {
                        let names: Vec<&str> = pairs.iter().map(|(n, _)| n.as_str()).collect();
                        return Err(Error::invalid(format!(
                            "Expected one of {}, got {}",
                            names.join(", "),
                            s
                        )));
                    }
                }
            }
            (ValueKind::TimeField(f), json) => f.from_external(json).map(Value::Int),
            _ => None,
        };
        converted.ok_or_else(|| {
            Error::invalid(format!("Expected a {} value, got {}", self.name, json))
        })
    }

    pub fn internal_to_external(&self, value: &Value) -> Json {
        match (&self.kind, value) {
            (_, Value::Null) => Json::Null,
            (ValueKind::Enum(pairs), Value::Text(code)) => {
                match pairs.iter().find(|(_, c)| c == code) {
                    Some((name, _)) => Json::String(name.clone()),
                    None => Json::String(code.clone()),
                }
            }
            (ValueKind::TimeField(f), Value::Int(n)) => f.to_external(*n),
            (_, Value::Bool(b)) => Json::Bool(*b),
            (_, Value::Int(n)) => Json::from(*n),
            (_, Value::Float(x)) => serde_json::Number::from_f64(*x).map_or(Json::Null, Json::Number),
            (_, Value::Decimal(s)) | (_, Value::Text(s)) => Json::String(s.clone()),
            (_, Value::Date(d)) => Json::String(format_date(*d)),
            (_, Value::DateTime(s)) => Json::String(format_datetime(*s)),
        }
    }

    pub fn internal_to_database(&self, value: &Value) -> Literal {
        match value {
            Value::Null => Literal::Null,
            Value::Bool(b) => Literal::Bool(*b),
            Value::Int(n) => Literal::Int(*n),
            Value::Float(x) => Literal::Float(*x),
            Value::Decimal(s) => Literal::Numeric(s.clone()),
            Value::Text(s) => Literal::String(s.clone()),
            Value::Date(d) => Literal::String(format_date(*d)),
            Value::DateTime(s) => Literal::String(format_datetime_sql(*s)),
        }
    }

    /// Convert a scalar read back from the backend.
    pub fn database_to_internal(&self, raw: Value) -> Result<Value> {
        let converted = match (&self.kind, raw) {
            (_, Value::Null) => Some(Value::Null),
            (ValueKind::String | ValueKind::Enum(_), Value::Text(s)) => Some(Value::Text(s)),
            (ValueKind::String | ValueKind::Enum(_), Value::Int(n)) => Some(Value::Text(n.to_string())),
            (ValueKind::Integer | ValueKind::TimeField(_), Value::Int(n)) => Some(Value::Int(n)),
            // Aggregates over integers can come back as reals (SUM on some backends).
            (ValueKind::Integer | ValueKind::TimeField(_), Value::Float(x)) if x.fract() == 0.0 => {
                Some(Value::Int(x as i64))
            }
            (ValueKind::Integer | ValueKind::TimeField(_), Value::Text(s)) => {
                s.trim().parse().ok().map(Value::Int)
            }
            (ValueKind::Float, Value::Float(x)) => Some(Value::Float(x)),
            (ValueKind::Float, Value::Int(n)) => Some(Value::Float(n as f64)),
            (ValueKind::Float, Value::Text(s)) => s.trim().parse().ok().map(Value::Float),
            (ValueKind::Decimal, Value::Int(n)) => Some(Value::Decimal(n.to_string())),
            (ValueKind::Decimal, Value::Float(x)) => {
                Some(Value::Decimal(x.to_string()))
            }
            (ValueKind::Decimal, Value::Text(s)) => Some(Value::Decimal(s)),
            (ValueKind::Date, Value::Text(s)) => parse_date(&s)
                .or_else(|| parse_datetime(&s).map(|secs| secs.div_euclid(SECS_PER_DAY)))
                .map(Value::Date),
            (ValueKind::Time | ValueKind::DateTime, Value::Text(s)) => {
                parse_datetime(&s).map(Value::DateTime)
            }
            (ValueKind::Time | ValueKind::DateTime, Value::Int(n)) => Some(Value::DateTime(n)),
            (ValueKind::Boolean, Value::Int(n)) => Some(Value::Bool(n != 0)),
            (ValueKind::Boolean, Value::Bool(b)) => Some(Value::Bool(b)),
            (ValueKind::Boolean, Value::Text(s)) => match s.as_str() {
                "1" | "true" | "t" => Some(Value::Bool(true)),
                "0" | "false" | "f" => Some(Value::Bool(false)),
                _ => None,
            },
            (_, other) => {
                return Err(BackendError::Conversion(format!(
                    "can't read {:?} as {}",
                    other, self.name
                ))
                .into())
            }
        };
        converted.ok_or_else(|| {
            BackendError::Conversion(format!("malformed {} value from database", self.name)).into()
        })
    }

    // =========================================================================
    // Enumeration
    // =========================================================================

    /// All possible values, or those within `range` for infinite types.
    ///
    /// Fails when more than `max` values would be produced.
    pub fn generate_values(&self, range: Option<&ValueRange>, max: usize) -> Result<Vec<Value>> {
        let values: Vec<Value> = match &self.kind {
            ValueKind::Boolean => vec![Value::Bool(false), Value::Bool(true)],
            ValueKind::Enum(pairs) => pairs.iter().map(|(_, c)| Value::Text(c.clone())).collect(),
            ValueKind::TimeField(f) if f.all().is_some() => {
                f.all().into_iter().flatten().map(Value::Int).collect()
            }
            ValueKind::Integer | ValueKind::Date | ValueKind::TimeField(_) => {
                let range = range.ok_or_else(|| {
                    Error::invalid(format!(
                        "Require a range filter to generate possible values for infinite type {}",
                        self.name
                    ))
                })?;
                let (Some(lo), Some(hi)) = (range.start.as_counter(), range.end.as_counter()) else {
                    return Err(Error::invalid(format!(
                        "Range {}..{} can't be enumerated for type {}",
                        range.start, range.end, self.name
                    )));
                };
                let count = range.len().unwrap_or(u64::MAX);
                if count > max as u64 {
                    return Err(Error::invalid(format!(
                        "Range {}..{} would generate {} values of {}, more than the limit of {}",
                        range.start, range.end, count, self.name, max
                    )));
                }
                let is_date = self.kind == ValueKind::Date;
                (lo..=hi)
                    .map(|n| if is_date { Value::Date(n) } else { Value::Int(n) })
                    .collect()
            }
            _ => {
                return Err(Error::unsupported(format!(
                    "Can't generate possible values for value type {}",
                    self.name
                )))
            }
        };
        if values.len() > max {
            return Err(Error::invalid(format!(
                "{} has {} possible values, more than the limit of {}",
                self.name,
                values.len(),
                max
            )));
        }
        Ok(values)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

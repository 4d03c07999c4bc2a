//! Generators for dependent values.
//!
//! A dimension on a type without a table has no column to read, so its
//! values are computed from the owner's primary value instead. When such
//! a type is materialized into a temporary table, each row is filled by
//! walking these generators down the requested path.

use std::fmt;
use std::sync::Arc;

use super::value::Value;
use super::value_type::TimeField;

/// Built-in calendar generators, usable from schema documents by name.
///
/// Each applies to `Date` and `DateTime` values and yields the matching
/// [`TimeField`] counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Derive(TimeField);

impl Derive {
    pub fn from_name(name: &str) -> Option<Self> {
        TimeField::ALL
            .iter()
            .find(|f| f.name() == name)
            .map(|f| Derive(*f))
    }

    pub fn field(self) -> TimeField {
        self.0
    }

    /// Name of the value type the generated values belong to.
    pub fn value_type_name(self) -> &'static str {
        self.0.name()
    }

    /// Whether `a <= b` implies `derive(a) <= derive(b)`.
    ///
    /// True for the monotonic counters, false for the cyclic fields.
    pub fn respects_ordering(self) -> bool {
        self.0.all().is_none()
    }

    pub fn apply(self, value: &Value) -> Value {
        match value {
            Value::Date(days) => match self.0 {
                TimeField::HalfHourOfDay => Value::Int(0),
                field => Value::Int(field.from_days(*days)),
            },
            Value::DateTime(secs) => Value::Int(self.0.from_epoch_seconds(*secs)),
            // Weeks and years derived from a day counter.
            Value::Int(days) if self.0 != TimeField::HalfHourOfDay => {
                Value::Int(self.0.from_days(*days))
            }
            _ => Value::Null,
        }
    }

    pub fn generator(self) -> Generator {
        Generator::new(move |v| self.apply(v))
    }
}

impl From<TimeField> for Derive {
    fn from(field: TimeField) -> Self {
        Derive(field)
    }
}

/// Computes a dependent value from its owner's value.
#[derive(Clone)]
pub struct Generator(Arc<dyn Fn(&Value) -> Value + Send + Sync>);

impl Generator {
    pub fn new(f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        Generator(Arc::new(f))
    }

    pub fn call(&self, value: &Value) -> Value {
        (self.0)(value)
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Generator(..)")
    }
}

//! Typed clause values

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Text formats recognised as dates, besides RFC 3339 and RFC 2822
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// A single clause value.
///
/// `Bool` is representable so documents can be matched on boolean
/// fields by the engine, but no predicate context accepts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    #[serde(skip_deserializing)]
    Date(DateTime<Utc>),
    Text(String),
}

impl Scalar {
    /// Integers and finite floats; NaN and infinities have no JSON form
    pub fn is_numeric(&self) -> bool {
        match self {
            Scalar::Int(_) => true,
            Scalar::Float(f) => f.is_finite(),
            _ => false,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Scalar::Text(_))
    }

    /// True for date values and for text that parses as a date
    pub fn is_date(&self) -> bool {
        match self {
            Scalar::Date(_) => true,
            Scalar::Text(s) => parse_date(s).is_some(),
            _ => false,
        }
    }

    /// Numeric or date values can be compared with range operators
    pub fn is_rangeable(&self) -> bool {
        self.is_numeric() || self.is_date()
    }

    /// JSON representation sent to the engine
    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::from(*i),
            Scalar::Float(f) => Value::from(*f),
            Scalar::Date(d) => Value::String(d.to_rfc3339()),
            Scalar::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Date(d) => write!(f, "{}", d.to_rfc3339()),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Parse text in any of the supported date formats
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }

    None
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Scalar {
            fn from(v: $t) -> Self {
                Scalar::Int(v as i64)
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Scalar {
    fn from(v: f32) -> Self {
        Scalar::Float(v as f64)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

impl From<&String> for Scalar {
    fn from(v: &String) -> Self {
        Scalar::Text(v.clone())
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(v: DateTime<Utc>) -> Self {
        Scalar::Date(v)
    }
}

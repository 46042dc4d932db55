//! SQL value types exchanged between the source reader and target writer.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Canonical text form for timestamps without fractional seconds.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Canonical text form for offset-aware timestamps. Always fits in 40 chars.
pub const DATETIME_OFFSET_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f %:z";

/// SQL value enum for type-safe row handling.
///
/// Source rows are decoded into these variants by the SQL Server reader, and
/// target rows are decoded into the same variants by the MySQL writer so that
/// the two sides compare with plain equality.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL.
    Null,

    /// Boolean value (bit).
    Bool(bool),

    /// 16-bit signed integer (smallint, tinyint).
    I16(i16),

    /// 32-bit signed integer (int).
    I32(i32),

    /// 64-bit signed integer (bigint).
    I64(i64),

    /// 32-bit floating point (real).
    F32(f32),

    /// 64-bit floating point (float).
    F64(f64),

    /// Text/string data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// UUID/GUID value.
    Uuid(Uuid),

    /// Decimal value (decimal, numeric, money).
    Decimal(Decimal),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Render as a MySQL literal for statement logs.
    ///
    /// Statements are always executed with bound parameters; this rendering
    /// only exists so that a logged statement reads like the SQL that ran.
    #[must_use]
    pub fn to_mysql_literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(v) => if *v { "1" } else { "0" }.to_string(),
            SqlValue::I16(v) => v.to_string(),
            SqlValue::I32(v) => v.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F32(v) => v.to_string(),
            SqlValue::F64(v) => v.to_string(),
            SqlValue::Text(v) => quote_string(v),
            SqlValue::Bytes(v) => format!("X'{}'", hex::encode_upper(v)),
            SqlValue::Uuid(v) => format!("'{}'", v.hyphenated()),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::DateTime(v) => format!("'{}'", format_datetime(v)),
            SqlValue::DateTimeOffset(v) => format!("'{}'", format_datetime_offset(v)),
            SqlValue::Date(v) => format!("'{}'", v.format("%Y-%m-%d")),
            SqlValue::Time(v) => format!("'{}'", format_time(v)),
        }
    }

    /// Short type name for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::I16(_) => "i16",
            SqlValue::I32(_) => "i32",
            SqlValue::I64(_) => "i64",
            SqlValue::F32(_) => "f32",
            SqlValue::F64(_) => "f64",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::Uuid(_) => "uuid",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::DateTime(_) => "datetime",
            SqlValue::DateTimeOffset(_) => "datetimeoffset",
            SqlValue::Date(_) => "date",
            SqlValue::Time(_) => "time",
        }
    }
}

/// Quote and escape a string literal for MySQL.
fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// `YYYY-MM-DD HH:MM:SS[.ffffff]`; the fraction is omitted when zero.
pub fn format_datetime(v: &NaiveDateTime) -> String {
    if v.nanosecond() / 1_000 == 0 {
        v.format(DATETIME_FORMAT).to_string()
    } else {
        v.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

/// Round to whole microseconds, half up, carrying into the next second.
///
/// MySQL keeps at most microseconds; this is the value a `DATETIME(6)`
/// column holds after the row is written.
pub fn round_to_micros(v: NaiveDateTime) -> NaiveDateTime {
    // Leap seconds are reported as nanos >= 1e9.
    let nanos = v.nanosecond().min(999_999_999);
    let truncated = v.with_nanosecond(nanos - nanos % 1_000).unwrap_or(v);
    if nanos % 1_000 >= 500 {
        truncated + Duration::microseconds(1)
    } else {
        truncated
    }
}

/// `HH:MM:SS[.ffffff]`; the fraction is omitted when zero.
pub fn format_time(v: &NaiveTime) -> String {
    if v.nanosecond() / 1_000 == 0 {
        v.format("%H:%M:%S").to_string()
    } else {
        v.format("%H:%M:%S%.6f").to_string()
    }
}

/// Canonical text form of an offset-aware timestamp.
pub fn format_datetime_offset(v: &DateTime<FixedOffset>) -> String {
    v.format(DATETIME_OFFSET_FORMAT).to_string()
}

/// Parse the canonical text form written by [`format_datetime_offset`].
pub fn parse_datetime_offset(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(s.trim(), DATETIME_OFFSET_FORMAT).ok()
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        SqlValue::I16(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        SqlValue::F32(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<DateTime<FixedOffset>> for SqlValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        SqlValue::DateTimeOffset(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(v: NaiveTime) -> Self {
        SqlValue::Time(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

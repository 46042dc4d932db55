//! Value equality between a source row and its target counterpart.
//!
//! The source value is first brought to what the target column would store
//! (MySQL rounds fractional seconds to the column precision, pads nothing on
//! CHAR, keeps DECIMAL at its declared scale). Audit columns are then cut to
//! whole seconds on both sides.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, NaiveTime, Timelike};

use crate::core::value::{round_to_micros, SqlValue};
use crate::plan::ColumnPlan;
use crate::typemap::MysqlType;

/// Precision at which two temporal values are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Seconds,
    Micros,
}

impl Granularity {
    /// Granularity used for a mapped column.
    pub fn for_column(column: &ColumnPlan) -> Self {
        if column.audit || !column.definition.sql_type.keeps_microseconds() {
            Granularity::Seconds
        } else {
            Granularity::Micros
        }
    }
}

/// Whether the target already holds the source value for this column.
pub fn values_match(source: &SqlValue, target: &SqlValue, column: &ColumnPlan) -> bool {
    let source = normalize(&stored_form(source, column), column);
    let target = normalize(target, column);
    source == target
}

/// The value MySQL would keep after writing `value` into the column.
fn stored_form(value: &SqlValue, column: &ColumnPlan) -> SqlValue {
    match (value, &column.definition.sql_type) {
        // The writer binds microseconds; a DATETIME column rounds those again.
        (SqlValue::DateTime(v), MysqlType::DateTime) => {
            SqlValue::DateTime(round_datetime(round_to_micros(*v), 1_000_000_000))
        }
        (SqlValue::DateTime(v), _) => SqlValue::DateTime(round_to_micros(*v)),
        (SqlValue::Time(v), _) => SqlValue::Time(truncate_time(*v, 1_000)),
        (SqlValue::DateTimeOffset(v), _) => SqlValue::DateTimeOffset(truncate_offset(*v, 1_000)),
        (SqlValue::Decimal(d), MysqlType::Decimal { scale, .. }) => {
            SqlValue::Decimal(d.round_dp(u32::from(*scale)))
        }
        (SqlValue::Text(s), MysqlType::Char(_)) if column.source_type.is_fixed_length_text() => {
            SqlValue::Text(s.trim_end_matches(' ').to_string())
        }
        _ => value.clone(),
    }
}

/// Reduce a value to the comparison granularity and a canonical variant.
fn normalize(value: &SqlValue, column: &ColumnPlan) -> SqlValue {
    let granularity = Granularity::for_column(column);
    match value {
        SqlValue::Bool(v) => SqlValue::I64(i64::from(*v)),
        SqlValue::I16(v) => SqlValue::I64(i64::from(*v)),
        SqlValue::I32(v) => SqlValue::I64(i64::from(*v)),
        SqlValue::DateTime(v) if granularity == Granularity::Seconds => {
            SqlValue::DateTime(truncate_datetime(*v, 1_000_000_000))
        }
        SqlValue::DateTimeOffset(v) if granularity == Granularity::Seconds => {
            SqlValue::DateTimeOffset(truncate_offset(*v, 1_000_000_000))
        }
        SqlValue::Decimal(d) => SqlValue::Decimal(d.normalize()),
        SqlValue::Text(s) if column.source_type.is_fixed_length_text() => {
            SqlValue::Text(s.trim_end_matches(' ').to_string())
        }
        other => other.clone(),
    }
}

fn sub_second_nanos(nanos: u32) -> u32 {
    // Leap seconds are reported as nanos >= 1e9.
    nanos.min(999_999_999)
}

fn truncate_datetime(v: NaiveDateTime, unit_nanos: u32) -> NaiveDateTime {
    let nanos = sub_second_nanos(v.nanosecond());
    v.with_nanosecond(nanos - nanos % unit_nanos).unwrap_or(v)
}

/// Round half up to `unit_nanos`, carrying into the next second.
fn round_datetime(v: NaiveDateTime, unit_nanos: u32) -> NaiveDateTime {
    let nanos = sub_second_nanos(v.nanosecond());
    let remainder = nanos % unit_nanos;
    let truncated = truncate_datetime(v, unit_nanos);
    if remainder * 2 >= unit_nanos {
        truncated + Duration::nanoseconds(i64::from(unit_nanos))
    } else {
        truncated
    }
}

fn truncate_time(v: NaiveTime, unit_nanos: u32) -> NaiveTime {
    let nanos = sub_second_nanos(v.nanosecond());
    v.with_nanosecond(nanos - nanos % unit_nanos).unwrap_or(v)
}

fn truncate_offset(v: DateTime<FixedOffset>, unit_nanos: u32) -> DateTime<FixedOffset> {
    let nanos = sub_second_nanos(v.nanosecond());
    v.with_nanosecond(nanos - nanos % unit_nanos).unwrap_or(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typemap::{map_column, SourceType};
    use crate::core::schema::SourceColumn;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn column(data_type: &str, audit: bool) -> ColumnPlan {
        let source = SourceColumn::new("c", data_type).with_length(10).with_precision(18, 2);
        ColumnPlan {
            source: "c".into(),
            target: "c".into(),
            source_type: SourceType::parse(data_type).unwrap(),
            definition: map_column("t", &source).unwrap(),
            audit,
        }
    }

    fn ts(s: u32, micro: u32) -> SqlValue {
        SqlValue::DateTime(
            NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_micro_opt(12, 0, s, micro)
                .unwrap(),
        )
    }

    #[test]
    fn test_audit_column_ignores_fractional_seconds() {
        let col = column("datetime2", true);
        assert!(values_match(&ts(5, 123_456), &ts(5, 0), &col));
        assert!(!values_match(&ts(6, 0), &ts(5, 0), &col));
    }

    #[test]
    fn test_non_audit_datetime2_compares_microseconds() {
        let col = column("datetime2", false);
        assert!(!values_match(&ts(5, 123_456), &ts(5, 0), &col));
        assert!(values_match(&ts(5, 123_456), &ts(5, 123_456), &col));
    }

    #[test]
    fn test_datetime2_rounds_to_microseconds_like_target() {
        let col = column("datetime2", false);
        let source = SqlValue::DateTime(
            NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_nano_opt(12, 0, 5, 123_456_700)
                .unwrap(),
        );
        assert!(values_match(&source, &ts(5, 123_457), &col));
    }

    #[test]
    fn test_legacy_datetime_rounds_to_seconds() {
        let col = column("datetime", false);
        // 12:00:05.997 is stored by MySQL DATETIME as 12:00:06.
        assert!(values_match(&ts(5, 997_000), &ts(6, 0), &col));
        assert!(values_match(&ts(5, 3_000), &ts(5, 0), &col));
    }

    #[test]
    fn test_legacy_datetime_rounds_microseconds_first() {
        let col = column("datetime", false);
        // .4999996 is bound as .500000, which DATETIME rounds up.
        let source = SqlValue::DateTime(
            NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_nano_opt(12, 0, 5, 499_999_600)
                .unwrap(),
        );
        assert!(values_match(&source, &ts(6, 0), &col));
    }

    #[test]
    fn test_fixed_length_text_ignores_padding() {
        let col = column("char", false);
        assert!(values_match(
            &SqlValue::Text("AB        ".into()),
            &SqlValue::Text("AB".into()),
            &col
        ));
        let col = column("varchar", false);
        assert!(!values_match(
            &SqlValue::Text("AB  ".into()),
            &SqlValue::Text("AB".into()),
            &col
        ));
    }

    #[test]
    fn test_decimal_compares_by_value_at_target_scale() {
        let col = column("decimal", false);
        assert!(values_match(
            &SqlValue::Decimal(Decimal::new(1250, 3)),
            &SqlValue::Decimal(Decimal::new(125, 2)),
            &col
        ));
        assert!(!values_match(
            &SqlValue::Decimal(Decimal::new(126, 2)),
            &SqlValue::Decimal(Decimal::new(125, 2)),
            &col
        ));
    }

    #[test]
    fn test_integer_widths_and_bits_compare_by_value() {
        let col = column("bit", false);
        assert!(values_match(&SqlValue::Bool(true), &SqlValue::I64(1), &col));
        let col = column("smallint", false);
        assert!(values_match(&SqlValue::I16(7), &SqlValue::I32(7), &col));
    }

    #[test]
    fn test_nulls() {
        let col = column("nvarchar", false);
        assert!(values_match(&SqlValue::Null, &SqlValue::Null, &col));
        assert!(!values_match(&SqlValue::Text("x".into()), &SqlValue::Null, &col));
    }

    #[test]
    fn test_granularity_for_column() {
        assert_eq!(Granularity::for_column(&column("datetime2", false)), Granularity::Micros);
        assert_eq!(Granularity::for_column(&column("datetime2", true)), Granularity::Seconds);
        assert_eq!(Granularity::for_column(&column("datetime", false)), Granularity::Seconds);
    }
}

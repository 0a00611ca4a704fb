//! PostgreSQL column → [`SqlValue`] conversion.
//!
//! Directory attributes are strings, so anything without a direct
//! [`SqlValue`] counterpart (decimals, timestamps, UUIDs, JSON) is carried
//! as its canonical text form.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sync_core::{Row, SqlValue};
use tokio_postgres::types::Type;
use tracing::warn;

/// Convert every column of a result row, keeping column order.
pub fn convert_postgres_row(row: &tokio_postgres::Row) -> Result<Row> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(index, column)| Ok((column.name().to_string(), convert_postgres_value(row, index)?)))
        .collect()
}

fn text<T: ToString>(value: Option<T>) -> SqlValue {
    value.map_or(SqlValue::Null, |v| SqlValue::Text(v.to_string()))
}

pub(crate) fn format_timestamp(ts: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(ts, Utc).to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn convert_postgres_value(row: &tokio_postgres::Row, index: usize) -> Result<SqlValue> {
    let column = &row.columns()[index];
    let pg_type = column.type_();

    let value = match *pg_type {
        Type::BOOL => row.try_get::<_, Option<bool>>(index)?.into(),
        Type::INT2 => row.try_get::<_, Option<i16>>(index)?.map(i64::from).into(),
        Type::INT4 => row.try_get::<_, Option<i32>>(index)?.map(i64::from).into(),
        Type::INT8 => row.try_get::<_, Option<i64>>(index)?.into(),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(index)?.map(f64::from).into(),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(index)?.into(),
        Type::NUMERIC => match row.try_get::<_, Option<Decimal>>(index) {
            Ok(decimal) => text(decimal),
            Err(e) => {
                warn!("Failed to get PostgreSQL NUMERIC as rust_decimal::Decimal: {e}");
                return Err(anyhow!("NUMERIC type conversion failed: {e}"));
            }
        },
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            row.try_get::<_, Option<String>>(index)?.into()
        }
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(index)?
            .map(format_timestamp)
            .into(),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(index)?
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            .into(),
        Type::DATE => text(row.try_get::<_, Option<NaiveDate>>(index)?),
        Type::TIME => text(row.try_get::<_, Option<NaiveTime>>(index)?),
        Type::JSON | Type::JSONB => text(row.try_get::<_, Option<serde_json::Value>>(index)?),
        Type::UUID => text(row.try_get::<_, Option<uuid::Uuid>>(index)?),
        _ => {
            // For unknown types, try to get as string
            match row.try_get::<_, Option<String>>(index) {
                Ok(val) => val.into(),
                Err(_) => return Err(anyhow!("Unsupported PostgreSQL type {pg_type} for column {}", column.name())),
            }
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_render_as_utc_rfc3339() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        assert_eq!(format_timestamp(ts), "2024-03-01T12:30:00Z");
    }

    #[test]
    fn test_text_helper_keeps_nulls() {
        assert_eq!(text::<uuid::Uuid>(None), SqlValue::Null);
        let id = uuid::Uuid::nil();
        assert_eq!(
            text(Some(id)),
            SqlValue::Text("00000000-0000-0000-0000-000000000000".to_string())
        );
        assert_eq!(
            text(Some(Decimal::new(1050, 2))),
            SqlValue::Text("10.50".to_string())
        );
    }
}

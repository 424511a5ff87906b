use anyhow::Context;
use rust_decimal::Decimal;
use strata_core::{ColumnInfo, FieldKind, Result, ResultSet, Row, Value};
use tiberius::{ColumnData, ColumnType};
use time::{
    Date, Duration, PrimitiveDateTime, Time,
    macros::{date, datetime},
};

fn kind_of(ty: ColumnType) -> FieldKind {
    use ColumnType::*;
    match ty {
        Bit | Bitn => FieldKind::Boolean,
        Int1 | Int2 | Int4 | Int8 | Intn | Float4 | Float8 | Floatn | Decimaln | Numericn
        | Money | Money4 => FieldKind::Numeric,
        _ => FieldKind::Text,
    }
}

pub(crate) fn column_info(columns: &[tiberius::Column]) -> Vec<ColumnInfo> {
    columns
        .iter()
        .map(|c| ColumnInfo {
            name: c.name().to_owned(),
            kind: kind_of(c.column_type()),
            length: None,
        })
        .collect()
}

pub(crate) fn rows_to_set(columns: Vec<ColumnInfo>, rows: Vec<tiberius::Row>) -> Result<ResultSet> {
    let values = rows
        .into_iter()
        .map(extract_row)
        .collect::<Result<Vec<_>>>()?;
    Ok(ResultSet::from_rows(columns, values))
}

fn extract_row(row: tiberius::Row) -> Result<Row> {
    row.into_iter().map(extract_value).collect()
}

fn extract_value(data: ColumnData<'_>) -> Result<Value> {
    Ok(match data {
        ColumnData::Bit(v) => Value::Boolean(v),
        ColumnData::U8(v) => Value::Int16(v.map(|v| v as i16)),
        ColumnData::I16(v) => Value::Int16(v),
        ColumnData::I32(v) => Value::Int32(v),
        ColumnData::I64(v) => Value::Int64(v),
        ColumnData::F32(v) => Value::Float32(v),
        ColumnData::F64(v) => Value::Float64(v),
        ColumnData::Numeric(v) => Value::Decimal(match v {
            Some(n) => Some(Decimal::from_i128_with_scale(n.value(), n.scale() as u32)),
            None => None,
        }),
        ColumnData::String(v) => Value::Varchar(v.map(|v| v.into_owned())),
        ColumnData::Guid(v) => Value::Uuid(v),
        ColumnData::Binary(v) => Value::Blob(v.map(|v| v.into_owned().into())),
        ColumnData::Xml(v) => Value::Varchar(v.map(|v| v.into_owned().into_string())),
        ColumnData::Date(v) => Value::Date(v.map(date_from).transpose()?),
        ColumnData::Time(v) => Value::Time(v.map(time_from).transpose()?),
        ColumnData::SmallDateTime(v) => Value::Timestamp(match v {
            Some(dt) => Some(
                datetime!(1900-01-01 00:00:00)
                    .checked_add(
                        Duration::days(dt.days() as i64)
                            + Duration::minutes(dt.seconds_fragments() as i64),
                    )
                    .context("smalldatetime out of range")?,
            ),
            None => None,
        }),
        ColumnData::DateTime(v) => Value::Timestamp(match v {
            Some(dt) => Some(
                datetime!(1900-01-01 00:00:00)
                    .checked_add(
                        Duration::days(dt.days() as i64)
                            // fragments are 1/300ths of a second
                            + Duration::nanoseconds(
                                dt.seconds_fragments() as i64 * 1_000_000_000 / 300,
                            ),
                    )
                    .context("datetime out of range")?,
            ),
            None => None,
        }),
        ColumnData::DateTime2(v) => Value::Timestamp(match v {
            Some(dt) => Some(PrimitiveDateTime::new(
                date_from(dt.date())?,
                time_from(dt.time())?,
            )),
            None => None,
        }),
        ColumnData::DateTimeOffset(v) => Value::Timestamp(match v {
            Some(dto) => {
                let dt = dto.datetime2();
                let local = PrimitiveDateTime::new(date_from(dt.date())?, time_from(dt.time())?);
                // normalize to UTC
                Some(
                    local
                        .checked_sub(Duration::minutes(dto.offset() as i64))
                        .context("datetimeoffset out of range")?,
                )
            }
            None => None,
        }),
    })
}

// days since 0001-01-01
fn date_from(d: tiberius::time::Date) -> Result<Date> {
    date!(0001 - 01 - 01)
        .checked_add(Duration::days(d.days() as i64))
        .context("date out of range")
}

fn time_from(t: tiberius::time::Time) -> Result<Time> {
    let nanos = t.increments() as i64 * 10_i64.pow(9 - t.scale() as u32);
    Ok(Time::MIDNIGHT + Duration::nanoseconds(nanos))
}

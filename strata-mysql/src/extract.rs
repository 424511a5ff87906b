use mysql_async::consts::ColumnType;
use rust_decimal::Decimal;
use strata_core::{ColumnInfo, FieldKind, Result, ResultSet, Row, Value};
use time::{
    Date, PrimitiveDateTime, Time,
    macros::format_description,
};

const BINARY_CHARSET: u16 = 63;

fn is_boolean(column: &mysql_async::Column) -> bool {
    // tinyint(1) is the MySQL idiom for a boolean column
    column.column_type() == ColumnType::MYSQL_TYPE_TINY && column.column_length() == 1
}

fn kind_of(column: &mysql_async::Column) -> FieldKind {
    use ColumnType::*;
    if is_boolean(column) {
        return FieldKind::Boolean;
    }
    match column.column_type() {
        MYSQL_TYPE_TINY | MYSQL_TYPE_SHORT | MYSQL_TYPE_INT24 | MYSQL_TYPE_LONG
        | MYSQL_TYPE_LONGLONG | MYSQL_TYPE_YEAR | MYSQL_TYPE_FLOAT | MYSQL_TYPE_DOUBLE
        | MYSQL_TYPE_DECIMAL | MYSQL_TYPE_NEWDECIMAL => FieldKind::Numeric,
        _ => FieldKind::Text,
    }
}

pub(crate) fn column_info(columns: &[mysql_async::Column]) -> Vec<ColumnInfo> {
    columns
        .iter()
        .map(|c| ColumnInfo {
            name: c.name_str().into_owned(),
            kind: kind_of(c),
            length: u32::try_from(c.column_length()).ok(),
        })
        .collect()
}

pub(crate) fn rows_to_set(columns: Vec<ColumnInfo>, rows: &[mysql_async::Row]) -> Result<ResultSet> {
    let values = rows.iter().map(extract_row).collect::<Result<Vec<_>>>()?;
    Ok(ResultSet::from_rows(columns, values))
}

fn extract_row(row: &mysql_async::Row) -> Result<Row> {
    (0..row.len())
        .map(|i| {
            let raw = row.as_ref(i).cloned().unwrap_or(mysql_async::Value::NULL);
            extract_value(raw, &row.columns_ref()[i])
        })
        .collect()
}

/// The text protocol reports almost everything as bytes; the column metadata
/// decides how the payload is read.
fn extract_value(raw: mysql_async::Value, column: &mysql_async::Column) -> Result<Value> {
    use ColumnType::*;
    use mysql_async::Value as Native;
    Ok(match raw {
        Native::NULL => Value::Null,
        Native::Int(v) if is_boolean(column) => Value::Boolean(Some(v != 0)),
        Native::Int(v) => Value::Int64(Some(v)),
        Native::UInt(v) => Value::Int64(Some(v as i64)),
        Native::Float(v) => Value::Float32(Some(v)),
        Native::Double(v) => Value::Float64(Some(v)),
        Native::Date(year, month, day, hour, minute, second, micro) => {
            let date = Date::from_calendar_date(
                year as i32,
                time::Month::try_from(month.max(1))?,
                day.max(1),
            )?;
            if column.column_type() == MYSQL_TYPE_DATE {
                Value::Date(Some(date))
            } else {
                let time = Time::from_hms_micro(hour, minute, second, micro)?;
                Value::Timestamp(Some(PrimitiveDateTime::new(date, time)))
            }
        }
        Native::Time(_, _, hours, minutes, seconds, micro) => {
            Value::Time(Some(Time::from_hms_micro(hours, minutes, seconds, micro)?))
        }
        Native::Bytes(bytes) => from_bytes(bytes, column)?,
    })
}

fn from_bytes(bytes: Vec<u8>, column: &mysql_async::Column) -> Result<Value> {
    use ColumnType::*;
    let text = || String::from_utf8_lossy(&bytes).into_owned();
    Ok(match column.column_type() {
        MYSQL_TYPE_TINY if is_boolean(column) => {
            Value::Boolean(Some(text().trim() != "0"))
        }
        MYSQL_TYPE_TINY | MYSQL_TYPE_SHORT | MYSQL_TYPE_INT24 | MYSQL_TYPE_LONG
        | MYSQL_TYPE_LONGLONG | MYSQL_TYPE_YEAR => {
            let t = text();
            let t = t.trim();
            match t.parse::<i64>() {
                Ok(v) => Value::Int64(Some(v)),
                Err(_) => Value::Int64(Some(t.parse::<u64>()? as i64)),
            }
        }
        MYSQL_TYPE_FLOAT => Value::Float32(Some(text().trim().parse()?)),
        MYSQL_TYPE_DOUBLE => Value::Float64(Some(text().trim().parse()?)),
        MYSQL_TYPE_DECIMAL | MYSQL_TYPE_NEWDECIMAL => {
            Value::Decimal(Some(text().trim().parse::<Decimal>()?))
        }
        MYSQL_TYPE_DATE => Value::Date(Some(Date::parse(
            text().trim(),
            format_description!("[year]-[month]-[day]"),
        )?)),
        MYSQL_TYPE_TIME => Value::Time(Some(parse_time(text().trim())?)),
        MYSQL_TYPE_DATETIME | MYSQL_TYPE_TIMESTAMP => {
            Value::Timestamp(Some(parse_datetime(text().trim())?))
        }
        MYSQL_TYPE_TINY_BLOB | MYSQL_TYPE_MEDIUM_BLOB | MYSQL_TYPE_LONG_BLOB
        | MYSQL_TYPE_BLOB | MYSQL_TYPE_STRING | MYSQL_TYPE_VAR_STRING | MYSQL_TYPE_VARCHAR
            if column.character_set() == BINARY_CHARSET =>
        {
            Value::Blob(Some(bytes.into()))
        }
        _ => Value::Varchar(Some(text())),
    })
}

fn parse_time(text: &str) -> Result<Time> {
    let text = text.split('.').next().unwrap_or(text);
    Ok(Time::parse(
        text,
        format_description!("[hour]:[minute]:[second]"),
    )?)
}

fn parse_datetime(text: &str) -> Result<PrimitiveDateTime> {
    let (date, time) = text.split_once(' ').unwrap_or((text, "00:00:00"));
    Ok(PrimitiveDateTime::new(
        Date::parse(date, format_description!("[year]-[month]-[day]"))?,
        parse_time(time)?,
    ))
}

use strata_core::{ColumnInfo, FieldKind, Result, Row, Value};
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tokio_postgres::types::Type;

pub(crate) fn column_info(columns: &[tokio_postgres::Column]) -> Vec<ColumnInfo> {
    columns
        .iter()
        .map(|c| ColumnInfo {
            name: c.name().to_owned(),
            kind: kind_of(c.type_()),
            length: None,
        })
        .collect()
}

fn kind_of(ty: &Type) -> FieldKind {
    if *ty == Type::BOOL {
        FieldKind::Boolean
    } else if *ty == Type::INT2
        || *ty == Type::INT4
        || *ty == Type::INT8
        || *ty == Type::FLOAT4
        || *ty == Type::FLOAT8
        || *ty == Type::NUMERIC
    {
        FieldKind::Numeric
    } else if *ty == Type::XID {
        FieldKind::Rowversion
    } else {
        FieldKind::Text
    }
}

pub(crate) fn extract_row(row: &tokio_postgres::Row) -> Result<Row> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, column)| extract_value(row, i, column.type_()))
        .collect()
}

fn extract_value(row: &tokio_postgres::Row, i: usize, ty: &Type) -> Result<Value> {
    let value = if *ty == Type::BOOL {
        Value::Boolean(row.try_get(i)?)
    } else if *ty == Type::INT2 {
        Value::Int16(row.try_get(i)?)
    } else if *ty == Type::INT4 {
        Value::Int32(row.try_get(i)?)
    } else if *ty == Type::INT8 {
        Value::Int64(row.try_get(i)?)
    } else if *ty == Type::FLOAT4 {
        Value::Float32(row.try_get(i)?)
    } else if *ty == Type::FLOAT8 {
        Value::Float64(row.try_get(i)?)
    } else if *ty == Type::NUMERIC {
        Value::Decimal(row.try_get(i)?)
    } else if *ty == Type::BYTEA {
        Value::Blob(row.try_get::<_, Option<Vec<u8>>>(i)?.map(Into::into))
    } else if *ty == Type::DATE {
        Value::Date(row.try_get(i)?)
    } else if *ty == Type::TIME {
        Value::Time(row.try_get(i)?)
    } else if *ty == Type::TIMESTAMP {
        Value::Timestamp(row.try_get(i)?)
    } else if *ty == Type::TIMESTAMPTZ {
        Value::Timestamp(row.try_get::<_, Option<OffsetDateTime>>(i)?.map(|v| {
            let v = v.to_offset(UtcOffset::UTC);
            PrimitiveDateTime::new(v.date(), v.time())
        }))
    } else if *ty == Type::UUID {
        Value::Uuid(row.try_get(i)?)
    } else {
        // Text types and anything without a dedicated mapping. Values that
        // cannot decode as text come back NULL rather than failing the row.
        Value::Varchar(row.try_get::<_, Option<String>>(i).unwrap_or(None))
    };
    Ok(value)
}

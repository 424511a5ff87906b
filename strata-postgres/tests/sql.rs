use strata_core::{
    CompareOp, Constraint, DbError, Driver, Entity, SqlWriter, Value,
};
use strata_postgres::{PostgresDriver, PostgresSqlWriter};

const WRITER: PostgresSqlWriter = PostgresSqlWriter {};

fn account() -> Entity {
    Entity::new("accounts")
        .field("id", Value::Int64(None))
        .field("name", Value::Varchar(None))
        .field("xmin", Value::Rowversion(None))
        .id("id")
}

#[test]
fn xmin_is_selected_as_text() {
    let mut out = String::new();
    WRITER.write_select(&mut out, &account(), &[], None).unwrap();
    assert_eq!(
        out,
        "SELECT \"id\", \"name\", \"xmin\"::text FROM \"accounts\" ORDER BY \"id\"",
    );
}

#[test]
fn insert_omits_id_and_xmin() {
    let mut entity = account();
    entity.set("name", "primary").unwrap();
    let mut out = String::new();
    WRITER.write_insert(&mut out, &entity).unwrap();
    assert_eq!(out, "INSERT INTO \"accounts\" (\"name\") VALUES ('primary')");
}

#[test]
fn update_guards_on_xmin() {
    let mut entity = account();
    entity.set("id", 4_i64).unwrap();
    entity.set("name", "renamed").unwrap();
    entity
        .set("xmin", Value::Rowversion(Some("7781".into())))
        .unwrap();
    let mut out = String::new();
    WRITER.write_update(&mut out, &entity).unwrap();
    assert_eq!(
        out,
        "UPDATE \"accounts\" SET \"name\" = 'renamed' \
         WHERE \"id\" = 4 AND \"xmin\" = '7781'",
    );
}

#[test]
fn ilike_is_native() {
    let constraint = Constraint::new().filter_literal("name", CompareOp::ILike, "prim");
    let mut out = String::new();
    WRITER
        .write_where_clause(&mut out, &account(), &[], &constraint, false)
        .unwrap();
    assert_eq!(out, "\"name\" ILIKE '%prim%'");
}

#[test]
fn blob_literal_uses_hex_escape() {
    let mut out = String::new();
    WRITER.write_value(&mut out, &Value::Blob(Some(vec![0xDE, 0xAD].into())));
    assert_eq!(out, "'\\xDEAD'");
}

#[test]
fn last_insert_id_uses_lastval() {
    let mut out = String::new();
    WRITER.write_last_insert_id(&mut out);
    assert_eq!(out, "SELECT lastval()");
}

#[test]
fn sqlstate_classification() {
    let driver = PostgresDriver {};
    let duplicate = DbError::new(Some("23505".into()), "duplicate key value");
    let foreign = DbError::new(Some("23503".into()), "violates foreign key constraint");
    let other = DbError::new(Some("42601".into()), "syntax error");
    assert!(driver.is_duplicate_key_error(&duplicate));
    assert!(!driver.is_foreign_key_error(&duplicate));
    assert!(driver.is_foreign_key_error(&foreign));
    assert!(!driver.is_duplicate_key_error(&other));
    assert!(!driver.is_foreign_key_error(&other));
}

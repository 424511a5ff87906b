use strata_core::{CompareOp, Constraint, DbError, Driver, Entity, SqlWriter, Value};
use strata_mysql::{MySqlDriver, MySqlSqlWriter};

const WRITER: MySqlSqlWriter = MySqlSqlWriter {};

fn product() -> Entity {
    Entity::new("products")
        .field("id", Value::Int64(None))
        .field("label", Value::Varchar(None))
        .field("in_stock", Value::Boolean(None))
        .id("id")
}

#[test]
fn identifiers_use_backticks() {
    let mut out = String::new();
    WRITER.write_select(&mut out, &product(), &[], None).unwrap();
    assert_eq!(
        out,
        "SELECT `id`, `label`, `in_stock` FROM `products` ORDER BY `id`",
    );
}

#[test]
fn booleans_render_as_digits() {
    let mut entity = product();
    entity.set("label", "thing").unwrap();
    entity.set("in_stock", true).unwrap();
    let mut out = String::new();
    WRITER.write_insert(&mut out, &entity).unwrap();
    assert_eq!(
        out,
        "INSERT INTO `products` (`label`, `in_stock`) VALUES ('thing', 1)",
    );
}

#[test]
fn strings_escape_backslash_and_quote() {
    let mut out = String::new();
    WRITER.write_value_string(&mut out, r"c:\temp\it's");
    assert_eq!(out, r"'c:\\temp\\it''s'");
}

#[test]
fn ilike_degrades_to_lowered_like() {
    let constraint = Constraint::new().filter_literal("label", CompareOp::ILike, "Cha");
    let mut out = String::new();
    WRITER
        .write_where_clause(&mut out, &product(), &[], &constraint, false)
        .unwrap();
    assert_eq!(out, "lower(`label`) LIKE lower('%Cha%')");
}

#[test]
fn transaction_verbs() {
    let mut out = String::new();
    WRITER.write_begin(&mut out);
    assert_eq!(out, "START TRANSACTION");
    let mut out = String::new();
    WRITER.write_last_insert_id(&mut out);
    assert_eq!(out, "SELECT LAST_INSERT_ID()");
}

#[test]
fn vendor_code_classification() {
    let driver = MySqlDriver {};
    let duplicate = DbError::new(Some("1062".into()), "Duplicate entry");
    let parent_missing = DbError::new(Some("1452".into()), "a foreign key constraint fails");
    let child_exists = DbError::new(Some("1451".into()), "a foreign key constraint fails");
    assert!(driver.is_duplicate_key_error(&duplicate));
    assert!(driver.is_foreign_key_error(&parent_missing));
    assert!(driver.is_foreign_key_error(&child_exists));
    assert!(!driver.is_foreign_key_error(&duplicate));
}

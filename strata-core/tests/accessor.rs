use indoc::indoc;
use std::collections::VecDeque;
use strata_core::{
    Accessor, ColumnInfo, CompareOp, Connection, Constraint, DbError, Driver, Entity, Error,
    FieldKind, OpCode, Result, ResultSet, RoutineCall, RoutineResults, SqlWriter,
    TransactionState, Value,
};

#[derive(Clone, Copy, Debug, Default)]
struct MockSqlWriter;

impl SqlWriter for MockSqlWriter {
    fn rowversion_field(&self) -> Option<&'static str> {
        Some("rv")
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct MockDriver;

impl Driver for MockDriver {
    type Connection = MockConnection;
    type SqlWriter = MockSqlWriter;

    const NAME: &'static str = "mock";

    fn sql_writer(&self) -> Self::SqlWriter {
        MockSqlWriter {}
    }

    fn is_duplicate_key_error(&self, error: &DbError) -> bool {
        error.code_is("DUP")
    }

    fn is_foreign_key_error(&self, error: &DbError) -> bool {
        error.code_is("FK")
    }
}

/// Replays scripted statement outcomes and records every statement text.
#[derive(Default)]
struct MockConnection {
    state: TransactionState,
    log: Vec<String>,
    replies: VecDeque<Result<ResultSet>>,
}

impl MockConnection {
    fn new() -> Self {
        Self::default()
    }

    fn reply(&mut self, reply: Result<ResultSet>) -> &mut Self {
        self.replies.push_back(reply);
        self
    }
}

impl Connection for MockConnection {
    type Driver = MockDriver;

    fn driver(&self) -> &Self::Driver {
        &MockDriver {}
    }

    async fn connect(_url: &str) -> Result<Self> {
        Ok(Self::new())
    }

    async fn execute(&mut self, sql: &str) -> Result<ResultSet> {
        self.log.push(sql.to_owned());
        self.replies
            .pop_front()
            .unwrap_or_else(|| Ok(ResultSet::from_affected(0, None)))
    }

    fn state(&mut self) -> &mut TransactionState {
        &mut self.state
    }

    async fn call_routine(&mut self, _call: &RoutineCall) -> Result<RoutineResults> {
        Ok(RoutineResults::default())
    }
}

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn rows(names: &[&str], data: Vec<Vec<Value>>) -> ResultSet {
    let columns = names
        .iter()
        .map(|n| ColumnInfo {
            name: n.to_string(),
            kind: FieldKind::Text,
            length: None,
        })
        .collect();
    ResultSet::from_rows(
        columns,
        data.into_iter().map(Vec::into_boxed_slice).collect(),
    )
}

fn no_rows() -> ResultSet {
    ResultSet::from_affected(0, None)
}

fn affected(n: u64) -> ResultSet {
    ResultSet::from_affected(n, None)
}

fn engine_error(code: &str) -> Error {
    Error::new(DbError::new(Some(code.to_owned()), "engine refused"))
}

fn invoice() -> Entity {
    Entity::new("invoice_header")
        .field("numero", Value::Int32(None))
        .field("descripcion", Value::Varchar(None))
        .key("numero")
}

fn versioned_invoice() -> Entity {
    invoice().field("rv", Value::Rowversion(None))
}

#[tokio::test]
async fn add_inserts_and_reads_back() {
    let mut connection = MockConnection::new();
    connection
        .reply(Ok(no_rows())) // existence probe
        .reply(Ok(affected(1))) // insert
        .reply(Ok(rows(
            &["numero", "descripcion"],
            vec![vec![Value::Int32(Some(7)), Value::from("Muebles")]],
        ))); // read back
    let mut entity = invoice();
    entity.set("numero", 7).unwrap();
    let code = Accessor::new(&mut connection).add(&mut entity).await.unwrap();
    assert_eq!(code, OpCode::Ok);
    assert_eq!(entity.get("descripcion"), Some(&Value::from("Muebles")));
    assert_eq!(connection.log.len(), 3);
    assert!(connection.log[1].starts_with("INSERT INTO"));
}

#[tokio::test]
async fn add_reports_existing_record_without_inserting() {
    let mut connection = MockConnection::new();
    connection.reply(Ok(rows(
        &["numero", "descripcion"],
        vec![vec![Value::Int32(Some(7)), Value::Varchar(None)]],
    )));
    let mut entity = invoice();
    entity.set("numero", 7).unwrap();
    let code = Accessor::new(&mut connection).add(&mut entity).await.unwrap();
    assert_eq!(code, OpCode::RecordExist);
    assert_eq!(connection.log.len(), 1);
}

#[tokio::test]
async fn add_classifies_duplicate_key() {
    init_logs();
    let mut connection = MockConnection::new();
    connection
        .reply(Ok(no_rows()))
        .reply(Err(engine_error("DUP")));
    let mut entity = invoice();
    entity.set("numero", 7).unwrap();
    let code = Accessor::new(&mut connection).add(&mut entity).await.unwrap();
    assert_eq!(code, OpCode::DuplicateKey);
}

#[tokio::test]
async fn update_success_refreshes_entity() {
    let mut connection = MockConnection::new();
    connection.reply(Ok(affected(1))).reply(Ok(rows(
        &["numero", "descripcion"],
        vec![vec![Value::Int32(Some(7)), Value::from("Nueva")]],
    )));
    let mut entity = invoice();
    entity.set("numero", 7).unwrap();
    entity.set("descripcion", "Vieja").unwrap();
    let code = Accessor::new(&mut connection)
        .update(&mut entity)
        .await
        .unwrap();
    assert_eq!(code, OpCode::Ok);
    assert_eq!(entity.get("descripcion"), Some(&Value::from("Nueva")));
}

#[tokio::test]
async fn update_zero_affected_with_guard_is_modified() {
    let mut connection = MockConnection::new();
    connection.reply(Ok(affected(0))).reply(Ok(rows(
        &["numero", "descripcion", "rv"],
        vec![vec![
            Value::Int32(Some(7)),
            Value::from("Ajena"),
            Value::Rowversion(Some("901".into())),
        ]],
    )));
    let mut entity = versioned_invoice();
    entity.set("numero", 7).unwrap();
    entity.set("descripcion", "Mia").unwrap();
    entity.set("rv", Value::Rowversion(Some("900".into()))).unwrap();
    let code = Accessor::new(&mut connection)
        .update(&mut entity)
        .await
        .unwrap();
    assert_eq!(code, OpCode::RecordModified);
    // the update carried the stale rowversion in its WHERE clause
    assert!(connection.log[0].contains("\"rv\" = '900'"));
}

#[tokio::test]
async fn update_zero_affected_without_guard_is_ok() {
    let mut connection = MockConnection::new();
    connection.reply(Ok(affected(0))).reply(Ok(rows(
        &["numero", "descripcion"],
        vec![vec![Value::Int32(Some(7)), Value::from("Igual")]],
    )));
    let mut entity = invoice();
    entity.set("numero", 7).unwrap();
    entity.set("descripcion", "Igual").unwrap();
    let code = Accessor::new(&mut connection)
        .update(&mut entity)
        .await
        .unwrap();
    assert_eq!(code, OpCode::Ok);
}

#[tokio::test]
async fn update_zero_affected_on_missing_row_is_not_exist() {
    let mut connection = MockConnection::new();
    connection.reply(Ok(affected(0))).reply(Ok(no_rows()));
    let mut entity = invoice();
    entity.set("numero", 7).unwrap();
    entity.set("descripcion", "x").unwrap();
    let code = Accessor::new(&mut connection)
        .update(&mut entity)
        .await
        .unwrap();
    assert_eq!(code, OpCode::RecordNotExist);
}

#[tokio::test]
async fn delete_verify_probes_first() {
    let mut connection = MockConnection::new();
    connection.reply(Ok(no_rows()));
    let mut entity = invoice();
    entity.set("numero", 7).unwrap();
    let code = Accessor::new(&mut connection)
        .delete(&entity, true)
        .await
        .unwrap();
    assert_eq!(code, OpCode::RecordNotExist);
    // only the probe ran
    assert_eq!(connection.log.len(), 1);
    assert!(connection.log[0].starts_with("SELECT"));
}

#[tokio::test]
async fn delete_zero_affected_with_guard_is_modified() {
    let mut connection = MockConnection::new();
    connection.reply(Ok(affected(0))).reply(Ok(rows(
        &["numero", "rv"],
        vec![vec![
            Value::Int32(Some(7)),
            Value::Rowversion(Some("901".into())),
        ]],
    )));
    let mut entity = versioned_invoice();
    entity.set("numero", 7).unwrap();
    entity.set("rv", Value::Rowversion(Some("900".into()))).unwrap();
    let code = Accessor::new(&mut connection)
        .delete(&entity, false)
        .await
        .unwrap();
    assert_eq!(code, OpCode::RecordModified);
}

#[tokio::test]
async fn delete_full_refuses_empty_where_without_executing() {
    let mut connection = MockConnection::new();
    let entity = invoice();
    let code = Accessor::new(&mut connection)
        .delete_full(&entity, &Constraint::new())
        .await
        .unwrap();
    assert_eq!(code, OpCode::DeleteNoWhereClause);
    assert!(connection.log.is_empty());
}

#[tokio::test]
async fn delete_full_runs_constrained_delete() {
    let mut connection = MockConnection::new();
    connection.reply(Ok(affected(3)));
    let entity = invoice();
    let constraint = Constraint::new().filter_literal("descripcion", CompareOp::Like, "old");
    let code = Accessor::new(&mut connection)
        .delete_full(&entity, &constraint)
        .await
        .unwrap();
    assert_eq!(code, OpCode::Ok);
    assert_eq!(
        connection.log[0],
        "DELETE FROM \"invoice_header\" WHERE \"descripcion\" LIKE '%old%'",
    );
}

#[tokio::test]
async fn read_rejects_ambiguous_key() {
    let mut connection = MockConnection::new();
    connection.reply(Ok(rows(
        &["numero", "descripcion"],
        vec![
            vec![Value::Int32(Some(7)), Value::from("a")],
            vec![Value::Int32(Some(7)), Value::from("b")],
        ],
    )));
    let mut entity = invoice();
    entity.set("numero", 7).unwrap();
    let code = Accessor::new(&mut connection)
        .read(&mut entity, None)
        .await
        .unwrap();
    assert_eq!(code, OpCode::NotUniqueId);
}

#[tokio::test]
async fn failed_operation_marks_transaction_dirty() {
    init_logs();
    let mut connection = MockConnection::new();
    connection
        .reply(Ok(affected(0))) // BEGIN
        .reply(Err(engine_error("XX000"))) // update
        .reply(Ok(affected(0))); // ROLLBACK
    connection.begin().await.unwrap();
    let mut entity = invoice();
    entity.set("numero", 7).unwrap();
    entity.set("descripcion", "x").unwrap();
    let code = Accessor::new(&mut connection)
        .update(&mut entity)
        .await
        .unwrap();
    assert_eq!(code, OpCode::OperationFail);
    assert!(connection.state().is_dirty());
    let kept = connection.complete().await.unwrap();
    assert!(!kept);
    assert_eq!(connection.log.last().map(String::as_str), Some("ROLLBACK"));
    assert!(!connection.state().is_dirty());
}

#[tokio::test]
async fn nested_levels_use_savepoints() {
    let mut connection = MockConnection::new();
    connection.begin().await.unwrap();
    connection.begin().await.unwrap();
    connection.commit().await.unwrap();
    connection.commit().await.unwrap();
    assert_eq!(
        connection.log.join("\n"),
        indoc! {r#"
            BEGIN
            SAVEPOINT "strata_sp_1"
            RELEASE SAVEPOINT "strata_sp_1"
            COMMIT"#},
    );
}

#[test]
fn transaction_futures_move_across_threads() {
    fn assert_send(_: impl Send) {}
    let mut connection = MockConnection::new();
    assert_send(connection.begin());
    let mut connection = MockConnection::new();
    assert_send(connection.complete());
    let mut connection = MockConnection::new();
    assert_send(connection.last_insert_id());
}

#[tokio::test]
async fn named_savepoints_go_through_the_writer() {
    let mut connection = MockConnection::new();
    connection.savepoint("before_import").await.unwrap();
    connection.rollback_to("before_import").await.unwrap();
    connection.release_savepoint("before_import").await.unwrap();
    assert_eq!(
        connection.log,
        vec![
            "SAVEPOINT \"before_import\"",
            "ROLLBACK TO SAVEPOINT \"before_import\"",
            "RELEASE SAVEPOINT \"before_import\"",
        ],
    );
}

#[tokio::test]
async fn clean_complete_commits_all_levels() {
    let mut connection = MockConnection::new();
    connection.begin().await.unwrap();
    connection.begin().await.unwrap();
    let kept = connection.complete().await.unwrap();
    assert!(kept);
    assert_eq!(connection.log.last().map(String::as_str), Some("COMMIT"));
    assert!(!connection.state().in_transaction());
}

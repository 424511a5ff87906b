use crate::{PostgresDriver, PostgresSqlWriter, extract};
use anyhow::bail;
use strata_core::{
    Connection, DbError, Driver, Error, ErrorContext, ParamMode, Result, ResultSet, RoutineCall,
    RoutineResults, SqlWriter, TransactionState, Value, conform, separated_by, truncate_long,
};
use tokio::spawn;
use tokio_postgres::NoTls;

pub struct PostgresConnection {
    client: tokio_postgres::Client,
    state: TransactionState,
}

fn wrap_error(e: tokio_postgres::Error, sql: &str) -> Error {
    let e = match e.as_db_error() {
        Some(db) => Error::new(DbError::new(
            Some(db.code().code().to_owned()),
            db.message(),
        )),
        None => Error::new(e),
    };
    let e = e.context(format!("While running the query:\n{}", truncate_long!(sql)));
    log::error!("{:#}", e);
    e
}

fn returns_rows(sql: &str) -> bool {
    let head = sql
        .trim_start()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    // CALL reports a procedure's OUT parameters as a one-row result.
    matches!(
        head.as_str(),
        "SELECT" | "WITH" | "SHOW" | "TABLE" | "VALUES" | "FETCH" | "CALL"
    )
}

fn routine_args(writer: &PostgresSqlWriter, call: &RoutineCall) -> String {
    let mut args = String::new();
    separated_by(
        &mut args,
        call.params.iter().filter(|p| p.mode != ParamMode::Out),
        |out, p| writer.write_value(out, &p.value),
        ", ",
    );
    args
}

fn procedure_statement(writer: &PostgresSqlWriter, name: &str, args: &str) -> String {
    let mut sql = String::from("CALL ");
    writer.write_identifier_quoted(&mut sql, name);
    sql.push('(');
    sql.push_str(args);
    sql.push(')');
    sql
}

fn cursor_open_statement(writer: &PostgresSqlWriter, name: &str, args: &str) -> String {
    let mut sql = String::from("SELECT ");
    writer.write_identifier_quoted(&mut sql, name);
    sql.push('(');
    sql.push_str(args);
    sql.push(')');
    sql
}

fn table_statement(writer: &PostgresSqlWriter, name: &str, args: &str) -> String {
    let mut sql = String::from("SELECT * FROM ");
    writer.write_identifier_quoted(&mut sql, name);
    sql.push('(');
    sql.push_str(args);
    sql.push(')');
    sql
}

fn fetch_statement(writer: &PostgresSqlWriter, cursor: &str) -> String {
    let mut sql = String::from("FETCH ALL IN ");
    writer.write_identifier_quoted(&mut sql, cursor);
    sql
}

impl Connection for PostgresConnection {
    type Driver = PostgresDriver;

    fn driver(&self) -> &Self::Driver {
        &PostgresDriver {}
    }

    async fn connect(url: &str) -> Result<Self> {
        let context = || format!("While trying to connect to `{}`", url);
        let prefix = format!("{}://", <Self::Driver as Driver>::NAME);
        if !url.starts_with(&prefix) {
            let error = Error::msg(format!(
                "Postgres connection url must start with `{}`",
                prefix
            ))
            .context(context());
            log::error!("{:#}", error);
            return Err(error);
        }
        let (client, connection) = tokio_postgres::connect(url, NoTls)
            .await
            .with_context(context)?;
        spawn(async move {
            if let Err(e) = connection.await
                && !e.is_closed()
            {
                log::error!("Postgres connection error: {:#}", e);
            }
        });
        Ok(Self {
            client,
            state: TransactionState::new(),
        })
    }

    async fn execute(&mut self, sql: &str) -> Result<ResultSet> {
        log::debug!("Executing:\n{}", truncate_long!(sql));
        if returns_rows(sql) {
            // Preparing first keeps the column metadata even when no row
            // comes back.
            let statement = self
                .client
                .prepare(sql)
                .await
                .map_err(|e| wrap_error(e, sql))?;
            let rows = self
                .client
                .query(&statement, &[])
                .await
                .map_err(|e| wrap_error(e, sql))?;
            let columns = extract::column_info(statement.columns());
            let values = rows
                .iter()
                .map(extract::extract_row)
                .collect::<Result<Vec<_>>>()?;
            Ok(ResultSet::from_rows(columns, values))
        } else {
            let affected = self
                .client
                .execute(sql, &[])
                .await
                .map_err(|e| wrap_error(e, sql))?;
            Ok(ResultSet::from_affected(affected, None))
        }
    }

    fn state(&mut self) -> &mut TransactionState {
        &mut self.state
    }

    /// Routine invocation with the shape decided by the catalog: procedures
    /// go through `CALL` and report their OUT values as a row, refcursor
    /// functions are opened inside a transaction and drained with
    /// `FETCH ALL`, plain functions run as a table expression.
    async fn call_routine(&mut self, call: &RoutineCall) -> Result<RoutineResults> {
        let writer = self.driver().sql_writer();
        let mut sql = String::from(
            "SELECT p.prokind::text AS prokind, t.typname AS rettype, \
             (SELECT string_agg(a.attname, ',' ORDER BY a.ord) \
              FROM unnest(p.proargnames) WITH ORDINALITY AS a(attname, ord) \
              JOIN unnest(coalesce(p.proallargtypes, p.proargtypes::oid[])) \
              WITH ORDINALITY AS at(oid, ord) ON at.ord = a.ord \
              JOIN pg_catalog.pg_type pt ON pt.oid = at.oid \
              WHERE pt.typname = 'refcursor') AS cursor_args \
             FROM pg_catalog.pg_proc p \
             JOIN pg_catalog.pg_type t ON t.oid = p.prorettype \
             WHERE p.proname = ",
        );
        writer.write_value_string(&mut sql, &call.name);
        let info = self.execute(&sql).await?;
        if info.num_rows() == 0 {
            bail!("Routine `{}` does not exist", call.name);
        }
        let prokind = info
            .value(0, "prokind")
            .and_then(Value::as_text)
            .unwrap_or_default();
        let rettype = info
            .value(0, "rettype")
            .and_then(Value::as_text)
            .unwrap_or_default();
        let cursor_args: Vec<String> = info
            .value(0, "cursor_args")
            .and_then(Value::as_text)
            .map(|list| list.split(',').map(str::to_owned).collect())
            .unwrap_or_default();
        let args = routine_args(&writer, call);
        let mut results = RoutineResults::default();
        if prokind == "p" {
            // Cursors handed back through INOUT parameters only survive
            // within the transaction that opened them.
            let opened = !cursor_args.is_empty() && !self.state.in_transaction();
            if opened {
                self.begin().await?;
            }
            let sql = procedure_statement(&writer, &call.name, &args);
            let set = match self.execute(&sql).await {
                Ok(set) => set,
                Err(e) => {
                    if opened {
                        let _ = self.rollback().await;
                    }
                    return Err(e);
                }
            };
            if let Some(row) = set.row(0) {
                for param in call.params.iter().filter(|p| p.mode != ParamMode::In) {
                    if let Some(name) = &param.name
                        && let Some(value) = row.get_column(name)
                    {
                        if cursor_args.iter().any(|a| a == name)
                            && let Some(cursor) = value.as_text()
                        {
                            let fetch = fetch_statement(&writer, &cursor);
                            match self.execute(&fetch).await {
                                Ok(set) => results.row_sets.push(set),
                                Err(e) => {
                                    if opened {
                                        let _ = self.rollback().await;
                                    }
                                    return Err(e);
                                }
                            }
                        }
                        results
                            .out_values
                            .push((name.clone(), conform(value.clone(), &param.value)));
                    }
                }
            }
            if opened {
                self.commit().await?;
            }
        } else if rettype == "refcursor" {
            // A refcursor only survives within the transaction that opened it.
            let opened = !self.state.in_transaction();
            if opened {
                self.begin().await?;
            }
            let sql = cursor_open_statement(&writer, &call.name, &args);
            let cursors = self.execute(&sql).await?;
            let names: Vec<String> = cursors
                .iter()
                .filter_map(|row| row.values().first().and_then(Value::as_text))
                .collect();
            for name in &names {
                let fetch = fetch_statement(&writer, name);
                match self.execute(&fetch).await {
                    Ok(set) => results.row_sets.push(set),
                    Err(e) => {
                        if opened {
                            let _ = self.rollback().await;
                        }
                        return Err(e);
                    }
                }
            }
            if opened {
                self.commit().await?;
            }
        } else {
            let sql = table_statement(&writer, &call.name, &args);
            results.row_sets.push(self.execute(&sql).await?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::RoutineParam;

    const WRITER: PostgresSqlWriter = PostgresSqlWriter {};

    fn refresh_call() -> RoutineCall {
        RoutineCall::new("refresh_totals")
            .input(3_i32)
            .param(RoutineParam::inout("total", Value::Decimal(None)))
            .param(RoutineParam::output("report", Value::Varchar(None)))
    }

    #[test]
    fn call_counts_as_row_returning() {
        assert!(returns_rows(r#"CALL "refresh_totals"(3, NULL)"#));
        assert!(returns_rows("  select 1"));
        assert!(!returns_rows("UPDATE t SET x = 1"));
    }

    #[test]
    fn procedure_inlines_in_and_inout_arguments() {
        let call = refresh_call();
        let args = routine_args(&WRITER, &call);
        assert_eq!(
            procedure_statement(&WRITER, &call.name, &args),
            r#"CALL "refresh_totals"(3, NULL)"#,
        );
    }

    #[test]
    fn cursor_functions_open_then_fetch() {
        let call = RoutineCall::new("report_cursor").input("west");
        let args = routine_args(&WRITER, &call);
        assert_eq!(
            cursor_open_statement(&WRITER, &call.name, &args),
            r#"SELECT "report_cursor"('west')"#,
        );
        assert_eq!(
            fetch_statement(&WRITER, "<unnamed portal 1>"),
            r#"FETCH ALL IN "<unnamed portal 1>""#,
        );
    }

    #[test]
    fn table_functions_run_as_a_table_expression() {
        let call = RoutineCall::new("invoices_of").input(9_i64);
        let args = routine_args(&WRITER, &call);
        assert_eq!(
            table_statement(&WRITER, &call.name, &args),
            r#"SELECT * FROM "invoices_of"(9)"#,
        );
    }
}

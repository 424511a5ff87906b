use crate::{MySqlDriver, MySqlSqlWriter, extract};
use anyhow::bail;
use futures::TryStreamExt;
use mysql_async::{Conn, Opts, prelude::Queryable};
use strata_core::{
    Connection, DbError, Driver, Error, ErrorContext, ParamMode, Result, ResultSet, RoutineCall,
    RoutineResults, SqlWriter, TransactionState, Value, conform, separated_by, truncate_long,
};

pub struct MySqlConnection {
    connection: Conn,
    state: TransactionState,
}

fn wrap_error(e: mysql_async::Error, sql: &str) -> Error {
    let e = if let mysql_async::Error::Server(server) = &e {
        Error::new(DbError::new(
            Some(server.code.to_string()),
            server.message.clone(),
        ))
    } else {
        Error::new(e)
    };
    let e = e.context(format!("While running the query:\n{}", truncate_long!(sql)));
    log::error!("{:#}", e);
    e
}

fn variable_assignment(writer: &MySqlSqlWriter, param: &strata_core::RoutineParam) -> String {
    let mut sql = String::from("SET @");
    sql.push_str(param.name.as_deref().unwrap_or_default());
    sql.push_str(" = ");
    match param.mode {
        ParamMode::InOut => writer.write_value(&mut sql, &param.value),
        _ => sql.push_str("NULL"),
    }
    sql
}

fn procedure_statement(writer: &MySqlSqlWriter, call: &RoutineCall) -> String {
    let mut sql = String::from("CALL ");
    writer.write_identifier_quoted(&mut sql, &call.name);
    sql.push('(');
    separated_by(
        &mut sql,
        &call.params,
        |out, param| match (&param.mode, &param.name) {
            (ParamMode::In, _) => writer.write_value(out, &param.value),
            (_, Some(name)) => {
                out.push('@');
                out.push_str(name);
            }
            _ => {}
        },
        ", ",
    );
    sql.push(')');
    sql
}

fn variable_readback(writer: &MySqlSqlWriter, outputs: &[&str]) -> String {
    let mut sql = String::from("SELECT ");
    separated_by(
        &mut sql,
        outputs,
        |out, name| {
            out.push('@');
            out.push_str(name);
            out.push_str(" AS ");
            writer.write_identifier_quoted(out, name);
        },
        ", ",
    );
    sql
}

fn function_statement(writer: &MySqlSqlWriter, call: &RoutineCall) -> String {
    let mut sql = String::from("SELECT ");
    writer.write_identifier_quoted(&mut sql, &call.name);
    sql.push('(');
    separated_by(
        &mut sql,
        call.params.iter().filter(|p| p.mode == ParamMode::In),
        |out, param| writer.write_value(out, &param.value),
        ", ",
    );
    sql.push(')');
    sql
}

impl MySqlConnection {
    /// Runs one statement and buffers every result set it produced.
    /// Statements without rows contribute the affected count instead.
    async fn run_statement(&mut self, sql: &str) -> Result<Vec<ResultSet>> {
        log::debug!("Executing:\n{}", truncate_long!(sql));
        let mut result = self
            .connection
            .query_iter(sql)
            .await
            .map_err(|e| wrap_error(e, sql))?;
        let mut sets = Vec::new();
        while let Some(stream) = result
            .stream::<mysql_async::Row>()
            .await
            .map_err(|e| wrap_error(e, sql))?
        {
            // Metadata comes from the stream, not the rows, so an empty
            // result set keeps its columns and its position.
            let columns = extract::column_info(stream.columns_ref());
            let rows: Vec<mysql_async::Row> = stream
                .try_collect()
                .await
                .map_err(|e| wrap_error(e, sql))?;
            if !columns.is_empty() {
                sets.push(extract::rows_to_set(columns, &rows)?);
            }
        }
        if sets.is_empty() {
            sets.push(ResultSet::from_affected(
                result.affected_rows(),
                result.last_insert_id().map(|v| v as i64),
            ));
        }
        Ok(sets)
    }
}

impl Connection for MySqlConnection {
    type Driver = MySqlDriver;

    fn driver(&self) -> &Self::Driver {
        &MySqlDriver {}
    }

    async fn connect(url: &str) -> Result<Self> {
        let context = || format!("While trying to connect to `{}`", truncate_long!(url));
        let prefix = format!("{}://", <Self::Driver as Driver>::NAME);
        if !url.starts_with(&prefix) {
            let error = Error::msg(format!("MySQL connection url must start with `{}`", prefix))
                .context(context());
            log::error!("{:#}", error);
            return Err(error);
        }
        let config = Opts::from_url(url).with_context(context)?;
        let connection = Conn::new(config).await.with_context(context)?;
        Ok(Self {
            connection,
            state: TransactionState::new(),
        })
    }

    async fn close(self) -> Result<()> {
        self.connection.disconnect().await?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<ResultSet> {
        let mut sets = self.run_statement(sql).await?;
        Ok(sets.swap_remove(0))
    }

    fn state(&mut self) -> &mut TransactionState {
        &mut self.state
    }

    /// Procedures run through `CALL` with session variables standing in for
    /// the OUT and INOUT parameters, read back with a trailing SELECT.
    /// Functions are evaluated as a one-row SELECT.
    async fn call_routine(&mut self, call: &RoutineCall) -> Result<RoutineResults> {
        let writer = self.driver().sql_writer();
        let mut sql = String::from(
            "SELECT routine_type FROM information_schema.routines WHERE routine_schema = DATABASE() \
             AND routine_name = ",
        );
        writer.write_value_string(&mut sql, &call.name);
        let info = self.execute(&sql).await?;
        if info.num_rows() == 0 {
            bail!("Routine `{}` does not exist", call.name);
        }
        let kind = info.scalar().and_then(Value::as_text).unwrap_or_default();
        let mut results = RoutineResults::default();
        if kind.eq_ignore_ascii_case("PROCEDURE") {
            for param in call.params.iter().filter(|p| p.mode != ParamMode::In) {
                if param.name.is_none() {
                    bail!(
                        "OUT parameters of `{}` must be named to use session variables",
                        call.name,
                    );
                }
                let sql = variable_assignment(&writer, param);
                self.execute(&sql).await?;
            }
            let sql = procedure_statement(&writer, call);
            results.row_sets = self.run_statement(&sql).await?;
            let outputs: Vec<&str> = call
                .params
                .iter()
                .filter(|p| p.mode != ParamMode::In)
                .filter_map(|p| p.name.as_deref())
                .collect();
            if !outputs.is_empty() {
                let sql = variable_readback(&writer, &outputs);
                let set = self.execute(&sql).await?;
                if let Some(row) = set.row(0) {
                    for param in call.params.iter().filter(|p| p.mode != ParamMode::In) {
                        if let Some(name) = &param.name
                            && let Some(value) = row.get_column(name)
                        {
                            results
                                .out_values
                                .push((name.clone(), conform(value.clone(), &param.value)));
                        }
                    }
                }
            }
        } else {
            let sql = function_statement(&writer, call);
            results.row_sets.push(self.execute(&sql).await?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::RoutineParam;

    const WRITER: MySqlSqlWriter = MySqlSqlWriter {};

    fn restock_call() -> RoutineCall {
        RoutineCall::new("restock")
            .input("widget")
            .param(RoutineParam::inout("amount", 5_i32))
            .param(RoutineParam::output("warning", Value::Varchar(None)))
    }

    #[test]
    fn session_variables_are_seeded_per_mode() {
        let call = restock_call();
        let assignments: Vec<String> = call
            .params
            .iter()
            .filter(|p| p.mode != ParamMode::In)
            .map(|p| variable_assignment(&WRITER, p))
            .collect();
        assert_eq!(assignments, ["SET @amount = 5", "SET @warning = NULL"]);
    }

    #[test]
    fn procedures_mix_literals_and_session_variables() {
        let call = restock_call();
        assert_eq!(
            procedure_statement(&WRITER, &call),
            "CALL `restock`('widget', @amount, @warning)",
        );
        assert_eq!(
            variable_readback(&WRITER, &["amount", "warning"]),
            "SELECT @amount AS `amount`, @warning AS `warning`",
        );
    }

    #[test]
    fn functions_evaluate_as_a_scalar_select() {
        let call = RoutineCall::new("stock_level").input("widget");
        assert_eq!(function_statement(&WRITER, &call), "SELECT `stock_level`('widget')");
    }
}

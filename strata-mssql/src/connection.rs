use crate::{MssqlDriver, MssqlSqlWriter, extract};
use anyhow::bail;
use futures::TryStreamExt;
use strata_core::{
    ColumnInfo, Connection, DbError, Driver, Error, ErrorContext, ParamMode, Result, ResultSet,
    RoutineCall, RoutineParam, RoutineResults, SqlWriter, TransactionState, Value, conform,
    separated_by, truncate_long,
};
use tiberius::{AuthMethod, Client, Config, QueryItem};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use url::Url;
use urlencoding::decode;

pub struct MssqlConnection {
    client: Client<Compat<TcpStream>>,
    state: TransactionState,
}

fn wrap_error(e: tiberius::error::Error, sql: &str) -> Error {
    let e = if let tiberius::error::Error::Server(token) = &e {
        Error::new(DbError::new(
            Some(token.code().to_string()),
            token.message().to_owned(),
        ))
    } else {
        Error::new(e)
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
    matches!(head.as_str(), "SELECT" | "WITH" | "DECLARE" | "EXEC")
}

/// T-SQL type to declare for an OUT variable when the caller gave no hint.
fn declared_type(param: &RoutineParam) -> String {
    if let Some(hint) = &param.type_hint {
        return hint.clone();
    }
    match &param.value {
        Value::Boolean(..) => "BIT",
        Value::Int8(..) | Value::Int16(..) => "SMALLINT",
        Value::Int32(..) => "INT",
        Value::Int64(..) => "BIGINT",
        Value::Float32(..) => "REAL",
        Value::Float64(..) => "FLOAT",
        Value::Decimal(..) => "DECIMAL(38, 10)",
        Value::Blob(..) => "VARBINARY(MAX)",
        Value::Date(..) => "DATE",
        Value::Time(..) => "TIME",
        Value::Timestamp(..) => "DATETIME2",
        Value::Uuid(..) => "UNIQUEIDENTIFIER",
        Value::Rowversion(..) => "BINARY(8)",
        _ => "NVARCHAR(MAX)",
    }
    .to_owned()
}

fn procedure_batch(
    writer: &MssqlSqlWriter,
    schema: &str,
    name: &str,
    call: &RoutineCall,
    outputs: &[(&str, &RoutineParam)],
) -> String {
    let mut batch = String::new();
    for (name, param) in outputs {
        batch.push_str("DECLARE @");
        batch.push_str(name);
        batch.push(' ');
        batch.push_str(&declared_type(param));
        if param.mode == ParamMode::InOut {
            batch.push_str(" = ");
            writer.write_value(&mut batch, &param.value);
        }
        batch.push_str(";\n");
    }
    batch.push_str("EXEC ");
    writer.write_identifier_quoted(&mut batch, schema);
    batch.push('.');
    writer.write_identifier_quoted(&mut batch, name);
    batch.push(' ');
    separated_by(
        &mut batch,
        &call.params,
        |out, param| match (&param.mode, &param.name) {
            (ParamMode::In, _) => writer.write_value(out, &param.value),
            (_, Some(name)) => {
                out.push('@');
                out.push_str(name);
                out.push_str(" OUTPUT");
            }
            _ => {}
        },
        ", ",
    );
    batch.push_str(";\n");
    if !outputs.is_empty() {
        batch.push_str("SELECT ");
        separated_by(
            &mut batch,
            outputs,
            |out, (name, _)| {
                out.push('@');
                out.push_str(name);
                out.push_str(" AS ");
                writer.write_identifier_quoted(out, name);
            },
            ", ",
        );
        batch.push(';');
    }
    batch
}

fn function_statement(
    writer: &MssqlSqlWriter,
    schema: &str,
    name: &str,
    call: &RoutineCall,
    table_valued: bool,
) -> String {
    let mut sql = String::from(if table_valued {
        "SELECT * FROM "
    } else {
        "SELECT "
    });
    writer.write_identifier_quoted(&mut sql, schema);
    sql.push('.');
    writer.write_identifier_quoted(&mut sql, name);
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

impl MssqlConnection {
    async fn run_batch(&mut self, sql: &str) -> Result<Vec<ResultSet>> {
        let mut stream = self
            .client
            .simple_query(sql)
            .await
            .map_err(|e| wrap_error(e, sql))?;
        // Each result set announces its metadata before any row, so empty
        // sets keep their columns and their position in the batch.
        let mut sets: Vec<(Vec<ColumnInfo>, Vec<tiberius::Row>)> = Vec::new();
        while let Some(item) = stream.try_next().await.map_err(|e| wrap_error(e, sql))? {
            match item {
                QueryItem::Metadata(meta) => {
                    sets.push((extract::column_info(meta.columns()), Vec::new()));
                }
                QueryItem::Row(row) => {
                    if let Some((_, rows)) = sets.last_mut() {
                        rows.push(row);
                    }
                }
            }
        }
        sets.into_iter()
            .map(|(columns, rows)| extract::rows_to_set(columns, rows))
            .collect()
    }
}

impl Connection for MssqlConnection {
    type Driver = MssqlDriver;

    fn driver(&self) -> &Self::Driver {
        &MssqlDriver {}
    }

    async fn connect(url: &str) -> Result<Self> {
        let context = || format!("While trying to connect to `{}`", truncate_long!(url));
        let prefix = format!("{}://", <Self::Driver as Driver>::NAME);
        if !url.starts_with(&prefix) {
            let error = Error::msg(format!(
                "SQL Server connection url must start with `{}`",
                prefix
            ))
            .context(context());
            log::error!("{:#}", error);
            return Err(error);
        }
        let parsed = Url::parse(url).with_context(context)?;
        let mut config = Config::new();
        config.host(parsed.host_str().unwrap_or("localhost"));
        if let Some(port) = parsed.port() {
            config.port(port);
        }
        let database = parsed.path().trim_start_matches('/');
        if !database.is_empty() {
            config.database(decode(database).with_context(context)?);
        }
        let user = decode(parsed.username()).with_context(context)?;
        let password = decode(parsed.password().unwrap_or_default()).with_context(context)?;
        config.authentication(AuthMethod::sql_server(user, password));
        config.trust_cert();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .with_context(context)?;
        tcp.set_nodelay(true).with_context(context)?;
        let client = Client::connect(config, tcp.compat_write())
            .await
            .with_context(context)?;
        Ok(Self {
            client,
            state: TransactionState::new(),
        })
    }

    async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<ResultSet> {
        log::debug!("Executing:\n{}", truncate_long!(sql));
        if returns_rows(sql) {
            let mut sets = self.run_batch(sql).await?;
            if sets.is_empty() {
                return Ok(ResultSet::from_affected(0, None));
            }
            Ok(sets.swap_remove(0))
        } else {
            let result = self
                .client
                .execute(sql, &[])
                .await
                .map_err(|e| wrap_error(e, sql))?;
            let affected = result.rows_affected().iter().sum();
            Ok(ResultSet::from_affected(affected, None))
        }
    }

    fn state(&mut self) -> &mut TransactionState {
        &mut self.state
    }

    /// Procedures run as a `DECLARE` / `EXEC ... OUTPUT` / `SELECT` batch;
    /// the trailing SELECT carries the OUT variables back. Functions are
    /// evaluated as expressions, schema-qualified as T-SQL requires.
    async fn call_routine(&mut self, call: &RoutineCall) -> Result<RoutineResults> {
        let writer = self.driver().sql_writer();
        let (schema, name) = call
            .name
            .split_once('.')
            .unwrap_or(("dbo", call.name.as_str()));
        let mut sql = String::from("SELECT RTRIM(o.type) FROM sys.objects o WHERE o.name = ");
        writer.write_value_string(&mut sql, name);
        sql.push_str(" AND SCHEMA_NAME(o.schema_id) = ");
        writer.write_value_string(&mut sql, schema);
        let info = self.execute(&sql).await?;
        if info.num_rows() == 0 {
            bail!("Routine `{}` does not exist", call.name);
        }
        let kind = info.scalar().and_then(Value::as_text).unwrap_or_default();
        let mut results = RoutineResults::default();
        match kind.as_str() {
            "P" | "PC" => {
                let outputs: Vec<(&str, &RoutineParam)> = call
                    .params
                    .iter()
                    .filter(|p| p.mode != ParamMode::In)
                    .map(|p| {
                        p.name
                            .as_deref()
                            .map(|name| (name, p))
                            .context("OUT parameters must be named")
                    })
                    .collect::<Result<_>>()?;
                let batch = procedure_batch(&writer, schema, name, call, &outputs);
                let mut sets = self.run_batch(&batch).await?;
                if !outputs.is_empty()
                    && let Some(last) = sets.pop()
                    && let Some(row) = last.row(0)
                {
                    for (name, param) in &outputs {
                        if let Some(value) = row.get_column(name) {
                            results
                                .out_values
                                .push((name.to_string(), conform(value.clone(), &param.value)));
                        }
                    }
                }
                results.row_sets = sets;
            }
            "FN" => {
                let sql = function_statement(&writer, schema, name, call, false);
                results.row_sets.push(self.execute(&sql).await?);
            }
            _ => {
                // inline and multi-statement table-valued functions
                let sql = function_statement(&writer, schema, name, call, true);
                results.row_sets.push(self.execute(&sql).await?);
            }
        }
        Ok(results)
    }
}

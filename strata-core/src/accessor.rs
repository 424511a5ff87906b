use crate::{
    BuildError, Connection, Constraint, DbError, Driver, Entity, Error, OpCode, Result,
    ResultSet, RoutineCall, RoutineResults, SqlWriter, WhereField,
};
use anyhow::Context;
use log::{error, warn};

/// Engine-independent persistence operations over one connection.
///
/// Single-record operations report their outcome as an [`OpCode`] instead of
/// an error: a duplicate key or a missing record is a normal business
/// outcome the caller branches on, not an exceptional condition. Only
/// infrastructure failures (lost connection, malformed SQL from a driver
/// bug) surface as `Err`. Multi-record fetches have no outcome to classify
/// and use plain `Result`s.
///
/// Any non-Ok outcome inside an open transaction marks it dirty, so a later
/// [`Connection::complete`] rolls the whole unit of work back.
pub struct Accessor<'c, C: Connection> {
    connection: &'c mut C,
}

impl<'c, C: Connection> Accessor<'c, C> {
    pub fn new(connection: &'c mut C) -> Self {
        Self { connection }
    }

    pub fn connection(&mut self) -> &mut C {
        self.connection
    }

    fn writer(&self) -> <C::Driver as Driver>::SqlWriter {
        self.connection.driver().sql_writer()
    }

    /// Maps an operation error onto the portable outcome code.
    fn classify(&self, error: &Error) -> OpCode {
        if let Some(build) = error.downcast_ref::<BuildError>() {
            return build.op_code();
        }
        if let Some(db) = error.downcast_ref::<DbError>() {
            let driver = self.connection.driver();
            if driver.is_duplicate_key_error(db) {
                return OpCode::DuplicateKey;
            }
            if driver.is_foreign_key_error(db) {
                return OpCode::ForeignKeyError;
            }
        }
        OpCode::OperationFail
    }

    /// Records the outcome against the open transaction, if any.
    fn settle(&mut self, code: OpCode) -> OpCode {
        if !code.is_ok() && self.connection.state().in_transaction() {
            self.connection.state().mark_dirty();
        }
        code
    }

    fn fail(&mut self, error: &Error) -> OpCode {
        error!("{:#}", error);
        let code = self.classify(error);
        self.settle(code)
    }

    fn key_is_populated(&self, entity: &Entity) -> bool {
        entity
            .effective_key()
            .map(|keys| {
                keys.iter()
                    .all(|k| entity.get(k).is_some_and(|v| !v.is_null()))
            })
            .unwrap_or(false)
    }

    /// Inserts the entity's row.
    ///
    /// When the key is already populated the row is probed first and an
    /// existing record reports [`OpCode::RecordExist`] without touching the
    /// table. After a successful insert the entity is refreshed from the
    /// database: a generated id is pulled in via the dialect's identity
    /// query, then the row is re-read so server-side defaults and the
    /// rowversion land back in the entity.
    pub async fn add(&mut self, entity: &mut Entity) -> Result<OpCode> {
        if let Err(e) = entity.validate() {
            return Ok(self.fail(&e));
        }
        if self.key_is_populated(entity) {
            let mut probe = entity.clone();
            if self.read(&mut probe, None).await?.is_ok() {
                return Ok(self.settle(OpCode::RecordExist));
            }
        }
        let mut sql = String::new();
        if let Err(e) = self.writer().write_insert(&mut sql, entity) {
            return Ok(self.fail(&e));
        }
        if let Err(e) = self.connection.execute(&sql).await {
            return Ok(self.fail(&e));
        }
        if let Some(id) = entity.id_field().map(str::to_owned)
            && entity.get(&id).is_some_and(|v| v.is_null())
            && let Some(value) = self.connection.last_insert_id().await?
        {
            entity.set(&id, value)?;
        }
        if self.key_is_populated(entity) {
            let code = self.read(entity, None).await?;
            if code != OpCode::Ok {
                warn!(
                    "Inserted row of `{}` could not be read back: {}",
                    entity.table().full_name(),
                    code,
                );
            }
        }
        Ok(OpCode::Ok)
    }

    /// Updates the entity's row by key, guarded by the rowversion when the
    /// entity declares one.
    ///
    /// Zero affected rows is ambiguous and is disambiguated by re-reading:
    /// the row being gone is [`OpCode::RecordNotExist`]; the row existing
    /// while a rowversion guard was in place is [`OpCode::RecordModified`];
    /// the row existing without a guard means the statement simply changed
    /// nothing and is success. On success the entity absorbs the current
    /// row, picking up the new rowversion.
    pub async fn update(&mut self, entity: &mut Entity) -> Result<OpCode> {
        let mut sql = String::new();
        if let Err(e) = self.writer().write_update(&mut sql, entity) {
            return Ok(self.fail(&e));
        }
        let guarded = self
            .writer()
            .rowversion_field()
            .and_then(|rv| entity.get(rv))
            .is_some_and(|v| !v.is_null());
        let affected = match self.connection.execute(&sql).await {
            Ok(set) => set.affected_rows(),
            Err(e) => return Ok(self.fail(&e)),
        };
        if affected > 0 {
            let code = self.read(entity, None).await?;
            if code != OpCode::Ok {
                warn!(
                    "Updated row of `{}` could not be read back: {}",
                    entity.table().full_name(),
                    code,
                );
            }
            return Ok(OpCode::Ok);
        }
        match self.read(entity, None).await? {
            OpCode::Ok if guarded => Ok(self.settle(OpCode::RecordModified)),
            OpCode::Ok => Ok(OpCode::Ok),
            OpCode::RecordNotExist => Ok(self.settle(OpCode::RecordNotExist)),
            code => Ok(self.settle(code)),
        }
    }

    /// Deletes the entity's row by key, guarded by the rowversion when the
    /// entity declares one. With `verify` the row is probed first so a
    /// missing record is reported before any delete is attempted.
    pub async fn delete(&mut self, entity: &Entity, verify: bool) -> Result<OpCode> {
        if verify {
            let mut probe = entity.clone();
            let code = self.read(&mut probe, None).await?;
            if !code.is_ok() {
                return Ok(self.settle(code));
            }
        }
        let mut sql = String::new();
        if let Err(e) = self.writer().write_delete(&mut sql, entity) {
            return Ok(self.fail(&e));
        }
        let guarded = self
            .writer()
            .rowversion_field()
            .and_then(|rv| entity.get(rv))
            .is_some_and(|v| !v.is_null());
        let affected = match self.connection.execute(&sql).await {
            Ok(set) => set.affected_rows(),
            Err(e) => return Ok(self.fail(&e)),
        };
        if affected > 0 {
            return Ok(OpCode::Ok);
        }
        let mut probe = entity.clone();
        match self.read(&mut probe, None).await? {
            OpCode::Ok if guarded => Ok(self.settle(OpCode::RecordModified)),
            OpCode::Ok => Ok(self.settle(OpCode::OperationFail)),
            OpCode::RecordNotExist => Ok(self.settle(OpCode::RecordNotExist)),
            code => Ok(self.settle(code)),
        }
    }

    /// Deletes every row matching the constraint. A constraint rendering an
    /// empty WHERE clause is refused before any statement reaches the
    /// engine.
    pub async fn delete_full(
        &mut self,
        entity: &Entity,
        constraint: &Constraint,
    ) -> Result<OpCode> {
        let mut sql = String::new();
        if let Err(e) = self.writer().write_delete_where(&mut sql, entity, constraint) {
            return Ok(self.fail(&e));
        }
        if let Err(e) = self.connection.execute(&sql).await {
            return Ok(self.fail(&e));
        }
        Ok(OpCode::Ok)
    }

    /// Reads exactly one row by the entity's effective key, optionally
    /// narrowed by an extra constraint, and absorbs it into the entity.
    /// Zero rows is [`OpCode::RecordNotExist`]; more than one means the key
    /// did not identify a unique row and is [`OpCode::NotUniqueId`].
    pub async fn read(
        &mut self,
        entity: &mut Entity,
        constraint: Option<&Constraint>,
    ) -> Result<OpCode> {
        let keys = match entity.effective_key() {
            Ok(keys) => keys.into_iter().map(str::to_owned).collect::<Vec<_>>(),
            Err(e) => return Ok(self.fail(&e)),
        };
        let mut merged = constraint.cloned().unwrap_or_default();
        for key in keys {
            merged.where_fields.push(WhereField::equal(&key));
        }
        let mut sql = String::new();
        if let Err(e) = self.writer().write_select(&mut sql, entity, &[], Some(&merged)) {
            return Ok(self.fail(&e));
        }
        let set = match self.connection.execute(&sql).await {
            Ok(set) => set,
            Err(e) => return Ok(self.fail(&e)),
        };
        match set.num_rows() {
            0 => Ok(self.settle(OpCode::RecordNotExist)),
            1 => {
                if let Some(row) = set.row(0) {
                    entity.absorb_row(&row);
                }
                Ok(OpCode::Ok)
            }
            _ => Ok(self.settle(OpCode::NotUniqueId)),
        }
    }

    /// Runs the select described by the entity and constraint and returns
    /// the buffered rows. Contract violations propagate as errors here,
    /// there is no single-record outcome to encode them in.
    pub async fn fetch(
        &mut self,
        entity: &Entity,
        constraint: Option<&Constraint>,
    ) -> Result<ResultSet> {
        self.fetch_full(entity, &[], constraint).await
    }

    /// Join-aware fetch: `refs` supplies the descriptors of the joined
    /// tables so pulled and filtered fields can be checked for existence.
    pub async fn fetch_full(
        &mut self,
        entity: &Entity,
        refs: &[&Entity],
        constraint: Option<&Constraint>,
    ) -> Result<ResultSet> {
        let mut sql = String::new();
        self.writer()
            .write_select(&mut sql, entity, refs, constraint)?;
        let result = self.connection.execute(&sql).await;
        if result.is_err() && self.connection.state().in_transaction() {
            self.connection.state().mark_dirty();
        }
        result.with_context(|| format!("Fetch from `{}` failed", entity.table().full_name()))
    }

    /// Invokes a stored routine through the driver's calling protocol.
    pub async fn call_routine(&mut self, call: &RoutineCall) -> Result<RoutineResults> {
        let result = self.connection.call_routine(call).await;
        if result.is_err() && self.connection.state().in_transaction() {
            self.connection.state().mark_dirty();
        }
        result.with_context(|| format!("Routine `{}` failed", call.name))
    }
}

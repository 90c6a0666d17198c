//! Transaction operations for SQL backends.
//!
//! Every statement runs on the transaction's connection, so later reads see
//! earlier writes and nothing is visible to other connections until commit.
//! Statements are built per list from the registered schema; values are always
//! bound, and identifiers are quoted names that passed schema validation.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, Row, Transaction};

use crate::Result;
use crate::backend::BackendTxn;
use crate::backend::errors::BackendError;
use crate::constants::{ID_COLUMN, POSITION_COLUMN};
use crate::record::{Record, RecordId};
use crate::schema::{ColumnType, ListSchema};
use crate::scope::{PositionShift, PositionWindow, ScopeFilter};
use crate::value::Value;

use super::schema::{quote, table_name};
use super::{DbKind, ListRegistry, SqlxResultExt};

/// A bound parameter. Nulls carry their column type so the driver can encode them.
#[derive(Debug, Clone)]
enum Param {
    Integer(Option<i64>),
    Text(Option<String>),
}

impl Param {
    fn from_value(value: &Value, ty: ColumnType) -> Self {
        match (value, ty) {
            (Value::Integer(i), _) => Param::Integer(Some(*i)),
            (Value::Text(s), _) => Param::Text(Some(s.clone())),
            (Value::Null, ColumnType::Integer) => Param::Integer(None),
            (Value::Null, ColumnType::Text) => Param::Text(None),
        }
    }
}

/// SQL text with `$N` placeholders and the values bound to them.
#[derive(Debug, Default)]
struct Statement {
    sql: String,
    params: Vec<Param>,
    has_where: bool,
}

impl Statement {
    fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Default::default()
        }
    }

    fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    fn push_bind(&mut self, param: Param) -> &mut Self {
        self.params.push(param);
        let placeholder = format!("${}", self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// Start the next `WHERE` / `AND` condition.
    fn and(&mut self) -> &mut Self {
        let keyword = if self.has_where { " AND " } else { " WHERE " };
        self.has_where = true;
        self.push(keyword)
    }

    fn push_scope(&mut self, schema: &ListSchema, filter: &ScopeFilter) -> &mut Self {
        for (column, value) in filter.conditions() {
            self.and().push(&quote(column));
            if value.is_null() {
                self.push(" IS NULL");
            } else {
                let ty = schema
                    .column(column)
                    .map_or(ColumnType::Text, |column| column.ty);
                self.push(" = ").push_bind(Param::from_value(value, ty));
            }
        }
        self
    }

    fn query(&self) -> Query<'_, Any, AnyArguments<'_>> {
        let mut query = sqlx::query(&self.sql);
        for param in &self.params {
            query = match param {
                Param::Integer(value) => query.bind(*value),
                Param::Text(value) => query.bind(value.clone()),
            };
        }
        query
    }
}

/// An open SQL transaction.
pub(crate) struct SqlxTxn {
    tx: Transaction<'static, Any>,
    kind: DbKind,
    lists: ListRegistry,
}

impl SqlxTxn {
    pub(crate) fn new(tx: Transaction<'static, Any>, kind: DbKind, lists: ListRegistry) -> Self {
        Self { tx, kind, lists }
    }

    /// Registered schema of `list`.
    ///
    /// Takes `&mut self`: the wrapped `Transaction` is `Send` but not `Sync`,
    /// so only an exclusive borrow may be held across the await.
    async fn schema(&mut self, list: &str) -> Result<Arc<ListSchema>> {
        self.lists.read().await.get(list).cloned().ok_or_else(|| {
            BackendError::UnknownList {
                list: list.to_string(),
            }
            .into()
        })
    }

    /// `ORDER BY` clause giving `(position, id)` order. Postgres compares
    /// text by collation; `"C"` makes it bytewise like SQLite.
    fn order_by(&self) -> String {
        let id = match self.kind {
            DbKind::Sqlite => quote(ID_COLUMN),
            DbKind::Postgres => format!("{} COLLATE \"C\"", quote(ID_COLUMN)),
        };
        format!(" ORDER BY {}, {id}", quote(POSITION_COLUMN))
    }
}

/// Column list for reading whole records: id, position, then declared columns.
fn select_columns(schema: &ListSchema) -> String {
    let mut columns = vec![quote(ID_COLUMN), quote(POSITION_COLUMN)];
    columns.extend(schema.columns().iter().map(|column| quote(&column.name)));
    columns.join(", ")
}

fn decode_record(schema: &ListSchema, row: &AnyRow) -> Result<Record> {
    let id: String = row.try_get(0).sql_context("Failed to read id")?;
    let position: i64 = row.try_get(1).sql_context("Failed to read position")?;

    let mut record = Record::new(id);
    record.position = Some(position);
    for (offset, column) in schema.columns().iter().enumerate() {
        let index = offset + 2;
        let value = match column.ty {
            ColumnType::Integer => row
                .try_get::<Option<i64>, _>(index)
                .map(Value::from),
            ColumnType::Text => row
                .try_get::<Option<String>, _>(index)
                .map(Value::from),
        }
        .map_err(|e| BackendError::CorruptRow {
            list: schema.name().to_string(),
            reason: format!("column '{}': {e}", column.name),
        })?;
        record.fields.insert(column.name.clone(), value);
    }
    Ok(record)
}

fn require_position(record: &Record) -> Result<i64> {
    record.position.ok_or_else(|| {
        crate::coordinator::PositionError::MissingPosition {
            id: record.id.to_string(),
        }
        .into()
    })
}

#[async_trait]
impl BackendTxn for SqlxTxn {
    async fn get(&mut self, list: &str, id: &RecordId) -> Result<Option<Record>> {
        let schema = self.schema(list).await?;
        let mut statement = Statement::new(format!(
            "SELECT {} FROM {}",
            select_columns(&schema),
            table_name(list)
        ));
        statement
            .and()
            .push(&quote(ID_COLUMN))
            .push(" = ")
            .push_bind(Param::Text(Some(id.to_string())));

        let row = statement
            .query()
            .fetch_optional(&mut *self.tx)
            .await
            .sql_context("Failed to get record")?;
        row.map(|row| decode_record(&schema, &row)).transpose()
    }

    async fn insert(&mut self, list: &str, record: &Record) -> Result<()> {
        let schema = self.schema(list).await?;
        let position = require_position(record)?;

        if self.get(list, &record.id).await?.is_some() {
            return Err(BackendError::DuplicateRecord {
                list: list.to_string(),
                id: record.id.clone(),
            }
            .into());
        }

        let mut statement = Statement::new(format!(
            "INSERT INTO {} ({}) VALUES (",
            table_name(list),
            select_columns(&schema)
        ));
        statement
            .push_bind(Param::Text(Some(record.id.to_string())))
            .push(", ")
            .push_bind(Param::Integer(Some(position)));
        for column in schema.columns() {
            statement
                .push(", ")
                .push_bind(Param::from_value(record.field(&column.name), column.ty));
        }
        statement.push(")");

        statement
            .query()
            .execute(&mut *self.tx)
            .await
            .sql_context("Failed to insert record")?;
        Ok(())
    }

    async fn update(&mut self, list: &str, record: &Record) -> Result<()> {
        let schema = self.schema(list).await?;
        let position = require_position(record)?;

        let mut statement = Statement::new(format!("UPDATE {} SET ", table_name(list)));
        statement
            .push(&quote(POSITION_COLUMN))
            .push(" = ")
            .push_bind(Param::Integer(Some(position)));
        for column in schema.columns() {
            statement
                .push(", ")
                .push(&quote(&column.name))
                .push(" = ")
                .push_bind(Param::from_value(record.field(&column.name), column.ty));
        }
        statement
            .and()
            .push(&quote(ID_COLUMN))
            .push(" = ")
            .push_bind(Param::Text(Some(record.id.to_string())));

        let result = statement
            .query()
            .execute(&mut *self.tx)
            .await
            .sql_context("Failed to update record")?;
        if result.rows_affected() == 0 {
            return Err(BackendError::RecordNotFound {
                list: list.to_string(),
                id: record.id.clone(),
            }
            .into());
        }
        Ok(())
    }

    async fn delete(&mut self, list: &str, id: &RecordId) -> Result<bool> {
        self.schema(list).await?;
        let mut statement = Statement::new(format!("DELETE FROM {}", table_name(list)));
        statement
            .and()
            .push(&quote(ID_COLUMN))
            .push(" = ")
            .push_bind(Param::Text(Some(id.to_string())));

        let result = statement
            .query()
            .execute(&mut *self.tx)
            .await
            .sql_context("Failed to delete record")?;
        Ok(result.rows_affected() > 0)
    }

    async fn members(&mut self, filter: &ScopeFilter) -> Result<Vec<Record>> {
        let schema = self.schema(filter.list()).await?;
        let mut statement = Statement::new(format!(
            "SELECT {} FROM {}",
            select_columns(&schema),
            table_name(filter.list())
        ));
        statement.push_scope(&schema, filter).push(&self.order_by());

        let rows = statement
            .query()
            .fetch_all(&mut *self.tx)
            .await
            .sql_context("Failed to list scope members")?;
        rows.iter().map(|row| decode_record(&schema, row)).collect()
    }

    async fn ordered_positions(&mut self, filter: &ScopeFilter) -> Result<Vec<(RecordId, i64)>> {
        let schema = self.schema(filter.list()).await?;
        let mut statement = Statement::new(format!(
            "SELECT {}, {} FROM {}",
            quote(ID_COLUMN),
            quote(POSITION_COLUMN),
            table_name(filter.list())
        ));
        statement.push_scope(&schema, filter).push(&self.order_by());

        let rows = statement
            .query()
            .fetch_all(&mut *self.tx)
            .await
            .sql_context("Failed to read scope positions")?;
        rows.iter()
            .map(|row| {
                let id: String = row.try_get(0).sql_context("Failed to read id")?;
                let position: i64 = row.try_get(1).sql_context("Failed to read position")?;
                Ok((RecordId::from(id), position))
            })
            .collect()
    }

    async fn max_position(&mut self, filter: &ScopeFilter) -> Result<Option<i64>> {
        let schema = self.schema(filter.list()).await?;
        let mut statement = Statement::new(format!(
            "SELECT MAX({}) FROM {}",
            quote(POSITION_COLUMN),
            table_name(filter.list())
        ));
        statement.push_scope(&schema, filter);

        let row = statement
            .query()
            .fetch_one(&mut *self.tx)
            .await
            .sql_context("Failed to read max position")?;
        row.try_get::<Option<i64>, _>(0)
            .sql_context("Failed to read max position")
    }

    async fn shift_positions(&mut self, filter: &ScopeFilter, shift: &PositionShift) -> Result<u64> {
        let schema = self.schema(filter.list()).await?;
        let position = quote(POSITION_COLUMN);

        let mut statement = Statement::new(format!(
            "UPDATE {} SET {position} = {position} + ",
            table_name(filter.list())
        ));
        statement
            .push_bind(Param::Integer(Some(shift.delta)))
            .push_scope(&schema, filter);
        match shift.window {
            PositionWindow::AtOrAfter(from) => {
                statement
                    .and()
                    .push(&position)
                    .push(" >= ")
                    .push_bind(Param::Integer(Some(from)));
            }
            PositionWindow::Between(low, high) => {
                statement
                    .and()
                    .push(&position)
                    .push(" BETWEEN ")
                    .push_bind(Param::Integer(Some(low)))
                    .push(" AND ")
                    .push_bind(Param::Integer(Some(high)));
            }
        }
        if let Some(exclude) = &shift.exclude {
            statement
                .and()
                .push(&quote(ID_COLUMN))
                .push(" <> ")
                .push_bind(Param::Text(Some(exclude.to_string())));
        }

        let result = statement
            .query()
            .execute(&mut *self.tx)
            .await
            .sql_context("Failed to shift positions")?;
        Ok(result.rows_affected())
    }

    async fn set_position(&mut self, list: &str, id: &RecordId, position: i64) -> Result<()> {
        self.schema(list).await?;
        let mut statement = Statement::new(format!("UPDATE {} SET ", table_name(list)));
        statement
            .push(&quote(POSITION_COLUMN))
            .push(" = ")
            .push_bind(Param::Integer(Some(position)))
            .and()
            .push(&quote(ID_COLUMN))
            .push(" = ")
            .push_bind(Param::Text(Some(id.to_string())));

        let result = statement
            .query()
            .execute(&mut *self.tx)
            .await
            .sql_context("Failed to set position")?;
        if result.rows_affected() == 0 {
            return Err(BackendError::RecordNotFound {
                list: list.to_string(),
                id: id.clone(),
            }
            .into());
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .sql_context("Failed to commit transaction")
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .sql_context("Failed to roll back transaction")
    }
}

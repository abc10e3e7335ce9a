//! SeaORM record store.
//!
//! Keeps one row per session in the `session` table of any database SeaORM
//! can reach (enable the `sqlite`, `postgres` or `mysql` feature for the
//! driver).
//!
//! ```rust,ignore
//! use armature_dbsession::{DbSessionHandler, SeaOrmRecordStore, SessionConfig};
//! use std::sync::Arc;
//!
//! let store = SeaOrmRecordStore::connect("sqlite://sessions.db?mode=rwc").await?;
//! store.create_schema().await?;
//!
//! let handler = DbSessionHandler::new(Arc::new(store), SessionConfig::default())?;
//! ```

pub mod entity;

use crate::error::{SessionError, SessionResult};
use crate::record::SessionRecord;
use crate::stores::{CompareOp, Condition, Field, FieldValue, RecordStore, persisted_id};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use sea_orm::sea_query::{
    Alias, ColumnDef, Expr, Index, IndexCreateStatement, SimpleExpr, Table, TableCreateStatement,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    Database, DatabaseConnection, DbBackend, EntityName, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Statement, Value,
};
use tracing::{debug, info, trace};

/// Rows fetched per query while streaming a sweep.
const DEFAULT_BATCH_SIZE: u64 = 100;

/// Name of the lookup index on `session_id`.
const SESSION_ID_INDEX: &str = "idx-session-session_id";

/// Longest `session_id` the column holds.
const SESSION_ID_LEN: u32 = 256;

/// Relational session row store backed by SeaORM.
#[derive(Clone)]
pub struct SeaOrmRecordStore {
    conn: DatabaseConnection,
    batch_size: u64,
}

impl SeaOrmRecordStore {
    /// Wrap an existing connection.
    pub fn new(conn: DatabaseConnection) -> Self {
        Self {
            conn,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Connect to the database at `url`.
    pub async fn connect(url: &str) -> SessionResult<Self> {
        info!("Connecting session store to database");
        let conn = Database::connect(url)
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))?;
        info!("Session store connection established");
        Ok(Self::new(conn))
    }

    /// Set how many rows each sweep query fetches.
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Get a reference to the underlying connection.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Create the `session` table and its `session_id` index if missing.
    pub async fn create_schema(&self) -> SessionResult<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .execute(backend.build(&table_statement(backend)))
            .await?;

        // MySQL has no CREATE INDEX IF NOT EXISTS.
        let index_missing = match backend {
            DbBackend::MySql => !self.mysql_index_exists().await?,
            _ => true,
        };
        if index_missing {
            self.conn.execute(backend.build(&index_statement())).await?;
        }

        debug!(backend = ?backend, "Session schema ready");
        Ok(())
    }

    async fn mysql_index_exists(&self) -> SessionResult<bool> {
        let query = Statement::from_sql_and_values(
            DbBackend::MySql,
            "SELECT COUNT(*) FROM information_schema.statistics \
             WHERE table_schema = DATABASE() AND table_name = ? AND index_name = ?",
            [
                Value::from(entity::Entity.table_name()),
                Value::from(SESSION_ID_INDEX),
            ],
        );
        let count = match self.conn.query_one(query).await? {
            Some(row) => row.try_get_by_index::<i64>(0)?,
            None => 0,
        };
        Ok(count > 0)
    }
}

fn table_statement(backend: DbBackend) -> TableCreateStatement {
    let mut data = ColumnDef::new(entity::Column::Data);
    let mut created_on = ColumnDef::new(entity::Column::CreatedOn);
    let mut updated_on = ColumnDef::new(entity::Column::UpdatedOn);

    match backend {
        // TEXT stops at 64 KiB and TIMESTAMP drops the microseconds.
        DbBackend::MySql => {
            data.custom(Alias::new("longtext"));
            created_on.custom(Alias::new("datetime(6)"));
            updated_on.custom(Alias::new("datetime(6)"));
        }
        _ => {
            data.text();
            created_on.timestamp_with_time_zone();
            updated_on.timestamp_with_time_zone();
        }
    }

    Table::create()
        .table(entity::Entity.table_ref())
        .if_not_exists()
        .col(
            ColumnDef::new(entity::Column::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(entity::Column::SessionId)
                .string_len(SESSION_ID_LEN)
                .not_null(),
        )
        .col(data.not_null())
        .col(created_on.not_null())
        .col(updated_on.not_null())
        .to_owned()
}

fn index_statement() -> IndexCreateStatement {
    Index::create()
        .name(SESSION_ID_INDEX)
        .table(entity::Entity.table_ref())
        .col(entity::Column::SessionId)
        .if_not_exists()
        .to_owned()
}

fn column(field: Field) -> entity::Column {
    match field {
        Field::SessionId => entity::Column::SessionId,
        Field::CreatedOn => entity::Column::CreatedOn,
        Field::UpdatedOn => entity::Column::UpdatedOn,
    }
}

fn filter_expr(field: Field, op: CompareOp, value: FieldValue) -> SessionResult<SimpleExpr> {
    let condition = Condition::new(field, op, value)?;
    let column = column(condition.field);
    let value: Value = match condition.value {
        FieldValue::Text(text) => text.into(),
        FieldValue::Timestamp(at) => at.into(),
    };

    Ok(match condition.op {
        CompareOp::Eq => column.eq(value),
        CompareOp::Lt => column.lt(value),
        CompareOp::Le => column.lte(value),
        CompareOp::Gt => column.gt(value),
        CompareOp::Ge => column.gte(value),
    })
}

#[async_trait]
impl RecordStore for SeaOrmRecordStore {
    async fn find_one_by(
        &self,
        field: Field,
        value: FieldValue,
    ) -> SessionResult<Option<SessionRecord>> {
        let filter = filter_expr(field, CompareOp::Eq, value)?;
        let model = entity::Entity::find()
            .filter(filter)
            .order_by_asc(entity::Column::Id)
            .one(&self.conn)
            .await?;
        Ok(model.map(Into::into))
    }

    async fn save_new(&self, record: SessionRecord) -> SessionResult<SessionRecord> {
        let model = entity::ActiveModel {
            id: NotSet,
            session_id: Set(record.session_id),
            data: Set(record.data),
            created_on: Set(record.created_on),
            updated_on: Set(record.updated_on),
        }
        .insert(&self.conn)
        .await?;

        trace!(id = model.id, session_id = %model.session_id, "Inserted session row");
        Ok(model.into())
    }

    async fn update(&self, record: &SessionRecord) -> SessionResult<()> {
        let id = persisted_id(record)?;
        // A row swept by a concurrent GC simply stays gone.
        let result = entity::Entity::update_many()
            .col_expr(entity::Column::SessionId, Expr::value(record.session_id.clone()))
            .col_expr(entity::Column::Data, Expr::value(record.data.clone()))
            .col_expr(entity::Column::UpdatedOn, Expr::value(record.updated_on))
            .filter(entity::Column::Id.eq(id))
            .exec(&self.conn)
            .await?;

        trace!(id = id, rows = result.rows_affected, "Updated session row");
        Ok(())
    }

    async fn delete(&self, record: &SessionRecord) -> SessionResult<()> {
        let id = persisted_id(record)?;
        let result = entity::Entity::delete_by_id(id).exec(&self.conn).await?;
        trace!(id = id, rows = result.rows_affected, "Deleted session row");
        Ok(())
    }

    fn iterate_where(
        &self,
        field: Field,
        op: CompareOp,
        value: FieldValue,
    ) -> BoxStream<'_, SessionResult<SessionRecord>> {
        let filter = match filter_expr(field, op, value) {
            Ok(filter) => filter,
            Err(err) => return stream::once(async move { Err(err) }).boxed(),
        };
        let batch_size = self.batch_size;

        // Keyset pagination on `id`: deleting yielded rows never shifts the
        // next batch the way OFFSET paging would.
        stream::unfold(Some(None::<i64>), move |cursor| {
            let filter = filter.clone();
            async move {
                let after = cursor?;
                let mut query = entity::Entity::find()
                    .filter(filter)
                    .order_by_asc(entity::Column::Id)
                    .limit(batch_size);
                if let Some(id) = after {
                    query = query.filter(entity::Column::Id.gt(id));
                }

                let (batch, next): (Vec<SessionResult<SessionRecord>>, _) =
                    match query.all(&self.conn).await {
                        Ok(models) => {
                            let next = if models.len() as u64 == batch_size {
                                models.last().map(|m| Some(m.id))
                            } else {
                                None
                            };
                            (models.into_iter().map(|m| Ok(m.into())).collect(), next)
                        }
                        Err(err) => (vec![Err(err.into())], None),
                    };

                if batch.is_empty() {
                    return None;
                }
                Some((stream::iter(batch), next))
            }
        })
        .flatten()
        .boxed()
    }

    async fn count(&self) -> SessionResult<usize> {
        let rows = entity::Entity::find().count(&self.conn).await?;
        Ok(rows as usize)
    }

    fn store_type(&self) -> &'static str {
        "seaorm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_schema_column_types() {
        let sql = DbBackend::MySql
            .build(&table_statement(DbBackend::MySql))
            .to_string();

        assert!(sql.contains("`session_id` varchar(256)"), "{}", sql);
        assert!(sql.contains("`data` longtext"), "{}", sql);
        assert!(sql.contains("`created_on` datetime(6)"), "{}", sql);
        assert!(sql.contains("`updated_on` datetime(6)"), "{}", sql);
    }

    #[test]
    fn test_postgres_schema_column_types() {
        let sql = DbBackend::Postgres
            .build(&table_statement(DbBackend::Postgres))
            .to_string();

        assert!(sql.contains("\"session_id\" varchar(256)"), "{}", sql);
        assert!(sql.contains("\"data\" text"), "{}", sql);
        assert!(sql.contains("\"updated_on\" timestamp with time zone"), "{}", sql);
    }

    #[test]
    fn test_index_targets_session_id() {
        let sql = DbBackend::MySql.build(&index_statement()).to_string();
        assert!(sql.contains("`idx-session-session_id`"), "{}", sql);
        assert!(sql.contains("(`session_id`)"), "{}", sql);
    }
}

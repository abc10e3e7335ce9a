//! SeaORM entity for the `session` table.
//!
//! | Column      | Type                   | Notes                         |
//! |-------------|------------------------|-------------------------------|
//! | id          | BIGINT (PK, auto)      | surrogate key                 |
//! | session_id  | VARCHAR(256) (indexed) | external session identifier   |
//! | data        | TEXT / LONGTEXT        | whole serialized session      |
//! | created_on  | TIMESTAMP (µs)         | set on insert                 |
//! | updated_on  | TIMESTAMP (µs)         | bumped on every write         |
//!
//! The DDL is built per backend by `SeaOrmRecordStore::create_schema`.

use crate::record::SessionRecord;
use sea_orm::entity::prelude::*;

/// One session row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "session")]
pub struct Model {
    /// Surrogate key
    #[sea_orm(primary_key)]
    pub id: i64,
    /// External session identifier; looked up by exact match
    #[sea_orm(column_type = "String(StringLen::N(256))")]
    pub session_id: String,
    /// Must be text to hold a whole serialized session
    #[sea_orm(column_type = "Text")]
    pub data: String,
    /// Insert time
    pub created_on: DateTimeUtc,
    /// Last write time, compared against the GC cutoff
    pub updated_on: DateTimeUtc,
}

/// The session table has no relations.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for SessionRecord {
    fn from(model: Model) -> Self {
        Self {
            id: Some(model.id),
            session_id: model.session_id,
            data: model.data,
            created_on: model.created_on,
            updated_on: model.updated_on,
        }
    }
}

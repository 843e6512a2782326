use futures_core::future::BoxFuture;
use serde_json::Value;
use sqlx::{
    error::BoxDynError,
    migrate::{MigrateDatabase, Migration as SqlxMigration, MigrationSource, MigrationType, Migrator},
    sqlite::{Sqlite, SqliteConnectOptions, SqliteRow},
    ConnectOptions, FromRow, Pool, Row,
};
use std::{path::PathBuf, str::FromStr};

use crate::{
    error::BuildonomyError,
    fields::FieldKind,
    store::{FieldValueRecord, FieldValueStore},
};

pub const FIELD_VALUE_DB: &str = "field_values.db";

fn kind_to_sql(kind: FieldKind) -> Result<String, BuildonomyError> {
    match serde_json::to_value(kind)? {
        Value::String(s) => Ok(s),
        other => Err(BuildonomyError::Serialization(format!(
            "Field kind serialized to a non-string: {other}"
        ))),
    }
}

impl FromRow<'_, SqliteRow> for FieldValueRecord {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let kind_str: String = row.try_get("kind")?;
        let value_str: &str = row.try_get("value")?;
        let kind = serde_json::from_value::<FieldKind>(Value::String(kind_str))
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let value =
            serde_json::from_str::<Value>(value_str).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(FieldValueRecord {
            id: row.try_get("id")?,
            path: row.try_get("path")?,
            field_id: row.try_get("field_id")?,
            field_name: row.try_get("field_name")?,
            kind,
            value,
            updated: row.try_get("updated")?,
        })
    }
}

/// [FieldValueStore] persisted in SQLite.
#[derive(Debug, Clone)]
pub struct SqliteStore(pub Pool<Sqlite>);

impl SqliteStore {
    pub async fn open(db_path: PathBuf) -> Result<SqliteStore, BuildonomyError> {
        Ok(SqliteStore(db_init(db_path).await?))
    }
}

impl FieldValueStore for SqliteStore {
    async fn get(&self, id: &str) -> Result<Option<FieldValueRecord>, BuildonomyError> {
        Ok(
            sqlx::query_as::<_, FieldValueRecord>("SELECT * FROM field_values WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.0)
                .await?,
        )
    }

    #[tracing::instrument(skip_all, fields(id = %record.id))]
    async fn put(&self, record: FieldValueRecord) -> Result<(), BuildonomyError> {
        let kind = kind_to_sql(record.kind)?;
        sqlx::query(
            "INSERT OR REPLACE INTO field_values \
             (id, path, field_id, field_name, kind, value, updated) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.path)
        .bind(&record.field_id)
        .bind(&record.field_name)
        .bind(kind)
        .bind(record.value.to_string())
        .bind(record.updated)
        .execute(&self.0)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), BuildonomyError> {
        sqlx::query("DELETE FROM field_values WHERE id = ?")
            .bind(id)
            .execute(&self.0)
            .await?;
        Ok(())
    }

    async fn get_all_by_path(&self, path: &str) -> Result<Vec<FieldValueRecord>, BuildonomyError> {
        Ok(sqlx::query_as::<_, FieldValueRecord>(
            "SELECT * FROM field_values WHERE path = ? ORDER BY id",
        )
        .bind(path)
        .fetch_all(&self.0)
        .await?)
    }

    async fn get_all_by_kind(
        &self,
        kind: FieldKind,
    ) -> Result<Vec<FieldValueRecord>, BuildonomyError> {
        Ok(sqlx::query_as::<_, FieldValueRecord>(
            "SELECT * FROM field_values WHERE kind = ? ORDER BY id",
        )
        .bind(kind_to_sql(kind)?)
        .fetch_all(&self.0)
        .await?)
    }

    async fn get_all(&self) -> Result<Vec<FieldValueRecord>, BuildonomyError> {
        Ok(
            sqlx::query_as::<_, FieldValueRecord>("SELECT * FROM field_values ORDER BY id")
                .fetch_all(&self.0)
                .await?,
        )
    }
}

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
    pub kind: MigrationType,
}

#[derive(Debug, Clone)]
struct MigrationList(Vec<Migration>);

impl MigrationSource<'static> for MigrationList {
    fn resolve(self) -> BoxFuture<'static, Result<Vec<SqlxMigration>, BoxDynError>> {
        Box::pin(async move {
            let mut migrations = Vec::new();
            for migration in self.0 {
                if matches!(migration.kind, MigrationType::ReversibleUp) {
                    migrations.push(SqlxMigration::new(
                        migration.version,
                        migration.description.into(),
                        migration.kind,
                        migration.sql.into(),
                        false,
                    ));
                }
            }
            Ok(migrations)
        })
    }
}

pub async fn db_init(db_path: PathBuf) -> Result<Pool<Sqlite>, sqlx::Error> {
    let fqdb = format!("sqlite:{}", db_path.display());
    tracing::debug!("Initializing field value db from file: {:?}", fqdb);
    if !Sqlite::database_exists(&fqdb).await.unwrap_or(false) {
        Sqlite::create_database(&fqdb).await?;
    }
    let options = SqliteConnectOptions::from_str(&fqdb)?
        .read_only(false)
        .disable_statement_logging()
        .create_if_missing(true);
    let pool = Pool::<Sqlite>::connect_with(options).await?;

    let migrations = MigrationList(vec![Migration {
        version: 1,
        description: "create_field_values",
        sql: "\
            CREATE TABLE field_values (id TEXT PRIMARY KEY, path TEXT NOT NULL, field_id TEXT NOT NULL, \
            field_name TEXT NOT NULL, kind TEXT NOT NULL, value TEXT NOT NULL, updated INTEGER NOT NULL); \
            CREATE INDEX field_values_path ON field_values (path); \
            CREATE INDEX field_values_kind ON field_values (kind);",
        kind: MigrationType::ReversibleUp,
    }]);
    let migrator = Migrator::new(migrations).await?;
    migrator.run(&pool).await?;

    let count_res = sqlx::query("SELECT COUNT(*) as vcount FROM field_values;")
        .fetch_one(&pool)
        .await?;
    tracing::info!(
        "DB Connection initialized. Cached field values: {:?}",
        count_res.get::<u32, usize>(0)
    );

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_sqlite_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join(FIELD_VALUE_DB)).await.unwrap();
        let record = FieldValueRecord::new("a.md", "f1", "team", FieldKind::Lookup, json!(["[[b]]"]));
        store.put(record.clone()).await.unwrap();
        store
            .put(FieldValueRecord::new("b.md", "f2", "data", FieldKind::Json, json!({"k": 1})))
            .await
            .unwrap();

        assert_eq!(store.get(&record.id).await.unwrap(), Some(record.clone()));
        assert_eq!(store.get_all_by_path("a.md").await.unwrap(), vec![record.clone()]);
        let json_kind = store.get_all_by_kind(FieldKind::Json).await.unwrap();
        assert_eq!(json_kind.len(), 1);
        assert_eq!(json_kind[0].value, json!({"k": 1}));

        store.delete(&record.id).await.unwrap();
        assert_eq!(store.get_all().await.unwrap().len(), 1);

        // Reopening sees the persisted rows and skips the applied migration
        drop(store);
        let reopened = SqliteStore::open(dir.path().join(FIELD_VALUE_DB)).await.unwrap();
        assert_eq!(reopened.get_all().await.unwrap().len(), 1);
    }
}

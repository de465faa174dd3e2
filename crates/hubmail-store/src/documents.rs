use async_trait::async_trait;
use chrono::Utc;
use hubmail_shared::protocol::ChangeEvent;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;

use crate::database::SqliteStore;
use crate::error::{Result, StoreError};
use crate::feed::{self, ChangeStream, FeedItem};
use crate::models::{is_identifier, CollectionConfig, DatabaseInfo};
use crate::query::Query;
use crate::store::DocumentStore;

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn new_db(
        &self,
        id: &str,
        name: &str,
        owner: &str,
        collections: &[CollectionConfig],
    ) -> Result<DatabaseInfo> {
        for config in collections {
            validate_collection(config)?;
        }

        let info = DatabaseInfo {
            id: id.to_string(),
            name: name.to_string(),
            owner: owner.to_string(),
            created_at: Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        };
        let collections = collections.to_vec();

        let created = info.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO databases (id, name, owner, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![created.id, created.name, created.owner, created.created_at],
            )?;
            for config in &collections {
                tx.execute(
                    "INSERT INTO collections (db_id, name, indexes) VALUES (?1, ?2, ?3)",
                    params![created.id, config.name, serde_json::to_string(&config.indexes)?],
                )?;
                for field in &config.indexes {
                    tx.execute_batch(&format!(
                        "CREATE INDEX IF NOT EXISTS idx_instances_{field} \
                         ON instances (db_id, collection, json_extract(data, '$.{field}'))"
                    ))?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await?;

        tracing::debug!(db = %info.id, name = %info.name, owner = %info.owner, "database created");
        Ok(info)
    }

    async fn get_db(&self, id: &str) -> Result<DatabaseInfo> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            query_db(
                conn,
                "SELECT id, name, owner, created_at FROM databases WHERE id = ?1",
                params![id],
            )
        })
        .await
    }

    async fn find_db(&self, name: &str, owner: &str) -> Result<DatabaseInfo> {
        let (name, owner) = (name.to_string(), owner.to_string());
        self.with_conn(move |conn| {
            query_db(
                conn,
                "SELECT id, name, owner, created_at FROM databases WHERE name = ?1 AND owner = ?2",
                params![name, owner],
            )
        })
        .await
    }

    async fn create(&self, db: &str, collection: &str, instance: &Value) -> Result<String> {
        let id = instance_id(instance)?;
        let data = serde_json::to_string(instance)?;

        let (db_id, coll, key) = (db.to_string(), collection.to_string(), id.clone());
        self.with_conn(move |conn| {
            ensure_collection(conn, &db_id, &coll)?;
            conn.execute(
                "INSERT INTO instances (db_id, collection, id, data) VALUES (?1, ?2, ?3, ?4)",
                params![db_id, coll, key, data],
            )?;
            Ok(())
        })
        .await?;

        self.publish(
            db,
            collection,
            ChangeEvent::Create {
                instance_id: id.clone(),
                instance: instance.clone(),
            },
        );
        Ok(id)
    }

    async fn save(&self, db: &str, collection: &str, instance: &Value) -> Result<()> {
        let id = instance_id(instance)?;
        let data = serde_json::to_string(instance)?;

        let (db_id, coll, key) = (db.to_string(), collection.to_string(), id.clone());
        self.with_conn(move |conn| {
            let affected = conn.execute(
                "UPDATE instances SET data = ?4 WHERE db_id = ?1 AND collection = ?2 AND id = ?3",
                params![db_id, coll, key, data],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await?;

        self.publish(
            db,
            collection,
            ChangeEvent::Save {
                instance_id: id,
                instance: instance.clone(),
            },
        );
        Ok(())
    }

    async fn get(&self, db: &str, collection: &str, id: &str) -> Result<Value> {
        let (db_id, coll, key) = (db.to_string(), collection.to_string(), id.to_string());
        let data: String = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT data FROM instances WHERE db_id = ?1 AND collection = ?2 AND id = ?3",
                    params![db_id, coll, key],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or(StoreError::NotFound)
            })
            .await?;
        Ok(serde_json::from_str(&data)?)
    }

    async fn delete(&self, db: &str, collection: &str, id: &str) -> Result<()> {
        let (db_id, coll, key) = (db.to_string(), collection.to_string(), id.to_string());
        self.with_conn(move |conn| {
            let affected = conn.execute(
                "DELETE FROM instances WHERE db_id = ?1 AND collection = ?2 AND id = ?3",
                params![db_id, coll, key],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await?;

        self.publish(
            db,
            collection,
            ChangeEvent::Delete {
                instance_id: id.to_string(),
            },
        );
        Ok(())
    }

    async fn list(&self, db: &str, collection: &str, query: &Query) -> Result<Vec<Value>> {
        let (tail, mut tail_params) = query.to_sql()?;
        let sql = format!("SELECT data FROM instances WHERE db_id = ?1 AND collection = ?2{tail}");

        let mut values = vec![
            rusqlite::types::Value::Text(db.to_string()),
            rusqlite::types::Value::Text(collection.to_string()),
        ];
        values.append(&mut tail_params);

        let (db_id, coll) = (db.to_string(), collection.to_string());
        let rows: Vec<String> = self
            .with_conn(move |conn| {
                ensure_collection(conn, &db_id, &coll)?;
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(values), |row| row.get(0))?;

                let mut data = Vec::new();
                for row in rows {
                    data.push(row?);
                }
                Ok(data)
            })
            .await?;

        rows.iter()
            .map(|data| serde_json::from_str(data).map_err(StoreError::from))
            .collect()
    }

    fn listen(&self, db: &str, collection: &str) -> ChangeStream {
        feed::subscribe(self.feed.subscribe(), db.to_string(), collection.to_string())
    }
}

impl SqliteStore {
    fn publish(&self, db: &str, collection: &str, event: ChangeEvent) {
        tracing::trace!(%db, %collection, id = %event.instance_id(), "change");
        // No receivers is not an error.
        let _ = self.feed.send(FeedItem {
            db_id: db.to_string(),
            collection: collection.to_string(),
            event,
        });
    }
}

fn validate_collection(config: &CollectionConfig) -> Result<()> {
    if !is_identifier(&config.name) {
        return Err(StoreError::InvalidArgument(format!(
            "invalid collection name: {}",
            config.name
        )));
    }
    if let Some(bad) = config.indexes.iter().find(|f| !is_identifier(f)) {
        return Err(StoreError::InvalidArgument(format!("invalid index field: {bad}")));
    }
    Ok(())
}

fn instance_id(instance: &Value) -> Result<String> {
    instance
        .get("_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StoreError::Serialization("instance has no string _id".into()))
}

fn ensure_collection(conn: &Connection, db_id: &str, collection: &str) -> Result<()> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM collections WHERE db_id = ?1 AND name = ?2",
            params![db_id, collection],
            |row| row.get(0),
        )
        .optional()?;
    match exists {
        Some(_) => Ok(()),
        None => Err(StoreError::CollectionNotFound(collection.to_string())),
    }
}

fn query_db<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<DatabaseInfo> {
    conn.query_row(sql, params, |row| {
        Ok(DatabaseInfo {
            id: row.get(0)?,
            name: row.get(1)?,
            owner: row.get(2)?,
            created_at: row.get(3)?,
        })
    })
    .optional()?
    .ok_or(StoreError::DatabaseNotFound)
}

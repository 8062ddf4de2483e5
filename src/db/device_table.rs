use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::SqlitePool;

use super::{validate_table_name, DbError};

/// Partition key attribute of the device table
pub const KEY_ATTRIBUTE: &str = "deviceId";

/// A stored record: a schemaless JSON object keyed by attribute name
pub type Item = Map<String, Value>;

/// One page of a table scan
#[derive(Debug, Default)]
pub struct ScanPage {
    pub items: Vec<Item>,
    /// Key of the last returned item, present only when more items remain
    pub last_evaluated_key: Option<String>,
}

/// Key-value table holding device items
#[async_trait]
pub trait DeviceTable: Send + Sync {
    /// Insert or replace an item, keyed by its `deviceId` attribute
    async fn put(&self, item: &Item) -> Result<(), DbError>;

    /// Get an item by key
    async fn get(&self, device_id: &str) -> Result<Option<Item>, DbError>;

    /// Delete an item by key, returning the old item if there was one
    async fn delete(&self, device_id: &str) -> Result<Option<Item>, DbError>;

    /// Scan items in key order, starting after `exclusive_start_key`
    async fn scan(
        &self,
        limit: u32,
        exclusive_start_key: Option<&str>,
    ) -> Result<ScanPage, DbError>;

    /// Set the given attributes on an item and return the new item.
    ///
    /// A missing item is created from its key unless `require_existing` is
    /// set, in which case nothing is written and `None` is returned.
    async fn update(
        &self,
        device_id: &str,
        fields: &[(String, Value)],
        require_existing: bool,
    ) -> Result<Option<Item>, DbError>;

    /// Number of stored items
    async fn count(&self) -> Result<usize, DbError>;
}

/// SQLite implementation of DeviceTable
pub struct SqliteDeviceTable {
    pool: SqlitePool,
    table_name: String,
}

impl SqliteDeviceTable {
    pub fn new(pool: SqlitePool, table_name: impl Into<String>) -> Result<Self, DbError> {
        let table_name = table_name.into();
        validate_table_name(&table_name)?;
        Ok(Self { pool, table_name })
    }

    fn parse_item(device_id: &str, raw: &str) -> Result<Item, DbError> {
        match serde_json::from_str::<Value>(raw)? {
            Value::Object(item) => Ok(item),
            _ => Err(DbError::CorruptItem(device_id.to_string())),
        }
    }

    fn key_of(item: &Item) -> Result<&str, DbError> {
        item.get(KEY_ATTRIBUTE)
            .and_then(Value::as_str)
            .ok_or(DbError::MissingKey)
    }

    fn upsert_sql(&self) -> String {
        format!(
            "INSERT INTO \"{}\" (device_id, item) VALUES (?, ?)
             ON CONFLICT(device_id) DO UPDATE SET item = excluded.item",
            self.table_name
        )
    }
}

/// Internal row structure for SQLite queries
#[derive(sqlx::FromRow)]
struct ItemRow {
    device_id: String,
    item: String,
}

#[async_trait]
impl DeviceTable for SqliteDeviceTable {
    async fn put(&self, item: &Item) -> Result<(), DbError> {
        let device_id = Self::key_of(item)?;
        let raw = serde_json::to_string(item)?;

        sqlx::query(&self.upsert_sql())
            .bind(device_id)
            .bind(&raw)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get(&self, device_id: &str) -> Result<Option<Item>, DbError> {
        let sql = format!(
            "SELECT device_id, item FROM \"{}\" WHERE device_id = ?",
            self.table_name
        );
        let row: Option<ItemRow> = sqlx::query_as(&sql)
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| Self::parse_item(&r.device_id, &r.item))
            .transpose()
    }

    async fn delete(&self, device_id: &str) -> Result<Option<Item>, DbError> {
        let sql = format!(
            "DELETE FROM \"{}\" WHERE device_id = ? RETURNING device_id, item",
            self.table_name
        );
        let row: Option<ItemRow> = sqlx::query_as(&sql)
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| Self::parse_item(&r.device_id, &r.item))
            .transpose()
    }

    async fn scan(
        &self,
        limit: u32,
        exclusive_start_key: Option<&str>,
    ) -> Result<ScanPage, DbError> {
        let sql = format!(
            "SELECT device_id, item FROM \"{}\"
             WHERE (?1 IS NULL OR device_id > ?1)
             ORDER BY device_id
             LIMIT ?2",
            self.table_name
        );
        // One extra row tells us whether another page exists
        let mut rows: Vec<ItemRow> = sqlx::query_as(&sql)
            .bind(exclusive_start_key)
            .bind(i64::from(limit) + 1)
            .fetch_all(&self.pool)
            .await?;

        let has_more = rows.len() > limit as usize;
        rows.truncate(limit as usize);

        let last_evaluated_key = if has_more {
            rows.last().map(|r| r.device_id.clone())
        } else {
            None
        };

        let items = rows
            .iter()
            .map(|r| Self::parse_item(&r.device_id, &r.item))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ScanPage {
            items,
            last_evaluated_key,
        })
    }

    async fn update(
        &self,
        device_id: &str,
        fields: &[(String, Value)],
        require_existing: bool,
    ) -> Result<Option<Item>, DbError> {
        let select = format!(
            "SELECT device_id, item FROM \"{}\" WHERE device_id = ?",
            self.table_name
        );

        // Take the write lock up front so concurrent updates queue on the busy
        // timeout instead of failing to upgrade a read lock
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let existing: Option<ItemRow> = sqlx::query_as(&select)
            .bind(device_id)
            .fetch_optional(&mut *tx)
            .await?;

        let mut item = match existing {
            Some(row) => Self::parse_item(&row.device_id, &row.item)?,
            None if require_existing => return Ok(None),
            None => {
                let mut item = Item::new();
                item.insert(
                    KEY_ATTRIBUTE.to_string(),
                    Value::String(device_id.to_string()),
                );
                item
            }
        };

        for (name, value) in fields {
            if name == KEY_ATTRIBUTE {
                continue;
            }
            item.insert(name.clone(), value.clone());
        }

        let raw = serde_json::to_string(&item)?;
        sqlx::query(&self.upsert_sql())
            .bind(device_id)
            .bind(&raw)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(item))
    }

    async fn count(&self) -> Result<usize, DbError> {
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", self.table_name);
        let row: (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;

        Ok(row.0 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations, DbConfig};
    use serde_json::json;

    const TABLE: &str = "SmartHomeDevices";

    async fn setup_test_table() -> SqliteDeviceTable {
        let config = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        };
        let pool = create_pool(&config).await.unwrap();
        run_migrations(&pool, TABLE).await.unwrap();
        SqliteDeviceTable::new(pool, TABLE).unwrap()
    }

    fn create_test_item(device_id: &str) -> Item {
        let value = json!({
            "deviceId": device_id,
            "name": "Test Device",
            "type": "light",
            "status": "off",
            "properties": { "brightness": 80 },
        });
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let table = setup_test_table().await;
        let item = create_test_item("lamp-1");

        table.put(&item).await.unwrap();

        let retrieved = table.get("lamp-1").await.unwrap();
        assert_eq!(retrieved, Some(item));
        assert!(table.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_existing_key() {
        let table = setup_test_table().await;
        table.put(&create_test_item("lamp-1")).await.unwrap();

        let mut replacement = create_test_item("lamp-1");
        replacement.insert("status".to_string(), json!("on"));
        replacement.remove("properties");
        table.put(&replacement).await.unwrap();

        let retrieved = table.get("lamp-1").await.unwrap().unwrap();
        assert_eq!(retrieved["status"], "on");
        assert!(!retrieved.contains_key("properties"));
        assert_eq!(table.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_put_requires_key() {
        let table = setup_test_table().await;
        let mut item = create_test_item("lamp-1");
        item.remove(KEY_ATTRIBUTE);

        let result = table.put(&item).await;
        assert!(matches!(result, Err(DbError::MissingKey)));
    }

    #[tokio::test]
    async fn test_delete_returns_old_item() {
        let table = setup_test_table().await;
        let item = create_test_item("lamp-1");
        table.put(&item).await.unwrap();

        let removed = table.delete("lamp-1").await.unwrap();
        assert_eq!(removed, Some(item));
        assert!(table.get("lamp-1").await.unwrap().is_none());

        let removed_again = table.delete("lamp-1").await.unwrap();
        assert!(removed_again.is_none());
    }

    #[tokio::test]
    async fn test_scan_paginates_in_key_order() {
        let table = setup_test_table().await;
        for id in ["e", "c", "a", "d", "b"] {
            table.put(&create_test_item(id)).await.unwrap();
        }

        let first = table.scan(2, None).await.unwrap();
        let ids: Vec<&str> = first
            .items
            .iter()
            .map(|i| i[KEY_ATTRIBUTE].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(first.last_evaluated_key.as_deref(), Some("b"));

        let rest = table.scan(100, Some("b")).await.unwrap();
        assert_eq!(rest.items.len(), 3);
        assert!(rest.last_evaluated_key.is_none());
    }

    #[tokio::test]
    async fn test_scan_exact_page_has_no_cursor() {
        let table = setup_test_table().await;
        table.put(&create_test_item("a")).await.unwrap();
        table.put(&create_test_item("b")).await.unwrap();

        let page = table.scan(2, None).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.last_evaluated_key.is_none());
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let table = setup_test_table().await;
        table.put(&create_test_item("lamp-1")).await.unwrap();

        let fields = vec![
            ("status".to_string(), json!("on")),
            ("location".to_string(), json!("Kitchen")),
            (KEY_ATTRIBUTE.to_string(), json!("hijacked")),
        ];
        let updated = table.update("lamp-1", &fields, false).await.unwrap().unwrap();

        assert_eq!(updated["deviceId"], "lamp-1");
        assert_eq!(updated["status"], "on");
        assert_eq!(updated["location"], "Kitchen");
        assert_eq!(updated["name"], "Test Device");
        assert_eq!(table.get("lamp-1").await.unwrap(), Some(updated));
        assert!(table.get("hijacked").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_creates_missing_item() {
        let table = setup_test_table().await;
        let fields = vec![("status".to_string(), json!("on"))];

        let created = table.update("ghost", &fields, false).await.unwrap().unwrap();
        assert_eq!(created["deviceId"], "ghost");
        assert_eq!(created["status"], "on");
        assert_eq!(table.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_require_existing() {
        let table = setup_test_table().await;
        let fields = vec![("status".to_string(), json!("on"))];

        let result = table.update("ghost", &fields, true).await.unwrap();
        assert!(result.is_none());
        assert_eq!(table.count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_on_file_database() {
        let dir = std::env::temp_dir().join(format!("homedevices-{}", uuid::Uuid::new_v4()));
        let config = DbConfig {
            url: format!("sqlite:{}", dir.join("devices.db").display()),
            ..Default::default()
        };
        let pool = create_pool(&config).await.unwrap();
        run_migrations(&pool, TABLE).await.unwrap();
        let table = std::sync::Arc::new(SqliteDeviceTable::new(pool.clone(), TABLE).unwrap());
        table.put(&create_test_item("lamp")).await.unwrap();

        let tasks: Vec<_> = (0..40)
            .map(|i| {
                let table = table.clone();
                tokio::spawn(async move {
                    let fields = vec![
                        ("status".to_string(), json!(format!("s{i}"))),
                        (format!("field{i}"), json!(i)),
                    ];
                    table.update("lamp", &fields, false).await
                })
            })
            .collect();

        for task in tasks {
            let updated = task.await.unwrap().unwrap();
            assert!(updated.is_some());
        }

        // Every merge saw the previous write, so no field was lost
        let item = table.get("lamp").await.unwrap().unwrap();
        for i in 0..40 {
            assert_eq!(item[&format!("field{i}")], json!(i));
        }
        assert!(item["status"].as_str().unwrap().starts_with('s'));

        pool.close().await;
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_table_name() {
        let config = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        };
        let pool = create_pool(&config).await.unwrap();
        assert!(SqliteDeviceTable::new(pool, "bad name").is_err());
    }
}

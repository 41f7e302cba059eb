// ==========================================
// 批量表格数据导入引擎 - SQLite 记录存储
// ==========================================
// 表结构: 通用 record_store 表（记录类型 + 序列化唯一键 + 字段 JSON）
// 事务: SAVEPOINT import_run，一次导入运行一个
// ==========================================

use crate::domain::types::RecordId;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::store::{
    serialize_unique_key, FieldMap, RecordStoreAdapter, UniqueKey,
};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

const SAVEPOINT_NAME: &str = "import_run";

pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
    // 提交后钩子（缓存失效等下游信号，由存储自行触发）
    post_commit_hooks: Mutex<Vec<Box<dyn Fn(&RecordId) + Send + Sync>>>,
    // 保存点内被写入的记录
    touched: Mutex<Vec<RecordId>>,
}

impl SqliteRecordStore {
    /// 创建存储并确保表结构存在
    pub fn new(conn: Arc<Mutex<Connection>>) -> ImportResult<Self> {
        let store = Self {
            conn,
            post_commit_hooks: Mutex::new(Vec::new()),
            touched: Mutex::new(Vec::new()),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn add_post_commit_hook<F>(&self, hook: F)
    where
        F: Fn(&RecordId) + Send + Sync + 'static,
    {
        self.post_commit_hooks
            .lock()
            .expect("钩子锁中毒")
            .push(Box::new(hook));
    }

    fn lock_conn(&self) -> ImportResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ImportError::StoreError(format!("数据库锁获取失败: {}", e)))
    }

    fn ensure_schema(&self) -> ImportResult<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS record_store (
                record_id   TEXT PRIMARY KEY,
                record_type TEXT NOT NULL,
                unique_key  TEXT,
                fields_json TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_record_store_key
                ON record_store(record_type, unique_key)
                WHERE unique_key IS NOT NULL;
            "#,
        )?;
        debug!("记录存储表结构就绪");
        Ok(())
    }

    fn mark_touched(&self, id: &RecordId) -> ImportResult<()> {
        self.touched
            .lock()
            .map_err(|e| ImportError::StoreError(format!("锁获取失败: {}", e)))?
            .push(id.clone());
        Ok(())
    }
}

#[async_trait]
impl RecordStoreAdapter for SqliteRecordStore {
    async fn lookup(
        &self,
        record_type: &str,
        key: &UniqueKey,
    ) -> ImportResult<Option<RecordId>> {
        let serialized = match serialize_unique_key(key) {
            Some(s) => s,
            None => return Ok(None),
        };

        let conn = self.lock_conn()?;
        let id: Option<String> = conn
            .query_row(
                "SELECT record_id FROM record_store WHERE record_type = ?1 AND unique_key = ?2",
                params![record_type, serialized],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(RecordId))
    }

    async fn create(
        &self,
        record_type: &str,
        key: &UniqueKey,
        fields: &FieldMap,
    ) -> ImportResult<RecordId> {
        let id = RecordId(uuid::Uuid::new_v4().to_string());
        let fields_json = serde_json::to_string(fields)?;
        let now = Utc::now();

        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            INSERT INTO record_store
                (record_id, record_type, unique_key, fields_json, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                id.0,
                record_type,
                serialize_unique_key(key),
                fields_json,
                now,
                now,
            ],
        )?;
        drop(conn);

        self.mark_touched(&id)?;
        Ok(id)
    }

    async fn update(
        &self,
        record_type: &str,
        id: &RecordId,
        fields: &FieldMap,
    ) -> ImportResult<RecordId> {
        let conn = self.lock_conn()?;

        let existing_json: String = conn
            .query_row(
                "SELECT fields_json FROM record_store WHERE record_id = ?1 AND record_type = ?2",
                params![id.0, record_type],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| {
                ImportError::StoreError(format!("记录不存在: {} ({})", id, record_type))
            })?;

        // 字段级合并：仅覆盖提供的字段
        let mut merged: FieldMap = serde_json::from_str(&existing_json)?;
        for (name, value) in fields {
            merged.insert(name.clone(), value.clone());
        }

        conn.execute(
            "UPDATE record_store SET fields_json = ?1, updated_at = ?2 WHERE record_id = ?3",
            params![serde_json::to_string(&merged)?, Utc::now(), id.0],
        )?;
        drop(conn);

        self.mark_touched(id)?;
        Ok(id.clone())
    }

    async fn count(&self, record_type: &str) -> ImportResult<usize> {
        let conn = self.lock_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM record_store WHERE record_type = ?1",
            params![record_type],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    async fn dump_all(&self, record_type: &str) -> ImportResult<String> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT record_id, unique_key, fields_json FROM record_store \
             WHERE record_type = ?1 ORDER BY record_id",
        )?;
        let rows = stmt
            .query_map(params![record_type], |row| {
                let record_id: String = row.get(0)?;
                let unique_key: Option<String> = row.get(1)?;
                let fields_json: String = row.get(2)?;
                Ok((record_id, unique_key, fields_json))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let records = rows
            .into_iter()
            .map(|(record_id, unique_key, fields_json)| {
                Ok(serde_json::json!({
                    "record_id": record_id,
                    "unique_key": unique_key,
                    "fields": serde_json::from_str::<serde_json::Value>(&fields_json)?,
                }))
            })
            .collect::<ImportResult<Vec<_>>>()?;
        Ok(serde_json::to_string(&records)?)
    }

    async fn begin_savepoint(&self) -> ImportResult<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(&format!("SAVEPOINT {};", SAVEPOINT_NAME))
            .map_err(|e| ImportError::StoreTransactionError(e.to_string()))?;
        drop(conn);
        self.touched
            .lock()
            .map_err(|e| ImportError::StoreError(format!("锁获取失败: {}", e)))?
            .clear();
        Ok(())
    }

    async fn commit_savepoint(&self) -> ImportResult<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(&format!("RELEASE SAVEPOINT {};", SAVEPOINT_NAME))
            .map_err(|e| ImportError::StoreTransactionError(e.to_string()))?;
        drop(conn);

        let touched = std::mem::take(
            &mut *self
                .touched
                .lock()
                .map_err(|e| ImportError::StoreError(format!("锁获取失败: {}", e)))?,
        );
        let hooks = self
            .post_commit_hooks
            .lock()
            .map_err(|e| ImportError::StoreError(format!("锁获取失败: {}", e)))?;
        for id in &touched {
            for hook in hooks.iter() {
                hook(id);
            }
        }
        Ok(())
    }

    async fn rollback_savepoint(&self) -> ImportResult<()> {
        let conn = self.lock_conn()?;
        // 回滚后仍需 RELEASE 以结束保存点作用域
        conn.execute_batch(&format!(
            "ROLLBACK TO SAVEPOINT {0}; RELEASE SAVEPOINT {0};",
            SAVEPOINT_NAME
        ))
        .map_err(|e| ImportError::StoreTransactionError(e.to_string()))?;
        drop(conn);
        self.touched
            .lock()
            .map_err(|e| ImportError::StoreError(format!("锁获取失败: {}", e)))?
            .clear();
        Ok(())
    }
}

// ==========================================
// 批量表格数据导入引擎 - 配置管理器
// ==========================================
// 存储: SQLite config_kv 表（全局作用域键值对）
// 读取策略: 缺失或解析失败回退默认值并记 warn，不向引擎抛错
// ==========================================

use crate::config::import_config_trait::{
    ImportConfigReader, DEFAULT_BACKUP_BEFORE_IMPORT, DEFAULT_CHUNK_SIZE,
    DEFAULT_ERROR_RATE_THRESHOLD_PCT, DEFAULT_MAX_ERROR_SAMPLES, DEFAULT_TOP_ERROR_COUNT,
    DEFAULT_UPDATE_EXISTING,
};
use crate::repository::error::{RepoResult, RepositoryError};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

const GLOBAL_SCOPE: &str = "global";

// ===== 配置键 =====
pub const KEY_CHUNK_SIZE: &str = "import.chunk_size";
pub const KEY_ERROR_RATE_THRESHOLD: &str = "import.error_rate_threshold_pct";
pub const KEY_BACKUP_BEFORE_IMPORT: &str = "import.backup_before_import";
pub const KEY_UPDATE_EXISTING: &str = "import.update_existing";
pub const KEY_TOP_ERROR_COUNT: &str = "import.top_error_count";
pub const KEY_MAX_ERROR_SAMPLES: &str = "import.max_error_samples";

pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    pub fn new(conn: Arc<Mutex<Connection>>) -> RepoResult<Self> {
        let manager = Self { conn };
        manager.ensure_schema()?;
        Ok(manager)
    }

    fn lock_conn(&self) -> RepoResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn ensure_schema(&self) -> RepoResult<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS config_kv (
                scope TEXT NOT NULL,
                key   TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (scope, key)
            );
            "#,
        )?;
        Ok(())
    }

    /// 读取原始配置值
    pub fn get_string(&self, key: &str) -> RepoResult<Option<String>> {
        let conn = self.lock_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope = ?1 AND key = ?2",
                params![GLOBAL_SCOPE, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入配置值（upsert）
    pub fn set_string(&self, key: &str, value: &str) -> RepoResult<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO config_kv (scope, key, value) VALUES (?1, ?2, ?3)",
            params![GLOBAL_SCOPE, key, value],
        )?;
        Ok(())
    }

    /// 读取并解析，缺失/失败回退默认值
    fn get_or_default<T: FromStr + Copy>(&self, key: &str, default: T) -> T {
        match self.get_string(key) {
            Ok(Some(raw)) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("配置 {} 解析失败（值: {}），使用默认值", key, raw);
                default
            }),
            Ok(None) => default,
            Err(e) => {
                warn!("配置 {} 读取失败: {}，使用默认值", key, e);
                default
            }
        }
    }
}

#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn import_chunk_size(&self) -> usize {
        // 块大小至少为 1
        self.get_or_default(KEY_CHUNK_SIZE, DEFAULT_CHUNK_SIZE).max(1)
    }

    async fn error_rate_threshold_pct(&self) -> f64 {
        self.get_or_default(KEY_ERROR_RATE_THRESHOLD, DEFAULT_ERROR_RATE_THRESHOLD_PCT)
    }

    async fn backup_before_import(&self) -> bool {
        self.get_or_default(KEY_BACKUP_BEFORE_IMPORT, DEFAULT_BACKUP_BEFORE_IMPORT)
    }

    async fn update_existing(&self) -> bool {
        self.get_or_default(KEY_UPDATE_EXISTING, DEFAULT_UPDATE_EXISTING)
    }

    async fn top_error_count(&self) -> usize {
        self.get_or_default(KEY_TOP_ERROR_COUNT, DEFAULT_TOP_ERROR_COUNT)
    }

    async fn max_error_samples(&self) -> usize {
        self.get_or_default(KEY_MAX_ERROR_SAMPLES, DEFAULT_MAX_ERROR_SAMPLES)
    }
}

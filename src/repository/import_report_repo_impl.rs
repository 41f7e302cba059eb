// ==========================================
// 批量表格数据导入引擎 - 导入报告仓储 SQLite 实现
// ==========================================
// 存储: rusqlite + Arc<Mutex<Connection>>
// 结构化字段（字段统计/错误直方图/明细 JSON 列）以 serde_json 序列化存储
// ==========================================

use crate::domain::import_task::{
    BackupSnapshot, ImportRowDetail, ImportSummary, ImportTask,
};
use crate::domain::types::{RowStatus, TaskStatus};
use crate::repository::error::{RepoResult, RepositoryError};
use crate::repository::import_report_repo::ImportReportRepo;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

pub struct SqliteReportRepo {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteReportRepo {
    /// 创建仓储并确保表结构存在
    pub fn new(conn: Arc<Mutex<Connection>>) -> RepoResult<Self> {
        let repo = Self { conn };
        repo.ensure_schema()?;
        Ok(repo)
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
            CREATE TABLE IF NOT EXISTS import_tasks (
                task_id        TEXT PRIMARY KEY,
                record_type    TEXT NOT NULL,
                status         TEXT NOT NULL,
                source_file    TEXT,
                initiated_by   TEXT,
                total_rows     INTEGER NOT NULL DEFAULT 0,
                processed_rows INTEGER NOT NULL DEFAULT 0,
                created_at     TEXT NOT NULL,
                started_at     TEXT,
                completed_at   TEXT
            );

            CREATE TABLE IF NOT EXISTS import_summaries (
                task_id          TEXT PRIMARY KEY
                                 REFERENCES import_tasks(task_id) ON DELETE CASCADE,
                total_rows       INTEGER NOT NULL,
                success_rows     INTEGER NOT NULL,
                failed_rows      INTEGER NOT NULL,
                skipped_rows     INTEGER NOT NULL,
                partial_rows     INTEGER NOT NULL,
                created_count    INTEGER NOT NULL,
                updated_count    INTEGER NOT NULL,
                field_stats_json TEXT NOT NULL,
                top_errors_json  TEXT NOT NULL,
                duration_ms      INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS import_row_details (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id             TEXT NOT NULL
                                    REFERENCES import_tasks(task_id) ON DELETE CASCADE,
                row_number          INTEGER NOT NULL,
                row_data_json       TEXT NOT NULL,
                status              TEXT NOT NULL,
                fields_updated_json TEXT NOT NULL,
                fields_failed_json  TEXT NOT NULL,
                error_message       TEXT,
                side_effects_json   TEXT NOT NULL,
                created_at          TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_row_details_task
                ON import_row_details(task_id, row_number);

            CREATE TABLE IF NOT EXISTS import_backups (
                backup_id    TEXT PRIMARY KEY,
                record_type  TEXT NOT NULL,
                taken_at     TEXT NOT NULL,
                record_count INTEGER NOT NULL,
                payload_json TEXT NOT NULL
            );
            "#,
        )?;
        debug!("导入报告表结构就绪");
        Ok(())
    }

    fn map_task(row: &Row<'_>) -> rusqlite::Result<ImportTask> {
        let status: String = row.get("status")?;
        Ok(ImportTask {
            task_id: row.get("task_id")?,
            record_type: row.get("record_type")?,
            status: TaskStatus::parse(&status),
            source_file: row.get("source_file")?,
            initiated_by: row.get("initiated_by")?,
            total_rows: row.get::<_, i64>("total_rows")? as usize,
            processed_rows: row.get::<_, i64>("processed_rows")? as usize,
            created_at: row.get::<_, DateTime<Utc>>("created_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

#[async_trait]
impl ImportReportRepo for SqliteReportRepo {
    async fn save_task(&self, task: &ImportTask) -> RepoResult<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            INSERT INTO import_tasks
                (task_id, record_type, status, source_file, initiated_by,
                 total_rows, processed_rows, created_at, started_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(task_id) DO UPDATE SET
                status = excluded.status,
                total_rows = excluded.total_rows,
                processed_rows = excluded.processed_rows,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at
            "#,
            params![
                task.task_id,
                task.record_type,
                task.status.as_str(),
                task.source_file,
                task.initiated_by,
                task.total_rows as i64,
                task.processed_rows as i64,
                task.created_at,
                task.started_at,
                task.completed_at,
            ],
        )?;
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> RepoResult<Option<ImportTask>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT * FROM import_tasks WHERE task_id = ?1")?;
        let mut rows = stmt.query_map(params![task_id], Self::map_task)?;
        match rows.next() {
            Some(task) => Ok(Some(task?)),
            None => Ok(None),
        }
    }

    async fn list_recent_tasks(&self, limit: usize) -> RepoResult<Vec<ImportTask>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare("SELECT * FROM import_tasks ORDER BY created_at DESC LIMIT ?1")?;
        let tasks = stmt
            .query_map(params![limit as i64], Self::map_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    async fn delete_task(&self, task_id: &str) -> RepoResult<()> {
        let conn = self.lock_conn()?;
        // 外键级联删除汇总与明细（连接已开启 foreign_keys）
        let affected = conn.execute(
            "DELETE FROM import_tasks WHERE task_id = ?1",
            params![task_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound(task_id.to_string()));
        }
        Ok(())
    }

    async fn save_summary(&self, summary: &ImportSummary) -> RepoResult<()> {
        let field_stats_json = serde_json::to_string(&summary.field_stats)?;
        let top_errors_json = serde_json::to_string(&summary.top_errors)?;
        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO import_summaries
                (task_id, total_rows, success_rows, failed_rows, skipped_rows,
                 partial_rows, created_count, updated_count,
                 field_stats_json, top_errors_json, duration_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                summary.task_id,
                summary.total_rows as i64,
                summary.success_rows as i64,
                summary.failed_rows as i64,
                summary.skipped_rows as i64,
                summary.partial_rows as i64,
                summary.created_count as i64,
                summary.updated_count as i64,
                field_stats_json,
                top_errors_json,
                summary.duration_ms,
            ],
        )?;
        Ok(())
    }

    async fn get_summary(&self, task_id: &str) -> RepoResult<Option<ImportSummary>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT * FROM import_summaries WHERE task_id = ?1")?;
        let mut rows = stmt.query_map(params![task_id], |row| {
            let field_stats_json: String = row.get("field_stats_json")?;
            let top_errors_json: String = row.get("top_errors_json")?;
            Ok((
                ImportSummary {
                    task_id: row.get("task_id")?,
                    total_rows: row.get::<_, i64>("total_rows")? as usize,
                    success_rows: row.get::<_, i64>("success_rows")? as usize,
                    failed_rows: row.get::<_, i64>("failed_rows")? as usize,
                    skipped_rows: row.get::<_, i64>("skipped_rows")? as usize,
                    partial_rows: row.get::<_, i64>("partial_rows")? as usize,
                    created_count: row.get::<_, i64>("created_count")? as usize,
                    updated_count: row.get::<_, i64>("updated_count")? as usize,
                    field_stats: Default::default(),
                    top_errors: Vec::new(),
                    duration_ms: row.get("duration_ms")?,
                },
                field_stats_json,
                top_errors_json,
            ))
        })?;

        match rows.next() {
            Some(result) => {
                let (mut summary, field_stats_json, top_errors_json) = result?;
                summary.field_stats = serde_json::from_str(&field_stats_json)?;
                summary.top_errors = serde_json::from_str(&top_errors_json)?;
                Ok(Some(summary))
            }
            None => Ok(None),
        }
    }

    async fn append_row_detail(&self, detail: &ImportRowDetail) -> RepoResult<()> {
        let row_data_json = serde_json::to_string(&detail.row_data)?;
        let fields_updated_json = serde_json::to_string(&detail.fields_updated)?;
        let fields_failed_json = serde_json::to_string(&detail.fields_failed)?;
        let side_effects_json = serde_json::to_string(&detail.side_effects)?;
        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            INSERT INTO import_row_details
                (task_id, row_number, row_data_json, status, fields_updated_json,
                 fields_failed_json, error_message, side_effects_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                detail.task_id,
                detail.row_number as i64,
                row_data_json,
                detail.status.as_str(),
                fields_updated_json,
                fields_failed_json,
                detail.error_message,
                side_effects_json,
                detail.created_at,
            ],
        )?;
        Ok(())
    }

    async fn list_row_details(&self, task_id: &str) -> RepoResult<Vec<ImportRowDetail>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM import_row_details WHERE task_id = ?1 ORDER BY row_number ASC",
        )?;
        let rows = stmt.query_map(params![task_id], |row| {
            let status: String = row.get("status")?;
            let row_data_json: String = row.get("row_data_json")?;
            let fields_updated_json: String = row.get("fields_updated_json")?;
            let fields_failed_json: String = row.get("fields_failed_json")?;
            let side_effects_json: String = row.get("side_effects_json")?;
            Ok((
                ImportRowDetail {
                    task_id: row.get("task_id")?,
                    row_number: row.get::<_, i64>("row_number")? as usize,
                    row_data: serde_json::Value::Null,
                    status: RowStatus::parse(&status),
                    fields_updated: Vec::new(),
                    fields_failed: Default::default(),
                    error_message: row.get("error_message")?,
                    side_effects: Vec::new(),
                    created_at: row.get("created_at")?,
                },
                row_data_json,
                fields_updated_json,
                fields_failed_json,
                side_effects_json,
            ))
        })?;

        let mut details = Vec::new();
        for result in rows {
            let (mut detail, row_data, fields_updated, fields_failed, side_effects) = result?;
            detail.row_data = serde_json::from_str(&row_data)?;
            detail.fields_updated = serde_json::from_str(&fields_updated)?;
            detail.fields_failed = serde_json::from_str(&fields_failed)?;
            detail.side_effects = serde_json::from_str(&side_effects)?;
            details.push(detail);
        }
        Ok(details)
    }

    async fn save_backup(&self, backup: &BackupSnapshot) -> RepoResult<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO import_backups
                (backup_id, record_type, taken_at, record_count, payload_json)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                backup.backup_id,
                backup.record_type,
                backup.taken_at,
                backup.record_count as i64,
                backup.payload_json,
            ],
        )?;
        Ok(())
    }

    async fn get_backup(&self, backup_id: &str) -> RepoResult<Option<BackupSnapshot>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT * FROM import_backups WHERE backup_id = ?1")?;
        let mut rows = stmt.query_map(params![backup_id], |row| {
            Ok(BackupSnapshot {
                backup_id: row.get("backup_id")?,
                record_type: row.get("record_type")?,
                taken_at: row.get("taken_at")?,
                record_count: row.get::<_, i64>("record_count")? as usize,
                payload_json: row.get("payload_json")?,
            })
        })?;
        match rows.next() {
            Some(backup) => Ok(Some(backup?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_repo() -> SqliteReportRepo {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        SqliteReportRepo::new(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[tokio::test]
    async fn test_task_upsert_roundtrip() {
        let repo = test_repo();
        let mut task = ImportTask::new("product", Some("a.csv"), Some("tester"));
        repo.save_task(&task).await.unwrap();

        task.status = TaskStatus::Processing;
        task.total_rows = 10;
        repo.save_task(&task).await.unwrap();

        let loaded = repo.get_task(&task.task_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Processing);
        assert_eq!(loaded.total_rows, 10);
        assert_eq!(loaded.source_file.as_deref(), Some("a.csv"));
    }

    #[tokio::test]
    async fn test_delete_task_cascades() {
        let repo = test_repo();
        let task = ImportTask::new("product", None, None);
        repo.save_task(&task).await.unwrap();
        repo.append_row_detail(&ImportRowDetail {
            task_id: task.task_id.clone(),
            row_number: 1,
            row_data: serde_json::json!({"sku": "A1"}),
            status: RowStatus::Created,
            fields_updated: vec!["sku".to_string()],
            fields_failed: Default::default(),
            error_message: None,
            side_effects: Vec::new(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        repo.delete_task(&task.task_id).await.unwrap();
        assert!(repo.get_task(&task.task_id).await.unwrap().is_none());
        assert!(repo
            .list_row_details(&task.task_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_task() {
        let repo = test_repo();
        let result = repo.delete_task("不存在").await;
        assert!(matches!(result, Err(RepositoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_summary_json_columns_roundtrip() {
        let repo = test_repo();
        let task = ImportTask::new("product", None, None);
        repo.save_task(&task).await.unwrap();

        let mut summary = ImportSummary {
            task_id: task.task_id.clone(),
            total_rows: 3,
            success_rows: 2,
            partial_rows: 1,
            ..Default::default()
        };
        summary.field_stats.insert(
            "price".to_string(),
            crate::domain::import_task::FieldStat {
                total: 3,
                success: 2,
                failed: 1,
                rate: 66.7,
            },
        );
        summary.top_errors.push(crate::domain::import_task::ErrorCount {
            message: "无法解析为小数".to_string(),
            count: 1,
        });
        repo.save_summary(&summary).await.unwrap();

        let loaded = repo.get_summary(&task.task_id).await.unwrap().unwrap();
        assert_eq!(loaded.field_stats.get("price").unwrap().success, 2);
        assert_eq!(loaded.top_errors[0].message, "无法解析为小数");
    }

    #[tokio::test]
    async fn test_backup_roundtrip() {
        let repo = test_repo();
        let backup = BackupSnapshot::new("product", 2, "[]".to_string());
        repo.save_backup(&backup).await.unwrap();
        let loaded = repo.get_backup(&backup.backup_id).await.unwrap().unwrap();
        assert_eq!(loaded.record_count, 2);
        assert_eq!(loaded.payload_json, "[]");
    }
}

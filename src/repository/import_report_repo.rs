// ==========================================
// 批量表格数据导入引擎 - 导入报告仓储接口
// ==========================================
// 职责: 导入任务 / 汇总 / 行明细 / 备份快照的持久化契约
// 约定: save_task 为 upsert 语义；明细追加只写；删除任务级联清理
// ==========================================

use crate::domain::import_task::{BackupSnapshot, ImportRowDetail, ImportSummary, ImportTask};
use crate::repository::error::RepoResult;
use async_trait::async_trait;

#[async_trait]
pub trait ImportReportRepo: Send + Sync {
    // ===== 任务 =====

    /// 保存任务（存在则整体覆盖）
    async fn save_task(&self, task: &ImportTask) -> RepoResult<()>;

    /// 按 ID 读取任务
    async fn get_task(&self, task_id: &str) -> RepoResult<Option<ImportTask>>;

    /// 最近任务列表（按创建时间降序）
    async fn list_recent_tasks(&self, limit: usize) -> RepoResult<Vec<ImportTask>>;

    /// 删除任务（级联删除汇总与明细）
    async fn delete_task(&self, task_id: &str) -> RepoResult<()>;

    // ===== 汇总 =====

    async fn save_summary(&self, summary: &ImportSummary) -> RepoResult<()>;

    async fn get_summary(&self, task_id: &str) -> RepoResult<Option<ImportSummary>>;

    // ===== 行明细 =====

    /// 追加单行明细（只写不改）
    async fn append_row_detail(&self, detail: &ImportRowDetail) -> RepoResult<()>;

    /// 按行号升序读取任务全部明细
    async fn list_row_details(&self, task_id: &str) -> RepoResult<Vec<ImportRowDetail>>;

    // ===== 备份快照 =====

    async fn save_backup(&self, backup: &BackupSnapshot) -> RepoResult<()>;

    async fn get_backup(&self, backup_id: &str) -> RepoResult<Option<BackupSnapshot>>;
}

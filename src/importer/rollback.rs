// ==========================================
// 批量表格数据导入引擎 - 事务回滚包装器
// ==========================================
// 职责: 备份快照 → 保存点 → 运行导入 → 错误率阈值判定 → 提交/回滚
// 阈值语义: 错误率 = failed / total（部分成功不计入错误率）
// 红线: 回滚整次运行（无部分提交）；备份恢复是运维动作，不在此自动执行
// ==========================================

use crate::domain::import_task::{BackupSnapshot, ImportResult as AggregateResult};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::store::RecordStoreAdapter;
use crate::repository::import_report_repo::ImportReportRepo;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

pub struct TransactionalImport {
    store: Arc<dyn RecordStoreAdapter>,
    // 备份快照持久化目标（None 时备份仅存在于返回值中）
    report_repo: Option<Arc<dyn ImportReportRepo>>,
    error_rate_threshold_pct: f64,
    backup_before_import: bool,
}

impl TransactionalImport {
    pub fn new(store: Arc<dyn RecordStoreAdapter>, error_rate_threshold_pct: f64) -> Self {
        Self {
            store,
            report_repo: None,
            error_rate_threshold_pct,
            backup_before_import: true,
        }
    }

    pub fn with_report_repo(mut self, repo: Arc<dyn ImportReportRepo>) -> Self {
        self.report_repo = Some(repo);
        self
    }

    pub fn without_backup(mut self) -> Self {
        self.backup_before_import = false;
        self
    }

    /// 在事务边界内运行导入
    ///
    /// # 参数
    /// - record_type: 目标记录类型（备份范围）
    /// - import_fn: 实际导入逻辑（引擎调用）
    ///
    /// # 返回
    /// - Err(ErrorRateExceeded): 错误率超限，已回滚，restore_hint 指向备份
    pub async fn run<F, Fut>(
        &self,
        record_type: &str,
        import_fn: F,
    ) -> ImportResult<AggregateResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ImportResult<AggregateResult>>,
    {
        // ===== 步骤 1: 导入前备份 =====
        let backup_id = if self.backup_before_import {
            let payload = self.store.dump_all(record_type).await?;
            let count = self.store.count(record_type).await?;
            let backup = BackupSnapshot::new(record_type, count, payload);
            let backup_id = backup.backup_id.clone();
            if let Some(repo) = &self.report_repo {
                repo.save_backup(&backup).await?;
            }
            info!(
                "导入前备份完成: backup_id={}, 记录数={}",
                backup_id, count
            );
            Some(backup_id)
        } else {
            None
        };

        // ===== 步骤 2: 开启保存点 =====
        self.store.begin_savepoint().await?;

        // ===== 步骤 3: 运行导入 =====
        let result = match import_fn().await {
            Ok(result) => result,
            Err(e) => {
                warn!("导入中断，回滚整次运行: {}", e);
                self.store.rollback_savepoint().await?;
                return Err(e);
            }
        };

        // ===== 步骤 4: 错误率阈值判定 =====
        let error_pct = result.error_rate();
        if error_pct > self.error_rate_threshold_pct {
            warn!(
                "错误率 {:.1}% 超过阈值 {:.1}%，回滚整次运行",
                error_pct, self.error_rate_threshold_pct
            );
            self.store.rollback_savepoint().await?;
            return Err(ImportError::ErrorRateExceeded {
                error_pct,
                threshold_pct: self.error_rate_threshold_pct,
                restore_hint: backup_id,
            });
        }

        // ===== 步骤 5: 提交 =====
        self.store.commit_savepoint().await?;
        Ok(result)
    }
}

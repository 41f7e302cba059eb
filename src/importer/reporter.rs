// ==========================================
// 批量表格数据导入引擎 - 导入报告器
// ==========================================
// 职责: 任务生命周期追踪 + 行明细落库 + 汇总统计定稿
// 统计口径: 字段成功率 = success/(success+failed)，零样本为 0
//           Top-N 错误直方图按出现次数降序
// 红线: 汇总在 complete 时一次性定稿，明细追加只写
// ==========================================

use crate::domain::import_task::{ErrorCount, ImportRowDetail, ImportSummary, ImportTask};
use crate::domain::types::{RowStatus, TaskStatus};
use crate::importer::error::ImportResult;
use crate::importer::row_processor::{RowOutcome, WriteOp};
use crate::repository::import_report_repo::ImportReportRepo;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

// ==========================================
// ImportReport - 完整报告（任务 + 汇总 + 明细）
// ==========================================
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub task: ImportTask,
    pub summary: Option<ImportSummary>,
    pub details: Vec<ImportRowDetail>,
}

// ==========================================
// ImportReporter - 单次运行的报告器
// ==========================================
// 生命周期: start → report_row* → update_progress* → complete
pub struct ImportReporter {
    repo: Arc<dyn ImportReportRepo>,
    task: ImportTask,
    summary: ImportSummary,
    // 错误信息 → 出现次数（complete 时折叠为 Top-N）
    error_histogram: HashMap<String, usize>,
    top_error_count: usize,
}

impl ImportReporter {
    pub fn new(repo: Arc<dyn ImportReportRepo>, task: ImportTask, top_error_count: usize) -> Self {
        let summary = ImportSummary {
            task_id: task.task_id.clone(),
            ..Default::default()
        };
        Self {
            repo,
            task,
            summary,
            error_histogram: HashMap::new(),
            top_error_count,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task.task_id
    }

    /// 开始处理（PENDING → PROCESSING，持久化任务）
    pub async fn start(&mut self, total_rows: usize) -> ImportResult<()> {
        self.task.status = TaskStatus::Processing;
        self.task.started_at = Some(Utc::now());
        self.task.total_rows = total_rows;
        self.summary.total_rows = total_rows;
        self.repo.save_task(&self.task).await?;
        debug!("任务 {} 开始处理, 总行数 {}", self.task.task_id, total_rows);
        Ok(())
    }

    /// 录入单行结果（明细落库 + 统计增量更新）
    pub async fn report_row(&mut self, outcome: &RowOutcome) -> ImportResult<()> {
        // ===== 计数器 =====
        match outcome.status {
            RowStatus::Created | RowStatus::Updated => self.summary.success_rows += 1,
            RowStatus::Partial => self.summary.partial_rows += 1,
            RowStatus::Failed => self.summary.failed_rows += 1,
            RowStatus::Skipped => self.summary.skipped_rows += 1,
        }
        match outcome.operation {
            Some(WriteOp::Create) => self.summary.created_count += 1,
            Some(WriteOp::Update) => self.summary.updated_count += 1,
            None => {}
        }

        // ===== 字段成功率 =====
        for field in &outcome.fields_written {
            let stat = self.summary.field_stats.entry(field.clone()).or_default();
            stat.total += 1;
            stat.success += 1;
        }
        for field in outcome.fields_failed.keys() {
            let stat = self.summary.field_stats.entry(field.clone()).or_default();
            stat.total += 1;
            stat.failed += 1;
        }

        // ===== 错误直方图（按信息去重，不含行号）=====
        for message in outcome.fields_failed.values() {
            *self.error_histogram.entry(message.clone()).or_insert(0) += 1;
        }
        if let Some(message) = &outcome.error_message {
            *self.error_histogram.entry(message.clone()).or_insert(0) += 1;
        }

        // ===== 明细落库（追加只写）=====
        let detail = ImportRowDetail {
            task_id: self.task.task_id.clone(),
            row_number: outcome.row_number,
            row_data: outcome.row_data.clone(),
            status: outcome.status,
            fields_updated: outcome.fields_written.clone(),
            fields_failed: outcome.fields_failed.clone(),
            error_message: outcome.error_message.clone(),
            side_effects: outcome.side_effects.clone(),
            created_at: Utc::now(),
        };
        self.repo.append_row_detail(&detail).await?;
        Ok(())
    }

    /// 块边界进度推进（持久化 processed_rows）
    pub async fn update_progress(&mut self, processed_rows: usize) -> ImportResult<()> {
        self.task.processed_rows = processed_rows;
        self.repo.save_task(&self.task).await?;
        Ok(())
    }

    /// 定稿（计算字段成功率 / Top-N 错误 / 耗时，持久化汇总与终态）
    pub async fn complete(mut self, final_status: TaskStatus) -> ImportResult<ImportSummary> {
        let now = Utc::now();

        for stat in self.summary.field_stats.values_mut() {
            stat.compute_rate();
        }

        // Top-N 错误：次数降序，同次数按信息排序保证稳定
        let mut errors: Vec<ErrorCount> = self
            .error_histogram
            .into_iter()
            .map(|(message, count)| ErrorCount { message, count })
            .collect();
        errors.sort_by(|a, b| b.count.cmp(&a.count).then(a.message.cmp(&b.message)));
        errors.truncate(self.top_error_count);
        self.summary.top_errors = errors;

        self.summary.duration_ms = self
            .task
            .started_at
            .map(|s| (now - s).num_milliseconds())
            .unwrap_or(0);

        self.task.status = final_status;
        self.task.completed_at = Some(now);
        self.task.processed_rows = self.summary.success_rows
            + self.summary.failed_rows
            + self.summary.partial_rows
            + self.summary.skipped_rows;

        self.repo.save_summary(&self.summary).await?;
        self.repo.save_task(&self.task).await?;
        debug!(
            "任务 {} 定稿: 状态 {}, 成功 {}, 失败 {}, 部分成功 {}",
            self.task.task_id,
            final_status,
            self.summary.success_rows,
            self.summary.failed_rows,
            self.summary.partial_rows
        );
        Ok(self.summary)
    }

    /// 读取完整报告（任务 + 汇总 + 全部明细）
    pub async fn fetch_report(
        repo: &dyn ImportReportRepo,
        task_id: &str,
    ) -> ImportResult<Option<ImportReport>> {
        let task = match repo.get_task(task_id).await? {
            Some(task) => task,
            None => return Ok(None),
        };
        let summary = repo.get_summary(task_id).await?;
        let details = repo.list_row_details(task_id).await?;
        Ok(Some(ImportReport {
            task,
            summary,
            details,
        }))
    }
}

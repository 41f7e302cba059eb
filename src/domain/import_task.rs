// ==========================================
// 批量表格数据导入引擎 - 导入任务领域模型
// ==========================================
// 职责: 导入任务 / 汇总统计 / 行级明细 / 运行期聚合结果
// 所有权: ImportTask 拥有其 ImportSummary(1:1) 与明细行(1:N)，级联删除
// ==========================================

use crate::domain::types::{RecordId, RowStatus, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// ImportTask - 一次导入运行
// ==========================================
// 生命周期: 请求导入时创建，Reporter 随处理推进更新
// 红线: completed_at 写入后不再变更（仅允许后置错误转 FAILED）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportTask {
    pub task_id: String,                        // 任务 ID（UUID）
    pub record_type: String,                    // 记录类型标签（如 "product" / "order"）
    pub status: TaskStatus,                     // 生命周期状态
    pub source_file: Option<String>,            // 源文件引用
    pub initiated_by: Option<String>,           // 发起人
    pub total_rows: usize,                      // 总行数（已知时）
    pub processed_rows: usize,                  // 已处理行数（按块推进）
    pub created_at: DateTime<Utc>,              // 创建时间
    pub started_at: Option<DateTime<Utc>>,      // 开始处理时间
    pub completed_at: Option<DateTime<Utc>>,    // 完成时间
}

impl ImportTask {
    /// 创建新任务（状态 PENDING）
    pub fn new(record_type: &str, source_file: Option<&str>, initiated_by: Option<&str>) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            record_type: record_type.to_string(),
            status: TaskStatus::Pending,
            source_file: source_file.map(|s| s.to_string()),
            initiated_by: initiated_by.map(|s| s.to_string()),
            total_rows: 0,
            processed_rows: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

// ==========================================
// FieldStat - 单字段成功率统计
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldStat {
    pub total: usize,   // 该字段出现的总次数
    pub success: usize, // 校验通过次数
    pub failed: usize,  // 校验失败次数
    pub rate: f64,      // 成功率（%），completed 时一次性计算
}

impl FieldStat {
    /// 成功率 = success / (success + failed)，零样本定义为 0
    pub fn compute_rate(&mut self) {
        let denom = self.success + self.failed;
        self.rate = if denom == 0 {
            0.0
        } else {
            self.success as f64 / denom as f64 * 100.0
        };
    }
}

// ==========================================
// ErrorCount - 错误信息直方图条目
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorCount {
    pub message: String, // 去重后的错误信息
    pub count: usize,    // 出现次数
}

// ==========================================
// ImportSummary - 任务汇总统计（与 ImportTask 1:1）
// ==========================================
// 增量更新，complete_import 时一次性定稿
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportSummary {
    pub task_id: String,
    pub total_rows: usize,
    pub success_rows: usize,               // 全字段成功行数
    pub failed_rows: usize,
    pub skipped_rows: usize,
    pub partial_rows: usize,               // 部分成功行数
    pub created_count: usize,              // 新建记录数
    pub updated_count: usize,              // 更新记录数
    pub field_stats: BTreeMap<String, FieldStat>, // 字段名 → 成功率统计
    pub top_errors: Vec<ErrorCount>,       // 最高频错误（Top-N）
    pub duration_ms: i64,                  // 总处理耗时（毫秒）
}

// ==========================================
// ImportRowDetail - 单行导入明细（与 ImportTask 1:N）
// ==========================================
// 红线: 追加只写，创建后永不修改
// 排序: (task_id, row_number)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRowDetail {
    pub task_id: String,
    pub row_number: usize,                         // 数据行序号（不含表头，从 1 开始）
    pub row_data: serde_json::Value,               // 原始行数据（不透明键值映射）
    pub status: RowStatus,
    pub fields_updated: Vec<String>,               // 成功写入的字段集合
    pub fields_failed: BTreeMap<String, String>,   // 失败字段 → 错误信息
    pub error_message: Option<String>,             // 行级错误（如落库异常）
    pub side_effects: Vec<String>,                 // 依赖操作副作用（如"新建分类 X"）
    pub created_at: DateTime<Utc>,
}

// ==========================================
// ImportResult - 运行期内存聚合结果
// ==========================================
// 生命周期: 仅存在于一次 import_data 调用栈内，不跨行共享
// 不变量: total == success + failed + partial_success_rows.len()
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportResult {
    pub total: usize,                       // 已处理行数（不含 skipped）
    pub success: usize,                     // 全字段成功行数
    pub failed: usize,                      // 失败行数
    pub created_ids: Vec<RecordId>,         // 新建记录 ID 列表
    pub updated_ids: Vec<RecordId>,         // 更新记录 ID 列表
    pub partial_success_rows: Vec<usize>,   // 部分成功的行号
    pub skipped_rows: Vec<usize>,           // 跳过的行号
    pub errors: Vec<String>,                // 错误信息列表
    // 行号 → (字段 → 是否通过校验)
    pub field_level_results: BTreeMap<usize, BTreeMap<String, bool>>,
}

impl ImportResult {
    /// 全成功率（%），零行定义为 0
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.success as f64 / self.total as f64 * 100.0
        }
    }

    /// 部分成功率（%），零行定义为 0
    pub fn partial_success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.partial_success_rows.len() as f64 / self.total as f64 * 100.0
        }
    }

    /// 错误率（%）= failed / total，供回滚阈值判定
    pub fn error_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64 * 100.0
        }
    }

    /// 校验行分片不变量（调试/测试用）
    pub fn check_invariant(&self) -> bool {
        self.total == self.success + self.failed + self.partial_success_rows.len()
    }
}

// ==========================================
// BackupSnapshot - 导入前备份快照
// ==========================================
// 用途: 回滚包装器在导入前生成，阈值触发回滚时作为恢复提示
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub backup_id: String,              // 备份 ID（UUID）
    pub record_type: String,            // 目标记录类型
    pub taken_at: DateTime<Utc>,        // 快照时间
    pub record_count: usize,            // 快照记录数
    pub payload_json: String,           // 全量序列化转储
}

impl BackupSnapshot {
    pub fn new(record_type: &str, record_count: usize, payload_json: String) -> Self {
        Self {
            backup_id: uuid::Uuid::new_v4().to_string(),
            record_type: record_type.to_string(),
            taken_at: Utc::now(),
            record_count,
            payload_json,
        }
    }
}

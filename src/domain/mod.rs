// ==========================================
// 批量表格数据导入引擎 - 领域层
// ==========================================
// 职责: 实体与类型定义，不包含业务逻辑
// ==========================================

pub mod import_task;
pub mod types;

pub use import_task::{
    BackupSnapshot, ErrorCount, FieldStat, ImportResult, ImportRowDetail, ImportSummary,
    ImportTask,
};
pub use types::{CellValue, FieldValue, RecordId, RefValue, RowStatus, TaskStatus};

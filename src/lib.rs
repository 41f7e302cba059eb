// ==========================================
// 批量表格数据导入引擎
// ==========================================
// 字段级粒度的批量表格数据导入：部分成功语义、唯一键
// 新建-或-更新、错误率阈值回滚、分块进度与协作式取消
// ==========================================

pub mod config;
pub mod db;
pub mod domain;
pub mod importer;
pub mod logging;
pub mod repository;

pub use config::{ConfigManager, ImportConfigReader, StaticConfig};
pub use domain::{
    BackupSnapshot, CellValue, ErrorCount, FieldStat, FieldValue, ImportResult, ImportRowDetail,
    ImportSummary, ImportTask, RecordId, RefValue, RowStatus, TaskStatus,
};
pub use importer::{
    AsyncImportRunner, FieldMappingConfig, FieldSpec, ImportEngine, ImportError, ImportOptions,
    ImportReporter, ImportTaskHandle, ProgressEvent, ProgressSink, RecordStoreAdapter,
    TransactionalImport,
};
pub use repository::{ImportReportRepo, SqliteRecordStore, SqliteReportRepo};

/// 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用名称
pub const APP_NAME: &str = "tabular-importer";

// ==========================================
// 批量表格数据导入引擎 - 仓储模块
// ==========================================

pub mod error;
pub mod import_report_repo;
pub mod import_report_repo_impl;
pub mod record_store_sqlite;

pub use error::RepositoryError;
pub use import_report_repo::ImportReportRepo;
pub use import_report_repo_impl::SqliteReportRepo;
pub use record_store_sqlite::SqliteRecordStore;

// ==========================================
// 批量表格数据导入引擎 - 仓储层错误类型
// ==========================================

use thiserror::Error;

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("数据库错误: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("序列化错误: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("记录不存在: {0}")]
    NotFound(String),

    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    #[error("数据不一致: {0}")]
    DataInconsistency(String),
}

/// Result 类型别名
pub type RepoResult<T> = Result<T, RepositoryError>;

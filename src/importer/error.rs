// ==========================================
// 批量表格数据导入引擎 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 传播策略: 行级错误就地恢复入账，仅配置错误与聚合阈值错误向外传播
// ==========================================

use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xls/.csv）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    // ===== 配置错误（运行前致命）=====
    #[error("缺失必填列: {fields:?}（源文件中无对应列且未配置默认值）")]
    MissingRequiredColumns { fields: Vec<String> },

    #[error("字段映射配置错误 (字段 {field}): {message}")]
    MappingConfigError { field: String, message: String },

    // ===== 聚合阈值错误（运行后致命）=====
    #[error("错误率超限: {error_pct:.1}% > 阈值 {threshold_pct:.1}%")]
    ErrorRateExceeded {
        error_pct: f64,
        threshold_pct: f64,
        // 恢复提示（指向导入前备份快照的 backup_id），由回滚包装器填充
        restore_hint: Option<String>,
    },

    // ===== 存储适配器错误 =====
    #[error("记录存储操作失败: {0}")]
    StoreError(String),

    #[error("存储事务失败: {0}")]
    StoreTransactionError(String),

    // ===== 任务运行错误 =====
    #[error("任务已取消: {0}")]
    TaskCancelled(String),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::StoreError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

// 实现 From<serde_json::Error>
impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        ImportError::InternalError(format!("JSON 序列化失败: {}", err))
    }
}

// 实现 From<RepositoryError>
impl From<crate::repository::error::RepositoryError> for ImportError {
    fn from(err: crate::repository::error::RepositoryError) -> Self {
        ImportError::StoreError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;

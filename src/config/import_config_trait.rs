// ==========================================
// 批量表格数据导入引擎 - 导入配置读取接口
// ==========================================
// 约定: 读取失败/缺失一律回退默认值，配置层不向引擎抛错
// ==========================================

use async_trait::async_trait;

// ===== 默认值 =====
pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_ERROR_RATE_THRESHOLD_PCT: f64 = 10.0;
pub const DEFAULT_BACKUP_BEFORE_IMPORT: bool = true;
pub const DEFAULT_UPDATE_EXISTING: bool = true;
pub const DEFAULT_TOP_ERROR_COUNT: usize = 5;
pub const DEFAULT_MAX_ERROR_SAMPLES: usize = 100;

#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 处理块大小（行数）
    async fn import_chunk_size(&self) -> usize;

    /// 错误率回滚阈值（百分比，严格大于才触发回滚）
    async fn error_rate_threshold_pct(&self) -> f64;

    /// 导入前是否生成备份快照
    async fn backup_before_import(&self) -> bool;

    /// 唯一键命中已有记录时是否更新（关闭则跳过）
    async fn update_existing(&self) -> bool;

    /// 汇总中保留的高频错误条数
    async fn top_error_count(&self) -> usize;

    /// 聚合结果中的错误样本上限
    async fn max_error_samples(&self) -> usize;
}

// ==========================================
// StaticConfig - 静态配置（测试/程序内构造）
// ==========================================
#[derive(Debug, Clone)]
pub struct StaticConfig {
    pub chunk_size: usize,
    pub error_rate_threshold_pct: f64,
    pub backup_before_import: bool,
    pub update_existing: bool,
    pub top_error_count: usize,
    pub max_error_samples: usize,
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            error_rate_threshold_pct: DEFAULT_ERROR_RATE_THRESHOLD_PCT,
            backup_before_import: DEFAULT_BACKUP_BEFORE_IMPORT,
            update_existing: DEFAULT_UPDATE_EXISTING,
            top_error_count: DEFAULT_TOP_ERROR_COUNT,
            max_error_samples: DEFAULT_MAX_ERROR_SAMPLES,
        }
    }
}

#[async_trait]
impl ImportConfigReader for StaticConfig {
    async fn import_chunk_size(&self) -> usize {
        self.chunk_size
    }

    async fn error_rate_threshold_pct(&self) -> f64 {
        self.error_rate_threshold_pct
    }

    async fn backup_before_import(&self) -> bool {
        self.backup_before_import
    }

    async fn update_existing(&self) -> bool {
        self.update_existing
    }

    async fn top_error_count(&self) -> usize {
        self.top_error_count
    }

    async fn max_error_samples(&self) -> usize {
        self.max_error_samples
    }
}

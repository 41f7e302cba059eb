// ==========================================
// 批量表格数据导入引擎 - 配置模块
// ==========================================

pub mod config_manager;
pub mod import_config_trait;

pub use config_manager::ConfigManager;
pub use import_config_trait::{ImportConfigReader, StaticConfig};

// ==========================================
// 批量表格数据导入引擎 - 日志初始化
// ==========================================
// 工具: tracing + tracing-subscriber（env-filter）
// 过滤: RUST_LOG 环境变量优先，默认 info
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

/// 初始化全局日志订阅器
///
/// # 参数
/// - json: true 时输出结构化 JSON（服务部署），false 时人类可读格式
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}

/// 测试用初始化（重复调用安全）
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

// ==========================================
// 批量表格数据导入引擎 - 数据库连接
// ==========================================
// 约定: 单连接 + Arc<Mutex>，外键开启，忙等 5 秒
// ==========================================

use crate::repository::error::RepoResult;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

/// 连接级 PRAGMA 配置
pub fn configure_sqlite_connection(conn: &Connection) -> RepoResult<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

/// 打开文件数据库并完成配置
pub fn open_sqlite_connection(path: &Path) -> RepoResult<Arc<Mutex<Connection>>> {
    let conn = Connection::open(path)?;
    configure_sqlite_connection(&conn)?;
    info!("数据库连接已打开: {}", path.display());
    Ok(Arc::new(Mutex::new(conn)))
}

/// 打开内存数据库（测试用）
pub fn open_in_memory_connection() -> RepoResult<Arc<Mutex<Connection>>> {
    let conn = Connection::open_in_memory()?;
    configure_sqlite_connection(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

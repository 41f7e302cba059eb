// ==========================================
// 批量表格数据导入引擎 - 进度上报
// ==========================================
// 时机: 每个处理块完成后发布一次（fire-and-forget）
// 红线: 发布失败仅记日志，永不中断导入
// ==========================================

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

// ==========================================
// ProgressEvent - 块级进度事件
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub processed: usize,            // 已处理行数（含 skipped）
    pub total: Option<usize>,        // 总行数（流式源未知时为 None）
    pub success_count: usize,        // 全字段成功行数
    pub partial_count: usize,        // 部分成功行数
    pub error_count: usize,          // 失败行数
    pub current_chunk: usize,        // 当前块序号（1 基）
    pub total_chunks: Option<usize>, // 总块数（总行数已知时）
}

// ==========================================
// ProgressSink Trait
// ==========================================
// 实现者: NullSink（默认）、LogSink、ChannelSink（前端订阅）
pub trait ProgressSink: Send + Sync {
    /// 发布进度事件（返回 Err 仅用于记日志）
    fn publish(&self, task_id: &str, event: &ProgressEvent) -> Result<(), String>;
}

/// 丢弃所有事件
pub struct NullSink;

impl ProgressSink for NullSink {
    fn publish(&self, _task_id: &str, _event: &ProgressEvent) -> Result<(), String> {
        Ok(())
    }
}

/// 结构化日志输出
pub struct LogSink;

impl ProgressSink for LogSink {
    fn publish(&self, task_id: &str, event: &ProgressEvent) -> Result<(), String> {
        info!(
            task_id = task_id,
            processed = event.processed,
            total = event.total,
            success = event.success_count,
            partial = event.partial_count,
            failed = event.error_count,
            chunk = event.current_chunk,
            "导入进度"
        );
        Ok(())
    }
}

/// tokio 通道转发（订阅端消费）
pub struct ChannelSink {
    sender: UnboundedSender<(String, ProgressEvent)>,
}

impl ChannelSink {
    pub fn new(sender: UnboundedSender<(String, ProgressEvent)>) -> Self {
        Self { sender }
    }
}

impl ProgressSink for ChannelSink {
    fn publish(&self, task_id: &str, event: &ProgressEvent) -> Result<(), String> {
        self.sender
            .send((task_id.to_string(), event.clone()))
            .map_err(|e| format!("进度通道已关闭: {}", e))
    }
}

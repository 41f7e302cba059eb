// ==========================================
// 批量表格数据导入引擎 - 异步任务运行器
// ==========================================
// 职责: 后台运行导入任务，暴露状态查询与协作式取消
// 取消语义: 置标志位，引擎在块边界观察；已写入数据由事务包装器回滚
// ==========================================

use crate::domain::import_task::ImportResult as AggregateResult;
use crate::domain::types::TaskStatus;
use crate::importer::engine::ImportEngine;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::reporter::ImportReporter;
use crate::importer::rollback::TransactionalImport;
use crate::importer::source::RowSource;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

// ==========================================
// ImportTaskHandle - 任务句柄
// ==========================================
pub struct ImportTaskHandle {
    task_id: String,
    status: Arc<Mutex<TaskStatus>>,
    cancel_flag: Arc<AtomicBool>,
    join: JoinHandle<ImportResult<AggregateResult>>,
}

impl ImportTaskHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn status(&self) -> TaskStatus {
        *self.status.lock().expect("状态锁中毒")
    }

    /// 请求取消（块边界生效）
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    /// 等待任务结束并取回结果
    pub async fn wait(self) -> ImportResult<AggregateResult> {
        self.join
            .await
            .map_err(|e| ImportError::InternalError(format!("任务执行中断: {}", e)))?
    }
}

// ==========================================
// AsyncImportRunner - 任务注册表与派发
// ==========================================
struct TaskEntry {
    status: Arc<Mutex<TaskStatus>>,
    cancel_flag: Arc<AtomicBool>,
}

#[derive(Default)]
pub struct AsyncImportRunner {
    tasks: Mutex<HashMap<String, TaskEntry>>,
}

impl AsyncImportRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// 派发后台导入任务
    ///
    /// # 说明
    /// - 引擎运行包裹在事务边界内：取消/错误率超限时整次回滚
    /// - 报告器定稿失败不影响任务结果，仅记 warn
    pub fn spawn(
        &self,
        engine: ImportEngine,
        source: Box<dyn RowSource>,
        mut reporter: ImportReporter,
        txn: TransactionalImport,
    ) -> ImportTaskHandle {
        let task_id = reporter.task_id().to_string();
        // 派发时为 PENDING，worker 首次执行时进入 PROCESSING
        let status = Arc::new(Mutex::new(TaskStatus::Pending));
        let cancel_flag = Arc::new(AtomicBool::new(false));

        self.tasks.lock().expect("注册表锁中毒").insert(
            task_id.clone(),
            TaskEntry {
                status: status.clone(),
                cancel_flag: cancel_flag.clone(),
            },
        );

        let status_inner = status.clone();
        let cancel_inner = cancel_flag.clone();
        let spawned_task_id = task_id.clone();
        let join = tokio::spawn(async move {
            let record_type = engine.mapping().record_type.clone();
            *status_inner.lock().expect("状态锁中毒") = TaskStatus::Processing;
            info!("后台导入任务启动: {} ({})", spawned_task_id, record_type);

            let reporter_ref = &mut reporter;
            let run = txn
                .run(&record_type, move || async move {
                    engine
                        .import_data(source, Some(reporter_ref), Some(cancel_inner))
                        .await
                })
                .await;

            let final_status = match &run {
                Ok(result) => ImportEngine::final_status(result),
                Err(ImportError::TaskCancelled(_)) => TaskStatus::Cancelled,
                Err(_) => TaskStatus::Failed,
            };

            if let Err(e) = reporter.complete(final_status).await {
                warn!("任务 {} 报告定稿失败: {}", spawned_task_id, e);
            }
            *status_inner.lock().expect("状态锁中毒") = final_status;
            info!("后台导入任务结束: {} → {}", spawned_task_id, final_status);
            run
        });

        ImportTaskHandle {
            task_id,
            status,
            cancel_flag,
            join,
        }
    }

    /// 查询任务状态
    pub fn status(&self, task_id: &str) -> Option<TaskStatus> {
        self.tasks
            .lock()
            .expect("注册表锁中毒")
            .get(task_id)
            .map(|entry| *entry.status.lock().expect("状态锁中毒"))
    }

    /// 请求取消（任务不存在返回 false）
    pub fn cancel(&self, task_id: &str) -> bool {
        match self.tasks.lock().expect("注册表锁中毒").get(task_id) {
            Some(entry) => {
                entry.cancel_flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// 从注册表移除已结束任务
    pub fn forget(&self, task_id: &str) {
        self.tasks.lock().expect("注册表锁中毒").remove(task_id);
    }
}

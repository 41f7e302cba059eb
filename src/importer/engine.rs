// ==========================================
// 批量表格数据导入引擎 - 导入引擎
// ==========================================
// 流程: 表头预检 → 分块拉取 → 逐行处理 → 块边界进度/取消
// 红线: 必填列缺失为运行前致命错误；行级错误就地入账不中断
//       取消仅在块边界生效，已处理的块交由事务包装器统一回滚
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::domain::import_task::ImportResult as AggregateResult;
use crate::domain::types::TaskStatus;
use crate::importer::accumulator::ResultAccumulator;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_normalizer::FieldNormalizer;
use crate::importer::mapping::FieldMappingConfig;
use crate::importer::progress::{NullSink, ProgressEvent, ProgressSink};
use crate::importer::reporter::ImportReporter;
use crate::importer::row_processor::RowProcessor;
use crate::importer::source::RowSource;
use crate::importer::store::RecordStoreAdapter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

// ==========================================
// ImportOptions - 单次运行的引擎参数
// ==========================================
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub chunk_size: usize,
    pub update_existing: bool,
    pub top_error_count: usize,
    pub max_error_samples: usize,
}

impl ImportOptions {
    /// 从配置读取器装配（缺失项回退默认值）
    pub async fn from_config(config: &dyn ImportConfigReader) -> Self {
        Self {
            chunk_size: config.import_chunk_size().await,
            update_existing: config.update_existing().await,
            top_error_count: config.top_error_count().await,
            max_error_samples: config.max_error_samples().await,
        }
    }
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            chunk_size: crate::config::import_config_trait::DEFAULT_CHUNK_SIZE,
            update_existing: crate::config::import_config_trait::DEFAULT_UPDATE_EXISTING,
            top_error_count: crate::config::import_config_trait::DEFAULT_TOP_ERROR_COUNT,
            max_error_samples: crate::config::import_config_trait::DEFAULT_MAX_ERROR_SAMPLES,
        }
    }
}

// ==========================================
// ImportEngine - 导入引擎
// ==========================================
pub struct ImportEngine {
    mapping: FieldMappingConfig,
    store: Arc<dyn RecordStoreAdapter>,
    options: ImportOptions,
    progress: Arc<dyn ProgressSink>,
}

impl ImportEngine {
    pub fn new(
        mapping: FieldMappingConfig,
        store: Arc<dyn RecordStoreAdapter>,
        options: ImportOptions,
    ) -> Self {
        Self {
            mapping,
            store,
            options,
            progress: Arc::new(NullSink),
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn mapping(&self) -> &FieldMappingConfig {
        &self.mapping
    }

    /// 按聚合结果推导任务终态
    pub fn final_status(result: &AggregateResult) -> TaskStatus {
        if result.total == 0 {
            TaskStatus::Completed
        } else if result.failed == result.total {
            TaskStatus::Failed
        } else if result.failed > 0 || !result.partial_success_rows.is_empty() {
            TaskStatus::Partial
        } else {
            TaskStatus::Completed
        }
    }

    /// 执行一次导入运行
    ///
    /// # 参数
    /// - source: 行数据源
    /// - reporter: 任务报告器（可选，不接报告仍可导入）
    /// - cancel_flag: 协作式取消标志（块边界检查）
    ///
    /// # 返回
    /// - Err(MissingRequiredColumns): 预检失败，未处理任何行
    /// - Err(TaskCancelled): 取消于块边界生效，已处理行由事务包装器回滚
    #[instrument(skip_all, fields(record_type = %self.mapping.record_type))]
    pub async fn import_data(
        &self,
        mut source: Box<dyn RowSource>,
        mut reporter: Option<&mut ImportReporter>,
        cancel_flag: Option<Arc<AtomicBool>>,
    ) -> ImportResult<AggregateResult> {
        // ===== 步骤 1: 表头规范化与必填列预检 =====
        debug!("=== 步骤 1: 表头预检 ===");
        let normalizer = FieldNormalizer::new(&self.mapping);
        let canonical_headers: Vec<String> = source
            .headers()
            .iter()
            .map(|h| normalizer.normalize(h))
            .collect();

        // 未配置的列可容忍，仅记日志
        let ignored: Vec<&String> = canonical_headers
            .iter()
            .filter(|h| !self.mapping.fields.contains_key(h.as_str()))
            .collect();
        if !ignored.is_empty() {
            debug!("忽略未配置的源列: {:?}", ignored);
        }

        self.mapping.check_source_columns(&canonical_headers)?;

        let total = source.total_rows();
        let total_chunks = total.map(|t| t.div_ceil(self.options.chunk_size).max(1));

        if let Some(reporter) = reporter.as_deref_mut() {
            if let Err(e) = reporter.start(total.unwrap_or(0)).await {
                warn!("任务状态持久化失败（继续导入）: {}", e);
            }
        }

        // ===== 步骤 2: 分块处理 =====
        debug!("=== 步骤 2: 分块处理, 块大小 {} ===", self.options.chunk_size);
        let processor =
            RowProcessor::new(&self.mapping, self.store.clone(), self.options.update_existing);
        let mut accumulator = ResultAccumulator::new(self.options.max_error_samples);
        let mut current_chunk = 0usize;
        let mut processed = 0usize;

        loop {
            // 取消仅在块边界生效
            if let Some(flag) = &cancel_flag {
                if flag.load(Ordering::SeqCst) {
                    info!("取消请求在块边界生效, 已处理 {} 行", processed);
                    let task_id = reporter
                        .as_deref()
                        .map(|r| r.task_id().to_string())
                        .unwrap_or_default();
                    return Err(ImportError::TaskCancelled(task_id));
                }
            }

            let chunk = source.next_chunk(self.options.chunk_size)?;
            if chunk.is_empty() {
                break;
            }
            current_chunk += 1;

            for row in &chunk {
                let outcome = processor.process(row, &normalizer).await;
                accumulator.record(&outcome);
                if let Some(reporter) = reporter.as_deref_mut() {
                    if let Err(e) = reporter.report_row(&outcome).await {
                        warn!("行明细持久化失败（继续导入）: {}", e);
                    }
                }
            }
            processed += chunk.len();

            // ===== 块边界: 进度事件（fire-and-forget）=====
            let snapshot = accumulator.result();
            let event = ProgressEvent {
                processed,
                total,
                success_count: snapshot.success,
                partial_count: snapshot.partial_success_rows.len(),
                error_count: snapshot.failed,
                current_chunk,
                total_chunks,
            };
            let task_id = reporter
                .as_deref()
                .map(|r| r.task_id().to_string())
                .unwrap_or_default();
            if let Err(e) = self.progress.publish(&task_id, &event) {
                warn!("进度事件发布失败（忽略）: {}", e);
            }
            if let Some(reporter) = reporter.as_deref_mut() {
                if let Err(e) = reporter.update_progress(processed).await {
                    warn!("进度持久化失败（继续导入）: {}", e);
                }
            }
        }

        let result = accumulator.into_result();
        info!(
            "导入运行完成: 总计 {}, 成功 {}, 失败 {}, 部分成功 {}, 跳过 {}",
            result.total,
            result.success,
            result.failed,
            result.partial_success_rows.len(),
            result.skipped_rows.len()
        );
        Ok(result)
    }
}

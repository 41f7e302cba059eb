// ==========================================
// 批量表格数据导入引擎 - 导入模块
// ==========================================
// 管道: 数据源 → 字段规范化 → 校验强转 → 行处理 → 落库
//       结果累加 → 报告 → 事务回滚包装 → 异步运行器
// ==========================================

pub mod accumulator;
pub mod engine;
pub mod error;
pub mod field_normalizer;
pub mod mapping;
pub mod progress;
pub mod reporter;
pub mod rollback;
pub mod row_processor;
pub mod runner;
pub mod source;
pub mod store;
pub mod validator;

pub use accumulator::ResultAccumulator;
pub use engine::{ImportEngine, ImportOptions};
pub use error::ImportError;
pub use field_normalizer::FieldNormalizer;
pub use mapping::{FieldMappingConfig, FieldSpec};
pub use progress::{ChannelSink, LogSink, NullSink, ProgressEvent, ProgressSink};
pub use reporter::{ImportReport, ImportReporter};
pub use rollback::TransactionalImport;
pub use row_processor::{RowOutcome, RowProcessor, WriteOp};
pub use runner::{AsyncImportRunner, ImportTaskHandle};
pub use source::{open_source, CsvSource, ExcelSource, RawRow, RowSource, VecSource};
pub use store::{
    serialize_unique_key, FieldMap, InMemoryRecordStore, RecordStoreAdapter, ReferenceResolver,
    UniqueKey,
};
pub use validator::{
    BooleanValidator, Coerced, DateTimeValidator, DateValidator, DecimalValidator,
    FieldValidator, IntegerValidator, ReferenceValidator, TextValidator, ValidatorRegistry,
};

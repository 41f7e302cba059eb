// ==========================================
// 批量表格数据导入引擎 - 行处理器
// ==========================================
// 职责: 单行的字段级处理状态机
// 状态判定: 必填字段全败/任一失败 → 整行失败（不落库）
//           必填全部成功 + 可选部分失败 → 部分成功（仅落成功字段）
//           全部成功 → 新建或更新
// 红线: 行间无依赖，单行异常不得打断运行；行内不重试
// ==========================================

use crate::domain::types::{CellValue, FieldValue, RecordId, RowStatus};
use crate::importer::field_normalizer::FieldNormalizer;
use crate::importer::mapping::FieldMappingConfig;
use crate::importer::source::RawRow;
use crate::importer::store::{FieldMap, RecordStoreAdapter, UniqueKey};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

// ==========================================
// WriteOp - 落库操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
}

// ==========================================
// RowOutcome - 单行处理结果
// ==========================================
#[derive(Debug, Clone)]
pub struct RowOutcome {
    pub row_number: usize,
    pub status: RowStatus,
    pub record_id: Option<RecordId>,
    pub operation: Option<WriteOp>,              // 落库时的操作类型
    pub fields_written: Vec<String>,             // 实际落库的字段（含默认值字段）
    pub fields_failed: BTreeMap<String, String>, // 字段名 → 错误信息
    pub side_effects: Vec<String>,               // 校验期依赖操作（如按需新建引用目标）
    pub error_message: Option<String>,           // 行级错误（整行失败时）
    pub row_data: serde_json::Value,             // 原始行快照（报告明细用）
}

impl RowOutcome {
    fn skipped(row_number: usize, row_data: serde_json::Value) -> Self {
        Self {
            row_number,
            status: RowStatus::Skipped,
            record_id: None,
            operation: None,
            fields_written: Vec::new(),
            fields_failed: BTreeMap::new(),
            side_effects: Vec::new(),
            error_message: None,
            row_data,
        }
    }
}

// ==========================================
// RowProcessor - 行处理器
// ==========================================
pub struct RowProcessor<'a> {
    mapping: &'a FieldMappingConfig,
    store: Arc<dyn RecordStoreAdapter>,
    // 关闭时已存在记录不更新，按跳过处理
    update_existing: bool,
}

impl<'a> RowProcessor<'a> {
    pub fn new(
        mapping: &'a FieldMappingConfig,
        store: Arc<dyn RecordStoreAdapter>,
        update_existing: bool,
    ) -> Self {
        Self {
            mapping,
            store,
            update_existing,
        }
    }

    /// 处理单行
    ///
    /// # 说明
    /// - 永不向外传播错误：校验失败入字段账，落库失败入行账
    /// - 空行直接按 Skipped 产出
    pub async fn process(&self, row: &RawRow, normalizer: &FieldNormalizer<'_>) -> RowOutcome {
        let row_data = snapshot_row(&row.cells);

        if row.is_blank() {
            debug!("行 {} 为空行，跳过", row.row_number);
            return RowOutcome::skipped(row.row_number, row_data);
        }

        let normalized = normalizer.normalize_row(&row.cells);

        // ===== 字段级校验与强转 =====
        let mut coerced_fields: FieldMap = BTreeMap::new();
        let mut fields_failed: BTreeMap<String, String> = BTreeMap::new();
        let mut side_effects: Vec<String> = Vec::new();
        let mut required_failed = false;

        for (name, spec) in &self.mapping.fields {
            let cell = match normalized.get(name.as_str()) {
                Some(cell) if !cell.is_empty() => cell,
                _ => {
                    // 缺失字段：默认值直接落库（已强转，不再过校验器）
                    if let Some(default) = &spec.default {
                        coerced_fields.insert(name.clone(), default.clone());
                    } else if spec.is_effectively_required() {
                        fields_failed.insert(name.clone(), "必填字段缺失".to_string());
                        required_failed = true;
                    }
                    continue;
                }
            };
            match &spec.validator {
                Some(validator) => match validator.validate(cell) {
                    Ok(coerced) => {
                        coerced_fields.insert(name.clone(), coerced.value);
                        if let Some(effect) = coerced.side_effect {
                            side_effects.push(effect);
                        }
                    }
                    Err(message) => {
                        if spec.is_effectively_required() {
                            required_failed = true;
                        }
                        fields_failed.insert(name.clone(), message);
                    }
                },
                // 未配置校验器：仅存在性检查，按文本透传
                None => {
                    coerced_fields.insert(
                        name.clone(),
                        FieldValue::Text(cell.to_display_string()),
                    );
                }
            }
        }

        // ===== 整行失败判定 =====
        if required_failed {
            let message = fields_failed
                .iter()
                .map(|(f, m)| format!("{}: {}", f, m))
                .collect::<Vec<_>>()
                .join("; ");
            return RowOutcome {
                row_number: row.row_number,
                status: RowStatus::Failed,
                record_id: None,
                operation: None,
                fields_written: Vec::new(),
                fields_failed,
                side_effects,
                error_message: Some(message),
                row_data,
            };
        }

        // ===== 唯一键查找（仅使用强转后的值）=====
        let unique_key: UniqueKey = self
            .mapping
            .unique_key_fields()
            .iter()
            .filter_map(|field| {
                coerced_fields
                    .get(*field)
                    .map(|v| (field.to_string(), v.key_repr()))
            })
            .collect();

        let existing = match self
            .store
            .lookup(&self.mapping.record_type, &unique_key)
            .await
        {
            Ok(found) => found,
            Err(e) => return self.persistence_failure(row.row_number, fields_failed, row_data, e.to_string()),
        };

        // 更新开关关闭时，已存在记录按跳过处理（不视为错误）
        if existing.is_some() && !self.update_existing {
            debug!("行 {} 命中已有记录且更新已关闭，跳过", row.row_number);
            return RowOutcome::skipped(row.row_number, row_data);
        }

        // ===== 落库 =====
        let write = match &existing {
            Some(id) => self
                .store
                .update(&self.mapping.record_type, id, &coerced_fields)
                .await
                .map(|id| (id, WriteOp::Update)),
            None => self
                .store
                .create(&self.mapping.record_type, &unique_key, &coerced_fields)
                .await
                .map(|id| (id, WriteOp::Create)),
        };

        let (record_id, operation) = match write {
            Ok(pair) => pair,
            Err(e) => return self.persistence_failure(row.row_number, fields_failed, row_data, e.to_string()),
        };

        let status = if fields_failed.is_empty() {
            match operation {
                WriteOp::Create => RowStatus::Created,
                WriteOp::Update => RowStatus::Updated,
            }
        } else {
            RowStatus::Partial
        };

        RowOutcome {
            row_number: row.row_number,
            status,
            record_id: Some(record_id),
            operation: Some(operation),
            fields_written: coerced_fields.keys().cloned().collect(),
            fields_failed,
            side_effects,
            error_message: None,
            row_data,
        }
    }

    /// 落库异常 → 整行失败（不传播）
    fn persistence_failure(
        &self,
        row_number: usize,
        fields_failed: BTreeMap<String, String>,
        row_data: serde_json::Value,
        message: String,
    ) -> RowOutcome {
        RowOutcome {
            row_number,
            status: RowStatus::Failed,
            record_id: None,
            operation: None,
            fields_written: Vec::new(),
            fields_failed,
            side_effects: Vec::new(),
            error_message: Some(format!("记录落库失败: {}", message)),
            row_data,
        }
    }
}

/// 原始行 → JSON 快照（报告明细持久化用）
fn snapshot_row(cells: &[(String, CellValue)]) -> serde_json::Value {
    let map: HashMap<&str, String> = cells
        .iter()
        .map(|(header, value)| (header.as_str(), value.to_display_string()))
        .collect();
    serde_json::to_value(map).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::mapping::FieldSpec;
    use crate::importer::store::InMemoryRecordStore;
    use crate::importer::validator::{DecimalValidator, TextValidator};

    fn mapping() -> FieldMappingConfig {
        FieldMappingConfig::builder("product")
            .field(
                "sku",
                FieldSpec::new()
                    .unique_key()
                    .validator(Arc::new(TextValidator::uppercased())),
            )
            .field("name", FieldSpec::new().required())
            .field(
                "price",
                FieldSpec::new().validator(Arc::new(DecimalValidator::non_negative())),
            )
            .field(
                "is_active",
                FieldSpec::new().default_value(FieldValue::Boolean(true)),
            )
            .build()
    }

    fn row(number: usize, cells: &[(&str, &str)]) -> RawRow {
        RawRow {
            row_number: number,
            cells: cells
                .iter()
                .map(|(h, v)| {
                    let value = if v.is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::Text(v.to_string())
                    };
                    (h.to_string(), value)
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_full_success_creates_record() {
        let mapping = mapping();
        let store = Arc::new(InMemoryRecordStore::new());
        let processor = RowProcessor::new(&mapping, store.clone(), true);
        let normalizer = FieldNormalizer::new(&mapping);

        let outcome = processor
            .process(
                &row(1, &[("sku", "a1"), ("name", "螺栓"), ("price", "1.5")]),
                &normalizer,
            )
            .await;

        assert_eq!(outcome.status, RowStatus::Created);
        assert_eq!(outcome.operation, Some(WriteOp::Create));
        // 默认值字段随行落库
        assert!(outcome.fields_written.contains(&"is_active".to_string()));

        let fields = store
            .get_fields("product", outcome.record_id.as_ref().unwrap())
            .unwrap();
        // 校验器强转生效（大写）
        assert_eq!(fields.get("sku"), Some(&FieldValue::Text("A1".to_string())));
        assert_eq!(fields.get("is_active"), Some(&FieldValue::Boolean(true)));
    }

    #[tokio::test]
    async fn test_partial_success_persists_only_coerced_fields() {
        let mapping = mapping();
        let store = Arc::new(InMemoryRecordStore::new());
        let processor = RowProcessor::new(&mapping, store.clone(), true);
        let normalizer = FieldNormalizer::new(&mapping);

        let outcome = processor
            .process(
                &row(1, &[("sku", "a2"), ("name", "螺母"), ("price", "不是数字")]),
                &normalizer,
            )
            .await;

        assert_eq!(outcome.status, RowStatus::Partial);
        assert!(outcome.fields_failed.contains_key("price"));

        // 失败的可选字段不落库（不写默认值）
        let fields = store
            .get_fields("product", outcome.record_id.as_ref().unwrap())
            .unwrap();
        assert!(!fields.contains_key("price"));
        assert!(fields.contains_key("name"));
    }

    #[tokio::test]
    async fn test_required_failure_fails_whole_row() {
        let mapping = mapping();
        let store = Arc::new(InMemoryRecordStore::new());
        let processor = RowProcessor::new(&mapping, store.clone(), true);
        let normalizer = FieldNormalizer::new(&mapping);

        let outcome = processor
            .process(&row(1, &[("sku", "a3"), ("price", "1.0")]), &normalizer)
            .await;

        assert_eq!(outcome.status, RowStatus::Failed);
        assert!(outcome.record_id.is_none());
        assert!(outcome.fields_failed.contains_key("name"));
        // 整行失败不落库
        assert_eq!(store.count("product").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unique_key_match_updates() {
        let mapping = mapping();
        let store = Arc::new(InMemoryRecordStore::new());
        let processor = RowProcessor::new(&mapping, store.clone(), true);
        let normalizer = FieldNormalizer::new(&mapping);

        let first = processor
            .process(
                &row(1, &[("sku", "A1"), ("name", "螺栓"), ("price", "1.5")]),
                &normalizer,
            )
            .await;
        let second = processor
            .process(
                &row(2, &[("sku", "a1"), ("name", "六角螺栓")]),
                &normalizer,
            )
            .await;

        assert_eq!(second.status, RowStatus::Updated);
        assert_eq!(second.record_id, first.record_id);
        assert_eq!(store.count("product").await.unwrap(), 1);

        // 更新为字段级合并：未提供的 price 保留原值
        let fields = store
            .get_fields("product", first.record_id.as_ref().unwrap())
            .unwrap();
        assert_eq!(fields.get("price"), Some(&FieldValue::Decimal(1.5)));
        assert_eq!(
            fields.get("name"),
            Some(&FieldValue::Text("六角螺栓".to_string()))
        );
    }

    #[tokio::test]
    async fn test_update_disabled_skips_existing() {
        let mapping = mapping();
        let store = Arc::new(InMemoryRecordStore::new());
        let normalizer = FieldNormalizer::new(&mapping);

        let create = RowProcessor::new(&mapping, store.clone(), true);
        create
            .process(
                &row(1, &[("sku", "A1"), ("name", "螺栓")]),
                &normalizer,
            )
            .await;

        let no_update = RowProcessor::new(&mapping, store.clone(), false);
        let outcome = no_update
            .process(
                &row(2, &[("sku", "A1"), ("name", "改名")]),
                &normalizer,
            )
            .await;

        assert_eq!(outcome.status, RowStatus::Skipped);
        assert_eq!(store.count("product").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_blank_row_skipped() {
        let mapping = mapping();
        let store = Arc::new(InMemoryRecordStore::new());
        let processor = RowProcessor::new(&mapping, store.clone(), true);
        let normalizer = FieldNormalizer::new(&mapping);

        let outcome = processor
            .process(&row(5, &[("sku", ""), ("name", "")]), &normalizer)
            .await;
        assert_eq!(outcome.status, RowStatus::Skipped);
        assert_eq!(outcome.row_number, 5);
    }
}

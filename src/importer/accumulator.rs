// ==========================================
// 批量表格数据导入引擎 - 结果累加器
// ==========================================
// 职责: 行结果 → 运行期聚合，维护行分片不变量
// 不变量: total == success + failed + partial 行数（skipped 不计入 total）
// ==========================================

use crate::domain::import_task::ImportResult as AggregateResult;
use crate::domain::types::{RecordId, RowStatus};
use crate::importer::row_processor::{RowOutcome, WriteOp};
use std::collections::BTreeMap;

pub struct ResultAccumulator {
    result: AggregateResult,
    // 错误样本上限（防止病态文件撑爆内存）
    max_error_samples: usize,
    truncated_errors: usize,
}

impl ResultAccumulator {
    pub fn new(max_error_samples: usize) -> Self {
        Self {
            result: AggregateResult::default(),
            max_error_samples,
            truncated_errors: 0,
        }
    }

    /// 录入单行结果（每行恰好进入一个桶）
    pub fn record(&mut self, outcome: &RowOutcome) {
        // 字段级结果：成功写入 true，校验失败 false
        if !outcome.fields_written.is_empty() || !outcome.fields_failed.is_empty() {
            let mut per_field: BTreeMap<String, bool> = BTreeMap::new();
            for field in &outcome.fields_written {
                per_field.insert(field.clone(), true);
            }
            for field in outcome.fields_failed.keys() {
                per_field.insert(field.clone(), false);
            }
            self.result
                .field_level_results
                .insert(outcome.row_number, per_field);
        }

        match outcome.status {
            RowStatus::Skipped => self.skip_row(outcome.row_number),
            RowStatus::Created | RowStatus::Updated => {
                if let (Some(id), Some(op)) = (&outcome.record_id, outcome.operation) {
                    self.add_success(id, op);
                }
            }
            RowStatus::Partial => {
                if let (Some(id), Some(op)) = (&outcome.record_id, outcome.operation) {
                    self.add_partial_success(outcome.row_number, id, op, &outcome.fields_failed);
                }
            }
            RowStatus::Failed => {
                let message = outcome
                    .error_message
                    .as_deref()
                    .unwrap_or("未知错误");
                self.add_error(outcome.row_number, message);
            }
        }
    }

    /// 全字段成功行
    pub fn add_success(&mut self, id: &RecordId, op: WriteOp) {
        self.result.total += 1;
        self.result.success += 1;
        self.push_id(id, op);
    }

    /// 部分成功行（必填成功、部分可选失败，已落库）
    pub fn add_partial_success(
        &mut self,
        row_number: usize,
        id: &RecordId,
        op: WriteOp,
        fields_failed: &BTreeMap<String, String>,
    ) {
        self.result.total += 1;
        self.result.partial_success_rows.push(row_number);
        self.push_id(id, op);
        for (field, message) in fields_failed {
            self.push_error(format!("行 {} 字段 {}: {}", row_number, field, message));
        }
    }

    /// 失败行（未落库）
    pub fn add_error(&mut self, row_number: usize, message: &str) {
        self.result.total += 1;
        self.result.failed += 1;
        self.push_error(format!("行 {}: {}", row_number, message));
    }

    /// 跳过行（不计入 total）
    pub fn skip_row(&mut self, row_number: usize) {
        self.result.skipped_rows.push(row_number);
    }

    // 落库 ID 入账（部分成功行同样计入新建/更新）
    fn push_id(&mut self, id: &RecordId, op: WriteOp) {
        match op {
            WriteOp::Create => self.result.created_ids.push(id.clone()),
            WriteOp::Update => self.result.updated_ids.push(id.clone()),
        }
    }

    fn push_error(&mut self, message: String) {
        if self.result.errors.len() < self.max_error_samples {
            self.result.errors.push(message);
        } else {
            self.truncated_errors += 1;
        }
    }

    /// 被截断的错误样本数
    pub fn truncated_errors(&self) -> usize {
        self.truncated_errors
    }

    pub fn result(&self) -> &AggregateResult {
        &self.result
    }

    /// 取出聚合结果（运行结束时调用）
    pub fn into_result(mut self) -> AggregateResult {
        if self.truncated_errors > 0 {
            self.result
                .errors
                .push(format!("（另有 {} 条错误被截断）", self.truncated_errors));
        }
        debug_assert!(self.result.check_invariant(), "行分片不变量被破坏");
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::RecordId;

    fn outcome(row: usize, status: RowStatus) -> RowOutcome {
        let (record_id, operation) = match status {
            RowStatus::Created | RowStatus::Partial => {
                (Some(RecordId::from("id")), Some(WriteOp::Create))
            }
            RowStatus::Updated => (Some(RecordId::from("id")), Some(WriteOp::Update)),
            _ => (None, None),
        };
        RowOutcome {
            row_number: row,
            status,
            record_id,
            operation,
            fields_written: vec!["name".to_string()],
            fields_failed: if status == RowStatus::Partial {
                [("price".to_string(), "无法解析".to_string())].into()
            } else {
                BTreeMap::new()
            },
            side_effects: Vec::new(),
            error_message: if status == RowStatus::Failed {
                Some("必填字段缺失".to_string())
            } else {
                None
            },
            row_data: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_partition_invariant() {
        let mut acc = ResultAccumulator::new(100);
        acc.record(&outcome(1, RowStatus::Created));
        acc.record(&outcome(2, RowStatus::Updated));
        acc.record(&outcome(3, RowStatus::Partial));
        acc.record(&outcome(4, RowStatus::Failed));
        acc.record(&outcome(5, RowStatus::Skipped));

        let result = acc.into_result();
        assert!(result.check_invariant());
        assert_eq!(result.total, 4); // skipped 不计入
        assert_eq!(result.success, 2);
        assert_eq!(result.failed, 1);
        assert_eq!(result.partial_success_rows, vec![3]);
        assert_eq!(result.skipped_rows, vec![5]);
        assert_eq!(result.created_ids.len(), 2); // 部分成功行也入账
        assert_eq!(result.updated_ids.len(), 1);
    }

    #[test]
    fn test_error_sample_cap() {
        let mut acc = ResultAccumulator::new(2);
        for i in 1..=5 {
            acc.record(&outcome(i, RowStatus::Failed));
        }
        assert_eq!(acc.truncated_errors(), 3);
        let result = acc.into_result();
        // 2 条样本 + 1 条截断说明
        assert_eq!(result.errors.len(), 3);
    }

    #[test]
    fn test_field_level_results() {
        let mut acc = ResultAccumulator::new(100);
        acc.record(&outcome(3, RowStatus::Partial));
        let result = acc.into_result();
        let per_field = result.field_level_results.get(&3).unwrap();
        assert_eq!(per_field.get("name"), Some(&true));
        assert_eq!(per_field.get("price"), Some(&false));
    }
}

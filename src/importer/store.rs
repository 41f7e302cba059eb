// ==========================================
// 批量表格数据导入引擎 - 记录存储适配器
// ==========================================
// 职责: 导入器唯一触达持久化的位置（查找/新建/更新）
// 红线: 存储自行保证单次写入的原子性与锁；导入器不实现乐观/悲观锁
// 红线: 提交后钩子由适配器自行触发，导入器核心不依赖、不调用
// ==========================================

use crate::domain::types::{FieldValue, RecordId};
use crate::importer::error::{ImportError, ImportResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// 规范字段名 → 已强转字段值
pub type FieldMap = BTreeMap<String, FieldValue>;

/// 唯一键字段名 → 规范化字符串值（有序，保证序列化稳定）
pub type UniqueKey = BTreeMap<String, String>;

/// 序列化唯一键（空键返回 None，由存储生成独立标识）
pub fn serialize_unique_key(key: &UniqueKey) -> Option<String> {
    if key.is_empty() {
        None
    } else {
        Some(
            key.iter()
                .map(|(field, value)| format!("{}={}", field, value))
                .collect::<Vec<_>>()
                .join("\u{1f}"),
        )
    }
}

// ==========================================
// RecordStoreAdapter Trait
// ==========================================
// 用途: 持久化契约（查找-新建-更新 + 事务边界 + 备份转储）
// 实现者: InMemoryRecordStore（测试/干跑）, SqliteRecordStore（rusqlite）
#[async_trait]
pub trait RecordStoreAdapter: Send + Sync {
    /// 按唯一键查找记录
    ///
    /// # 参数
    /// - record_type: 记录类型标签
    /// - key: 唯一键字段 → 规范化值
    ///
    /// # 返回
    /// - Ok(Some(id)): 已存在
    /// - Ok(None): 不存在
    async fn lookup(&self, record_type: &str, key: &UniqueKey)
        -> ImportResult<Option<RecordId>>;

    /// 新建记录
    ///
    /// # 参数
    /// - key: 唯一键（可为空，空键记录按独立标识存储）
    /// - fields: 待写入字段集合
    async fn create(
        &self,
        record_type: &str,
        key: &UniqueKey,
        fields: &FieldMap,
    ) -> ImportResult<RecordId>;

    /// 更新已有记录（字段级合并，未提供的字段保持原值）
    async fn update(
        &self,
        record_type: &str,
        id: &RecordId,
        fields: &FieldMap,
    ) -> ImportResult<RecordId>;

    /// 统计记录数（备份元数据 / 测试断言用）
    async fn count(&self, record_type: &str) -> ImportResult<usize>;

    /// 全量序列化转储（JSON 数组），供备份快照
    async fn dump_all(&self, record_type: &str) -> ImportResult<String>;

    // ===== 事务边界（回滚包装器使用）=====

    /// 开启保存点（一次导入运行一个）
    async fn begin_savepoint(&self) -> ImportResult<()>;

    /// 提交保存点（适配器在此触发提交后钩子）
    async fn commit_savepoint(&self) -> ImportResult<()>;

    /// 回滚到保存点（整次运行全量撤销）
    async fn rollback_savepoint(&self) -> ImportResult<()>;
}

// ==========================================
// ReferenceResolver Trait
// ==========================================
// 用途: 外键字段的解析-或-新建；新建时返回副作用描述
// 实现者: 调用方（通常闭合到某个 RecordStoreAdapter 上）
pub trait ReferenceResolver: Send + Sync {
    /// 解析原始标量为记录引用
    ///
    /// # 返回
    /// - Ok((id, None)): 目标已存在
    /// - Ok((id, Some(msg))): 目标按需新建，msg 为副作用描述（如"新建分类 X"）
    /// - Err: 无法解析且不允许新建
    fn resolve(&self, raw: &str) -> Result<(RecordId, Option<String>), String>;
}

// ==========================================
// InMemoryRecordStore - 内存记录存储
// ==========================================
// 用途: 干跑 / 单元与集成测试；语义与 SqliteRecordStore 对齐
#[derive(Debug, Clone)]
struct StoredRecord {
    key: Option<String>,
    fields: FieldMap,
}

#[derive(Default)]
struct StoreState {
    // record_type → (record_id → 记录)
    records: HashMap<String, BTreeMap<String, StoredRecord>>,
    // 保存点快照（begin_savepoint 时整表克隆）
    savepoint: Option<HashMap<String, BTreeMap<String, StoredRecord>>>,
    // 保存点内被写入的记录（提交时触发钩子）
    touched: Vec<RecordId>,
}

pub struct InMemoryRecordStore {
    state: Mutex<StoreState>,
    // 提交后钩子（缓存失效/审计信号等的显式建模）
    post_commit_hooks: Mutex<Vec<Box<dyn Fn(&RecordId) + Send + Sync>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            post_commit_hooks: Mutex::new(Vec::new()),
        }
    }

    /// 注册提交后钩子
    pub fn add_post_commit_hook<F>(&self, hook: F)
    where
        F: Fn(&RecordId) + Send + Sync + 'static,
    {
        self.post_commit_hooks
            .lock()
            .expect("钩子锁中毒")
            .push(Box::new(hook));
    }

    /// 读取单条记录的字段（测试断言用）
    pub fn get_fields(&self, record_type: &str, id: &RecordId) -> Option<FieldMap> {
        let state = self.state.lock().expect("存储锁中毒");
        state
            .records
            .get(record_type)
            .and_then(|by_id| by_id.get(id.as_str()))
            .map(|r| r.fields.clone())
    }

    fn lock_state(&self) -> ImportResult<std::sync::MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| ImportError::StoreError("存储锁中毒".to_string()))
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStoreAdapter for InMemoryRecordStore {
    async fn lookup(
        &self,
        record_type: &str,
        key: &UniqueKey,
    ) -> ImportResult<Option<RecordId>> {
        let serialized = match serialize_unique_key(key) {
            Some(s) => s,
            None => return Ok(None), // 空键无可查
        };

        let state = self.lock_state()?;
        let found = state.records.get(record_type).and_then(|by_id| {
            by_id
                .iter()
                .find(|(_, record)| record.key.as_deref() == Some(serialized.as_str()))
                .map(|(id, _)| RecordId::from(id.as_str()))
        });
        Ok(found)
    }

    async fn create(
        &self,
        record_type: &str,
        key: &UniqueKey,
        fields: &FieldMap,
    ) -> ImportResult<RecordId> {
        let serialized = serialize_unique_key(key);
        let id = RecordId(uuid::Uuid::new_v4().to_string());

        let mut state = self.lock_state()?;
        let by_id = state.records.entry(record_type.to_string()).or_default();

        // 唯一键冲突按存储层约束错误处理（对齐 SQLite UNIQUE 约束行为）
        if let Some(s) = &serialized {
            if by_id.values().any(|r| r.key.as_deref() == Some(s.as_str())) {
                return Err(ImportError::StoreError(format!(
                    "唯一键冲突: {} ({})",
                    s, record_type
                )));
            }
        }

        by_id.insert(
            id.0.clone(),
            StoredRecord {
                key: serialized,
                fields: fields.clone(),
            },
        );
        state.touched.push(id.clone());
        Ok(id)
    }

    async fn update(
        &self,
        record_type: &str,
        id: &RecordId,
        fields: &FieldMap,
    ) -> ImportResult<RecordId> {
        let mut state = self.lock_state()?;
        let record = state
            .records
            .get_mut(record_type)
            .and_then(|by_id| by_id.get_mut(id.as_str()))
            .ok_or_else(|| {
                ImportError::StoreError(format!("记录不存在: {} ({})", id, record_type))
            })?;

        // 字段级合并：仅覆盖提供的字段
        for (name, value) in fields {
            record.fields.insert(name.clone(), value.clone());
        }
        state.touched.push(id.clone());
        Ok(id.clone())
    }

    async fn count(&self, record_type: &str) -> ImportResult<usize> {
        let state = self.lock_state()?;
        Ok(state.records.get(record_type).map_or(0, |m| m.len()))
    }

    async fn dump_all(&self, record_type: &str) -> ImportResult<String> {
        let state = self.lock_state()?;
        let records: Vec<serde_json::Value> = state
            .records
            .get(record_type)
            .map(|by_id| {
                by_id
                    .iter()
                    .map(|(id, record)| {
                        serde_json::json!({
                            "record_id": id,
                            "unique_key": record.key,
                            "fields": record.fields,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(serde_json::to_string(&records)?)
    }

    async fn begin_savepoint(&self) -> ImportResult<()> {
        let mut state = self.lock_state()?;
        if state.savepoint.is_some() {
            return Err(ImportError::StoreTransactionError(
                "保存点已存在，单次运行仅允许一个".to_string(),
            ));
        }
        state.savepoint = Some(state.records.clone());
        state.touched.clear();
        Ok(())
    }

    async fn commit_savepoint(&self) -> ImportResult<()> {
        let touched = {
            let mut state = self.lock_state()?;
            state.savepoint = None;
            std::mem::take(&mut state.touched)
        };

        // 提交后钩子：适配器职责，导入器核心不触发
        let hooks = self
            .post_commit_hooks
            .lock()
            .map_err(|_| ImportError::StoreError("钩子锁中毒".to_string()))?;
        for id in &touched {
            for hook in hooks.iter() {
                hook(id);
            }
        }
        Ok(())
    }

    async fn rollback_savepoint(&self) -> ImportResult<()> {
        let mut state = self.lock_state()?;
        let snapshot = state.savepoint.take().ok_or_else(|| {
            ImportError::StoreTransactionError("不存在可回滚的保存点".to_string())
        })?;
        state.records = snapshot;
        state.touched.clear();
        Ok(())
    }
}

// ==========================================
// 批量表格数据导入引擎 - 字段映射配置
// ==========================================
// 职责: 规范字段 → {必填, 唯一键, 校验器, 默认值} 的不可变输入
// 红线: 由调用方提供，引擎不修改
// ==========================================

use crate::domain::types::FieldValue;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::validator::FieldValidator;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

// ==========================================
// FieldSpec - 单字段配置
// ==========================================
#[derive(Clone)]
pub struct FieldSpec {
    pub required: bool,                              // 必填（失败则整行失败）
    pub unique_key: bool,                            // 唯一键成员（隐含必填语义）
    pub validator: Option<Arc<dyn FieldValidator>>,  // 未配置时仅做必填存在性检查
    pub default: Option<FieldValue>,                 // 行缺失该字段时的默认值（已强转，不再校验）
    pub display_name: Option<String>,                // 显示名（参与表头规范化）
}

impl FieldSpec {
    pub fn new() -> Self {
        Self {
            required: false,
            unique_key: false,
            validator: None,
            default: None,
            display_name: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique_key(mut self) -> Self {
        self.unique_key = true;
        self
    }

    pub fn validator(mut self, validator: Arc<dyn FieldValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn default_value(mut self, value: FieldValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_string());
        self
    }

    /// 唯一键字段隐含必填（唯一键校验失败时无法查找，整行按失败处理）
    pub fn is_effectively_required(&self) -> bool {
        self.required || self.unique_key
    }
}

impl Default for FieldSpec {
    fn default() -> Self {
        Self::new()
    }
}

// ==========================================
// FieldMappingConfig - 一次导入的字段映射配置
// ==========================================
pub struct FieldMappingConfig {
    pub record_type: String,                 // 目标记录类型标签
    pub aliases: HashMap<String, String>,    // 源表头别名 → 规范字段名
    pub fields: BTreeMap<String, FieldSpec>, // 规范字段名 → 配置（有序）
}

impl FieldMappingConfig {
    pub fn builder(record_type: &str) -> FieldMappingConfigBuilder {
        FieldMappingConfigBuilder {
            record_type: record_type.to_string(),
            aliases: HashMap::new(),
            fields: BTreeMap::new(),
        }
    }

    /// 唯一键字段名列表（有序）
    pub fn unique_key_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, spec)| spec.unique_key)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// 必填字段名列表（含唯一键字段）
    pub fn required_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, spec)| spec.is_effectively_required())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// 配置自检（build 时调用）
    ///
    /// # 返回
    /// - Err(MappingConfigError): 空字段表等配置性错误
    fn validate(&self) -> ImportResult<()> {
        if self.fields.is_empty() {
            return Err(ImportError::MappingConfigError {
                field: "*".to_string(),
                message: "字段映射配置为空".to_string(),
            });
        }
        for (name, spec) in &self.fields {
            if spec.unique_key && spec.default.is_some() {
                return Err(ImportError::MappingConfigError {
                    field: name.clone(),
                    message: "唯一键字段不允许配置默认值".to_string(),
                });
            }
        }
        Ok(())
    }

    /// 源列完整性预检（运行前致命检查）
    ///
    /// # 参数
    /// - canonical_headers: 已规范化的源表头集合
    ///
    /// # 返回
    /// - Err(MissingRequiredColumns): 必填字段在源中完全缺列且无默认值
    pub fn check_source_columns(&self, canonical_headers: &[String]) -> ImportResult<()> {
        let missing: Vec<String> = self
            .fields
            .iter()
            .filter(|(name, spec)| {
                spec.is_effectively_required()
                    && spec.default.is_none()
                    && !canonical_headers.iter().any(|h| h == *name)
            })
            .map(|(name, _)| name.clone())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ImportError::MissingRequiredColumns { fields: missing })
        }
    }
}

// ==========================================
// FieldMappingConfigBuilder
// ==========================================
pub struct FieldMappingConfigBuilder {
    record_type: String,
    aliases: HashMap<String, String>,
    fields: BTreeMap<String, FieldSpec>,
}

impl FieldMappingConfigBuilder {
    pub fn field(mut self, name: &str, spec: FieldSpec) -> Self {
        self.fields.insert(name.to_string(), spec);
        self
    }

    pub fn alias(mut self, source_header: &str, canonical: &str) -> Self {
        self.aliases
            .insert(source_header.to_string(), canonical.to_string());
        self
    }

    /// 构建配置（panic 版，供测试与静态配置使用）
    pub fn build(self) -> FieldMappingConfig {
        self.try_build().expect("字段映射配置非法")
    }

    /// 构建配置（Result 版）
    pub fn try_build(self) -> ImportResult<FieldMappingConfig> {
        let config = FieldMappingConfig {
            record_type: self.record_type,
            aliases: self.aliases,
            fields: self.fields,
        };
        config.validate()?;
        Ok(config)
    }
}

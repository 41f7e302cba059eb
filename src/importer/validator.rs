// ==========================================
// 批量表格数据导入引擎 - 字段校验/强转器
// ==========================================
// 职责: 单字段类型化校验与强转，独立于记录存储
// 红线: 引擎不硬编码业务规则，规则由调用方经映射配置注入
// 组合方式: 命名校验器注册表（组合而非继承）
// ==========================================

use crate::domain::types::{CellValue, FieldValue, RefValue};
use crate::importer::store::ReferenceResolver;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

// ==========================================
// Coerced - 校验产物
// ==========================================
// 携带强转后的值与可选的依赖操作副作用（如"新建分类 X"）
#[derive(Debug, Clone)]
pub struct Coerced {
    pub value: FieldValue,
    pub side_effect: Option<String>,
}

impl Coerced {
    pub fn plain(value: FieldValue) -> Self {
        Self {
            value,
            side_effect: None,
        }
    }
}

// ==========================================
// FieldValidator Trait
// ==========================================
// 用途: 单字段校验接口
// 实现者: 内置校验器 + 调用方自定义校验器
pub trait FieldValidator: Send + Sync {
    /// 注册表中的校验器名称
    fn name(&self) -> &str;

    /// 校验并强转单个原始值
    ///
    /// # 参数
    /// - raw: 原始单元格值（空值由行处理器在调用前拦截）
    ///
    /// # 返回
    /// - Ok(Coerced): 强转成功
    /// - Err(String): 字段级错误信息（不携带行号，行号由行处理器补充）
    fn validate(&self, raw: &CellValue) -> Result<Coerced, String>;
}

// ==========================================
// TextValidator - 文本（TRIM，可选转大写）
// ==========================================
pub struct TextValidator {
    uppercase: bool,
}

impl TextValidator {
    pub fn new() -> Self {
        Self { uppercase: false }
    }

    pub fn uppercased() -> Self {
        Self { uppercase: true }
    }
}

impl Default for TextValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldValidator for TextValidator {
    fn name(&self) -> &str {
        "text"
    }

    fn validate(&self, raw: &CellValue) -> Result<Coerced, String> {
        let text = raw.to_display_string();
        let cleaned = if self.uppercase {
            text.to_uppercase()
        } else {
            text
        };
        Ok(Coerced::plain(FieldValue::Text(cleaned)))
    }
}

// ==========================================
// IntegerValidator - 整数
// ==========================================
pub struct IntegerValidator;

impl FieldValidator for IntegerValidator {
    fn name(&self) -> &str {
        "integer"
    }

    fn validate(&self, raw: &CellValue) -> Result<Coerced, String> {
        match raw {
            CellValue::Number(n) if n.fract() == 0.0 => {
                Ok(Coerced::plain(FieldValue::Integer(*n as i64)))
            }
            CellValue::Number(n) => Err(format!("无法解析为整数: {}", n)),
            _ => {
                let text = raw.to_display_string();
                text.parse::<i64>()
                    .map(|v| Coerced::plain(FieldValue::Integer(v)))
                    .map_err(|_| format!("无法解析为整数: {}", text))
            }
        }
    }
}

// ==========================================
// DecimalValidator - 小数（支持逗号小数分隔符）
// ==========================================
// 本地化兼容: "150,75" 与 "150.75" 强转为同一数值
pub struct DecimalValidator {
    min: Option<f64>,
    max: Option<f64>,
}

impl DecimalValidator {
    pub fn new() -> Self {
        Self {
            min: None,
            max: None,
        }
    }

    /// 非负小数（价格/数量等）
    pub fn non_negative() -> Self {
        Self {
            min: Some(0.0),
            max: None,
        }
    }

    pub fn with_range(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    /// 逗号小数分隔符预处理（仅当恰有一个逗号且无点号时替换）
    fn normalize_decimal_separator(text: &str) -> String {
        if text.matches(',').count() == 1 && !text.contains('.') {
            text.replace(',', ".")
        } else {
            text.to_string()
        }
    }
}

impl Default for DecimalValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldValidator for DecimalValidator {
    fn name(&self) -> &str {
        if self.min == Some(0.0) && self.max.is_none() {
            "non_negative_decimal"
        } else {
            "decimal"
        }
    }

    fn validate(&self, raw: &CellValue) -> Result<Coerced, String> {
        let value = match raw {
            CellValue::Number(n) => *n,
            _ => {
                let text = raw.to_display_string();
                let normalized = Self::normalize_decimal_separator(&text);
                normalized
                    .parse::<f64>()
                    .map_err(|_| format!("无法解析为小数: {}", text))?
            }
        };

        if let Some(min) = self.min {
            if value < min {
                return Err(format!("数值 {} 小于下限 {}", value, min));
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return Err(format!("数值 {} 超出上限 {}", value, max));
            }
        }

        Ok(Coerced::plain(FieldValue::Decimal(value)))
    }
}

// ==========================================
// BooleanValidator - 布尔（可注入真/假词表）
// ==========================================
// 默认词表含中英标记，调用方可注入本地化词表（如 evet/aktif）
pub struct BooleanValidator {
    truthy: Vec<String>,
    falsy: Vec<String>,
}

impl BooleanValidator {
    pub fn new() -> Self {
        Self {
            truthy: ["1", "true", "y", "yes", "是"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            falsy: ["0", "false", "n", "no", "否"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// 注入自定义词表（比较时统一小写）
    pub fn with_tokens(truthy: &[&str], falsy: &[&str]) -> Self {
        Self {
            truthy: truthy.iter().map(|s| s.to_lowercase()).collect(),
            falsy: falsy.iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    /// 在默认词表上追加真值词（如 "evet"、"aktif"）
    pub fn with_extra_truthy(tokens: &[&str]) -> Self {
        let mut v = Self::new();
        v.truthy
            .extend(tokens.iter().map(|s| s.to_lowercase()));
        v
    }
}

impl Default for BooleanValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldValidator for BooleanValidator {
    fn name(&self) -> &str {
        "boolean"
    }

    fn validate(&self, raw: &CellValue) -> Result<Coerced, String> {
        if let CellValue::Boolean(b) = raw {
            return Ok(Coerced::plain(FieldValue::Boolean(*b)));
        }

        let text = raw.to_display_string().to_lowercase();
        if self.truthy.iter().any(|t| t == &text) {
            Ok(Coerced::plain(FieldValue::Boolean(true)))
        } else if self.falsy.iter().any(|t| t == &text) {
            Ok(Coerced::plain(FieldValue::Boolean(false)))
        } else {
            Err(format!("无法解析为布尔值: {}", text))
        }
    }
}

// ==========================================
// DateValidator - 日期（多格式回退）
// ==========================================
// 格式链: YYYYMMDD → YYYY-MM-DD → DD.MM.YYYY
pub struct DateValidator;

impl FieldValidator for DateValidator {
    fn name(&self) -> &str {
        "date"
    }

    fn validate(&self, raw: &CellValue) -> Result<Coerced, String> {
        let text = raw.to_display_string();
        NaiveDate::parse_from_str(&text, "%Y%m%d")
            .or_else(|_| NaiveDate::parse_from_str(&text, "%Y-%m-%d"))
            .or_else(|_| NaiveDate::parse_from_str(&text, "%d.%m.%Y"))
            .map(|d| Coerced::plain(FieldValue::Date(d)))
            .map_err(|_| format!("日期格式错误: {}", text))
    }
}

// ==========================================
// DateTimeValidator - 日期时间（多格式回退）
// ==========================================
pub struct DateTimeValidator;

impl FieldValidator for DateTimeValidator {
    fn name(&self) -> &str {
        "datetime"
    }

    fn validate(&self, raw: &CellValue) -> Result<Coerced, String> {
        let text = raw.to_display_string();

        if let Ok(dt) = DateTime::parse_from_rfc3339(&text) {
            return Ok(Coerced::plain(FieldValue::DateTime(
                dt.with_timezone(&Utc),
            )));
        }

        let naive = NaiveDateTime::parse_from_str(&text, "%Y%m%d%H%M%S")
            .or_else(|_| NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S"))
            .map_err(|_| format!("日期时间格式错误: {}", text))?;

        Ok(Coerced::plain(FieldValue::DateTime(
            DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc),
        )))
    }
}

// ==========================================
// ReferenceValidator - 外键引用（解析或按需新建）
// ==========================================
// 产物为显式 Resolved 引用；解析器新建目标时记录副作用
pub struct ReferenceValidator {
    resolver: Arc<dyn ReferenceResolver>,
}

impl ReferenceValidator {
    pub fn new(resolver: Arc<dyn ReferenceResolver>) -> Self {
        Self { resolver }
    }
}

impl FieldValidator for ReferenceValidator {
    fn name(&self) -> &str {
        "reference"
    }

    fn validate(&self, raw: &CellValue) -> Result<Coerced, String> {
        let text = raw.to_display_string();
        let (record_id, side_effect) = self.resolver.resolve(&text)?;
        Ok(Coerced {
            value: FieldValue::Reference(RefValue::Resolved(record_id)),
            side_effect,
        })
    }
}

// ==========================================
// ValidatorRegistry - 命名校验器注册表
// ==========================================
// 用途: 映射配置按名称引用校验器，调用方可注册自定义规则
pub struct ValidatorRegistry {
    validators: HashMap<String, Arc<dyn FieldValidator>>,
}

impl ValidatorRegistry {
    /// 空注册表
    pub fn new() -> Self {
        Self {
            validators: HashMap::new(),
        }
    }

    /// 含全部内置校验器的注册表
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TextValidator::new()));
        registry.register(Arc::new(IntegerValidator));
        registry.register(Arc::new(DecimalValidator::new()));
        registry.register(Arc::new(DecimalValidator::non_negative()));
        registry.register(Arc::new(BooleanValidator::new()));
        registry.register(Arc::new(DateValidator));
        registry.register(Arc::new(DateTimeValidator));
        registry
    }

    /// 注册校验器（同名覆盖）
    pub fn register(&mut self, validator: Arc<dyn FieldValidator>) {
        self.validators
            .insert(validator.name().to_string(), validator);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn FieldValidator>> {
        self.validators.get(name).cloned()
    }
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_comma_separator() {
        let validator = DecimalValidator::new();
        let comma = validator
            .validate(&CellValue::Text("150,75".to_string()))
            .unwrap();
        let dot = validator
            .validate(&CellValue::Text("150.75".to_string()))
            .unwrap();
        assert_eq!(comma.value, dot.value);
        assert_eq!(comma.value, FieldValue::Decimal(150.75));
    }

    #[test]
    fn test_decimal_invalid_text() {
        let validator = DecimalValidator::new();
        assert!(validator
            .validate(&CellValue::Text("abc".to_string()))
            .is_err());
    }

    #[test]
    fn test_non_negative_decimal() {
        let validator = DecimalValidator::non_negative();
        assert!(validator.validate(&CellValue::Number(-1.0)).is_err());
        assert!(validator.validate(&CellValue::Number(0.0)).is_ok());
    }

    #[test]
    fn test_boolean_default_tokens() {
        let validator = BooleanValidator::new();
        let truthy = validator
            .validate(&CellValue::Text("是".to_string()))
            .unwrap();
        assert_eq!(truthy.value, FieldValue::Boolean(true));

        let falsy = validator
            .validate(&CellValue::Text("NO".to_string()))
            .unwrap();
        assert_eq!(falsy.value, FieldValue::Boolean(false));
    }

    #[test]
    fn test_boolean_injected_tokens() {
        // 调用方注入本地化词表
        let validator = BooleanValidator::with_extra_truthy(&["evet", "aktif"]);
        let coerced = validator
            .validate(&CellValue::Text("Evet".to_string()))
            .unwrap();
        assert_eq!(coerced.value, FieldValue::Boolean(true));
    }

    #[test]
    fn test_boolean_native_cell() {
        let validator = BooleanValidator::new();
        let coerced = validator.validate(&CellValue::Boolean(true)).unwrap();
        assert_eq!(coerced.value, FieldValue::Boolean(true));
    }

    #[test]
    fn test_date_formats() {
        let validator = DateValidator;
        let expected = FieldValue::Date(NaiveDate::from_ymd_opt(2025, 1, 20).unwrap());
        for text in ["20250120", "2025-01-20", "20.01.2025"] {
            let coerced = validator
                .validate(&CellValue::Text(text.to_string()))
                .unwrap();
            assert_eq!(coerced.value, expected, "格式: {}", text);
        }
    }

    #[test]
    fn test_integer_from_excel_number() {
        let validator = IntegerValidator;
        let coerced = validator.validate(&CellValue::Number(42.0)).unwrap();
        assert_eq!(coerced.value, FieldValue::Integer(42));
        assert!(validator.validate(&CellValue::Number(1.5)).is_err());
    }

    #[test]
    fn test_registry_builtins() {
        let registry = ValidatorRegistry::with_builtins();
        assert!(registry.get("decimal").is_some());
        assert!(registry.get("non_negative_decimal").is_some());
        assert!(registry.get("boolean").is_some());
        assert!(registry.get("nonexistent").is_none());
    }
}

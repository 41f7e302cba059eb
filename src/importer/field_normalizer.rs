// ==========================================
// 批量表格数据导入引擎 - 字段名规范化器
// ==========================================
// 职责: 任意表头 → 规范字段名
// 解析顺序: 精确别名 → 大小写不敏感别名 → 目标字段/显示名 → 小写下划线回退
// 红线: 永不失败，总是返回某个字符串（是否真实字段由行处理器判定）
// ==========================================

use crate::domain::types::CellValue;
use crate::importer::mapping::FieldMappingConfig;
use std::collections::HashMap;

pub struct FieldNormalizer<'a> {
    mapping: &'a FieldMappingConfig,
    // 小写别名 → 规范字段名（构造时预计算）
    lower_aliases: HashMap<String, String>,
    // 小写规范字段/显示名 → 规范字段名
    lower_fields: HashMap<String, String>,
}

impl<'a> FieldNormalizer<'a> {
    pub fn new(mapping: &'a FieldMappingConfig) -> Self {
        let mut lower_aliases = HashMap::new();
        for (alias, canonical) in &mapping.aliases {
            lower_aliases.insert(alias.to_lowercase(), canonical.clone());
        }

        let mut lower_fields = HashMap::new();
        for (canonical, spec) in &mapping.fields {
            lower_fields.insert(canonical.to_lowercase(), canonical.clone());
            if let Some(display) = &spec.display_name {
                lower_fields.insert(display.to_lowercase(), canonical.clone());
            }
        }

        Self {
            mapping,
            lower_aliases,
            lower_fields,
        }
    }

    /// 规范化单个表头
    ///
    /// # 参数
    /// - source_header: 源文件列名（任意大小写/空格）
    ///
    /// # 返回
    /// - 规范字段名（可能不对应任何已配置字段，调用方自行判定）
    pub fn normalize(&self, source_header: &str) -> String {
        let trimmed = source_header.trim();

        // (a) 精确别名匹配
        if let Some(canonical) = self.mapping.aliases.get(trimmed) {
            return canonical.clone();
        }

        // (b) 大小写不敏感别名匹配
        if let Some(canonical) = self.lower_aliases.get(&trimmed.to_lowercase()) {
            return canonical.clone();
        }

        // (c) 大小写不敏感匹配目标字段名/显示名
        if let Some(canonical) = self.lower_fields.get(&trimmed.to_lowercase()) {
            return canonical.clone();
        }

        // (d) 回退: 小写 + 空格转下划线
        trimmed.to_lowercase().replace(' ', "_")
    }

    /// 规范化整行的列名
    ///
    /// # 说明
    /// - 两个源列规范化到同一字段时，后出现的列覆盖先出现的列
    ///   （保持源系统的既有语义，文档化行为而非缺陷）
    pub fn normalize_row(&self, cells: &[(String, CellValue)]) -> HashMap<String, CellValue> {
        let mut normalized = HashMap::with_capacity(cells.len());
        for (header, value) in cells {
            normalized.insert(self.normalize(header), value.clone());
        }
        normalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::mapping::{FieldMappingConfig, FieldSpec};

    fn test_mapping() -> FieldMappingConfig {
        FieldMappingConfig::builder("product")
            .field("name", FieldSpec::new().required().display_name("产品名称"))
            .field("price", FieldSpec::new())
            .field("stock_count", FieldSpec::new())
            .alias("Ürün Adı", "name")
            .alias("单价", "price")
            .build()
    }

    #[test]
    fn test_exact_alias_wins() {
        let mapping = test_mapping();
        let normalizer = FieldNormalizer::new(&mapping);
        assert_eq!(normalizer.normalize("Ürün Adı"), "name");
        assert_eq!(normalizer.normalize("单价"), "price");
    }

    #[test]
    fn test_case_insensitive_alias() {
        let mapping = test_mapping();
        let normalizer = FieldNormalizer::new(&mapping);
        assert_eq!(normalizer.normalize("ÜRÜN ADı".to_lowercase().as_str()), "name");
    }

    #[test]
    fn test_field_and_display_name_match() {
        let mapping = test_mapping();
        let normalizer = FieldNormalizer::new(&mapping);
        assert_eq!(normalizer.normalize("NAME"), "name");
        assert_eq!(normalizer.normalize("产品名称"), "name");
        assert_eq!(normalizer.normalize("Stock_Count"), "stock_count");
    }

    #[test]
    fn test_fallback_lowercase_underscore() {
        let mapping = test_mapping();
        let normalizer = FieldNormalizer::new(&mapping);
        // 未配置的列也返回字符串，不失败
        assert_eq!(normalizer.normalize("Some Unknown Column"), "some_unknown_column");
    }

    #[test]
    fn test_duplicate_headers_last_wins() {
        let mapping = test_mapping();
        let normalizer = FieldNormalizer::new(&mapping);
        let cells = vec![
            ("Name".to_string(), CellValue::Text("first".to_string())),
            ("NAME".to_string(), CellValue::Text("second".to_string())),
        ];
        let row = normalizer.normalize_row(&cells);
        assert_eq!(row.get("name"), Some(&CellValue::Text("second".to_string())));
    }
}

// ==========================================
// 批量表格数据导入引擎 - 基础类型
// ==========================================
// 职责: 定义导入管道的标签联合类型与状态枚举
// 红线: 类型层不包含业务规则，只做数据表示
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// TaskStatus - 导入任务生命周期状态
// ==========================================
// 状态机: Pending → Processing → {Completed, Failed, Partial, Cancelled}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,    // 已创建，尚未开始处理
    Processing, // 正在处理
    Completed,  // 全部行成功
    Failed,     // 配置错误 / 阈值超限 / 全部行失败
    Partial,    // 部分行成功
    Cancelled,  // 协作式取消（块边界生效）
}

impl TaskStatus {
    /// 数据库存储用的全大写字符串（与枚举序列化格式统一）
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Partial => "PARTIAL",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }

    /// 从数据库字符串解析（未知值回退为 FAILED）
    pub fn parse(raw: &str) -> TaskStatus {
        match raw.trim() {
            "PENDING" => TaskStatus::Pending,
            "PROCESSING" => TaskStatus::Processing,
            "COMPLETED" => TaskStatus::Completed,
            "PARTIAL" => TaskStatus::Partial,
            "CANCELLED" => TaskStatus::Cancelled,
            _ => TaskStatus::Failed,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// RowStatus - 单行处理结果状态
// ==========================================
// 每行终态唯一，行内不重试
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowStatus {
    Created, // 新建记录
    Updated, // 更新已有记录
    Partial, // 必填字段全部成功，部分可选字段失败，已落库
    Failed,  // 必填字段失败或落库异常，未落库
    Skipped, // 行被跳过（空行等）
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Created => "CREATED",
            RowStatus::Updated => "UPDATED",
            RowStatus::Partial => "PARTIAL",
            RowStatus::Failed => "FAILED",
            RowStatus::Skipped => "SKIPPED",
        }
    }

    pub fn parse(raw: &str) -> RowStatus {
        match raw.trim() {
            "CREATED" => RowStatus::Created,
            "UPDATED" => RowStatus::Updated,
            "PARTIAL" => RowStatus::Partial,
            "SKIPPED" => RowStatus::Skipped,
            _ => RowStatus::Failed,
        }
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// CellValue - 原始单元格值（标签联合）
// ==========================================
// 用途: 源文件读取层产出，校验器消费
// 说明: 替代源系统的动态字典行，未知列保持可容忍
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum CellValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    Empty,
}

impl CellValue {
    /// 是否空值（Empty 或纯空白文本）
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// 转为展示用字符串（校验错误信息、回退解析均使用此口径）
    pub fn to_display_string(&self) -> String {
        match self {
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => {
                // Excel 常把整数读成 f64，整数值不带小数尾巴
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Boolean(b) => b.to_string(),
            CellValue::Empty => String::new(),
        }
    }
}

// ==========================================
// RecordId - 记录存储返回的记录标识
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

// ==========================================
// RefValue - 外键引用值（显式标签联合）
// ==========================================
// 用途: 区分"待解析的原始标量"与"已解析的记录引用"
// 红线: 不做隐式属性探测，解析状态必须显式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value")]
pub enum RefValue {
    Raw(String),        // 原始标量，尚未在存储中解析
    Resolved(RecordId), // 已解析的记录引用
}

// ==========================================
// FieldValue - 校验/强转后的类型化字段值
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Date(chrono::NaiveDate),
    DateTime(chrono::DateTime<chrono::Utc>),
    Reference(RefValue),
}

impl FieldValue {
    /// 作为唯一键组成部分的规范化字符串
    ///
    /// # 说明
    /// - 唯一键查找以字符串口径拼接，与具体存储实现无关
    pub fn key_repr(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Decimal(d) => d.to_string(),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            FieldValue::DateTime(dt) => dt.to_rfc3339(),
            FieldValue::Reference(RefValue::Raw(s)) => s.clone(),
            FieldValue::Reference(RefValue::Resolved(id)) => id.0.clone(),
        }
    }
}

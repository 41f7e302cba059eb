// ==========================================
// 批量表格数据导入引擎 - 行数据源
// ==========================================
// 职责: 文件解析 → 带行号的原始单元格行，按块供给引擎
// 支持格式: .csv（流式）、.xlsx/.xls（calamine 全量加载）、内存行（测试）
// 红线: 源层不做字段语义判断，空行照常产出，由行处理器决定跳过
// ==========================================

use crate::domain::types::CellValue;
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Data, Reader};
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::path::Path;

// ==========================================
// RawRow - 原始数据行
// ==========================================
#[derive(Debug, Clone)]
pub struct RawRow {
    pub row_number: usize,                  // 数据行序号（不含表头，从 1 开始）
    pub cells: Vec<(String, CellValue)>,    // (源表头, 原始值)，保持源列顺序
}

impl RawRow {
    /// 整行是否为空（全部单元格为空值）
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, value)| value.is_empty())
    }
}

// ==========================================
// RowSource Trait
// ==========================================
// 用途: 引擎的数据入口，按块拉取，支持进度总数预告
pub trait RowSource: Send {
    /// 源表头（原始列名，未规范化）
    fn headers(&self) -> &[String];

    /// 拉取下一块数据行（最多 max_rows 行，空 Vec 表示读尽）
    fn next_chunk(&mut self, max_rows: usize) -> ImportResult<Vec<RawRow>>;

    /// 数据行总数（进度上报用；流式源无法预知时返回 None）
    fn total_rows(&self) -> Option<usize>;
}

/// 按扩展名打开数据源
///
/// # 参数
/// - path: 源文件路径
///
/// # 返回
/// - Box<dyn RowSource>: .csv → CsvSource；.xlsx/.xls → ExcelSource
pub fn open_source(path: &Path) -> ImportResult<Box<dyn RowSource>> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => Ok(Box::new(CsvSource::from_path(path)?)),
        "xlsx" | "xls" => Ok(Box::new(ExcelSource::from_path(path)?)),
        _ => Err(ImportError::UnsupportedFormat(path.display().to_string())),
    }
}

// ==========================================
// CsvSource - CSV 数据源（流式）
// ==========================================
// 总数预告: 构造时对文件做一次计数扫描
pub struct CsvSource {
    reader: csv::Reader<File>,
    headers: Vec<String>,
    total: usize,
    next_row_number: usize,
}

impl CsvSource {
    pub fn from_path(path: &Path) -> ImportResult<Self> {
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }

        // 第一遍: 计数扫描（进度总数）
        let mut counter = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_path(path)?;
        let total = counter.records().count();

        // 第二遍: 正式读取
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_path(path)?;
        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        Ok(Self {
            reader,
            headers,
            total,
            next_row_number: 1,
        })
    }
}

impl RowSource for CsvSource {
    fn headers(&self) -> &[String] {
        &self.headers
    }

    fn next_chunk(&mut self, max_rows: usize) -> ImportResult<Vec<RawRow>> {
        let mut rows = Vec::with_capacity(max_rows.min(64));

        for record in self.reader.records().take(max_rows) {
            let record = record?;
            let cells = self
                .headers
                .iter()
                .enumerate()
                .map(|(i, header)| {
                    // flexible 模式下短行缺失的列按空值补齐
                    let value = match record.get(i) {
                        Some(s) if !s.trim().is_empty() => CellValue::Text(s.to_string()),
                        _ => CellValue::Empty,
                    };
                    (header.clone(), value)
                })
                .collect();

            rows.push(RawRow {
                row_number: self.next_row_number,
                cells,
            });
            self.next_row_number += 1;
        }

        Ok(rows)
    }

    fn total_rows(&self) -> Option<usize> {
        Some(self.total)
    }
}

// ==========================================
// ExcelSource - Excel 数据源（calamine）
// ==========================================
// 读取首个工作表，构造时全量加载
pub struct ExcelSource {
    headers: Vec<String>,
    rows: Vec<Vec<CellValue>>,
    cursor: usize,
}

impl ExcelSource {
    pub fn from_path(path: &Path) -> ImportResult<Self> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| ImportError::ExcelParseError(e.to_string()))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ImportError::ExcelParseError("工作簿中无工作表".to_string()))?
            .map_err(|e| ImportError::ExcelParseError(e.to_string()))?;

        let mut iter = range.rows();
        let headers: Vec<String> = iter
            .next()
            .ok_or_else(|| ImportError::ExcelParseError("工作表为空，缺少表头行".to_string()))?
            .iter()
            .map(|cell| Self::convert_cell(cell).to_display_string())
            .collect();

        let rows = iter
            .map(|row| {
                (0..headers.len())
                    .map(|i| row.get(i).map(Self::convert_cell).unwrap_or(CellValue::Empty))
                    .collect()
            })
            .collect();

        Ok(Self {
            headers,
            rows,
            cursor: 0,
        })
    }

    /// calamine 单元格 → 原始值
    fn convert_cell(cell: &Data) -> CellValue {
        match cell {
            Data::String(s) => {
                if s.trim().is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::Text(s.to_string())
                }
            }
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Boolean(*b),
            Data::DateTime(dt) => match dt.as_datetime() {
                Some(naive) => CellValue::Text(naive.format("%Y-%m-%d %H:%M:%S").to_string()),
                None => CellValue::Number(dt.as_f64()),
            },
            Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.to_string()),
            Data::Error(_) | Data::Empty => CellValue::Empty,
        }
    }
}

impl RowSource for ExcelSource {
    fn headers(&self) -> &[String] {
        &self.headers
    }

    fn next_chunk(&mut self, max_rows: usize) -> ImportResult<Vec<RawRow>> {
        let end = (self.cursor + max_rows).min(self.rows.len());
        let chunk = self.rows[self.cursor..end]
            .iter()
            .enumerate()
            .map(|(offset, values)| RawRow {
                row_number: self.cursor + offset + 1,
                cells: self
                    .headers
                    .iter()
                    .cloned()
                    .zip(values.iter().cloned())
                    .collect(),
            })
            .collect();
        self.cursor = end;
        Ok(chunk)
    }

    fn total_rows(&self) -> Option<usize> {
        Some(self.rows.len())
    }
}

// ==========================================
// VecSource - 内存数据源
// ==========================================
// 用途: 单元/集成测试、程序内构造的导入数据
pub struct VecSource {
    headers: Vec<String>,
    rows: Vec<Vec<CellValue>>,
    cursor: usize,
}

impl VecSource {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            headers,
            rows,
            cursor: 0,
        }
    }

    /// 全文本行的便捷构造（空字符串视为空值）
    pub fn from_text_rows(headers: &[&str], rows: &[&[&str]]) -> Self {
        Self::new(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| {
                    row.iter()
                        .map(|cell| {
                            if cell.trim().is_empty() {
                                CellValue::Empty
                            } else {
                                CellValue::Text(cell.to_string())
                            }
                        })
                        .collect()
                })
                .collect(),
        )
    }
}

impl RowSource for VecSource {
    fn headers(&self) -> &[String] {
        &self.headers
    }

    fn next_chunk(&mut self, max_rows: usize) -> ImportResult<Vec<RawRow>> {
        let end = (self.cursor + max_rows).min(self.rows.len());
        let chunk = self.rows[self.cursor..end]
            .iter()
            .enumerate()
            .map(|(offset, values)| RawRow {
                row_number: self.cursor + offset + 1,
                cells: self
                    .headers
                    .iter()
                    .enumerate()
                    .map(|(i, header)| {
                        (
                            header.clone(),
                            values.get(i).cloned().unwrap_or(CellValue::Empty),
                        )
                    })
                    .collect(),
            })
            .collect();
        self.cursor = end;
        Ok(chunk)
    }

    fn total_rows(&self) -> Option<usize> {
        Some(self.rows.len())
    }
}

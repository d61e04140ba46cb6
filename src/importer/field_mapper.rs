// ==========================================
// 生产看板导入系统 - 行映射器
// ==========================================
// 职责: 表头 → HeaderMap（每次运行解析一次），原始行 → 记录候选
// 规则:
// - 标签匹配忽略大小写、折叠空白；同一标签重复出现时取最左一列
// - 任一必填字段无法解析 → 整次运行失败，并一次性列出所有缺失字段
// - 所有单元格为空的行静默跳过（不计入有效/拒绝）
// ==========================================

use crate::domain::record::FieldValue;
use crate::importer::cell_coercion::{coerce, coerce_date, CoercedCell};
use crate::importer::error::{ImportError, ImportOutcome};
use crate::importer::file_parser::Cell;
use crate::importer::layout::{normalize_label, DateColumnBlock, ImportLayout};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use tracing::debug;

// 表头里的数值只在 1990-01-01 ..= 2100-01-01 的序列号范围内按日期解释
const HEADER_SERIAL_RANGE: RangeInclusive<f64> = 32_874.0..=73_051.0;

// ==========================================
// HeaderMap - 规范字段 → 列下标（不可变值）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMap {
    columns: BTreeMap<&'static str, usize>,
    /// 宽表日期列: (列下标, 日期)，按列顺序
    date_columns: Vec<(usize, NaiveDate)>,
}

impl HeaderMap {
    /// 按标签解析表头
    ///
    /// # 错误
    /// - UnresolvedRequiredColumn: 列出全部缺失的必填字段（宽表无日期列时含 "date"）
    pub fn resolve(layout: &ImportLayout, sheet_name: &str, header: &[Cell]) -> ImportOutcome<Self> {
        let labels: Vec<Option<String>> = header
            .iter()
            .map(|cell| cell.label().map(|l| normalize_label(&l)))
            .collect();

        let mut columns = BTreeMap::new();
        let mut claimed = BTreeSet::new();
        let mut missing = Vec::new();

        for field in layout.fields {
            let found = labels.iter().enumerate().find(|(idx, label)| {
                !claimed.contains(idx)
                    && label.as_deref().is_some_and(|l| field.matches(l))
            });
            match found {
                Some((idx, _)) => {
                    claimed.insert(idx);
                    columns.insert(field.name, idx);
                }
                None if field.required => missing.push(field.name.to_string()),
                None => {}
            }
        }

        let date_columns = match layout.date_block {
            Some(block) => {
                let after = columns.values().max().map(|c| c + 1).unwrap_or(0);
                let found: Vec<(usize, NaiveDate)> = header
                    .iter()
                    .enumerate()
                    .skip(after)
                    .filter(|(idx, _)| !claimed.contains(idx))
                    .filter_map(|(idx, cell)| header_date(cell).map(|d| (idx, d)))
                    .collect();
                if found.is_empty() {
                    missing.push(block.date_field.to_string());
                }
                found
            }
            None => Vec::new(),
        };

        if !missing.is_empty() {
            return Err(ImportError::UnresolvedRequiredColumn {
                sheet: sheet_name.to_string(),
                missing,
            });
        }

        debug!(
            kind = %layout.kind,
            columns = ?columns,
            date_columns = date_columns.len(),
            "HeaderMap 已解析"
        );
        Ok(Self {
            columns,
            date_columns,
        })
    }

    pub fn column(&self, field: &str) -> Option<usize> {
        self.columns.get(field).copied()
    }

    pub fn date_columns(&self) -> &[(usize, NaiveDate)] {
        &self.date_columns
    }
}

/// 宽表表头单元格 → 日期列的日期
fn header_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Number(n) if !HEADER_SERIAL_RANGE.contains(n) => None,
        other => coerce_date(other).ok(),
    }
}

// ==========================================
// RecordCandidate - 已转换类型、尚未校验的候选记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCandidate {
    pub row_number: usize,
    pub cells: BTreeMap<&'static str, CoercedCell>,
}

impl RecordCandidate {
    pub fn get(&self, field: &str) -> &CoercedCell {
        self.cells.get(field).unwrap_or(&CoercedCell::Blank)
    }
}

// ==========================================
// RowMapper
// ==========================================
pub struct RowMapper<'a> {
    layout: &'a ImportLayout,
    header_map: &'a HeaderMap,
}

impl<'a> RowMapper<'a> {
    pub fn new(layout: &'a ImportLayout, header_map: &'a HeaderMap) -> Self {
        Self { layout, header_map }
    }

    /// 映射一行
    ///
    /// # 返回
    /// - 空 Vec: 空白行（或宽表中所有日期列都为空）
    /// - 普通布局: 一个候选
    /// - 宽表: 每个非空日期单元格一个候选，行号相同
    pub fn map_row(&self, row_number: usize, row: &[Cell]) -> Vec<RecordCandidate> {
        if row.iter().all(Cell::is_blank) {
            return Vec::new();
        }

        let mut base = BTreeMap::new();
        for field in self.layout.fields {
            let cell = self
                .header_map
                .column(field.name)
                .and_then(|idx| row.get(idx))
                .unwrap_or(&Cell::Empty);
            base.insert(field.name, coerce(cell, field.ty, field.key));
        }

        match self.layout.date_block {
            None => vec![RecordCandidate {
                row_number,
                cells: base,
            }],
            Some(block) => self.expand_date_columns(row_number, row, base, block),
        }
    }

    fn expand_date_columns(
        &self,
        row_number: usize,
        row: &[Cell],
        base: BTreeMap<&'static str, CoercedCell>,
        block: DateColumnBlock,
    ) -> Vec<RecordCandidate> {
        self.header_map
            .date_columns()
            .iter()
            .filter_map(|(idx, date)| {
                let cell = row.get(*idx).unwrap_or(&Cell::Empty);
                if cell.is_blank() {
                    return None;
                }
                let mut cells = base.clone();
                cells.insert(block.date_field, CoercedCell::Value(FieldValue::Date(*date)));
                cells.insert(block.value_field, coerce(cell, block.value_ty, false));
                Some(RecordCandidate { row_number, cells })
            })
            .collect()
    }
}

// ==========================================
// 生产看板导入系统 - 单元格类型转换
// ==========================================
// 职责: 每种语义类型一个转换函数，返回类型化结果或类型化失败
// 红线: 未转换的原始值不得流入校验器
// ==========================================

use crate::domain::record::{FieldValue, Fixed4};
use crate::importer::file_parser::{excel_serial_to_date, Cell, SERIAL_MAX};
use crate::importer::layout::SemanticType;
use chrono::{Datelike, NaiveDate};

// 数值单元格按日期解释的下限（1901-01-01）
const SERIAL_MIN: f64 = 367.0;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d", "%Y%m%d"];

/// 单元格转换结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoercedCell {
    /// 空单元格（是否允许由校验器判断）
    Blank,
    Value(FieldValue),
    /// 转换失败，附带原因
    Invalid(String),
}

/// 按语义类型转换一个单元格
///
/// - key: 逻辑键字段，文本去除首尾空白
pub fn coerce(cell: &Cell, ty: SemanticType, key: bool) -> CoercedCell {
    if cell.is_blank() {
        return CoercedCell::Blank;
    }
    let result = match ty {
        SemanticType::Date => coerce_date(cell).map(FieldValue::Date),
        SemanticType::Month => coerce_month(cell).map(FieldValue::Date),
        SemanticType::Integer => coerce_integer(cell).map(FieldValue::Integer),
        SemanticType::Decimal => coerce_decimal(cell).map(FieldValue::Decimal),
        SemanticType::Text => coerce_text(cell, key).map(FieldValue::Text),
        SemanticType::Shift | SemanticType::Position => coerce_enum(cell).map(FieldValue::Text),
    };
    match result {
        Ok(value) => CoercedCell::Value(value),
        Err(reason) => CoercedCell::Invalid(reason),
    }
}

/// 日期: 日期单元格 / Excel 序列号 / 文本（YYYY-MM-DD、YYYY.MM.DD(.)、YYYY/MM/DD、YYYYMMDD）
pub fn coerce_date(cell: &Cell) -> Result<NaiveDate, String> {
    match cell {
        Cell::Date(d) => Ok(*d),
        Cell::Number(n) if (SERIAL_MIN..=SERIAL_MAX).contains(n) => {
            excel_serial_to_date(*n).ok_or_else(|| format!("not a date: {}", n))
        }
        Cell::Text(s) => parse_date_text(s).ok_or_else(|| format!("not a date: {}", s.trim())),
        other => Err(format!("not a date: {}", describe(other))),
    }
}

fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    // 匈牙利格式常见 "2026. 10. 01." —— 去掉全部空白和末尾的点
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let compact = compact.trim_end_matches('.');
    // 带时间部分的文本只取日期
    let date_part = compact.split(['T', ' ']).next().unwrap_or(compact);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// 月份: YYYY-MM / YYYY.MM(.) / YYYY/MM，或任意日期（取当月第一天）
pub fn coerce_month(cell: &Cell) -> Result<NaiveDate, String> {
    if let Cell::Text(s) = cell {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let compact = compact.trim_end_matches('.');
        let parts: Vec<&str> = compact.split(['-', '.', '/']).collect();
        if let [year, month] = parts.as_slice() {
            if let (Ok(y), Ok(m)) = (year.parse::<i32>(), month.parse::<u32>()) {
                return NaiveDate::from_ymd_opt(y, m, 1)
                    .ok_or_else(|| format!("not a month: {}", s.trim()));
            }
        }
    }
    let date = coerce_date(cell).map_err(|_| format!("not a month: {}", describe(cell)))?;
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .ok_or_else(|| format!("not a month: {}", describe(cell)))
}

/// 整数: 数值单元格必须为整数值；文本允许空格千分位
pub fn coerce_integer(cell: &Cell) -> Result<i64, String> {
    let value = numeric_value(cell).ok_or_else(|| format!("not an integer: {}", describe(cell)))?;
    if value.fract() != 0.0 || value.abs() >= i64::MAX as f64 {
        return Err(format!("not an integer: {}", describe(cell)));
    }
    Ok(value as i64)
}

/// 小数: 固定 4 位精度，避免浮点舍入噪声
pub fn coerce_decimal(cell: &Cell) -> Result<Fixed4, String> {
    numeric_value(cell)
        .and_then(Fixed4::from_f64)
        .ok_or_else(|| format!("not a number: {}", describe(cell)))
}

/// 文本: 内容原样保留；逻辑键字段去除首尾空白
pub fn coerce_text(cell: &Cell, key: bool) -> Result<String, String> {
    let text = match cell {
        Cell::Text(s) => s.clone(),
        Cell::Number(n) => format_number(*n),
        Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
        other => return Err(format!("not text: {}", describe(other))),
    };
    Ok(if key { text.trim().to_string() } else { text })
}

/// 枚举（班次/岗位）: 去除首尾空白后的文本，是否属于允许集合由校验器判断
pub fn coerce_enum(cell: &Cell) -> Result<String, String> {
    coerce_text(cell, true)
}

fn numeric_value(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(n) => Some(*n),
        Cell::Text(s) => parse_number_text(s),
        _ => None,
    }
}

/// "1 234,5" / "1234.5" / "1\u{a0}234" → f64
fn parse_number_text(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\u{202f}')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    // 同时出现 '.' 与 ',' 时无法判断哪个是小数点
    if cleaned.contains('.') && cleaned.contains(',') {
        return None;
    }
    cleaned.replace(',', ".").parse::<f64>().ok()
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn describe(cell: &Cell) -> String {
    match cell {
        Cell::Empty => "<empty>".to_string(),
        Cell::Text(s) => s.trim().to_string(),
        Cell::Number(n) => format_number(*n),
        Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
        Cell::Bool(b) => b.to_string(),
        Cell::Error(e) => format!("#{}", e),
    }
}

// ==========================================
// 生产看板导入系统 - 文件解析器实现
// ==========================================
// 阶段 0: 工作簿字节 → Workbook（各工作表的原始单元格网格）
// 支持: Excel (.xlsx/.xls, 按文件头识别) / CSV (.csv, 单一隐式工作表)
// 红线: 这里不做任何语义解释，单元格只保留原始类型
// ==========================================

use crate::importer::error::{ImportError, ImportOutcome};
use calamine::{Data, Range, Reader, Xls, Xlsx};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use std::io::Cursor;
use tracing::debug;

// xlsx 为 zip 容器；xls 为 OLE2 复合文档
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const OLE2_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

// ==========================================
// Cell - 原始单元格
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Bool(bool),
    Error(String),
}

impl Cell {
    /// 空单元格或仅含空白的文本
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// 作为表头标签读取
    pub fn label(&self) -> Option<String> {
        match self {
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(n) => Some(n.to_string()),
            Cell::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            _ => None,
        }
    }
}

/// Excel 能表示的最大序列日期（9999-12-31）
pub const SERIAL_MAX: f64 = 2_958_465.0;

/// Excel 序列日期 → 日期（1900 日期系统，基准 1899-12-30）
///
/// 超出 1..=SERIAL_MAX 的值返回 None
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(1.0..=SERIAL_MAX).contains(&serial) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(chrono::Duration::try_days(serial.floor() as i64)?)
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::Bool(b) => Cell::Bool(*b),
            Data::DateTime(dt) => match excel_serial_to_date(dt.as_f64()) {
                Some(d) => Cell::Date(d),
                None => Cell::Number(dt.as_f64()),
            },
            Data::DateTimeIso(s) => match NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d") {
                Ok(d) => Cell::Date(d),
                Err(_) => Cell::Text(s.clone()),
            },
            Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Error(e) => Cell::Error(e.to_string()),
        }
    }
}

// ==========================================
// SheetGrid / Workbook
// ==========================================

/// 一个工作表的原始网格
#[derive(Debug, Clone)]
pub struct SheetGrid {
    pub name: String,
    /// rows[0] 在源表中的绝对行下标（从 0 开始）
    pub first_row: usize,
    pub rows: Vec<Vec<Cell>>,
}

impl SheetGrid {
    /// 源表行号（从 1 开始，与 Excel 显示一致）
    pub fn row_number(&self, offset: usize) -> usize {
        self.first_row + offset + 1
    }
}

#[derive(Debug, Clone)]
pub struct Workbook {
    pub sheets: Vec<SheetGrid>,
    /// CSV: 只有一个隐式工作表，任何工作表名都匹配它
    pub single_sheet: bool,
}

impl Workbook {
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }
}

// ==========================================
// 格式识别
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Xlsx,
    Xls,
    Csv,
}

/// 按文件头识别格式；无法识别时参考扩展名判断是否为 CSV
pub fn detect_format(bytes: &[u8], extension: Option<&str>) -> ImportOutcome<SourceFormat> {
    if bytes.starts_with(&ZIP_MAGIC) {
        return Ok(SourceFormat::Xlsx);
    }
    if bytes.starts_with(&OLE2_MAGIC) {
        return Ok(SourceFormat::Xls);
    }
    match extension {
        Some("csv") => Ok(SourceFormat::Csv),
        Some(ext) => Err(ImportError::UnsupportedFormat(ext.to_string())),
        None => Err(ImportError::UnsupportedFormat("未知".to_string())),
    }
}

// ==========================================
// 解析入口
// ==========================================

/// 工作簿字节 → Workbook
pub fn parse_workbook(bytes: &[u8], extension: Option<&str>) -> ImportOutcome<Workbook> {
    let format = detect_format(bytes, extension)?;
    debug!(format = ?format, size = bytes.len(), "解析工作簿");

    match format {
        SourceFormat::Xlsx => {
            let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec()))?;
            read_excel_sheets(&mut workbook)
        }
        SourceFormat::Xls => {
            let mut workbook: Xls<_> = Xls::new(Cursor::new(bytes.to_vec()))?;
            read_excel_sheets(&mut workbook)
        }
        SourceFormat::Csv => parse_csv(bytes),
    }
}

fn read_excel_sheets<R>(workbook: &mut R) -> ImportOutcome<Workbook>
where
    R: Reader<Cursor<Vec<u8>>>,
    ImportError: From<R::Error>,
{
    let names = workbook.sheet_names();
    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook.worksheet_range(&name)?;
        sheets.push(grid_from_range(name, &range));
    }
    Ok(Workbook {
        sheets,
        single_sheet: false,
    })
}

fn grid_from_range(name: String, range: &Range<Data>) -> SheetGrid {
    // range 的左上角不一定是 A1；列偏移补齐为空单元格，保持列位置一致
    let (first_row, first_col) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let rows = range
        .rows()
        .map(|row| {
            std::iter::repeat(Cell::Empty)
                .take(first_col)
                .chain(row.iter().map(Cell::from))
                .collect()
        })
        .collect();

    SheetGrid {
        name,
        first_row,
        rows,
    }
}

fn parse_csv(bytes: &[u8]) -> ImportOutcome<Workbook> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = ReaderBuilder::new()
        .has_headers(false) // 表头位置由定位器决定
        .flexible(true) // 允许行长度不一致
        .from_reader(bytes);

    let mut rows: Vec<Vec<Cell>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        // csv 会跳过空行；按记录起始行号补回，保持行号与源文件一致
        if let Some(pos) = record.position() {
            while (rows.len() as u64) + 1 < pos.line() {
                rows.push(Vec::new());
            }
        }
        rows.push(
            record
                .iter()
                .map(|v| {
                    if v.is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(v.to_string())
                    }
                })
                .collect(),
        );
    }

    Ok(Workbook {
        sheets: vec![SheetGrid {
            name: "csv".to_string(),
            first_row: 0,
            rows,
        }],
        single_sheet: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format_by_magic_bytes() {
        assert_eq!(
            detect_format(&[0x50, 0x4B, 0x03, 0x04, 0x00], Some("bin")).unwrap(),
            SourceFormat::Xlsx
        );
        assert_eq!(
            detect_format(&OLE2_MAGIC, None).unwrap(),
            SourceFormat::Xls
        );
        assert_eq!(detect_format(b"a,b\n", Some("csv")).unwrap(), SourceFormat::Csv);
        assert!(matches!(
            detect_format(b"%PDF-1.7", Some("pdf")),
            Err(ImportError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_csv_keeps_blank_rows_and_positions() {
        let csv = "Riport\n\nDátum,Operátor\n2026-10-01,Anna\n";
        let workbook = parse_workbook(csv.as_bytes(), Some("csv")).unwrap();
        assert!(workbook.single_sheet);

        let sheet = &workbook.sheets[0];
        assert_eq!(sheet.rows.len(), 4);
        assert!(sheet.rows[1].iter().all(Cell::is_blank));
        assert_eq!(sheet.rows[2][0], Cell::Text("Dátum".to_string()));
        assert_eq!(sheet.row_number(3), 4);
    }

    #[test]
    fn test_excel_serial_to_date() {
        // 45931 = 2025-10-01
        assert_eq!(
            excel_serial_to_date(45931.0),
            NaiveDate::from_ymd_opt(2025, 10, 1)
        );
        assert_eq!(excel_serial_to_date(-3.0), None);
        assert_eq!(excel_serial_to_date(f64::NAN), None);
        assert_eq!(excel_serial_to_date(1.0e15), None);
        assert_eq!(
            excel_serial_to_date(SERIAL_MAX),
            NaiveDate::from_ymd_opt(9999, 12, 31)
        );
    }

    #[test]
    fn test_out_of_range_date_cell_stays_number() {
        let mut book = rust_xlsxwriter::Workbook::new();
        let sheet = book.add_worksheet();
        let date_format = rust_xlsxwriter::Format::new().set_num_format("yyyy-mm-dd");
        sheet.write_string(0, 0, "Dátum").unwrap();
        sheet.write_number_with_format(1, 0, 1.0e15, &date_format).unwrap();
        sheet.write_number_with_format(2, 0, 46296.0, &date_format).unwrap();
        let bytes = book.save_to_buffer().unwrap();

        let workbook = parse_workbook(&bytes, Some("xlsx")).unwrap();
        let grid = &workbook.sheets[0];
        assert_eq!(grid.rows[1][0], Cell::Number(1.0e15));
        assert_eq!(
            grid.rows[2][0],
            Cell::Date(NaiveDate::from_ymd_opt(2026, 10, 1).unwrap())
        );
    }

    #[test]
    fn test_xlsx_offsets_are_preserved() {
        let mut book = rust_xlsxwriter::Workbook::new();
        let sheet = book.add_worksheet();
        sheet.set_name("Napi percek").unwrap();
        sheet.write_string(2, 1, "Dátum").unwrap();
        sheet.write_number(3, 1, 42.0).unwrap();
        let bytes = book.save_to_buffer().unwrap();

        let workbook = parse_workbook(&bytes, Some("xlsx")).unwrap();
        let grid = &workbook.sheets[0];
        assert_eq!(grid.name, "Napi percek");
        assert_eq!(grid.first_row, 2);
        assert_eq!(grid.rows[0][1], Cell::Text("Dátum".to_string()));
        assert_eq!(grid.rows[1][1], Cell::Number(42.0));
        assert_eq!(grid.row_number(0), 3);
    }
}

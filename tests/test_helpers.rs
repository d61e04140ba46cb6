// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、AppState 装配、xlsx/csv 测试文件生成
// ==========================================

#![allow(dead_code)]

use rust_xlsxwriter::Workbook;
use shopfloor_import::app::AppState;
use shopfloor_import::domain::{ImportSource, SourceOrigin};
use shopfloor_import::ImportKind;
use std::error::Error;
use std::path::Path;
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_string_lossy().to_string();

    let conn = rusqlite::Connection::open(&db_path)?;
    shopfloor_import::db::init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 临时数据库 + 完整装配的 AppState
pub fn create_test_state() -> (NamedTempFile, AppState) {
    let (temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let state = AppState::new(db_path).expect("Failed to create AppState");
    (temp_file, state)
}

/// 写入 global 配置
pub fn set_config(state: &AppState, key: &str, value: &str) {
    state
        .config
        .set_global_config_value(key, value)
        .expect("Failed to set config");
}

/// 上传来源（默认工作表）
pub fn upload(kind: ImportKind, file_name: &str) -> ImportSource {
    ImportSource::new(
        kind,
        SourceOrigin::Upload {
            file_name: file_name.to_string(),
        },
        "",
    )
}

// ==========================================
// xlsx 生成
// ==========================================

/// 测试单元格
#[derive(Debug, Clone)]
pub enum X {
    S(&'static str),
    N(f64),
    E,
}

/// 生成单工作表 xlsx（行列从 0 开始，与 Excel 第 1 行/A 列对应）
pub fn xlsx_bytes(sheet_name: &str, rows: &[Vec<X>]) -> Vec<u8> {
    xlsx_workbook(&[(sheet_name, rows)])
}

/// 生成多工作表 xlsx
pub fn xlsx_workbook(sheets: &[(&str, &[Vec<X>])]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    for (name, rows) in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(*name).expect("invalid sheet name");
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                match cell {
                    X::S(s) => {
                        sheet.write_string(r as u32, c as u16, *s).expect("write_string");
                    }
                    X::N(n) => {
                        sheet.write_number(r as u32, c as u16, *n).expect("write_number");
                    }
                    X::E => {}
                }
            }
        }
    }
    workbook.save_to_buffer().expect("save_to_buffer")
}

/// 每日分钟产量表: 表头在第 3 行，数据从第 4 行开始
///
/// rows: (日期, 操作员, 班次, 每分钟件数)，日期为空串表示空单元格
pub fn napi_perces_xlsx(rows: &[(&'static str, &'static str, &'static str, f64)]) -> Vec<u8> {
    let mut grid = vec![
        vec![X::S("Napi percek export"), X::E, X::E, X::E],
        vec![],
        vec![X::S("Dátum"), X::S("Operátor"), X::S("Műszak"), X::S("Db/perc")],
    ];
    for (date, operator, shift, ppm) in rows {
        let date_cell = if date.is_empty() { X::E } else { X::S(date) };
        grid.push(vec![date_cell, X::S(operator), X::S(shift), X::N(*ppm)]);
    }
    xlsx_bytes("Napi percek", &grid)
}

/// 写入文件（用于 FilePath 来源与在线数据源）
pub fn write_file(path: &Path, bytes: &[u8]) {
    std::fs::write(path, bytes).expect("Failed to write test file");
}

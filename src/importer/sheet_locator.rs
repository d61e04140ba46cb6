// ==========================================
// 生产看板导入系统 - 工作表定位器
// ==========================================
// 职责: 按配置的工作表名找到工作表，在扫描窗口内定位表头行
// 规则: 第一行"命中必填标签比例 ≥ 阈值"的行即表头
// 副作用: 无（纯读取）
// ==========================================

use crate::importer::error::{ImportError, ImportOutcome};
use crate::importer::file_parser::{Cell, SheetGrid, Workbook};
use crate::importer::layout::{normalize_label, ImportLayout};
use tracing::debug;

/// 表头定位规则
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeaderRule {
    /// 扫描窗口: 工作表前 N 行
    pub scan_rows: usize,
    /// 必填标签命中比例阈值（0.0 ~ 1.0）
    pub threshold: f64,
}

impl Default for HeaderRule {
    fn default() -> Self {
        Self {
            scan_rows: 20,
            threshold: 0.8,
        }
    }
}

/// 定位结果: 表头行 + 其下的原始数据行
#[derive(Debug, Clone, Copy)]
pub struct LocatedSheet<'a> {
    pub grid: &'a SheetGrid,
    /// 表头在 grid.rows 中的下标
    pub header_index: usize,
}

impl<'a> LocatedSheet<'a> {
    pub fn sheet_name(&self) -> &str {
        &self.grid.name
    }

    pub fn header(&self) -> &'a [Cell] {
        &self.grid.rows[self.header_index]
    }

    /// 表头行号（从 1 开始）
    pub fn header_row_number(&self) -> usize {
        self.grid.row_number(self.header_index)
    }

    /// 表头下方的数据行: (源表行号, 单元格)
    pub fn data_rows(&self) -> impl Iterator<Item = (usize, &'a [Cell])> + 'a {
        let grid = self.grid;
        let start = self.header_index + 1;
        grid.rows
            .iter()
            .enumerate()
            .skip(start)
            .map(move |(idx, row)| (grid.row_number(idx), row.as_slice()))
    }
}

pub struct SheetLocator<'a> {
    layout: &'a ImportLayout,
    rule: HeaderRule,
}

impl<'a> SheetLocator<'a> {
    pub fn new(layout: &'a ImportLayout, rule: HeaderRule) -> Self {
        Self { layout, rule }
    }

    /// 查找工作表并定位表头
    ///
    /// # 错误
    /// - SheetNotFound: 工作表名不存在
    /// - HeaderNotFound: 扫描窗口内没有任何行达到阈值
    pub fn locate<'w>(&self, workbook: &'w Workbook, sheet_name: &str) -> ImportOutcome<LocatedSheet<'w>> {
        let grid = find_sheet(workbook, sheet_name)?;

        // 窗口按源表行号计算；grid 可能从第 first_row+1 行才开始
        let window = self.rule.scan_rows.saturating_sub(grid.first_row);
        let mut best_ratio = 0.0_f64;
        for (idx, row) in grid.rows.iter().take(window).enumerate() {
            let ratio = self.match_ratio(row);
            best_ratio = best_ratio.max(ratio);
            if ratio >= self.rule.threshold && ratio > 0.0 {
                debug!(
                    sheet = %grid.name,
                    header_row = grid.row_number(idx),
                    ratio,
                    "表头已定位"
                );
                return Ok(LocatedSheet {
                    grid,
                    header_index: idx,
                });
            }
        }

        Err(ImportError::HeaderNotFound {
            sheet: sheet_name.to_string(),
            scan_rows: self.rule.scan_rows,
            threshold: self.rule.threshold,
            best_ratio,
        })
    }

    /// 一行中命中的必填字段比例（重复/空白单元格不影响结果）
    fn match_ratio(&self, row: &[Cell]) -> f64 {
        let labels: Vec<String> = row
            .iter()
            .filter_map(Cell::label)
            .map(|l| normalize_label(&l))
            .filter(|l| !l.is_empty())
            .collect();
        if labels.is_empty() {
            return 0.0;
        }

        let required: Vec<_> = self.layout.required_fields().collect();
        if required.is_empty() {
            return 0.0;
        }
        let hit = required
            .iter()
            .filter(|field| labels.iter().any(|label| field.matches(label)))
            .count();
        hit as f64 / required.len() as f64
    }
}

fn find_sheet<'w>(workbook: &'w Workbook, sheet_name: &str) -> ImportOutcome<&'w SheetGrid> {
    if workbook.single_sheet {
        if let Some(grid) = workbook.sheets.first() {
            return Ok(grid);
        }
    }

    // 先精确匹配，再忽略大小写/首尾空白匹配
    workbook
        .sheets
        .iter()
        .find(|s| s.name == sheet_name)
        .or_else(|| {
            let wanted = normalize_label(sheet_name);
            workbook
                .sheets
                .iter()
                .find(|s| normalize_label(&s.name) == wanted)
        })
        .ok_or_else(|| ImportError::SheetNotFound {
            sheet: sheet_name.to_string(),
            available: workbook.sheet_names(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ImportKind;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn workbook(rows: Vec<Vec<Cell>>) -> Workbook {
        Workbook {
            sheets: vec![SheetGrid {
                name: "Napi percek".to_string(),
                first_row: 0,
                rows,
            }],
            single_sheet: false,
        }
    }

    fn locator() -> SheetLocator<'static> {
        SheetLocator::new(
            ImportLayout::for_kind(ImportKind::NapiPerces),
            HeaderRule::default(),
        )
    }

    #[test]
    fn test_header_after_front_matter_and_blank_rows() {
        let wb = workbook(vec![
            vec![text("Napi percek riport"), Cell::Empty],
            vec![],
            vec![text("Dátum"), text("Operátor"), text("Műszak"), text("Db/perc")],
            vec![text("2026-10-01"), text("Anna"), text("Délelőtt"), Cell::Number(1.2)],
        ]);
        let located = locator().locate(&wb, "Napi percek").unwrap();
        assert_eq!(located.header_index, 2);
        assert_eq!(located.header_row_number(), 3);
        assert_eq!(located.data_rows().count(), 1);
        assert_eq!(located.data_rows().next().unwrap().0, 4);
    }

    #[test]
    fn test_header_below_threshold_reports_best_ratio() {
        // 4 个必填中命中 3 个 = 0.75 < 0.8
        let wb = workbook(vec![vec![text("Dátum"), text("Operátor"), text("Műszak")]]);
        let err = locator().locate(&wb, "Napi percek").unwrap_err();
        match err {
            ImportError::HeaderNotFound {
                scan_rows,
                best_ratio,
                ..
            } => {
                assert_eq!(scan_rows, 20);
                assert!((best_ratio - 0.75).abs() < 1e-9);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_header_outside_scan_window() {
        let mut rows: Vec<Vec<Cell>> = (0..5).map(|_| vec![text("x")]).collect();
        rows.push(vec![text("Dátum"), text("Operátor"), text("Műszak"), text("Db/perc")]);
        let wb = workbook(rows);
        let loc = SheetLocator::new(
            ImportLayout::for_kind(ImportKind::NapiPerces),
            HeaderRule {
                scan_rows: 5,
                threshold: 0.8,
            },
        );
        assert!(matches!(
            loc.locate(&wb, "Napi percek"),
            Err(ImportError::HeaderNotFound { .. })
        ));
    }

    #[test]
    fn test_scan_window_counts_leading_empty_rows() {
        let header = vec![text("Dátum"), text("Operátor"), text("Műszak"), text("Db/perc")];
        let rule = HeaderRule {
            scan_rows: 5,
            threshold: 0.8,
        };
        let loc = SheetLocator::new(ImportLayout::for_kind(ImportKind::NapiPerces), rule);

        // 表头在第 26 行（前 25 行为空，解析后不出现在 grid 中）
        let mut wb = workbook(vec![header.clone()]);
        wb.sheets[0].first_row = 25;
        assert!(matches!(
            loc.locate(&wb, "Napi percek"),
            Err(ImportError::HeaderNotFound { .. })
        ));

        // 表头在第 5 行，仍在窗口内
        let mut wb = workbook(vec![header]);
        wb.sheets[0].first_row = 4;
        assert_eq!(loc.locate(&wb, "Napi percek").unwrap().header_row_number(), 5);
    }

    #[test]
    fn test_sheet_not_found_lists_available() {
        let wb = workbook(vec![]);
        match locator().locate(&wb, "Teljesítmény") {
            Err(ImportError::SheetNotFound { sheet, available }) => {
                assert_eq!(sheet, "Teljesítmény");
                assert_eq!(available, vec!["Napi percek".to_string()]);
            }
            other => panic!("unexpected: {:?}", other.map(|l| l.header_index)),
        }
    }

    #[test]
    fn test_csv_single_sheet_matches_any_name() {
        let mut wb = workbook(vec![vec![
            text("Dátum"),
            text("Operátor"),
            text("Műszak"),
            text("Db/perc"),
        ]]);
        wb.single_sheet = true;
        assert!(locator().locate(&wb, "bármi").is_ok());
    }
}

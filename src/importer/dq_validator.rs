// ==========================================
// 生产看板导入系统 - 数据质量校验器
// ==========================================
// 职责: 必填字段、类型转换结果、领域约束（报表期间、非负数、班次/岗位枚举）
// 规则: 行级失败只进入拒绝列表，不中断整次导入
// 输出: valid（类型化规范记录）+ rejected（行号 + 原因）
// ==========================================

use crate::domain::import::RejectedRow;
use crate::domain::record::{
    CanonicalRecord, DailyMinuteEntry, FieldValue, Fixed4, HeadcountEntry, PerformanceEntry,
    SourcedRecord,
};
use crate::domain::types::ImportKind;
use crate::importer::cell_coercion::CoercedCell;
use crate::importer::field_mapper::RecordCandidate;
use crate::importer::layout::{self, normalize_label, ImportLayout, SemanticType};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use tracing::warn;

/// 校验规则（来自配置）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationRules {
    /// 允许的班次取值（空 = 不限制）
    pub shift_values: Vec<String>,
    /// 允许的岗位取值（空 = 不限制）
    pub position_values: Vec<String>,
    /// 报表期间（闭区间）
    pub reporting_period: Option<(NaiveDate, NaiveDate)>,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub valid: Vec<SourcedRecord>,
    pub rejected: Vec<RejectedRow>,
}

pub struct DqValidator<'a> {
    layout: &'a ImportLayout,
    rules: &'a ValidationRules,
}

// 校验时逐字段检查的描述（普通字段 + 宽表日期块字段）
struct Check {
    name: &'static str,
    ty: SemanticType,
    required: bool,
}

impl<'a> DqValidator<'a> {
    pub fn new(layout: &'a ImportLayout, rules: &'a ValidationRules) -> Self {
        Self { layout, rules }
    }

    /// 批量校验，保持源表顺序
    pub fn partition(&self, candidates: impl IntoIterator<Item = RecordCandidate>) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();
        for candidate in candidates {
            match self.validate(&candidate) {
                Ok(record) => outcome.valid.push(record),
                Err(rejected) => outcome.rejected.push(rejected),
            }
        }
        outcome
    }

    /// 校验一个候选；同一行的多个问题以 "; " 合并为一个原因
    pub fn validate(&self, candidate: &RecordCandidate) -> Result<SourcedRecord, RejectedRow> {
        let mut reasons = Vec::new();
        let mut values: BTreeMap<&'static str, FieldValue> = BTreeMap::new();

        for check in self.checks() {
            match candidate.get(check.name) {
                CoercedCell::Blank => {
                    if check.required {
                        reasons.push(format!("missing {}", check.name));
                    }
                }
                CoercedCell::Invalid(msg) => {
                    reasons.push(format!("invalid {}: {}", check.name, msg));
                }
                CoercedCell::Value(value) => match self.check_value(&check, value) {
                    Ok(value) => {
                        values.insert(check.name, value);
                    }
                    Err(reason) => reasons.push(reason),
                },
            }
        }

        if reasons.is_empty() {
            match build_record(self.layout.kind, &values) {
                Ok(record) => {
                    return Ok(SourcedRecord {
                        row_number: candidate.row_number,
                        record,
                    })
                }
                Err(reason) => reasons.push(reason),
            }
        }

        let reason = reasons.join("; ");
        warn!(row = candidate.row_number, reason = %reason, "行被拒绝");
        Err(RejectedRow {
            row_number: candidate.row_number,
            reason,
        })
    }

    fn checks(&self) -> Vec<Check> {
        let mut checks: Vec<Check> = self
            .layout
            .fields
            .iter()
            .map(|f| Check {
                name: f.name,
                ty: f.ty,
                required: f.required,
            })
            .collect();
        if let Some(block) = self.layout.date_block {
            checks.push(Check {
                name: block.date_field,
                ty: SemanticType::Date,
                required: true,
            });
            checks.push(Check {
                name: block.value_field,
                ty: block.value_ty,
                required: true,
            });
        }
        checks
    }

    /// 领域约束；枚举值返回配置中的规范写法
    fn check_value(&self, check: &Check, value: &FieldValue) -> Result<FieldValue, String> {
        match (check.ty, value) {
            (SemanticType::Integer, FieldValue::Integer(v)) if *v < 0 => {
                Err(format!("negative {}: {}", check.name, v))
            }
            (SemanticType::Decimal, FieldValue::Decimal(v)) if v.is_negative() => {
                Err(format!("negative {}: {}", check.name, v))
            }
            (SemanticType::Date, FieldValue::Date(d)) => {
                self.check_period(check.name, *d, *d)?;
                Ok(value.clone())
            }
            (SemanticType::Month, FieldValue::Date(d)) => {
                self.check_period(check.name, *d, month_end(*d))?;
                Ok(value.clone())
            }
            (SemanticType::Shift, FieldValue::Text(s)) => {
                canonical_enum(&self.rules.shift_values, s)
                    .map(FieldValue::Text)
                    .ok_or_else(|| format!("unknown {}: {}", check.name, s))
            }
            (SemanticType::Position, FieldValue::Text(s)) => {
                canonical_enum(&self.rules.position_values, s)
                    .map(FieldValue::Text)
                    .ok_or_else(|| format!("unknown {}: {}", check.name, s))
            }
            _ => Ok(value.clone()),
        }
    }

    /// [first, last] 与报表期间没有交集 → 拒绝
    fn check_period(&self, field: &str, first: NaiveDate, last: NaiveDate) -> Result<(), String> {
        match self.rules.reporting_period {
            Some((from, to)) if last < from || first > to => Err(format!(
                "{} outside reporting period {}..{}: {}",
                field,
                from.format("%Y-%m-%d"),
                to.format("%Y-%m-%d"),
                first.format("%Y-%m-%d")
            )),
            _ => Ok(()),
        }
    }
}

fn canonical_enum(allowed: &[String], raw: &str) -> Option<String> {
    if allowed.is_empty() {
        return Some(raw.to_string());
    }
    let wanted = normalize_label(raw);
    allowed
        .iter()
        .find(|v| normalize_label(v) == wanted)
        .cloned()
}

fn month_end(first: NaiveDate) -> NaiveDate {
    let (y, m) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(first)
}

// ==========================================
// 类型化构造
// ==========================================

fn build_record(
    kind: ImportKind,
    values: &BTreeMap<&'static str, FieldValue>,
) -> Result<CanonicalRecord, String> {
    let record = match kind {
        ImportKind::NapiPerces => CanonicalRecord::DailyMinute(DailyMinuteEntry {
            date: req(values, layout::F_DATE, as_date)?,
            operator: req(values, layout::F_OPERATOR, as_text)?,
            shift: req(values, layout::F_SHIFT, as_text)?,
            pieces_per_minute: req(values, layout::F_PIECES_PER_MINUTE, as_decimal)?,
            worked_minutes: opt(values, layout::F_WORKED_MINUTES, as_integer),
            machine: opt(values, layout::F_MACHINE, as_text),
        }),
        ImportKind::Teljesitmeny => CanonicalRecord::Performance(PerformanceEntry {
            operator: req(values, layout::F_OPERATOR, as_text)?,
            period: req(values, layout::F_PERIOD, as_date)?,
            performance_pct: req(values, layout::F_PERFORMANCE_PCT, as_decimal)?,
            quality_pct: opt(values, layout::F_QUALITY_PCT, as_decimal),
            scrap_count: opt(values, layout::F_SCRAP_COUNT, as_integer),
        }),
        ImportKind::WarroomLetszam => CanonicalRecord::Headcount(HeadcountEntry {
            date: req(values, layout::F_DATE, as_date)?,
            shift: req(values, layout::F_SHIFT, as_text)?,
            position: req(values, layout::F_POSITION, as_text)?,
            planned: req(values, layout::F_PLANNED, as_integer)?,
        }),
    };
    Ok(record)
}

fn req<T>(
    values: &BTreeMap<&'static str, FieldValue>,
    field: &str,
    extract: fn(&FieldValue) -> Option<T>,
) -> Result<T, String> {
    opt(values, field, extract).ok_or_else(|| format!("missing {}", field))
}

fn opt<T>(
    values: &BTreeMap<&'static str, FieldValue>,
    field: &str,
    extract: fn(&FieldValue) -> Option<T>,
) -> Option<T> {
    values.get(field).and_then(extract)
}

fn as_text(v: &FieldValue) -> Option<String> {
    match v {
        FieldValue::Text(s) => Some(s.clone()),
        _ => None,
    }
}

fn as_integer(v: &FieldValue) -> Option<i64> {
    match v {
        FieldValue::Integer(i) => Some(*i),
        _ => None,
    }
}

fn as_decimal(v: &FieldValue) -> Option<Fixed4> {
    match v {
        FieldValue::Decimal(d) => Some(*d),
        _ => None,
    }
}

fn as_date(v: &FieldValue) -> Option<NaiveDate> {
    match v {
        FieldValue::Date(d) => Some(*d),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::layout::{F_DATE, F_OPERATOR, F_PIECES_PER_MINUTE, F_SHIFT, F_WORKED_MINUTES};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rules() -> ValidationRules {
        ValidationRules {
            shift_values: vec!["Délelőtt".to_string(), "Délután".to_string(), "Éjszaka".to_string()],
            position_values: vec![],
            reporting_period: Some((date(2026, 10, 1), date(2026, 10, 31))),
        }
    }

    fn candidate(row: usize, cells: Vec<(&'static str, CoercedCell)>) -> RecordCandidate {
        RecordCandidate {
            row_number: row,
            cells: cells.into_iter().collect(),
        }
    }

    fn v(value: FieldValue) -> CoercedCell {
        CoercedCell::Value(value)
    }

    fn napi_cells(d: Option<NaiveDate>, shift: &str, ppm: i64) -> Vec<(&'static str, CoercedCell)> {
        vec![
            (F_DATE, d.map(|d| v(FieldValue::Date(d))).unwrap_or(CoercedCell::Blank)),
            (F_OPERATOR, v(FieldValue::Text("Anna".to_string()))),
            (F_SHIFT, v(FieldValue::Text(shift.to_string()))),
            (F_PIECES_PER_MINUTE, v(FieldValue::Decimal(Fixed4::from_int(ppm)))),
        ]
    }

    #[test]
    fn test_valid_row_builds_typed_record() {
        let layout = ImportLayout::for_kind(ImportKind::NapiPerces);
        let rules = rules();
        let validator = DqValidator::new(layout, &rules);

        let record = validator
            .validate(&candidate(4, napi_cells(Some(date(2026, 10, 2)), "délután", 120)))
            .unwrap();
        assert_eq!(record.row_number, 4);
        match record.record {
            CanonicalRecord::DailyMinute(e) => {
                assert_eq!(e.shift, "Délután"); // 规范写法
                assert_eq!(e.pieces_per_minute, Fixed4::from_int(120));
                assert_eq!(e.worked_minutes, None);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_missing_date_reason() {
        let layout = ImportLayout::for_kind(ImportKind::NapiPerces);
        let rules = rules();
        let validator = DqValidator::new(layout, &rules);

        let rejected = validator
            .validate(&candidate(7, napi_cells(None, "Délelőtt", 120)))
            .unwrap_err();
        assert_eq!(rejected.row_number, 7);
        assert_eq!(rejected.reason, "missing date");
    }

    #[test]
    fn test_multiple_reasons_joined() {
        let layout = ImportLayout::for_kind(ImportKind::NapiPerces);
        let rules = rules();
        let validator = DqValidator::new(layout, &rules);

        let mut cells = napi_cells(Some(date(2026, 11, 2)), "Hajnal", -1);
        cells.push((F_WORKED_MINUTES, CoercedCell::Invalid("not an integer: 4.5".to_string())));
        let rejected = validator.validate(&candidate(9, cells)).unwrap_err();

        assert!(rejected.reason.contains("date outside reporting period"));
        assert!(rejected.reason.contains("unknown shift: Hajnal"));
        assert!(rejected.reason.contains("negative pieces_per_minute: -1"));
        assert!(rejected.reason.contains("invalid worked_minutes"));
        assert_eq!(rejected.reason.matches("; ").count(), 3);
    }

    #[test]
    fn test_month_period_overlapping_reporting_period() {
        let layout = ImportLayout::for_kind(ImportKind::Teljesitmeny);
        let rules = ValidationRules {
            reporting_period: Some((date(2026, 9, 15), date(2026, 10, 14))),
            ..Default::default()
        };
        let validator = DqValidator::new(layout, &rules);
        let make = |period: NaiveDate| {
            candidate(
                3,
                vec![
                    (layout::F_OPERATOR, v(FieldValue::Text("Nagy Péter".to_string()))),
                    (layout::F_PERIOD, v(FieldValue::Date(period))),
                    (layout::F_PERFORMANCE_PCT, v(FieldValue::Decimal(Fixed4::from_int(97)))),
                ],
            )
        };

        assert!(validator.validate(&make(date(2026, 9, 1))).is_ok());
        assert!(validator.validate(&make(date(2026, 10, 1))).is_ok());
        assert!(validator.validate(&make(date(2026, 8, 1))).is_err());
    }

    #[test]
    fn test_partition_keeps_order() {
        let layout = ImportLayout::for_kind(ImportKind::NapiPerces);
        let rules = rules();
        let validator = DqValidator::new(layout, &rules);

        let outcome = validator.partition(vec![
            candidate(4, napi_cells(Some(date(2026, 10, 1)), "Délelőtt", 100)),
            candidate(5, napi_cells(None, "Délelőtt", 100)),
            candidate(6, napi_cells(Some(date(2026, 10, 3)), "Éjszaka", 90)),
        ]);
        assert_eq!(outcome.valid.len(), 2);
        assert_eq!(outcome.valid[1].row_number, 6);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].row_number, 5);
    }
}

// ==========================================
// 生产看板导入系统 - 规范记录
// ==========================================
// 职责: 类型化字段值、定点小数、逻辑键、按种类区分的规范记录
// 红线: 规范记录只由校验器构造，不含原始单元格
// ==========================================

use crate::domain::types::ImportKind;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ==========================================
// Fixed4 - 四位小数定点数
// ==========================================
// 以 1/10000 为单位存储，比较时不受浮点舍入影响
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fixed4(i64);

impl Fixed4 {
    pub const SCALE: i64 = 10_000;

    pub fn from_int(v: i64) -> Self {
        Fixed4(v * Self::SCALE)
    }

    /// 浮点 → 定点（四舍五入到 4 位小数）；NaN/溢出返回 None
    pub fn from_f64(v: f64) -> Option<Self> {
        if !v.is_finite() {
            return None;
        }
        let scaled = (v * Self::SCALE as f64).round();
        if scaled.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(Fixed4(scaled as i64))
    }

    pub fn scaled(&self) -> i64 {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Fixed4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let int_part = abs / Self::SCALE as u64;
        let frac_part = abs % Self::SCALE as u64;
        if frac_part == 0 {
            return write!(f, "{}{}", sign, int_part);
        }
        let frac = format!("{:04}", frac_part);
        write!(f, "{}{}.{}", sign, int_part, frac.trim_end_matches('0'))
    }
}

impl std::str::FromStr for Fixed4 {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let v: f64 = s
            .trim()
            .parse()
            .map_err(|_| format!("无法解析为小数: {}", s))?;
        Fixed4::from_f64(v).ok_or_else(|| format!("小数超出范围: {}", s))
    }
}

// 以十进制字符串序列化，便于前端展示，也保证往返精确
impl Serialize for Fixed4 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Fixed4 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ==========================================
// FieldValue - 已完成类型转换的字段值
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Decimal(Fixed4),
    Date(NaiveDate),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Decimal(d) => write!(f, "{}", d),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

// ==========================================
// LogicalKey - 逻辑键
// ==========================================
// 标识"同一个真实事实"的字段组合，以 '|' 拼接
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalKey(String);

impl LogicalKey {
    pub fn from_parts(parts: &[&str]) -> Self {
        LogicalKey(parts.join("|"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for LogicalKey {
    fn from(raw: String) -> Self {
        LogicalKey(raw)
    }
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ==========================================
// 各种类的规范记录
// ==========================================

/// 每日分钟产量（napi-perces）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyMinuteEntry {
    pub date: NaiveDate,
    pub operator: String,
    pub shift: String,
    pub pieces_per_minute: Fixed4,
    pub worked_minutes: Option<i64>,
    pub machine: Option<String>,
}

/// 绩效评分（teljesitmeny），period 为所属月份第一天
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceEntry {
    pub operator: String,
    pub period: NaiveDate,
    pub performance_pct: Fixed4,
    pub quality_pct: Option<Fixed4>,
    pub scrap_count: Option<i64>,
}

/// 班次人数计划（warroom-letszam）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadcountEntry {
    pub date: NaiveDate,
    pub shift: String,
    pub position: String,
    pub planned: i64,
}

// ==========================================
// CanonicalRecord - 规范记录
// ==========================================
// 相等比较为逐字段精确比较（小数按 Fixed4）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CanonicalRecord {
    #[serde(rename = "napi-perces")]
    DailyMinute(DailyMinuteEntry),
    #[serde(rename = "teljesitmeny")]
    Performance(PerformanceEntry),
    #[serde(rename = "warroom-letszam")]
    Headcount(HeadcountEntry),
}

impl CanonicalRecord {
    pub fn kind(&self) -> ImportKind {
        match self {
            CanonicalRecord::DailyMinute(_) => ImportKind::NapiPerces,
            CanonicalRecord::Performance(_) => ImportKind::Teljesitmeny,
            CanonicalRecord::Headcount(_) => ImportKind::WarroomLetszam,
        }
    }

    /// 逻辑键
    ///
    /// - napi-perces: 日期 + 操作员 + 班次
    /// - teljesitmeny: 操作员 + 月份
    /// - warroom-letszam: 日期 + 班次 + 岗位
    pub fn logical_key(&self) -> LogicalKey {
        match self {
            CanonicalRecord::DailyMinute(e) => {
                let date = e.date.format("%Y-%m-%d").to_string();
                LogicalKey::from_parts(&[&date, &e.operator, &e.shift])
            }
            CanonicalRecord::Performance(e) => {
                let period = e.period.format("%Y-%m").to_string();
                LogicalKey::from_parts(&[&e.operator, &period])
            }
            CanonicalRecord::Headcount(e) => {
                let date = e.date.format("%Y-%m-%d").to_string();
                LogicalKey::from_parts(&[&date, &e.shift, &e.position])
            }
        }
    }

    /// 对账范围使用的日期（报表期间过滤）
    pub fn scope_date(&self) -> NaiveDate {
        match self {
            CanonicalRecord::DailyMinute(e) => e.date,
            CanonicalRecord::Performance(e) => e.period,
            CanonicalRecord::Headcount(e) => e.date,
        }
    }
}

/// 带源表行号的规范记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcedRecord {
    pub row_number: usize,
    pub record: CanonicalRecord,
}

/// 库中已存在的规范记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub key: LogicalKey,
    pub record: CanonicalRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_fixed4_rounds_float_noise() {
        let a = Fixed4::from_f64(0.1 + 0.2).unwrap();
        let b = Fixed4::from_f64(0.3).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.scaled(), 3_000);
    }

    #[test]
    fn test_fixed4_display_trims_trailing_zeros() {
        assert_eq!(Fixed4::from_int(120).to_string(), "120");
        assert_eq!(Fixed4::from_f64(1.25).unwrap().to_string(), "1.25");
        assert_eq!(Fixed4::from_f64(-0.5).unwrap().to_string(), "-0.5");
    }

    #[test]
    fn test_fixed4_serde_is_decimal_string() {
        let v = Fixed4::from_f64(12.5).unwrap();
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"12.5\"");
        let back: Fixed4 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_logical_key_daily_minute() {
        let record = CanonicalRecord::DailyMinute(DailyMinuteEntry {
            date: date(2026, 10, 1),
            operator: "Kovács Anna".to_string(),
            shift: "Délelőtt".to_string(),
            pieces_per_minute: Fixed4::from_int(120),
            worked_minutes: None,
            machine: None,
        });
        assert_eq!(record.logical_key().as_str(), "2026-10-01|Kovács Anna|Délelőtt");
        assert_eq!(record.kind(), ImportKind::NapiPerces);
    }

    #[test]
    fn test_logical_key_performance_uses_month() {
        let record = CanonicalRecord::Performance(PerformanceEntry {
            operator: "Nagy Péter".to_string(),
            period: date(2026, 9, 1),
            performance_pct: Fixed4::from_int(97),
            quality_pct: None,
            scrap_count: Some(3),
        });
        assert_eq!(record.logical_key().as_str(), "Nagy Péter|2026-09");
        assert_eq!(record.scope_date(), date(2026, 9, 1));
    }

    #[test]
    fn test_canonical_record_json_round_trip_keeps_equality() {
        let record = CanonicalRecord::Headcount(HeadcountEntry {
            date: date(2026, 10, 5),
            shift: "Éjszaka".to_string(),
            position: "Gépkezelő".to_string(),
            planned: 4,
        });
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"kind\":\"warroom-letszam\""));
        let back: CanonicalRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}

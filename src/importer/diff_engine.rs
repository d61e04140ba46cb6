// ==========================================
// 生产看板导入系统 - 差异/对账引擎
// ==========================================
// 职责: 源表记录（已去重）与库中同范围记录按逻辑键比对
// 分类:
// - 仅源表存在 → insert
// - 两边都有且字段不同 → update（整条替换，不做字段级合并）
// - 两边都有且完全相同 → no-op
// - 仅库中存在 → removed（导入时是否删除由策略决定）
// 相等: 逐字段精确比较；小数按 Fixed4，文本任何差异（含空白）都算 update
// ==========================================

use crate::domain::import::Discrepancy;
use crate::domain::record::{CanonicalRecord, LogicalKey, SourcedRecord, StoredRecord};
use crate::domain::types::{ChangeKind, DiscrepancyKind};
use std::collections::BTreeMap;

/// 一条更新: 库中旧值 + 源表新值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUpdate {
    pub stored: CanonicalRecord,
    pub incoming: SourcedRecord,
}

/// 分类后的变更集；每个逻辑键恰好出现在一个分类中
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub inserts: Vec<SourcedRecord>,
    pub updates: Vec<RecordUpdate>,
    pub unchanged: Vec<LogicalKey>,
    pub missing: Vec<StoredRecord>,
}

impl ChangeSet {
    /// 需要写入的记录（insert + update）
    pub fn records_to_write(&self) -> Vec<CanonicalRecord> {
        self.inserts
            .iter()
            .map(|s| s.record.clone())
            .chain(self.updates.iter().map(|u| u.incoming.record.clone()))
            .collect()
    }

    pub fn missing_keys(&self) -> Vec<LogicalKey> {
        self.missing.iter().map(|s| s.key.clone()).collect()
    }

    /// 某个逻辑键的分类
    pub fn classification(&self, key: &LogicalKey) -> Option<ChangeKind> {
        if self.inserts.iter().any(|s| &s.record.logical_key() == key) {
            Some(ChangeKind::Insert)
        } else if self.updates.iter().any(|u| &u.incoming.record.logical_key() == key) {
            Some(ChangeKind::Update)
        } else if self.unchanged.contains(key) {
            Some(ChangeKind::NoOp)
        } else if self.missing.iter().any(|s| &s.key == key) {
            Some(ChangeKind::Removed)
        } else {
            None
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.inserts.is_empty() || !self.updates.is_empty() || !self.missing.is_empty()
    }

    /// 同步模式: 变更集 → 差异列表（按逻辑键排序，no-op 不列出）
    pub fn to_discrepancies(&self) -> Vec<Discrepancy> {
        let mut list: Vec<Discrepancy> = Vec::new();
        for s in &self.inserts {
            list.push(Discrepancy {
                key: s.record.logical_key(),
                classification: DiscrepancyKind::Added,
                row_number: Some(s.row_number),
                source: Some(s.record.clone()),
                stored: None,
            });
        }
        for u in &self.updates {
            list.push(Discrepancy {
                key: u.incoming.record.logical_key(),
                classification: DiscrepancyKind::ValueChanged,
                row_number: Some(u.incoming.row_number),
                source: Some(u.incoming.record.clone()),
                stored: Some(u.stored.clone()),
            });
        }
        for s in &self.missing {
            list.push(Discrepancy {
                key: s.key.clone(),
                classification: DiscrepancyKind::Removed,
                row_number: None,
                source: None,
                stored: Some(s.record.clone()),
            });
        }
        list.sort_by(|a, b| a.key.cmp(&b.key));
        list
    }
}

pub struct DiffEngine;

impl DiffEngine {
    /// 对两侧所有逻辑键分类
    pub fn classify(
        source: &BTreeMap<LogicalKey, SourcedRecord>,
        stored: &BTreeMap<LogicalKey, CanonicalRecord>,
    ) -> ChangeSet {
        let mut change_set = ChangeSet::default();

        for (key, incoming) in source {
            match stored.get(key) {
                None => change_set.inserts.push(incoming.clone()),
                Some(existing) if existing == &incoming.record => {
                    change_set.unchanged.push(key.clone())
                }
                Some(existing) => change_set.updates.push(RecordUpdate {
                    stored: existing.clone(),
                    incoming: incoming.clone(),
                }),
            }
        }

        for (key, existing) in stored {
            if !source.contains_key(key) {
                change_set.missing.push(StoredRecord {
                    key: key.clone(),
                    record: existing.clone(),
                });
            }
        }

        change_set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{DailyMinuteEntry, Fixed4};
    use chrono::NaiveDate;

    fn entry(day: u32, operator: &str, ppm: i64) -> CanonicalRecord {
        CanonicalRecord::DailyMinute(DailyMinuteEntry {
            date: NaiveDate::from_ymd_opt(2026, 10, day).unwrap(),
            operator: operator.to_string(),
            shift: "Délelőtt".to_string(),
            pieces_per_minute: Fixed4::from_int(ppm),
            worked_minutes: Some(480),
            machine: Some("Gép 1".to_string()),
        })
    }

    fn source(records: Vec<CanonicalRecord>) -> BTreeMap<LogicalKey, SourcedRecord> {
        records
            .into_iter()
            .enumerate()
            .map(|(i, record)| {
                (
                    record.logical_key(),
                    SourcedRecord {
                        row_number: i + 4,
                        record,
                    },
                )
            })
            .collect()
    }

    fn stored(records: Vec<CanonicalRecord>) -> BTreeMap<LogicalKey, CanonicalRecord> {
        records.into_iter().map(|r| (r.logical_key(), r)).collect()
    }

    #[test]
    fn test_numeric_change_is_update() {
        let change_set = DiffEngine::classify(
            &source(vec![entry(1, "Anna", 125)]),
            &stored(vec![entry(1, "Anna", 120)]),
        );
        assert_eq!(change_set.updates.len(), 1);
        assert!(change_set.unchanged.is_empty());
        assert_eq!(change_set.updates[0].stored, entry(1, "Anna", 120));
    }

    #[test]
    fn test_whitespace_change_in_text_is_update() {
        let mut changed = entry(1, "Anna", 120);
        if let CanonicalRecord::DailyMinute(e) = &mut changed {
            e.machine = Some("Gép 1 ".to_string());
        }
        let change_set = DiffEngine::classify(&source(vec![changed]), &stored(vec![entry(1, "Anna", 120)]));
        assert_eq!(change_set.updates.len(), 1);
    }

    #[test]
    fn test_every_key_in_exactly_one_class() {
        let src = source(vec![entry(1, "Anna", 120), entry(2, "Béla", 90), entry(3, "Csaba", 70)]);
        let db = stored(vec![entry(1, "Anna", 120), entry(2, "Béla", 95), entry(4, "Dóra", 60)]);
        let change_set = DiffEngine::classify(&src, &db);

        assert_eq!(change_set.inserts.len(), 1);
        assert_eq!(change_set.updates.len(), 1);
        assert_eq!(change_set.unchanged.len(), 1);
        assert_eq!(change_set.missing.len(), 1);

        let all_keys: std::collections::BTreeSet<_> = src.keys().chain(db.keys()).cloned().collect();
        assert_eq!(all_keys.len(), 4);
        for key in &all_keys {
            assert!(change_set.classification(key).is_some(), "unclassified {}", key);
        }
        assert_eq!(
            change_set.classification(&entry(4, "Dóra", 60).logical_key()),
            Some(ChangeKind::Removed)
        );
    }

    #[test]
    fn test_discrepancies_skip_no_op() {
        let change_set = DiffEngine::classify(
            &source(vec![entry(1, "Anna", 120), entry(2, "Béla", 90)]),
            &stored(vec![entry(1, "Anna", 120), entry(3, "Csaba", 70)]),
        );
        let list = change_set.to_discrepancies();
        assert_eq!(list.len(), 2);
        assert!(list.iter().any(|d| d.classification == DiscrepancyKind::Added));
        assert!(list.iter().any(|d| d.classification == DiscrepancyKind::Removed));
        assert!(change_set.has_changes());
    }
}

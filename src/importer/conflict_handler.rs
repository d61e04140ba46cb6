// ==========================================
// 生产看板导入系统 - 冲突处理器
// ==========================================
// 职责: 同一次导入内按逻辑键去重
// 规则: 后出现的行覆盖先出现的行（last-row-wins），被覆盖的行不算拒绝
// ==========================================

use crate::domain::record::{LogicalKey, SourcedRecord};
use std::collections::BTreeMap;
use tracing::debug;

/// 去重结果
#[derive(Debug, Clone, Default)]
pub struct Deduplicated {
    /// 逻辑键 → 最后一次出现的记录
    pub records: BTreeMap<LogicalKey, SourcedRecord>,
    /// 被后行覆盖的次数
    pub overridden: usize,
}

pub struct ConflictHandler;

impl ConflictHandler {
    /// 按逻辑键去重（输入须保持源表顺序）
    pub fn dedup_last_wins(valid: Vec<SourcedRecord>) -> Deduplicated {
        let mut result = Deduplicated::default();
        for sourced in valid {
            let key = sourced.record.logical_key();
            if let Some(previous) = result.records.insert(key.clone(), sourced) {
                debug!(
                    key = %key,
                    overridden_row = previous.row_number,
                    "同键记录被后行覆盖"
                );
                result.overridden += 1;
            }
        }
        result
    }
}

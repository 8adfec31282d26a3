//! Totals comparison engine.
//!
//! Compares two keyed total maps and reports changes:
//! - Matches entries by key (resource id, or a finer ledger key)
//! - Classifies each change: gained, spent, new, gone
//! - Net change summary

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiffType {
    Gained,
    Spent,
    New,
    Gone,
}

impl DiffType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffType::Gained => "gained",
            DiffType::Spent => "spent",
            DiffType::New => "new",
            DiffType::Gone => "gone",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry<K> {
    pub key: K,
    pub old_amount: i64,
    pub new_amount: i64,
    pub delta: i64,
    pub diff_type: DiffType,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffResult<K> {
    pub entries: Vec<DiffEntry<K>>,
    pub net_change: i64,
    pub from_id: i64,
    pub to_id: i64,
    pub from_timestamp: i64,
    pub to_timestamp: i64,
}

/// Compare two total maps. Entries come out in key order; keys whose amount
/// did not move are not reported.
pub fn compare_totals<K: Ord + Clone>(
    from: &BTreeMap<K, i64>,
    to: &BTreeMap<K, i64>,
    from_id: i64,
    to_id: i64,
    from_timestamp: i64,
    to_timestamp: i64,
) -> DiffResult<K> {
    let mut entries = Vec::new();
    let mut net_change: i64 = 0;

    for (key, &new_amount) in to {
        let (old_amount, diff_type) = match from.get(key) {
            Some(&old) if new_amount >= old => (old, DiffType::Gained),
            Some(&old) => (old, DiffType::Spent),
            None => (0, DiffType::New),
        };
        let delta = new_amount.saturating_sub(old_amount);
        if delta == 0 {
            continue;
        }

        entries.push(DiffEntry {
            key: key.clone(),
            old_amount,
            new_amount,
            delta,
            diff_type,
        });
        net_change = net_change.saturating_add(delta);
    }

    // only in 'from'
    for (key, &old_amount) in from {
        if to.contains_key(key) || old_amount == 0 {
            continue;
        }
        let delta = old_amount.saturating_neg();
        entries.push(DiffEntry {
            key: key.clone(),
            old_amount,
            new_amount: 0,
            delta,
            diff_type: DiffType::Gone,
        });
        net_change = net_change.saturating_add(delta);
    }

    entries.sort_by(|a, b| a.key.cmp(&b.key));

    DiffResult {
        entries,
        net_change,
        from_id,
        to_id,
        from_timestamp,
        to_timestamp,
    }
}

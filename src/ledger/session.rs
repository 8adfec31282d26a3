//! Ledger derivation from snapshot history.
//!
//! Snapshots taken within `gap` of each other belong to one play session and
//! only the session's last snapshot matters. Each session contributes the
//! per-key difference from the previous session, or for the first one, from
//! what the ledger already holds for the root.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::aggregate::{fold_rows, RowFilter};
use crate::error::Result;
use crate::ident::{ResourceId, RootLabel};
use crate::model::{InventoryKind, ResourceKind, SlotRecord};
use crate::store::diff::compare_totals;
use crate::store::{BaselineRow, LedgerCursor, LedgerDelta, Snapshot, Store};

/// Granularity of ledger deltas.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LedgerKey {
    pub owner: String,
    pub inventory: InventoryKind,
    pub resource_id: ResourceId,
    pub resource_kind: ResourceKind,
}

impl LedgerKey {
    fn of(slot: &SlotRecord) -> Self {
        LedgerKey {
            owner: slot.owner.clone(),
            inventory: slot.inventory,
            resource_id: slot.resource_id.clone(),
            resource_kind: slot.resource_kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub start: i64,
    pub end: i64,
    pub members: usize,
    pub representative: Snapshot,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub baseline_at: Option<i64>,
    pub roots: usize,
    pub sessions: usize,
    pub deltas: usize,
}

/// Group consecutive snapshots (in id order) whose capture times are within
/// `gap` of the previous one.
pub fn coalesce(snapshots: &[Snapshot], gap: Duration) -> Vec<Session> {
    let gap = i64::try_from(gap.as_secs()).unwrap_or(i64::MAX);
    let mut sessions: Vec<Session> = Vec::new();

    for snapshot in snapshots {
        match sessions.last_mut() {
            Some(session) if snapshot.captured_at.saturating_sub(session.end) <= gap => {
                session.end = snapshot.captured_at;
                session.members += 1;
                session.representative = snapshot.clone();
            }
            _ => sessions.push(Session {
                start: snapshot.captured_at,
                end: snapshot.captured_at,
                members: 1,
                representative: snapshot.clone(),
            }),
        }
    }
    sessions
}

fn key_totals<'a, I>(rows: I) -> BTreeMap<LedgerKey, i64>
where
    I: IntoIterator<Item = &'a SlotRecord>,
{
    // the ledger carries every row; readers apply the tech flag
    let everything = RowFilter::new(None, true);
    fold_rows(rows, &everything, LedgerKey::of)
        .into_iter()
        .map(|(key, tally)| (key, tally.amount))
        .collect()
}

/// Deltas for one root's sessions, starting from `start`.
pub fn derive(
    root: &RootLabel,
    baseline_at: i64,
    start: BTreeMap<LedgerKey, i64>,
    start_id: i64,
    sessions: &[Session],
    load: impl Fn(i64) -> Result<Vec<SlotRecord>>,
) -> Result<Vec<LedgerDelta>> {
    let mut deltas = Vec::new();
    let mut previous = start;
    let mut previous_id = start_id;

    for session in sessions {
        let rep = &session.representative;
        let current = key_totals(&load(rep.id)?);
        let diff = compare_totals(&previous, &current, previous_id, rep.id, 0, rep.captured_at);

        let applied_at = rep.imported_at.max(baseline_at);
        deltas.extend(diff.entries.into_iter().map(|entry| LedgerDelta {
            resource_id: entry.key.resource_id,
            resource_kind: entry.key.resource_kind,
            owner: entry.key.owner,
            inventory: entry.key.inventory,
            delta: entry.delta,
            applied_at,
            session_start: Some(session.start),
            session_end: Some(session.end),
            snapshot_id: Some(rep.id),
            save_root: Some(root.clone()),
        }));

        previous = current;
        previous_id = rep.id;
    }
    Ok(deltas)
}

/// What the ledger holds for one root: its baseline rows plus every derived
/// delta since. Hand-recorded deltas are not part of it.
fn ledger_state(
    baseline: &[&BaselineRow],
    deltas: &[LedgerDelta],
    root: &RootLabel,
) -> BTreeMap<LedgerKey, i64> {
    let mut state = key_totals(baseline.iter().map(|row| &row.slot));
    for delta in deltas
        .iter()
        .filter(|d| d.snapshot_id.is_some() && d.save_root.as_ref() == Some(root))
    {
        let key = LedgerKey {
            owner: delta.owner.clone(),
            inventory: delta.inventory,
            resource_id: delta.resource_id.clone(),
            resource_kind: delta.resource_kind,
        };
        *state.entry(key).or_insert(0) += delta.delta;
    }
    state
}

/// Snapshots of `root` not yet folded into the ledger, oldest first.
///
/// - cursor at a snapshot: everything newer, plus the cursor snapshot itself
///   when it was re-ingested with different content
/// - cursor without a snapshot: everything imported since the baseline
/// - no cursor (root unknown to the baseline): the whole history
///
/// When the cursor snapshot was deleted and nothing newer exists, the root's
/// current latest snapshot is the only candidate.
fn pending(
    store: &Store,
    root: &RootLabel,
    baseline_at: i64,
    cursor: Option<&LedgerCursor>,
) -> Result<Vec<Snapshot>> {
    // list_snapshots is newest first
    let mut history = store.list_snapshots(Some(root))?;
    history.reverse();

    let mut later: Vec<Snapshot> = match cursor {
        Some(LedgerCursor {
            snapshot_id: Some(id),
            fingerprint,
            ..
        }) => history
            .iter()
            .filter(|s| {
                s.id > *id || (s.id == *id && fingerprint.as_deref().is_some_and(|fp| fp != s.fingerprint))
            })
            .cloned()
            .collect(),
        Some(_) => history.iter().filter(|s| s.imported_at >= baseline_at).cloned().collect(),
        None => history.clone(),
    };

    if later.is_empty() {
        if let Some(id) = cursor.and_then(|c| c.snapshot_id) {
            if !history.iter().any(|s| s.id == id) {
                if let Some(latest) = history.last() {
                    debug!(root = %root, deleted = id, fallback = latest.id, "ledger cursor snapshot deleted");
                    later.push(latest.clone());
                }
            }
        }
    }
    Ok(later)
}

/// Bring the ledger up to date with every active root's snapshots since the
/// latest baseline. Running it twice writes nothing the second time.
pub fn sync(store: &mut Store, gap: Duration) -> Result<SyncSummary> {
    let Some(baseline_at) = store.latest_baseline_at()? else {
        debug!("no baseline captured, nothing to sync");
        return Ok(SyncSummary::default());
    };

    let baseline = store.baseline_rows_at(baseline_at)?;
    let recorded = store.deltas_since(baseline_at)?;
    let mut summary = SyncSummary {
        baseline_at: Some(baseline_at),
        ..SyncSummary::default()
    };

    for root in store.active_roots()? {
        let rows: Vec<&BaselineRow> = baseline.iter().filter(|row| row.save_root == root).collect();
        let cursor = match store.ledger_cursor(&root, baseline_at)? {
            Some(cursor) => Some(cursor),
            // captures written without cursors start after their rows' snapshot
            None if !rows.is_empty() => Some(LedgerCursor {
                save_root: root.clone(),
                baseline_at,
                snapshot_id: rows.iter().filter_map(|row| row.snapshot_id).max(),
                fingerprint: None,
            }),
            None => None,
        };

        summary.roots += 1;
        let later = pending(store, &root, baseline_at, cursor.as_ref())?;
        let Some(last) = later.last() else {
            continue;
        };

        let start = ledger_state(&rows, &recorded, &root);
        let start_id = cursor.as_ref().and_then(|c| c.snapshot_id).unwrap_or(0);
        let sessions = coalesce(&later, gap);
        let deltas = derive(&root, baseline_at, start, start_id, &sessions, |id| {
            store.load_items(id)
        })?;

        let moved = LedgerCursor {
            save_root: root.clone(),
            baseline_at,
            snapshot_id: Some(last.id),
            fingerprint: Some(last.fingerprint.clone()),
        };
        store.commit_sync(&deltas, &moved)?;
        info!(
            root = %root,
            sessions = sessions.len(),
            deltas = deltas.len(),
            "ledger synced"
        );

        summary.sessions += sessions.len();
        summary.deltas += deltas.len();
    }

    Ok(summary)
}

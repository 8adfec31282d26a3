//! Snapshot ingestion.
//!
//! One decoded payload becomes at most one snapshot write:
//! - unchanged (capture time, fingerprint) for the source: skipped, no write
//! - otherwise: upsert keyed by (source, capture time), replace item rows
//!
//! Runs are serialized per root through `IngestGate`; roots run in parallel.

mod gate;

pub use gate::{IngestGate, IngestPermit};

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::ident::RootLabel;
use crate::model::{is_progress_token, SlotRecord};
use crate::payload::SnapshotPayload;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Same capture and content as the source's latest snapshot.
    Skipped { snapshot_id: i64 },
    Ingested {
        snapshot_id: i64,
        rows: usize,
        replaced: usize,
        dropped_tokens: usize,
    },
}

impl IngestOutcome {
    pub fn snapshot_id(&self) -> i64 {
        match self {
            IngestOutcome::Skipped { snapshot_id } => *snapshot_id,
            IngestOutcome::Ingested { snapshot_id, .. } => *snapshot_id,
        }
    }
}

/// Ingest one payload.
pub fn ingest(store: &mut Store, payload: &SnapshotPayload, imported_at: i64) -> Result<IngestOutcome> {
    if let Some(latest) = store.latest_for_source(&payload.source)? {
        if latest.captured_at == payload.captured_at && latest.fingerprint == payload.fingerprint {
            debug!(
                snapshot_id = latest.id,
                source = %payload.source,
                "unchanged since last import, skipping"
            );
            return Ok(IngestOutcome::Skipped {
                snapshot_id: latest.id,
            });
        }
    }

    let (slots, dropped_tokens): (Vec<SlotRecord>, Vec<SlotRecord>) = payload
        .slots
        .iter()
        .cloned()
        .partition(|slot| !is_progress_token(&slot.resource_id));
    if !dropped_tokens.is_empty() {
        warn!(
            source = %payload.source,
            count = dropped_tokens.len(),
            "dropped progress tokens"
        );
    }

    let (snapshot_id, replaced) = match store.write_snapshot(payload, &slots, imported_at) {
        Ok(written) => written,
        Err(e) => {
            error!(
                root = %payload.save_root,
                source = %payload.source,
                captured_at = payload.captured_at,
                error = %e,
                "snapshot write failed, previous content kept"
            );
            return Err(e);
        }
    };

    info!(
        snapshot_id,
        root = %payload.save_root,
        source = %payload.source,
        rows = slots.len(),
        replaced,
        "ingested snapshot"
    );

    Ok(IngestOutcome::Ingested {
        snapshot_id,
        rows: slots.len(),
        replaced,
        dropped_tokens: dropped_tokens.len(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A run for this root was already in flight; the trigger was dropped.
    Busy,
    Completed(IngestOutcome),
}

/// Ingest under the root's gate. A trigger that finds the root busy is
/// dropped; the next trigger re-observes the file anyway.
pub fn trigger(
    gate: &IngestGate,
    store: &mut Store,
    payload: &SnapshotPayload,
    imported_at: i64,
) -> Result<TriggerOutcome> {
    let Some(_permit) = gate.try_begin(&payload.save_root) else {
        debug!(root = %payload.save_root, source = %payload.source, "root busy, trigger dropped");
        return Ok(TriggerOutcome::Busy);
    };
    ingest(store, payload, imported_at).map(TriggerOutcome::Completed)
}

#[derive(Debug)]
pub struct BatchItem {
    pub source: String,
    pub captured_at: i64,
    pub outcome: Result<IngestOutcome>,
}

#[derive(Debug)]
pub enum RunOutcome {
    Busy,
    Finished(Vec<BatchItem>),
}

#[derive(Debug)]
pub struct RootRun {
    pub root: RootLabel,
    pub outcome: Result<RunOutcome>,
}

/// Ingest a batch: payloads are grouped by root and applied in capture order,
/// one thread (and one connection) per root.
pub fn ingest_batch(
    db_path: &Path,
    busy_timeout: Duration,
    payloads: Vec<SnapshotPayload>,
    gate: &IngestGate,
    imported_at: i64,
) -> Vec<RootRun> {
    let mut by_root: BTreeMap<RootLabel, Vec<SnapshotPayload>> = BTreeMap::new();
    for payload in payloads {
        by_root.entry(payload.save_root.clone()).or_default().push(payload);
    }
    for group in by_root.values_mut() {
        group.sort_by(|a, b| a.captured_at.cmp(&b.captured_at).then_with(|| a.source.cmp(&b.source)));
    }

    std::thread::scope(|scope| {
        let handles: Vec<_> = by_root
            .into_iter()
            .map(|(root, group)| {
                let handle = scope.spawn({
                    let root = root.clone();
                    move || run_root(db_path, busy_timeout, &root, group, gate, imported_at)
                });
                (root, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(root, handle)| {
                let outcome = match handle.join() {
                    Ok(outcome) => outcome,
                    Err(_) => Err(Error::WorkerPanicked(root.to_string())),
                };
                RootRun { root, outcome }
            })
            .collect()
    })
}

fn run_root(
    db_path: &Path,
    busy_timeout: Duration,
    root: &RootLabel,
    group: Vec<SnapshotPayload>,
    gate: &IngestGate,
    imported_at: i64,
) -> Result<RunOutcome> {
    let Some(_permit) = gate.try_begin(root) else {
        debug!(root = %root, count = group.len(), "root busy, batch dropped");
        return Ok(RunOutcome::Busy);
    };

    let mut store = Store::open(db_path, busy_timeout)?;
    let items = group
        .iter()
        .map(|payload| BatchItem {
            source: payload.source.clone(),
            captured_at: payload.captured_at,
            outcome: ingest(&mut store, payload, imported_at),
        })
        .collect();
    Ok(RunOutcome::Finished(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::ResourceId;
    use crate::model::{InventoryKind, ResourceKind};

    fn slot(x: i64, id: &str, amount: i64) -> SlotRecord {
        SlotRecord {
            owner: "SUIT".into(),
            inventory: InventoryKind::General,
            container: String::new(),
            x,
            y: 0,
            resource_id: ResourceId::new(id),
            amount,
            resource_kind: ResourceKind::Substance,
        }
    }

    fn payload(captured_at: i64, slots: Vec<SlotRecord>) -> SnapshotPayload {
        SnapshotPayload::new("st_1/save.hg", RootLabel::parse("st_1").unwrap(), captured_at, slots).unwrap()
    }

    #[test]
    fn reingest_of_unchanged_payload_is_skipped() {
        let mut store = Store::open_in_memory().unwrap();
        let p = payload(100, vec![slot(0, "FUEL1", 10)]);

        let first = ingest(&mut store, &p, 1).unwrap();
        let IngestOutcome::Ingested { snapshot_id, rows, replaced, .. } = first else {
            panic!("expected ingest, got {first:?}");
        };
        assert_eq!((rows, replaced), (1, 0));

        let second = ingest(&mut store, &p, 2).unwrap();
        assert_eq!(second, IngestOutcome::Skipped { snapshot_id });
        assert_eq!(store.list_snapshots(None).unwrap().len(), 1);
        assert_eq!(store.get_snapshot(snapshot_id).unwrap().unwrap().imported_at, 1);
    }

    #[test]
    fn redecode_with_new_content_replaces_rows() {
        let mut store = Store::open_in_memory().unwrap();
        let id = ingest(&mut store, &payload(100, vec![slot(0, "FUEL1", 10)]), 1)
            .unwrap()
            .snapshot_id();

        let outcome = ingest(&mut store, &payload(100, vec![slot(0, "FUEL1", 30)]), 2).unwrap();
        assert_eq!(
            outcome,
            IngestOutcome::Ingested {
                snapshot_id: id,
                rows: 1,
                replaced: 1,
                dropped_tokens: 0
            }
        );
        assert_eq!(store.load_items(id).unwrap()[0].amount, 30);
    }

    #[test]
    fn progress_tokens_not_stored() {
        let mut store = Store::open_in_memory().unwrap();
        let p = payload(100, vec![slot(0, "FUEL1", 10), slot(1, "^S19_TOKEN", 1), slot(2, "SMUGGLE_X", 1)]);
        let outcome = ingest(&mut store, &p, 1).unwrap();
        let IngestOutcome::Ingested { snapshot_id, rows, dropped_tokens, .. } = outcome else {
            panic!("expected ingest");
        };
        assert_eq!((rows, dropped_tokens), (1, 2));
        assert_eq!(store.item_count(snapshot_id).unwrap(), 1);
    }

    #[test]
    fn trigger_dropped_while_root_busy() {
        let mut store = Store::open_in_memory().unwrap();
        let gate = IngestGate::new();
        let p = payload(100, vec![slot(0, "FUEL1", 10)]);

        let permit = gate.try_begin(&p.save_root).unwrap();
        assert_eq!(trigger(&gate, &mut store, &p, 1).unwrap(), TriggerOutcome::Busy);
        assert!(store.list_snapshots(None).unwrap().is_empty());

        drop(permit);
        assert!(matches!(
            trigger(&gate, &mut store, &p, 1).unwrap(),
            TriggerOutcome::Completed(IngestOutcome::Ingested { .. })
        ));
    }
}

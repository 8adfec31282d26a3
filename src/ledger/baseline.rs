use serde::Serialize;
use std::str::FromStr;
use tracing::info;

use crate::aggregate::latest_by_root;
use crate::error::{Error, Result};
use crate::ident::RootLabel;
use crate::model::{is_progress_token, SlotRecord};
use crate::payload::SnapshotPayload;
use crate::store::{BaselineRow, LedgerCursor, Store};
use crate::util;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaselineCapture {
    pub captured_at: i64,
    pub roots: Vec<RootLabel>,
    pub rows: usize,
}

fn baseline_row(
    captured_at: i64,
    root: &RootLabel,
    snapshot_id: Option<i64>,
    source_file: &str,
    slot: &SlotRecord,
) -> BaselineRow {
    BaselineRow {
        captured_at,
        save_root: root.clone(),
        snapshot_id,
        slot: slot.clone(),
        // numeric containers are owner indexes (ship 2, storage 7)
        owner_index: slot.container.parse().ok(),
        owner_name: slot.container.clone(),
        max_amount: 0,
        source_file: source_file.to_string(),
    }
}

fn ensure_newer(store: &Store, captured_at: i64) -> Result<()> {
    if let Some(latest) = store.latest_baseline_at()? {
        if captured_at <= latest {
            return Err(Error::InvalidArgument(format!(
                "baseline at {} is not newer than existing baseline at {}",
                util::format_timestamp(captured_at),
                util::format_timestamp(latest)
            )));
        }
    }
    Ok(())
}

/// Capture the latest snapshot of every active root as a new baseline.
/// Every active root gets a ledger cursor, even one whose latest snapshot is
/// empty or that has no snapshot yet.
pub fn capture(store: &mut Store, captured_at: i64) -> Result<BaselineCapture> {
    ensure_newer(store, captured_at)?;

    let roots = store.active_roots()?;
    let latest = latest_by_root(store, &roots)?;
    let mut rows = Vec::new();
    let mut cursors = Vec::with_capacity(roots.len());
    for root in &roots {
        let snapshot = latest.iter().find(|snapshot| &snapshot.save_root == root);
        if let Some(snapshot) = snapshot {
            for slot in store.load_items(snapshot.id)? {
                rows.push(baseline_row(
                    captured_at,
                    root,
                    Some(snapshot.id),
                    &snapshot.source,
                    &slot,
                ));
            }
        }
        cursors.push(LedgerCursor {
            save_root: root.clone(),
            baseline_at: captured_at,
            snapshot_id: snapshot.map(|s| s.id),
            fingerprint: snapshot.map(|s| s.fingerprint.clone()),
        });
    }

    store.insert_capture(&rows, &cursors)?;
    info!(
        captured_at,
        roots = roots.len(),
        rows = rows.len(),
        "captured baseline"
    );

    Ok(BaselineCapture {
        captured_at,
        roots,
        rows: rows.len(),
    })
}

/// Store a decoded payload directly as a baseline at its capture time,
/// without going through the snapshot store.
pub fn import_payload(store: &mut Store, payload: &SnapshotPayload) -> Result<BaselineCapture> {
    ensure_newer(store, payload.captured_at)?;

    let rows: Vec<BaselineRow> = payload
        .slots
        .iter()
        .filter(|slot| !is_progress_token(&slot.resource_id))
        .map(|slot| {
            baseline_row(
                payload.captured_at,
                &payload.save_root,
                None,
                &payload.source,
                slot,
            )
        })
        .collect();

    store.ensure_root(&payload.save_root, payload.captured_at)?;
    let cursor = LedgerCursor {
        save_root: payload.save_root.clone(),
        baseline_at: payload.captured_at,
        snapshot_id: None,
        fingerprint: None,
    };
    store.insert_capture(&rows, &[cursor])?;
    info!(
        captured_at = payload.captured_at,
        root = %payload.save_root,
        rows = rows.len(),
        "imported baseline"
    );

    Ok(BaselineCapture {
        captured_at: payload.captured_at,
        roots: vec![payload.save_root.clone()],
        rows: rows.len(),
    })
}

/// Which baseline capture to inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselinePick {
    Latest,
    Oldest,
    At(i64),
}

impl FromStr for BaselinePick {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest" => Ok(BaselinePick::Latest),
            "oldest" => Ok(BaselinePick::Oldest),
            other => util::parse_timestamp(other)
                .map(BaselinePick::At)
                .ok_or_else(|| Error::InvalidArgument(format!("baseline selector '{s}'"))),
        }
    }
}

/// Rows of the chosen capture, or `None` when there is no such capture.
pub fn select(store: &Store, pick: BaselinePick) -> Result<Option<(i64, Vec<BaselineRow>)>> {
    let captured_at = match pick {
        BaselinePick::Latest => store.latest_baseline_at()?,
        BaselinePick::Oldest => store.oldest_baseline_at()?,
        BaselinePick::At(ts) => Some(ts),
    };
    let Some(captured_at) = captured_at else {
        return Ok(None);
    };

    if !store.baseline_exists(captured_at)? {
        return Ok(None);
    }
    Ok(Some((captured_at, store.baseline_rows_at(captured_at)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::ResourceId;
    use crate::model::{InventoryKind, ResourceKind};

    fn slot(x: i64, id: &str, amount: i64) -> SlotRecord {
        SlotRecord {
            owner: "SHIP".into(),
            inventory: InventoryKind::Cargo,
            container: "2".into(),
            x,
            y: 0,
            resource_id: ResourceId::new(id),
            amount,
            resource_kind: ResourceKind::Substance,
        }
    }

    fn ingest(store: &mut Store, root: &str, captured_at: i64, slots: Vec<SlotRecord>) -> i64 {
        let payload = SnapshotPayload::new(
            format!("{root}/save.hg"),
            RootLabel::parse(root).unwrap(),
            captured_at,
            slots,
        )
        .unwrap();
        store.write_snapshot(&payload, &payload.slots, captured_at).unwrap().0
    }

    #[test]
    fn capture_takes_active_roots_latest_snapshots() {
        let mut store = Store::open_in_memory().unwrap();
        ingest(&mut store, "st_a", 100, vec![slot(0, "FUEL1", 1)]);
        let latest_a = ingest(&mut store, "st_a", 200, vec![slot(0, "FUEL1", 10), slot(1, "OXYGEN", 2)]);
        ingest(&mut store, "st_b", 100, vec![slot(0, "FUEL1", 99)]);
        store.set_active(&RootLabel::parse("st_b").unwrap(), false).unwrap();

        let captured = capture(&mut store, 1000).unwrap();
        assert_eq!(captured.rows, 2);
        assert_eq!(captured.roots, vec![RootLabel::parse("st_a").unwrap()]);

        let (at, rows) = select(&store, BaselinePick::Latest).unwrap().unwrap();
        assert_eq!(at, 1000);
        assert!(rows.iter().all(|r| r.snapshot_id == Some(latest_a)));
        assert_eq!(rows[0].owner_index, Some(2));
    }

    #[test]
    fn capture_registers_roots_without_rows() {
        let mut store = Store::open_in_memory().unwrap();
        ingest(&mut store, "st_a", 100, vec![slot(0, "FUEL1", 1)]);
        let empty = ingest(&mut store, "st_b", 100, vec![]);

        let captured = capture(&mut store, 1000).unwrap();
        assert_eq!(captured.rows, 1);
        assert_eq!(captured.roots.len(), 2);

        let cursor = store
            .ledger_cursor(&RootLabel::parse("st_b").unwrap(), 1000)
            .unwrap()
            .unwrap();
        assert_eq!(cursor.snapshot_id, Some(empty));
        assert!(cursor.fingerprint.is_some());
    }

    #[test]
    fn capture_of_empty_roots_still_selectable() {
        let mut store = Store::open_in_memory().unwrap();
        ingest(&mut store, "st_a", 100, vec![]);
        capture(&mut store, 1000).unwrap();

        let (at, rows) = select(&store, BaselinePick::Latest).unwrap().unwrap();
        assert_eq!(at, 1000);
        assert!(rows.is_empty());
    }

    #[test]
    fn baseline_must_move_forward() {
        let mut store = Store::open_in_memory().unwrap();
        ingest(&mut store, "st_a", 100, vec![slot(0, "FUEL1", 1)]);
        capture(&mut store, 1000).unwrap();
        let err = capture(&mut store, 1000).unwrap_err();
        assert!(err.is_bad_request());
    }

    #[test]
    fn imported_payload_becomes_baseline() {
        let mut store = Store::open_in_memory().unwrap();
        let payload = SnapshotPayload::new(
            "st_a/save.hg",
            RootLabel::parse("st_a").unwrap(),
            500,
            vec![slot(0, "FUEL1", 7), slot(1, "GET_REWARD", 1)],
        )
        .unwrap();

        let imported = import_payload(&mut store, &payload).unwrap();
        assert_eq!(imported.rows, 1);
        assert!(store.list_snapshots(None).unwrap().is_empty());
        assert!(store.root_exists(&payload.save_root).unwrap());

        let (_, rows) = select(&store, BaselinePick::At(500)).unwrap().unwrap();
        assert_eq!(rows[0].snapshot_id, None);
    }

    #[test]
    fn selectors_parse() {
        assert_eq!("latest".parse::<BaselinePick>().unwrap(), BaselinePick::Latest);
        assert_eq!("Oldest".parse::<BaselinePick>().unwrap(), BaselinePick::Oldest);
        assert_eq!("1760000000".parse::<BaselinePick>().unwrap(), BaselinePick::At(1_760_000_000));
        assert!("someday".parse::<BaselinePick>().is_err());
    }

    #[test]
    fn missing_capture_selects_nothing() {
        let store = Store::open_in_memory().unwrap();
        assert!(select(&store, BaselinePick::Latest).unwrap().is_none());
        assert!(select(&store, BaselinePick::At(5)).unwrap().is_none());
    }
}

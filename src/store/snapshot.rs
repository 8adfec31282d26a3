use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::Store;
use crate::error::Result;
use crate::ident::{ResourceId, RootLabel};
use crate::model::{normalize_owner, InventoryKind, ResourceKind, SlotRecord};
use crate::payload::SnapshotPayload;

/// Snapshot metadata stored in database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub id: i64,
    pub source: String,
    pub save_root: RootLabel,
    pub captured_at: i64,
    pub decoded_at: i64,
    pub fingerprint: String,
    pub imported_at: i64,
}

/// A slot row together with the snapshot it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRow {
    pub snapshot_id: i64,
    pub slot: SlotRecord,
}

const SNAPSHOT_COLUMNS: &str =
    "id, source, save_root, captured_at, decoded_at, fingerprint, imported_at";

impl Store {
    /// The most recent snapshot recorded for exactly this source.
    pub fn latest_for_source(&self, source: &str) -> Result<Option<Snapshot>> {
        let snapshot = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
                     WHERE source = ?1
                     ORDER BY id DESC
                     LIMIT 1"
                ),
                params![source],
                snapshot_from_row,
            )
            .optional()?;
        Ok(snapshot)
    }

    /// Upsert the snapshot keyed by (source, captured_at) and replace its item
    /// rows, all in one transaction. Returns the snapshot id and how many old
    /// rows were replaced.
    pub fn write_snapshot(
        &mut self,
        payload: &SnapshotPayload,
        slots: &[SlotRecord],
        imported_at: i64,
    ) -> Result<(i64, usize)> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO save_roots (label, active, first_seen) VALUES (?1, 1, ?2)",
            params![payload.save_root.as_str(), imported_at],
        )?;

        let snapshot_id: i64 = tx.query_row(
            "INSERT INTO snapshots (source, save_root, captured_at, decoded_at, fingerprint, imported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(source, captured_at) DO UPDATE SET
                decoded_at = excluded.decoded_at,
                fingerprint = excluded.fingerprint
             RETURNING id",
            params![
                payload.source,
                payload.save_root.as_str(),
                payload.captured_at,
                payload.decoded_at,
                payload.fingerprint,
                imported_at
            ],
            |row| row.get(0),
        )?;

        let replaced = tx.execute("DELETE FROM items WHERE snapshot_id = ?1", params![snapshot_id])?;

        let mut stmt = tx.prepare_cached(
            "INSERT INTO items (snapshot_id, owner_kind, inventory_kind, container, slot_x, slot_y,
                                resource_id, amount, resource_kind)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;

        for slot in slots {
            stmt.execute(params![
                snapshot_id,
                slot.owner,
                slot.inventory.as_str(),
                slot.container,
                slot.x,
                slot.y,
                slot.resource_id.as_str(),
                slot.amount,
                slot.resource_kind.as_str()
            ])?;
        }

        drop(stmt);
        tx.commit()?;

        Ok((snapshot_id, replaced))
    }

    /// Current snapshot of a root: greatest id, ties by import time.
    pub fn latest_for_root(&self, root: &RootLabel) -> Result<Option<Snapshot>> {
        let snapshot = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
                     WHERE lower(trim(save_root)) = ?1
                     ORDER BY id DESC, imported_at DESC
                     LIMIT 1"
                ),
                params![root.as_str()],
                snapshot_from_row,
            )
            .optional()?;
        Ok(snapshot)
    }

    /// List snapshots, newest first, optionally for one root.
    pub fn list_snapshots(&self, root: Option<&RootLabel>) -> Result<Vec<Snapshot>> {
        let snapshots = match root {
            Some(root) => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
                     WHERE lower(trim(save_root)) = ?1
                     ORDER BY id DESC"
                ))?;
                let rows = stmt.query_map(params![root.as_str()], snapshot_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM snapshots ORDER BY id DESC"
                ))?;
                let rows = stmt.query_map([], snapshot_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(snapshots)
    }

    /// Get a specific snapshot by ID
    pub fn get_snapshot(&self, id: i64) -> Result<Option<Snapshot>> {
        let snapshot = self
            .conn
            .query_row(
                &format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE id = ?1"),
                params![id],
                snapshot_from_row,
            )
            .optional()?;
        Ok(snapshot)
    }

    /// The most recently imported snapshot anywhere.
    pub fn most_recent_import(&self) -> Result<Option<Snapshot>> {
        let snapshot = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
                     ORDER BY imported_at DESC, id DESC
                     LIMIT 1"
                ),
                [],
                snapshot_from_row,
            )
            .optional()?;
        Ok(snapshot)
    }

    /// Delete a snapshot; its item rows go with it. Returns false if absent.
    pub fn delete_snapshot(&mut self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM snapshots WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Load slot rows for a specific snapshot
    pub fn load_items(&self, snapshot_id: i64) -> Result<Vec<SlotRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT owner_kind, inventory_kind, container, slot_x, slot_y, resource_id, amount, resource_kind
             FROM items
             WHERE snapshot_id = ?1
             ORDER BY id",
        )?;
        let slots = stmt
            .query_map(params![snapshot_id], |row| slot_from_row(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(slots)
    }

    pub fn item_count(&self, snapshot_id: i64) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM items WHERE snapshot_id = ?1",
            params![snapshot_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    /// Every item row ever recorded for a root, in snapshot order.
    pub fn history_items(&self, root: &RootLabel) -> Result<Vec<ItemRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT i.snapshot_id, i.owner_kind, i.inventory_kind, i.container, i.slot_x, i.slot_y,
                    i.resource_id, i.amount, i.resource_kind
             FROM items i
             JOIN snapshots s ON s.id = i.snapshot_id
             WHERE lower(trim(s.save_root)) = ?1
             ORDER BY i.snapshot_id, i.id",
        )?;
        let rows = stmt
            .query_map(params![root.as_str()], |row| {
                Ok(ItemRow {
                    snapshot_id: row.get(0)?,
                    slot: slot_from_row(row, 1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn snapshot_from_row(row: &Row) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        id: row.get(0)?,
        source: row.get(1)?,
        save_root: RootLabel::from_stored(row.get(2)?),
        captured_at: row.get(3)?,
        decoded_at: row.get(4)?,
        fingerprint: row.get(5)?,
        imported_at: row.get(6)?,
    })
}

/// Columns from `offset`: owner, inventory, container, x, y, resource, amount, kind.
pub(super) fn slot_from_row(row: &Row, offset: usize) -> rusqlite::Result<SlotRecord> {
    let owner: String = row.get(offset)?;
    let inventory: String = row.get(offset + 1)?;
    let resource_id: String = row.get(offset + 5)?;
    let resource_kind: String = row.get(offset + 7)?;

    Ok(SlotRecord {
        owner: normalize_owner(&owner),
        inventory: InventoryKind::parse(&inventory),
        container: row.get(offset + 2)?,
        x: row.get(offset + 3)?,
        y: row.get(offset + 4)?,
        resource_id: ResourceId::new(&resource_id),
        amount: row.get(offset + 6)?,
        resource_kind: ResourceKind::parse(&resource_kind),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(id: &str, x: i64, amount: i64) -> SlotRecord {
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

    fn payload(source: &str, root: &str, captured_at: i64, slots: Vec<SlotRecord>) -> SnapshotPayload {
        SnapshotPayload::new(source, RootLabel::parse(root).unwrap(), captured_at, slots).unwrap()
    }

    #[test]
    fn upsert_reuses_identity_for_same_source_and_capture() {
        let mut store = Store::open_in_memory().unwrap();
        let first = payload("a.hg", "st_1", 100, vec![slot("FUEL1", 0, 10)]);
        let (id, replaced) = store.write_snapshot(&first, &first.slots, 1000).unwrap();
        assert_eq!(replaced, 0);

        let second = payload("a.hg", "st_1", 100, vec![slot("FUEL1", 0, 12), slot("OXYGEN", 1, 4)]);
        let (again, replaced) = store.write_snapshot(&second, &second.slots, 2000).unwrap();
        assert_eq!(again, id);
        assert_eq!(replaced, 1);

        let snap = store.get_snapshot(id).unwrap().unwrap();
        assert_eq!(snap.fingerprint, second.fingerprint);
        assert_eq!(snap.imported_at, 1000, "import time is not refreshed");
        assert_eq!(store.item_count(id).unwrap(), 2);
    }

    #[test]
    fn new_capture_gets_new_identity() {
        let mut store = Store::open_in_memory().unwrap();
        let a = payload("a.hg", "st_1", 100, vec![]);
        let b = payload("a.hg", "st_1", 200, vec![]);
        let (id_a, _) = store.write_snapshot(&a, &a.slots, 1).unwrap();
        let (id_b, _) = store.write_snapshot(&b, &b.slots, 2).unwrap();
        assert!(id_b > id_a);
        assert_eq!(store.latest_for_source("a.hg").unwrap().unwrap().id, id_b);
    }

    #[test]
    fn duplicate_slot_rolls_back_whole_write() {
        let mut store = Store::open_in_memory().unwrap();
        let good = payload("a.hg", "st_1", 100, vec![slot("FUEL1", 0, 10)]);
        let (id, _) = store.write_snapshot(&good, &good.slots, 1).unwrap();

        let bad = payload("a.hg", "st_1", 100, vec![slot("FUEL1", 0, 50), slot("OXYGEN", 0, 5)]);
        assert!(store.write_snapshot(&bad, &bad.slots, 2).is_err());

        let snap = store.get_snapshot(id).unwrap().unwrap();
        assert_eq!(snap.fingerprint, good.fingerprint);
        let items = store.load_items(id).unwrap();
        assert_eq!(items, good.slots);
    }

    #[test]
    fn delete_cascades_to_own_items_only() {
        let mut store = Store::open_in_memory().unwrap();
        let a = payload("a.hg", "st_1", 100, vec![slot("FUEL1", 0, 10), slot("OXYGEN", 1, 3)]);
        let b = payload("b.hg", "st_2", 100, vec![slot("FUEL1", 0, 7)]);
        let (id_a, _) = store.write_snapshot(&a, &a.slots, 1).unwrap();
        let (id_b, _) = store.write_snapshot(&b, &b.slots, 1).unwrap();

        assert!(store.delete_snapshot(id_a).unwrap());
        assert!(!store.delete_snapshot(id_a).unwrap());
        assert_eq!(store.item_count(id_a).unwrap(), 0);
        assert_eq!(store.item_count(id_b).unwrap(), 1);

        let orphans: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM items WHERE snapshot_id = ?1", [id_a], |r| r.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn legacy_root_labels_match_after_normalization() {
        let mut store = Store::open_in_memory().unwrap();
        let a = payload("a.hg", "st_1", 100, vec![slot("FUEL1", 0, 10)]);
        store.write_snapshot(&a, &a.slots, 1).unwrap();
        store
            .conn
            .execute("UPDATE snapshots SET save_root = ' ST_1 '", [])
            .unwrap();

        let root = RootLabel::parse("st_1").unwrap();
        assert_eq!(store.list_snapshots(Some(&root)).unwrap().len(), 1);
        assert_eq!(store.history_items(&root).unwrap().len(), 1);
        assert_eq!(store.list_snapshots(None).unwrap()[0].save_root, root);
    }

    #[test]
    fn most_recent_import_prefers_import_time() {
        let mut store = Store::open_in_memory().unwrap();
        let a = payload("a.hg", "st_1", 100, vec![]);
        let b = payload("b.hg", "st_2", 50, vec![]);
        let (id_a, _) = store.write_snapshot(&a, &a.slots, 500).unwrap();
        store.write_snapshot(&b, &b.slots, 400).unwrap();
        assert_eq!(store.most_recent_import().unwrap().unwrap().id, id_a);
    }
}

use rusqlite::{params, OptionalExtension, Row, Transaction};
use serde::Serialize;

use super::Store;
use crate::error::Result;
use crate::ident::{ResourceId, RootLabel};
use crate::model::{normalize_owner, InventoryKind, ResourceKind, SlotRecord};

/// Full-state row for the baseline+ledger path. The slot's container is
/// stored as the owner name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaselineRow {
    pub captured_at: i64,
    pub save_root: RootLabel,
    pub snapshot_id: Option<i64>,
    pub slot: SlotRecord,
    pub owner_index: Option<i64>,
    pub owner_name: String,
    pub max_amount: i64,
    pub source_file: String,
}

/// Net change of one resource in one owner inventory over a play session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerDelta {
    pub resource_id: ResourceId,
    pub resource_kind: ResourceKind,
    pub owner: String,
    pub inventory: InventoryKind,
    pub delta: i64,
    pub applied_at: i64,
    pub session_start: Option<i64>,
    pub session_end: Option<i64>,
    pub snapshot_id: Option<i64>,
    pub save_root: Option<RootLabel>,
}

impl LedgerDelta {
    pub fn is_tech(&self) -> bool {
        self.inventory == InventoryKind::TechOnly || self.resource_kind == ResourceKind::Technology
    }
}

/// Last snapshot of a root folded into the ledger under one baseline.
/// `snapshot_id` is `None` until the root has a snapshot to fold; a
/// `fingerprint` that no longer matches means the snapshot was re-ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerCursor {
    pub save_root: RootLabel,
    pub baseline_at: i64,
    pub snapshot_id: Option<i64>,
    pub fingerprint: Option<String>,
}

impl Store {
    /// Write a batch of baseline rows in one transaction.
    pub fn insert_baseline(&mut self, rows: &[BaselineRow]) -> Result<usize> {
        self.insert_capture(rows, &[])
    }

    /// Write a baseline capture: its rows plus the starting cursor of every
    /// root it covers, including roots that contributed no rows.
    pub fn insert_capture(&mut self, rows: &[BaselineRow], cursors: &[LedgerCursor]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO baseline_items (captured_at, save_root, snapshot_id, owner_kind, owner_index,
                                             owner_name, inventory_kind, slot_x, slot_y, resource_id,
                                             resource_kind, amount, max_amount, source_file)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.captured_at,
                    row.save_root.as_str(),
                    row.snapshot_id,
                    row.slot.owner,
                    row.owner_index,
                    row.owner_name,
                    row.slot.inventory.as_str(),
                    row.slot.x,
                    row.slot.y,
                    row.slot.resource_id.as_str(),
                    row.slot.resource_kind.as_str(),
                    row.slot.amount,
                    row.max_amount,
                    row.source_file
                ])?;
            }
        }
        for cursor in cursors {
            put_cursor(&tx, cursor)?;
        }
        tx.commit()?;
        Ok(rows.len())
    }

    pub fn latest_baseline_at(&self) -> Result<Option<i64>> {
        let ts = self
            .conn
            .query_row(
                "SELECT MAX(at) FROM (SELECT captured_at AS at FROM baseline_items
                                      UNION ALL SELECT baseline_at FROM ledger_cursors)",
                [],
                |row| row.get(0),
            )?;
        Ok(ts)
    }

    pub fn oldest_baseline_at(&self) -> Result<Option<i64>> {
        let ts = self
            .conn
            .query_row(
                "SELECT MIN(at) FROM (SELECT captured_at AS at FROM baseline_items
                                      UNION ALL SELECT baseline_at FROM ledger_cursors)",
                [],
                |row| row.get(0),
            )?;
        Ok(ts)
    }

    /// Distinct baseline capture timestamps with their row counts, newest first.
    pub fn baseline_captures(&self) -> Result<Vec<(i64, usize)>> {
        let mut stmt = self.conn.prepare(
            "SELECT captured_at, COUNT(*) FROM baseline_items
             GROUP BY captured_at
             ORDER BY captured_at DESC",
        )?;
        let captures = stmt
            .query_map([], |row| {
                let count: i64 = row.get(1)?;
                Ok((row.get(0)?, count.max(0) as usize))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(captures)
    }

    /// All baseline rows at exactly this capture timestamp.
    pub fn baseline_rows_at(&self, captured_at: i64) -> Result<Vec<BaselineRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT captured_at, save_root, snapshot_id, owner_kind, owner_index, owner_name,
                    inventory_kind, slot_x, slot_y, resource_id, resource_kind, amount,
                    max_amount, source_file
             FROM baseline_items
             WHERE captured_at = ?1
             ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![captured_at], baseline_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Append deltas in one transaction.
    pub fn append_deltas(&mut self, deltas: &[LedgerDelta]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        insert_deltas(&tx, deltas)?;
        tx.commit()?;
        Ok(deltas.len())
    }

    /// Append a root's derived deltas and move its cursor, atomically.
    pub fn commit_sync(&mut self, deltas: &[LedgerDelta], cursor: &LedgerCursor) -> Result<usize> {
        let tx = self.conn.transaction()?;
        insert_deltas(&tx, deltas)?;
        put_cursor(&tx, cursor)?;
        tx.commit()?;
        Ok(deltas.len())
    }

    /// Deltas with `applied_at >= since`, oldest first.
    pub fn deltas_since(&self, since: i64) -> Result<Vec<LedgerDelta>> {
        let mut stmt = self.conn.prepare(
            "SELECT resource_id, resource_kind, owner_kind, inventory_kind, delta, applied_at,
                    session_start, session_end, snapshot_id, save_root
             FROM ledger_deltas
             WHERE applied_at >= ?1
             ORDER BY applied_at, id",
        )?;
        let deltas = stmt
            .query_map(params![since], delta_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(deltas)
    }

    pub fn ledger_cursor(&self, root: &RootLabel, baseline_at: i64) -> Result<Option<LedgerCursor>> {
        let cursor = self
            .conn
            .query_row(
                "SELECT save_root, baseline_at, snapshot_id, fingerprint FROM ledger_cursors
                 WHERE lower(trim(save_root)) = ?1 AND baseline_at = ?2",
                params![root.as_str(), baseline_at],
                |row| {
                    Ok(LedgerCursor {
                        save_root: RootLabel::from_stored(row.get(0)?),
                        baseline_at: row.get(1)?,
                        snapshot_id: row.get(2)?,
                        fingerprint: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(cursor)
    }

    /// Whether a capture exists at this timestamp, with or without rows.
    pub fn baseline_exists(&self, captured_at: i64) -> Result<bool> {
        let found: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM baseline_items WHERE captured_at = ?1)
                 OR EXISTS(SELECT 1 FROM ledger_cursors WHERE baseline_at = ?1)",
            params![captured_at],
            |row| row.get(0),
        )?;
        Ok(found != 0)
    }
}

fn insert_deltas(tx: &Transaction, deltas: &[LedgerDelta]) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO ledger_deltas (resource_id, resource_kind, owner_kind, inventory_kind, delta,
                                    applied_at, session_start, session_end, snapshot_id, save_root)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;
    for delta in deltas {
        stmt.execute(params![
            delta.resource_id.as_str(),
            delta.resource_kind.as_str(),
            delta.owner,
            delta.inventory.as_str(),
            delta.delta,
            delta.applied_at,
            delta.session_start,
            delta.session_end,
            delta.snapshot_id,
            delta.save_root.as_ref().map(RootLabel::as_str)
        ])?;
    }
    Ok(())
}

fn put_cursor(tx: &Transaction, cursor: &LedgerCursor) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO ledger_cursors (save_root, baseline_at, snapshot_id, fingerprint)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(save_root, baseline_at) DO UPDATE SET
             snapshot_id = excluded.snapshot_id,
             fingerprint = excluded.fingerprint",
        params![
            cursor.save_root.as_str(),
            cursor.baseline_at,
            cursor.snapshot_id,
            cursor.fingerprint
        ],
    )?;
    Ok(())
}

fn baseline_from_row(row: &Row) -> rusqlite::Result<BaselineRow> {
    let owner: String = row.get(3)?;
    let inventory: String = row.get(6)?;
    let resource_id: String = row.get(9)?;
    let resource_kind: String = row.get(10)?;
    let owner_name: String = row.get(5)?;

    Ok(BaselineRow {
        captured_at: row.get(0)?,
        save_root: RootLabel::from_stored(row.get(1)?),
        snapshot_id: row.get(2)?,
        slot: SlotRecord {
            owner: normalize_owner(&owner),
            inventory: InventoryKind::parse(&inventory),
            container: owner_name.clone(),
            x: row.get(7)?,
            y: row.get(8)?,
            resource_id: ResourceId::new(&resource_id),
            amount: row.get(11)?,
            resource_kind: ResourceKind::parse(&resource_kind),
        },
        owner_index: row.get(4)?,
        owner_name,
        max_amount: row.get(12)?,
        source_file: row.get(13)?,
    })
}

fn delta_from_row(row: &Row) -> rusqlite::Result<LedgerDelta> {
    let resource_id: String = row.get(0)?;
    let resource_kind: String = row.get(1)?;
    let owner: String = row.get(2)?;
    let inventory: String = row.get(3)?;
    let save_root: Option<String> = row.get(9)?;

    Ok(LedgerDelta {
        resource_id: ResourceId::new(&resource_id),
        resource_kind: ResourceKind::parse(&resource_kind),
        owner: normalize_owner(&owner),
        inventory: InventoryKind::parse(&inventory),
        delta: row.get(4)?,
        applied_at: row.get(5)?,
        session_start: row.get(6)?,
        session_end: row.get(7)?,
        snapshot_id: row.get(8)?,
        save_root: save_root
            .filter(|label| !label.trim().is_empty())
            .map(RootLabel::from_stored),
    })
}

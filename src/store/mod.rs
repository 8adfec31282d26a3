//! SQLite storage.
//!
//! Tables:
//! - save_roots: label, active flag, display name
//! - snapshots: one row per ingested decode, unique on (source, captured_at)
//! - items: one row per slot per snapshot, cascade-deleted with its snapshot
//! - baseline_items: full-state rows for the ledger path
//! - ledger_deltas: signed per-session changes after a baseline
//! - ledger_cursors: per root and baseline, the last snapshot folded into the ledger
//!
//! Open one `Store` per thread; connections are not shared.

pub mod diff;
mod ledger;
mod roots;
mod snapshot;

pub use ledger::{BaselineRow, LedgerCursor, LedgerDelta};
pub use roots::RootInfo;
pub use snapshot::{ItemRow, Snapshot};

use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS save_roots (
            label TEXT PRIMARY KEY,
            active INTEGER NOT NULL DEFAULT 1,
            display_name TEXT,
            first_seen INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            save_root TEXT NOT NULL,
            captured_at INTEGER NOT NULL,
            decoded_at INTEGER NOT NULL,
            fingerprint TEXT NOT NULL,
            imported_at INTEGER NOT NULL,
            UNIQUE(source, captured_at)
        );

        CREATE INDEX IF NOT EXISTS idx_snapshots_root ON snapshots(save_root, id);

        CREATE TABLE IF NOT EXISTS items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            snapshot_id INTEGER NOT NULL,
            owner_kind TEXT NOT NULL,
            inventory_kind TEXT NOT NULL,
            container TEXT NOT NULL,
            slot_x INTEGER NOT NULL,
            slot_y INTEGER NOT NULL,
            resource_id TEXT NOT NULL,
            amount INTEGER NOT NULL,
            resource_kind TEXT NOT NULL,
            FOREIGN KEY(snapshot_id) REFERENCES snapshots(id) ON DELETE CASCADE,
            UNIQUE(snapshot_id, owner_kind, inventory_kind, container, slot_x, slot_y)
        );

        CREATE INDEX IF NOT EXISTS idx_items_snapshot_id ON items(snapshot_id);

        CREATE TABLE IF NOT EXISTS baseline_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            captured_at INTEGER NOT NULL,
            save_root TEXT NOT NULL,
            snapshot_id INTEGER,
            owner_kind TEXT NOT NULL,
            owner_index INTEGER,
            owner_name TEXT NOT NULL DEFAULT '',
            inventory_kind TEXT NOT NULL,
            slot_x INTEGER NOT NULL,
            slot_y INTEGER NOT NULL,
            resource_id TEXT NOT NULL,
            resource_kind TEXT NOT NULL,
            amount INTEGER NOT NULL,
            max_amount INTEGER NOT NULL DEFAULT 0,
            source_file TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_baseline_captured_at ON baseline_items(captured_at);

        CREATE TABLE IF NOT EXISTS ledger_deltas (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            resource_id TEXT NOT NULL,
            resource_kind TEXT NOT NULL,
            owner_kind TEXT NOT NULL,
            inventory_kind TEXT NOT NULL,
            delta INTEGER NOT NULL,
            applied_at INTEGER NOT NULL,
            session_start INTEGER,
            session_end INTEGER,
            snapshot_id INTEGER,
            save_root TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_ledger_applied_at ON ledger_deltas(applied_at);

        CREATE TABLE IF NOT EXISTS ledger_cursors (
            save_root TEXT NOT NULL,
            baseline_at INTEGER NOT NULL,
            snapshot_id INTEGER,
            fingerprint TEXT,
            PRIMARY KEY(save_root, baseline_at)
        );",
    )
}

/// Database handle. Open once per command (or per worker thread), reuse
/// across all operations.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        // WAL lets readers proceed while a root is being ingested
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        Self::configure(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        init_schema(&conn)?;
        Ok(Store { conn })
    }
}

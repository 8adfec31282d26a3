//! Decoder documents.
//!
//! The external decoder writes one JSON document per decoded save. Only
//! `slots` is required; the rest is filled from the file itself:
//! - `source` defaults to the document path
//! - `captured_at` / `decoded_at` default to the document mtime
//! - `save_root` is derived from the source path
//! - `fingerprint` is computed from the normalized slots

use serde::Deserialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::fingerprint;
use crate::ident::{ResourceId, RootLabel};
use crate::model::{normalize_owner, InventoryKind, ResourceKind, SlotRecord};
use crate::util;

/// The ingestion input contract.
#[derive(Debug, Clone)]
pub struct SnapshotPayload {
    pub source: String,
    pub save_root: RootLabel,
    pub captured_at: i64,
    pub decoded_at: i64,
    pub fingerprint: String,
    pub slots: Vec<SlotRecord>,
}

impl SnapshotPayload {
    /// Payload with a computed fingerprint and `decoded_at == captured_at`.
    pub fn new(
        source: impl Into<String>,
        save_root: RootLabel,
        captured_at: i64,
        slots: Vec<SlotRecord>,
    ) -> Result<Self> {
        let fingerprint = fingerprint::of_slots(&slots)?;
        Ok(SnapshotPayload {
            source: source.into(),
            save_root,
            captured_at,
            decoded_at: captured_at,
            fingerprint,
            slots,
        })
    }
}

#[derive(Deserialize)]
struct Document {
    source: Option<String>,
    save_root: Option<String>,
    captured_at: Option<i64>,
    decoded_at: Option<i64>,
    fingerprint: Option<String>,
    slots: Vec<DocumentSlot>,
}

#[derive(Deserialize)]
struct DocumentSlot {
    #[serde(default, alias = "owner_kind", alias = "owner_type")]
    owner: String,
    #[serde(default, alias = "inventory_kind")]
    inventory: String,
    #[serde(default)]
    container: String,
    #[serde(default, alias = "slot_x")]
    x: i64,
    #[serde(default, alias = "slot_y")]
    y: i64,
    #[serde(alias = "id")]
    resource_id: String,
    #[serde(default)]
    amount: i64,
    #[serde(default, alias = "resource_type")]
    resource_kind: String,
}

impl DocumentSlot {
    fn into_record(self) -> SlotRecord {
        SlotRecord {
            owner: normalize_owner(&self.owner),
            inventory: InventoryKind::parse(&self.inventory),
            container: self.container.trim().to_string(),
            x: self.x,
            y: self.y,
            resource_id: ResourceId::new(&self.resource_id),
            amount: self.amount,
            resource_kind: ResourceKind::parse(&self.resource_kind),
        }
    }
}

/// Read a decoder document from disk.
pub fn load(path: &Path) -> Result<SnapshotPayload> {
    let text = std::fs::read_to_string(path)?;
    let mtime = std::fs::metadata(path)?
        .modified()
        .map(util::system_time_secs)
        .unwrap_or(0);
    parse_document(&text, &path.display().to_string(), mtime)
}

/// Parse document text; `origin` and `mtime` stand in for missing fields.
pub fn parse_document(text: &str, origin: &str, mtime: i64) -> Result<SnapshotPayload> {
    let doc: Document = serde_json::from_str(text).map_err(|e| Error::InvalidPayload {
        path: origin.to_string(),
        reason: e.to_string(),
    })?;

    let source = doc
        .source
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| origin.to_string());

    let save_root = match doc.save_root.as_deref().map(str::trim) {
        Some(label) if !label.is_empty() => RootLabel::parse(label)?,
        _ => derive_save_root(&source),
    };

    // slots without an id are empty slots
    let slots: Vec<SlotRecord> = doc
        .slots
        .into_iter()
        .map(DocumentSlot::into_record)
        .filter(|slot| !slot.resource_id.is_empty())
        .collect();

    let fingerprint = match doc.fingerprint.map(|f| f.trim().to_lowercase()) {
        Some(fp) if !fp.is_empty() => fp,
        _ => fingerprint::of_slots(&slots)?,
    };

    let captured_at = doc.captured_at.unwrap_or(mtime);
    Ok(SnapshotPayload {
        source,
        save_root,
        captured_at,
        decoded_at: doc.decoded_at.unwrap_or(mtime),
        fingerprint,
        slots,
    })
}

/// Save root for a source path: the first `st_<digits>` segment (a Steam
/// profile directory), else the parent directory name, else `default`.
pub fn derive_save_root(source: &str) -> RootLabel {
    if let Some(label) = steam_profile_segment(source).and_then(RootLabel::sanitized) {
        return label;
    }

    Path::new(source)
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|name| name.to_str())
        .and_then(RootLabel::sanitized)
        .unwrap_or_else(|| RootLabel::from_stored("default".to_string()))
}

fn steam_profile_segment(source: &str) -> Option<&str> {
    let mut search_from = 0;
    while let Some(offset) = source[search_from..].find("st_") {
        let begin = search_from + offset;
        let digits_start = begin + 3;
        let digits_end = source[digits_start..]
            .find(|c: char| !c.is_ascii_digit())
            .map(|n| digits_start + n)
            .unwrap_or(source.len());

        if digits_end > digits_start {
            return Some(&source[begin..digits_end]);
        }
        search_from = digits_start;
    }
    None
}

/// Expand arguments into decoder documents: files are taken as-is,
/// directories are walked for `*.json`.
pub fn discover(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut in_dir: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(false)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|p| {
                    p.extension()
                        .and_then(|ext| ext.to_str())
                        .map(|ext| ext.eq_ignore_ascii_case("json"))
                        .unwrap_or(false)
                })
                .collect();
            in_dir.sort();
            found.extend(in_dir);
        } else {
            found.push(path.clone());
        }
    }
    found
}

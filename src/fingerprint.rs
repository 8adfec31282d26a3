//! Content fingerprint of a decoded payload.
//!
//! SHA-256 over the canonical JSON encoding of the normalized slot list
//! (object keys sorted, no whitespace), as lower-case hex. Slot order is
//! part of the content.

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::model::SlotRecord;

pub fn of_slots(slots: &[SlotRecord]) -> Result<String> {
    // round-trip through Value so object keys come out sorted
    let canonical = serde_json::to_value(slots)?;
    let mut hasher = Sha256::new();
    serde_json::to_writer(&mut hasher, &canonical)?;
    Ok(format!("{:x}", hasher.finalize()))
}

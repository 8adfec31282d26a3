use parking_lot::Mutex;
use std::collections::HashSet;

use crate::ident::RootLabel;

/// In-flight set of roots. At most one ingestion per root runs at a time;
/// different roots never wait on each other.
#[derive(Debug, Default)]
pub struct IngestGate {
    in_flight: Mutex<HashSet<RootLabel>>,
}

impl IngestGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a root. `None` means a run for it is already in flight.
    pub fn try_begin(&self, root: &RootLabel) -> Option<IngestPermit<'_>> {
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(root.clone()) {
            return None;
        }
        Some(IngestPermit {
            gate: self,
            root: root.clone(),
        })
    }

    pub fn is_busy(&self, root: &RootLabel) -> bool {
        self.in_flight.lock().contains(root)
    }
}

/// Releases its root when dropped.
#[derive(Debug)]
pub struct IngestPermit<'a> {
    gate: &'a IngestGate,
    root: RootLabel,
}

impl IngestPermit<'_> {
    pub fn root(&self) -> &RootLabel {
        &self.root
    }
}

impl Drop for IngestPermit<'_> {
    fn drop(&mut self) {
        self.gate.in_flight.lock().remove(&self.root);
    }
}

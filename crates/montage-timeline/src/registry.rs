//! Deferred reference resolution for deserialization.
//!
//! Serialized objects reference each other by uid (`linked-uid`,
//! `brother-uid`), and a reference may point at an object that appears later
//! in the file. The registry is owned by whichever scope performs the load,
//! passed explicitly into it, and discarded afterwards, never a hidden
//! global. Construction registers every object's uid; references whose
//! target is not yet known are parked in the pending table and handed back
//! as patch requests once every object exists.

use std::collections::HashSet;

use montage_core::{MontageError, Result};
use uuid::Uuid;

/// Which reference field of an object a pending request patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefSlot {
    Linked,
    Brother,
}

/// A reference whose target may not have been constructed yet.
#[derive(Debug, Clone, Copy)]
pub struct PendingRef {
    /// Object whose field gets patched.
    pub owner: Uuid,
    /// Which field.
    pub slot: RefSlot,
    /// Referenced uid.
    pub target: Uuid,
}

/// Directory mapping stable uids to constructed objects during a load, plus
/// the pending-reference table.
#[derive(Debug, Default)]
pub struct LinkRegistry {
    known: HashSet<Uuid>,
    pending: Vec<PendingRef>,
}

impl LinkRegistry {
    /// Create an empty registry for one load.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a constructed object. Each uid may appear exactly once per
    /// load.
    pub fn register(&mut self, uid: Uuid) -> Result<()> {
        if !self.known.insert(uid) {
            return Err(MontageError::DuplicateLink(format!(
                "uid {uid} is registered twice"
            )));
        }
        Ok(())
    }

    /// Check whether a uid has been registered.
    pub fn is_known(&self, uid: Uuid) -> bool {
        self.known.contains(&uid)
    }

    /// Park a reference to be patched once every object exists.
    pub fn defer(&mut self, owner: Uuid, slot: RefSlot, target: Uuid) {
        self.pending.push(PendingRef {
            owner,
            slot,
            target,
        });
    }

    /// Finalize the load: every pending reference must now have a
    /// registered target. Returns the patch requests in deferral order.
    pub fn resolve(self) -> Result<Vec<PendingRef>> {
        let unresolved: Vec<String> = self
            .pending
            .iter()
            .filter(|p| !self.known.contains(&p.target))
            .map(|p| p.target.to_string())
            .collect();
        if !unresolved.is_empty() {
            return Err(MontageError::UnresolvedReference(format!(
                "references to objects that were never constructed: {}",
                unresolved.join(", ")
            )));
        }
        Ok(self.pending)
    }
}

//! Hand-off of content hashes freed by deletes.
//!
//! After a delete commits, the hashes the deleted versions referenced are
//! passed to a [`HashCleanup`] collaborator, typically an external
//! reference-counting collector. Other cookbooks may still reference them,
//! so the receiver gets candidates, not a removal order.

use std::sync::mpsc::Sender;

use cookbook_store_core::Version;
use tracing::warn;

/// Hashes released by one committed delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupCandidates {
    pub cookbook: String,
    /// The deleted version, or `None` for a whole-cookbook delete.
    pub version: Option<Version>,
    /// Sorted, deduplicated content hashes.
    pub hashes: Vec<String>,
}

/// Receives cleanup candidates after a delete commits.
///
/// Never called for a delete that rolled back, and never called with an
/// empty hash list.
pub trait HashCleanup {
    fn release(&self, candidates: CleanupCandidates);
}

/// Drops every candidate set.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardCleanup;

impl HashCleanup for DiscardCleanup {
    fn release(&self, _candidates: CleanupCandidates) {}
}

impl HashCleanup for Sender<CleanupCandidates> {
    fn release(&self, candidates: CleanupCandidates) {
        if let Err(err) = self.send(candidates) {
            let dropped = err.0;
            warn!(
                cookbook = %dropped.cookbook,
                hashes = dropped.hashes.len(),
                "hash cleanup receiver is gone; candidates dropped"
            );
        }
    }
}

//! End-of-run diagnostics over the state store.

use crate::error::StoreError;
use crate::state::{ProcessingStatus, StateStore};

/// Outcome counts across every tracked document.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub total: u64,
    pub success: u64,
    pub failure: u64,
}

/// Count every entry in one pass. Read-only.
pub fn tally(store: &StateStore) -> Result<Tally, StoreError> {
    let mut tally = Tally::default();
    for (_, status) in store.scan()? {
        tally.total += 1;
        match status {
            ProcessingStatus::Success => tally.success += 1,
            ProcessingStatus::Failure => tally.failure += 1,
        }
    }
    Ok(tally)
}

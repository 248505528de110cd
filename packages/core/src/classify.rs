//! Candidate classification.
//!
//! Reduces the discovered partitions to the eligible ones and splits them by
//! whether they are already mounted.

use crate::disk::BlockDevice;
use crate::error::{Error, Result};

/// Eligible partitions, split by mount state. Discovery order is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    pub mounted: Vec<BlockDevice>,
    pub unmounted: Vec<BlockDevice>,
}

impl CandidateSet {
    /// Total number of candidates.
    pub fn len(&self) -> usize {
        self.mounted.len() + self.unmounted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Filters `devices` to eligible partitions and splits them.
///
/// Fails with [`Error::NoEligibleDevices`] when nothing qualifies.
pub fn classify(devices: &[BlockDevice]) -> Result<CandidateSet> {
    let (mounted, unmounted): (Vec<BlockDevice>, Vec<BlockDevice>) = devices
        .iter()
        .filter(|d| d.is_eligible())
        .cloned()
        .partition(|d| d.is_mounted());

    let candidates = CandidateSet { mounted, unmounted };
    if candidates.is_empty() {
        return Err(Error::NoEligibleDevices);
    }

    log::info!(
        "found {} eligible partition(s): {} mounted, {} unmounted",
        candidates.len(),
        candidates.mounted.len(),
        candidates.unmounted.len()
    );
    Ok(candidates)
}

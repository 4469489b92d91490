//! Diff calculation between a fresh fetch and the snapshot.
//!
//! The delta (new or changed listings) is the only input that proceeds to
//! enhancement, so unchanged listings never trigger routing lookups.

use std::collections::{HashMap, HashSet};

use crate::models::Listing;

/// Ids grouped by kind of change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// In current but not in previous
    pub added: Vec<String>,
    /// In both, tracked attribute changed
    pub updated: Vec<String>,
    /// In previous but not in current; informational only
    pub removed: Vec<String>,
}

/// Diff result with the full delta listings.
#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    pub diff: Diff,
    /// Added and updated listings in fetch order
    pub delta: Vec<Listing>,
}

/// Calculator for computing diffs against the snapshot.
///
/// A listing is new when its id is unknown and changed when its price differs.
#[derive(Debug, Clone, Default)]
pub struct DiffCalculator;

impl DiffCalculator {
    /// Create a new diff calculator.
    pub fn new() -> Self {
        Self
    }

    /// Calculate which `current` listings are new or changed.
    ///
    /// Identity is the id alone. If `current` repeats an id, the first
    /// occurrence wins.
    pub fn calculate(
        &self,
        current: &[Listing],
        previous: &HashMap<String, Listing>,
    ) -> DiffResult {
        let mut result = DiffResult::default();
        let mut seen: HashSet<&str> = HashSet::new();

        for listing in current {
            if !seen.insert(listing.id.as_str()) {
                continue;
            }
            match previous.get(&listing.id) {
                None => {
                    result.diff.added.push(listing.id.clone());
                    result.delta.push(listing.clone());
                }
                Some(prev) if prev.price != listing.price => {
                    result.diff.updated.push(listing.id.clone());
                    result.delta.push(listing.clone());
                }
                Some(_) => {}
            }
        }

        let mut removed: Vec<String> = previous
            .keys()
            .filter(|id| !seen.contains(id.as_str()))
            .cloned()
            .collect();
        removed.sort();
        result.diff.removed = removed;

        result
    }
}

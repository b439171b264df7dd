//! Selection of which pending event(s) to process next.

use crate::source::PendingEvent;
use std::str::FromStr;
use thiserror::Error;

/// Ordering policy applied to the pending listing each cycle.
///
/// Both deployment generations are supported; oldest-first supersedes the
/// lexicographic batch as the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderingPolicy {
    /// Sort the whole listing by key ascending and process it as one batch.
    LexicographicBatch,
    /// Process exactly one event per cycle, the one with the oldest
    /// last-modified timestamp. Bounds per-cycle work to one event and keeps
    /// processing order close to arrival order.
    #[default]
    OldestFirst,
}

impl OrderingPolicy {
    /// Apply this policy to a listing, returning the events to process in
    /// order.
    pub fn select(&self, mut pending: Vec<PendingEvent>) -> Vec<PendingEvent> {
        match self {
            Self::LexicographicBatch => {
                pending.sort_by(|a, b| a.location.cmp(&b.location));
                pending
            }
            // Ties on the timestamp break by key so selection is
            // deterministic and reproducible.
            Self::OldestFirst => pending
                .into_iter()
                .min_by(|a, b| {
                    a.last_modified
                        .cmp(&b.last_modified)
                        .then_with(|| a.location.cmp(&b.location))
                })
                .into_iter()
                .collect(),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown ordering policy '{0}', expected 'oldest-first' or 'lexicographic-batch'")]
pub struct InvalidOrderingPolicy(String);

impl FromStr for OrderingPolicy {
    type Err = InvalidOrderingPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lexicographic-batch" => Ok(Self::LexicographicBatch),
            "oldest-first" => Ok(Self::OldestFirst),
            other => Err(InvalidOrderingPolicy(other.to_string())),
        }
    }
}

impl std::fmt::Display for OrderingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LexicographicBatch => write!(f, "lexicographic-batch"),
            Self::OldestFirst => write!(f, "oldest-first"),
        }
    }
}

//! Merging of per-category batches into one set keyed by announcement number.
//!
//! First-seen wins: batches are consumed in the order given (the fixed
//! category order of a run) and any later record with an already-seen
//! `announcement_id` is discarded regardless of its content.

use crate::models::CanonicalBid;
use itertools::Itertools;
use tracing::debug;

#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub bids: Vec<CanonicalBid>,
    pub duplicates: usize,
}

pub fn deduplicate<I>(batches: I) -> DedupOutcome
where
    I: IntoIterator<Item = Vec<CanonicalBid>>,
{
    let mut total = 0usize;
    let bids: Vec<CanonicalBid> = batches
        .into_iter()
        .flatten()
        .inspect(|_| total += 1)
        .unique_by(|b| b.announcement_id.clone())
        .collect();
    let duplicates = total - bids.len();
    debug!(total, unique = bids.len(), duplicates, "Deduplicated batches");
    DedupOutcome { bids, duplicates }
}

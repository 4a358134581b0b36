//! Exclusion of negotiated (sole-source) contracts.

use crate::models::CanonicalBid;

/// Substring of `contractMethod` that marks a negotiated contract (수의계약).
/// Matched anywhere in the value, so `수의계약(일부)` is excluded too.
pub const NEGOTIATED_CONTRACT_MARKER: &str = "수의계약";

/// Bids that survived the filter plus the number that did not.
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub kept: Vec<CanonicalBid>,
    pub excluded: usize,
}

pub fn is_negotiated(bid: &CanonicalBid) -> bool {
    bid.contract_method.contains(NEGOTIATED_CONTRACT_MARKER)
}

/// Drop negotiated-contract bids, preserving the order of the rest.
pub fn exclude_negotiated(bids: Vec<CanonicalBid>) -> FilterOutcome {
    let total = bids.len();
    let kept: Vec<CanonicalBid> = bids.into_iter().filter(|b| !is_negotiated(b)).collect();
    FilterOutcome {
        excluded: total - kept.len(),
        kept,
    }
}

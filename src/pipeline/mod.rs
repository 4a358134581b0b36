//! The source-independent record pipeline.
//!
//! ```text
//! RawRecord ──normalize──▶ CanonicalBid ──filter──▶ kept ──dedupe──▶ unique set
//! ```
//!
//! - [`normalize`]: per-source field maps, placeholder substitution
//! - [`filter`]: negotiated-contract exclusion with a dropped count
//! - [`dedupe`]: first-seen merge of ordered batches with a duplicate count
//!
//! All three stages are pure apart from logging; orchestration lives in
//! [`crate::collect`].

pub mod dedupe;
pub mod filter;
pub mod normalize;

pub use dedupe::{DedupOutcome, deduplicate};
pub use filter::exclude_negotiated;
pub use normalize::{FieldMap, Normalizer};

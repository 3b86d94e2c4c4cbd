//! Idempotent usage metering.
//!
//! A completed meeting must increment consumption exactly once, no matter
//! how many completion signals fire or how often a failed attempt is
//! retried. The persisted unit ledger carries the claim; this module wires
//! it to the backend increment and the entitlement cache.

pub mod counter;

pub use counter::{CompletionOutcome, UsageCounter};

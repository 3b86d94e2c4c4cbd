//! API route modules.

pub mod entitlement;
pub mod jobs;
pub mod usage;

//! Flotilla Placement - deciding who hosts a deployment
//!
//! - **QuotaGuard**: side-effect free resource ceiling predicate
//! - **InstanceMatcher**: per-instance candidate accounts under hardware,
//!   image and realm constraints
//! - **AccountSelector**: the single highest-priority account able to host
//!   every instance within quota
//!
//! Placement is all-or-nothing: a selection assigns every instance of a
//! launch attempt to the same account.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod matcher;
pub mod quota;
pub mod selector;

// Re-exports
pub use matcher::{InstanceMatcher, MatchOutcome, MatchSet};
pub use quota::{InMemoryQuotaGuard, Quota, QuotaGuard, QuotaScope, UnlimitedQuota};
pub use selector::{AccountSelector, Selection, SelectionScope};

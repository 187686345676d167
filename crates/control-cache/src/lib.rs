//! The Fast Counter Store (§3 FCS): atomic, TTL-aware in-memory counters
//! backing rate limiting (§4.8) and per-node active-request tracking
//! (§4.3, §4.1). Built on `DashMap` rather than a single
//! `Arc<Mutex<HashMap<_>>>` so readers and writers on different shards
//! never serialize behind one lock (§5).

pub mod active_requests;
pub mod errors;
pub mod token_bucket;

pub use active_requests::ActiveRequestCounters;
pub use errors::FcsError;
pub use token_bucket::{BucketDecision, TokenBucketStore};

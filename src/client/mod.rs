//! Observer-Side Reconciliation
//!
//! Pure logic a rendering client runs against the event stream: clock offset
//! tracking, between-tick prediction, and lag detection. No drawing here.

pub mod observer;

pub use observer::{ObserverConfig, ObserverSession};

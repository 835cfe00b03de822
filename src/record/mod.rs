//! Record Module
//!
//! Record identifiers, the replicated record itself, and its persisted
//! envelope format.

pub mod envelope;
mod id;
mod replicated;

pub use id::RecordId;
pub use replicated::{Fields, ReplicatedRecord};

//! Part of [sps](https://crates.io/crates/sps), a [Sparkplug](https://sparkplug.eclipse.org/) session-integrity library.
//!
//! Shared identities, message kinds, topics and the opaque message envelope.

pub mod constants;
pub mod payload;
pub mod topic;
pub mod utils;

mod bdseq;
mod endpoint;
mod state;

pub use bdseq::BdSeq;
pub use endpoint::{Credentials, Endpoint, EndpointRing};
pub use state::StatePayload;

/// Represents a unique identifier of a metric within a scope
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum MetricId {
    Name(String),
    Alias(u64),
}

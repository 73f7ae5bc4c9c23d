//! Part of [sps](https://crates.io/crates/sps), a [Sparkplug](https://sparkplug.eclipse.org/) session-integrity library.
//!
//! This library defines the transport boundary: the traits a Sparkplug client implements, the events it produces
//! and a bounded pool for running publishes off the ingestion path.
//!
//! # Feature Flags
//!
//! - `channel-client`: Enables the channel based [EventLoop] and [Client] implementation. Disabled by default.
//!

mod pool;
mod traits;
mod types;
mod utils;

pub use pool::{PoolError, PublishJob, PublishPool};
pub use traits::{Client, DynClient, DynEventLoop, EventLoop};
pub use types::*;
pub use utils::topic_and_payload_to_event;

/// A basic [EventLoop] and [Client] implementation based on channels
///
/// Useful for writing tests where it is not appropriate to be running a real MQTT client and broker setup
#[cfg(any(feature = "channel-client", test, doc))]
pub mod channel;

//! Part of [sps](https://crates.io/crates/sps), a [Sparkplug](https://sparkplug.eclipse.org/) session-integrity library.
//!
//! Host application session orchestration: per node birth and death tracking, in order data
//! delivery, alias resolution, recovery timeouts and rebirth requests.
//!
//! # Example
//!
//! ```no_run
//! use sps_client::channel::ChannelEventLoop;
//! use sps_core::config::SessionConfig;
//! use sps_host::{HostApplication, HostEvent, SubscriptionConfig};
//!
//! # async fn run() {
//! let (eventloop, client, _broker) = ChannelEventLoop::new();
//! let (mut app, _handle) = HostApplication::new(
//!     "host",
//!     SubscriptionConfig::AllGroups,
//!     SessionConfig::default(),
//!     eventloop,
//!     client,
//! )
//! .unwrap();
//!
//! loop {
//!     match app.poll().await {
//!         HostEvent::NData { id, metrics, .. } => println!("{id}: {metrics:?}"),
//!         HostEvent::Stopped => break,
//!         _ => (),
//!     }
//! }
//! # }
//! ```

mod app;
mod config;
mod error;
mod events;
mod session;

pub use app::{HostApplication, HostClient};
pub use config::{NamespaceSubConfig, SubscriptionConfig};
pub use error::HostError;
pub use events::{HostEvent, RebirthReason, RebirthReasonDetails};
pub use session::{rebirth_command, SessionManager};

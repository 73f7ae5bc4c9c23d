//! [Sparkplug](https://sparkplug.eclipse.org/) session integrity for edge nodes and host applications.
//!
//! Keeps a consistent view of which edge nodes and devices are alive, in what order their messages
//! arrived and which metric names their aliases stand for, and recovers by requesting rebirths when
//! that view is lost.
//!
//! # Feature Flags
//!
//! - `edge`: the edge node orchestrator, [edge]. Enabled by default.
//! - `host`: the host application orchestrator, [host]. Enabled by default.
//! - `rumqtt-client`: the [rumqttc](https://crates.io/crates/rumqttc) transport. Enabled by default.

pub use sps_core as session;
#[cfg(feature = "edge")]
pub use sps_edge as edge;
#[cfg(feature = "host")]
pub use sps_host as host;
pub use sps_types as types;

pub mod client {
    pub use sps_client::*;

    #[cfg(feature = "rumqtt-client")]
    pub mod mqtt_client {
        pub use sps_client_rumqtt as rumqtt;
    }
}

//! Part of [sps](https://crates.io/crates/sps), a [Sparkplug](https://sparkplug.eclipse.org/) session-integrity library.
//!
//! A [sps_client::Client] and [sps_client::EventLoop] implementation over [rumqttc] (MQTT v5).
//!
//! Payloads travel as a JSON rendition of the sps message envelope.

mod client;

pub use client::{Client, ConnectionProperties, EventLoop, MqttOptions};

//! Part of [sps](https://crates.io/crates/sps), a [Sparkplug](https://sparkplug.eclipse.org/) session-integrity library.
//!
//! The building blocks shared by edge nodes and host applications:
//!
//! - [SequenceCounter]: the wrapping 0-255 message sequence
//! - [ReorderBuffer]: holds out of order messages and releases them in sequence
//! - [AliasRegistry]: metric name to alias mapping for one birth generation
//! - [BirthDeathLifecycle]: birth and death tracking keyed on bdSeq
//! - [PrimaryHostMonitor]: edge side gating on the primary host's liveness
//! - [NodeSession] and [ScopeRegistry]: per scope state behind one lock per scope

pub mod alias;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod primary_host;
pub mod registry;
pub mod reorder;
pub mod seq;
pub mod session;
pub mod timer;

pub use alias::AliasRegistry;
pub use lifecycle::{BirthDeathLifecycle, DeathOutcome, DeviceLifecycle, LifecycleState};
pub use primary_host::{HostState, HostTransition, PrimaryHostMonitor};
pub use registry::ScopeRegistry;
pub use reorder::{Arrival, ReorderBuffer};
pub use seq::SequenceCounter;
pub use session::{DeviceSession, NodeSession};
pub use timer::TimerSlot;

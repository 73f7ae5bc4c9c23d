//! Part of [sps](https://crates.io/crates/sps), a [Sparkplug](https://sparkplug.eclipse.org/) session-integrity library.
//!
//! Edge node session orchestration: births and deaths, bdSeq persistence, primary host gating,
//! rebirth handling and endpoint failover.

mod bdseq_store;
mod builder;
mod device;
mod error;
mod metric;
mod metric_manager;
mod node;

pub use bdseq_store::{BdSeqStore, BdSeqStoreError, DynBdSeqStore, FileBdSeqStore, MemoryBdSeqStore};
pub use builder::EoNBuilder;
pub use device::DeviceHandle;
pub use error::{BuildError, DeviceRegistrationError, PublishError};
pub use metric::MetricPublisher;
pub use metric_manager::{
    DeviceMetricManager, DynDeviceMetricManager, DynNodeMetricManager, MetricManager,
    NoMetricManager, NodeMetricManager,
};
pub use node::{EoN, NodeHandle};

#[derive(Debug, PartialEq)]
pub(crate) enum BirthType {
    Birth,
    Rebirth,
}

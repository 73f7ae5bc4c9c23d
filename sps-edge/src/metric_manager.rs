use async_trait::async_trait;
use sps_types::payload::Metric;

use crate::{DeviceHandle, NodeHandle};

pub type DynNodeMetricManager = dyn NodeMetricManager + Send + Sync + 'static;
pub type DynDeviceMetricManager = dyn DeviceMetricManager + Send + Sync + 'static;

/// Supplies the metrics of a birth certificate.
///
/// Called for every birth and rebirth. When aliasing is enabled each returned metric, including
/// metrics nested in template instances, is given a fresh alias before publishing.
pub trait MetricManager {
    fn birth_metrics(&self) -> Vec<Metric>;
}

#[async_trait]
pub trait NodeMetricManager: MetricManager {
    fn init(&self, _handle: &NodeHandle) {}
    /// Called with the metrics of a NCMD, names resolved. The rebirth control metric is handled by the node.
    async fn on_ncmd(&self, _node: NodeHandle, _metrics: Vec<Metric>) {}
}

#[async_trait]
pub trait DeviceMetricManager: MetricManager {
    fn init(&self, _handle: &DeviceHandle) {}
    async fn on_dcmd(&self, _device: DeviceHandle, _metrics: Vec<Metric>) {}
}

/// A metric manager with no metrics that ignores commands
#[derive(Default)]
pub struct NoMetricManager {}

impl NoMetricManager {
    pub fn new() -> Self {
        Self {}
    }
}

impl MetricManager for NoMetricManager {
    fn birth_metrics(&self) -> Vec<Metric> {
        Vec::new()
    }
}

impl NodeMetricManager for NoMetricManager {}

impl DeviceMetricManager for NoMetricManager {}

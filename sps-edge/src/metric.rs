use sps_types::payload::Metric;

use crate::PublishError;

/// A trait for publishing metrics to the network.
///
/// `MetricPublisher` defines a set of methods for publishing single metrics
/// or batches of metrics. It provides "try_" variants that may fail immediately.
///
/// "try_publish" variants will use the "try_publish" variants from the [sps_client::Client] trait.
/// Similarly, the "publish" variants will use the "publish" from the [sps_client::Client] trait.
pub trait MetricPublisher {
    /// Attempts to publish a batch of metrics without modifying their order.
    fn try_publish_metrics_unsorted(
        &self,
        metrics: Vec<Metric>,
    ) -> impl std::future::Future<Output = Result<(), PublishError>> + Send;

    /// Attempts to publish a single metric.
    fn try_publish_metric(
        &self,
        metric: Metric,
    ) -> impl std::future::Future<Output = Result<(), PublishError>> + Send {
        self.try_publish_metrics_unsorted(vec![metric])
    }

    /// Attempts to publish a batch of metrics after sorting by timestamp.
    fn try_publish_metrics(
        &self,
        mut metrics: Vec<Metric>,
    ) -> impl std::future::Future<Output = Result<(), PublishError>> + Send {
        metrics.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        self.try_publish_metrics_unsorted(metrics)
    }

    /// Publish a batch of metrics without modifying their order.
    fn publish_metrics_unsorted(
        &self,
        metrics: Vec<Metric>,
    ) -> impl std::future::Future<Output = Result<(), PublishError>> + Send;

    /// Publish a single metric.
    fn publish_metric(
        &self,
        metric: Metric,
    ) -> impl std::future::Future<Output = Result<(), PublishError>> + Send {
        self.publish_metrics_unsorted(vec![metric])
    }

    /// Publish a batch of metrics after sorting by timestamp.
    fn publish_metrics(
        &self,
        mut metrics: Vec<Metric>,
    ) -> impl std::future::Future<Output = Result<(), PublishError>> + Send {
        metrics.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        self.publish_metrics_unsorted(metrics)
    }
}

use std::sync::Arc;

use sps_client::{Client, DynClient, DynEventLoop, EventLoop};
use sps_core::config::SessionConfig;

use crate::{
    bdseq_store::{BdSeqStore, DynBdSeqStore, MemoryBdSeqStore},
    error::BuildError,
    metric_manager::{DynNodeMetricManager, NoMetricManager, NodeMetricManager},
    EoN, NodeHandle,
};

/// A builder for creating and configuring Edge of Network (EoN) instances.
pub struct EoNBuilder {
    pub(crate) group_id: Option<String>,
    pub(crate) node_id: Option<String>,
    pub(crate) eventloop_client: (Box<DynEventLoop>, Arc<DynClient>),
    pub(crate) metric_manager: Box<DynNodeMetricManager>,
    pub(crate) config: SessionConfig,
    pub(crate) bdseq_store: Arc<DynBdSeqStore>,
}

impl EoNBuilder {
    /// Creates a new builder with the specified event loop and client.
    ///
    /// Initializes a builder with the default [SessionConfig], a no-op metric manager and an in memory bdSeq store.
    pub fn new<E: EventLoop + Send + 'static, C: Client + Send + Sync + 'static>(
        eventloop: E,
        client: C,
    ) -> Self {
        Self {
            group_id: None,
            node_id: None,
            eventloop_client: (Box::new(eventloop), Arc::new(client)),
            metric_manager: Box::new(NoMetricManager::new()),
            config: SessionConfig::default(),
            bdseq_store: Arc::new(MemoryBdSeqStore::new()),
        }
    }

    /// Sets the group ID for the EoN instance.
    pub fn with_group_id<S: Into<String>>(mut self, group_id: S) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Sets the node ID for the EoN instance.
    ///
    /// The node ID uniquely identifies this node within its group.
    pub fn with_node_id<S: Into<String>>(mut self, node_id: S) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Sets a custom metric manager for the EoN instance.
    pub fn with_metric_manager<M: NodeMetricManager + Send + Sync + 'static>(
        mut self,
        metric_manager: M,
    ) -> Self {
        self.metric_manager = Box::new(metric_manager);
        self
    }

    /// Sets the session configuration: endpoints, primary host, timeouts and aliasing.
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets where the bdSeq is persisted between sessions and process restarts.
    pub fn with_bdseq_store<S: BdSeqStore + Send + Sync + 'static>(mut self, store: S) -> Self {
        self.bdseq_store = Arc::new(store);
        self
    }

    /// Builds the EoN instance with the configured settings.
    ///
    /// Creates and returns a new EoN instance and its associated NodeHandle.
    /// Returns an error if an identifier is missing or invalid, the configuration does not
    /// validate or the bdSeq could not be loaded.
    pub fn build(self) -> Result<(EoN, NodeHandle), BuildError> {
        EoN::new_from_builder(self)
    }
}

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use futures::future::join_all;
use log::{debug, error, warn};
use sps_client::DynClient;
use sps_core::AliasRegistry;
use sps_types::{
    payload::{Metric, Payload},
    topic::{DeviceIdentifier, MessageKind, MessageTopic},
    utils::timestamp,
};

use crate::{
    error::DeviceRegistrationError,
    metric_manager::DynDeviceMetricManager,
    node::{data_payload, EoNState},
    BirthType, MetricPublisher, PublishError,
};

struct DeviceTopics {
    birth: MessageTopic,
    data: MessageTopic,
    death: MessageTopic,
}

/// A handle to a device registered with a [NodeHandle](crate::NodeHandle).
#[derive(Clone)]
pub struct DeviceHandle {
    pub(crate) device: Arc<Device>,
}

impl DeviceHandle {
    pub fn name(&self) -> &str {
        &self.device.id.device
    }

    /// Enable the device, birthing it if the node is birthed.
    pub async fn enable(&self) {
        self.device.enabled.store(true, Ordering::SeqCst);
        self.device.birth(&BirthType::Birth).await;
    }

    /// Publish a new DBIRTH for the device
    pub async fn rebirth(&self) {
        self.device.enabled.store(true, Ordering::SeqCst);
        self.device.birth(&BirthType::Rebirth).await;
    }

    /// Disable the device, publishing its death certificate. A disabled device is not birthed with the node.
    pub async fn disable(&self) {
        if !self.device.enabled.swap(false, Ordering::SeqCst) {
            //already disabled
            return;
        };
        self.device.death(true).await
    }

    async fn publish_data(
        &self,
        mut metrics: Vec<Metric>,
        try_publish: bool,
    ) -> Result<(), PublishError> {
        if metrics.is_empty() {
            return Err(PublishError::NoMetrics);
        }
        if !self.device.eon_state.is_online() {
            return Err(PublishError::Offline);
        }
        if !self.device.birthed.load(Ordering::SeqCst) {
            return Err(PublishError::UnBirthed);
        }

        let seq = self.device.eon_state.prepare_publish(
            MessageKind::DData,
            Some(self.device.as_ref()),
            &mut metrics,
        )?;
        let topic = self.device.topics.data.clone();
        let payload = data_payload(seq, metrics);
        if try_publish {
            self.device.client.try_publish_message(topic, payload).await?;
        } else {
            self.device.client.publish_message(topic, payload).await?;
        }
        Ok(())
    }
}

impl MetricPublisher for DeviceHandle {
    async fn try_publish_metrics_unsorted(&self, metrics: Vec<Metric>) -> Result<(), PublishError> {
        self.publish_data(metrics, true).await
    }

    async fn publish_metrics_unsorted(&self, metrics: Vec<Metric>) -> Result<(), PublishError> {
        self.publish_data(metrics, false).await
    }
}

pub struct Device {
    id: DeviceIdentifier,
    topics: DeviceTopics,
    birthed: AtomicBool,
    /// node birth generation of the last DBIRTH, 0 if never birthed
    pub(crate) generation: AtomicU64,
    birth_lock: tokio::sync::Mutex<()>,
    enabled: AtomicBool,
    aliases: Mutex<AliasRegistry>,
    eon_state: Arc<EoNState>,
    pub(crate) dev_impl: Arc<DynDeviceMetricManager>,
    client: Arc<DynClient>,
}

impl Device {
    pub(crate) fn aliases(&self) -> &Mutex<AliasRegistry> {
        &self.aliases
    }

    pub(crate) async fn death(&self, publish: bool) {
        let _guard = self.birth_lock.lock().await;
        if !self.birthed.swap(false, Ordering::SeqCst) {
            return;
        }
        if !publish {
            return;
        }
        let seq = match self.eon_state.next_seq() {
            Ok(seq) => seq,
            Err(e) => {
                debug!("Device death not published. device = {}, reason = {e}", self.id);
                return;
            }
        };
        let payload = Payload {
            seq: Some(seq),
            timestamp: Some(timestamp()),
            metrics: Vec::new(),
            uuid: None,
            body: None,
        };
        if let Err(e) = self
            .client
            .publish_message(self.topics.death.clone(), payload)
            .await
        {
            warn!("Publishing device death failed. device = {}, error = {e}", self.id);
        }
    }

    pub(crate) async fn birth(&self, birth_type: &BirthType) {
        if !self.enabled.load(Ordering::SeqCst) {
            return;
        }
        let _guard = self.birth_lock.lock().await;
        if *birth_type == BirthType::Birth && self.birthed.load(Ordering::SeqCst) {
            return;
        }
        let metrics = self.dev_impl.birth_metrics();
        let payload = match self.eon_state.device_birth_payload(self, metrics) {
            Ok(payload) => payload,
            Err(e) => {
                debug!("Device birth skipped. device = {}, reason = {e}", self.id);
                return;
            }
        };
        match self
            .client
            .publish_message(self.topics.birth.clone(), payload)
            .await
        {
            Ok(_) => self.birthed.store(true, Ordering::SeqCst),
            Err(e) => error!("Publishing device birth failed. device = {}, error = {e}", self.id),
        }
    }
}

pub(crate) async fn birth_devices(devices: Vec<Arc<Device>>, birth_type: BirthType) {
    let futures: Vec<_> = devices.iter().map(|x| x.birth(&birth_type)).collect();
    join_all(futures).await;
}

pub(crate) struct DeviceMap {
    devices: HashMap<String, Arc<Device>>,
}

impl DeviceMap {
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
        }
    }

    pub fn add_device(
        &mut self,
        id: DeviceIdentifier,
        dev_impl: Arc<DynDeviceMetricManager>,
        eon_state: Arc<EoNState>,
        client: Arc<DynClient>,
    ) -> Result<DeviceHandle, DeviceRegistrationError> {
        if self.devices.contains_key(&id.device) {
            return Err(DeviceRegistrationError::DuplicateDevice);
        }

        let topics = DeviceTopics {
            birth: MessageTopic::device(&id, MessageKind::DBirth),
            data: MessageTopic::device(&id, MessageKind::DData),
            death: MessageTopic::device(&id, MessageKind::DDeath),
        };
        let device = Arc::new(Device {
            topics,
            birthed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            birth_lock: tokio::sync::Mutex::new(()),
            enabled: AtomicBool::new(true),
            aliases: Mutex::new(AliasRegistry::new()),
            eon_state,
            dev_impl,
            client,
            id,
        });
        let handle = DeviceHandle {
            device: device.clone(),
        };
        device.dev_impl.init(&handle);
        self.devices.insert(device.id.device.clone(), device);
        Ok(handle)
    }

    pub fn remove_device(&mut self, name: &str) -> Option<Arc<Device>> {
        self.devices.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Device>> {
        self.devices.get(name).cloned()
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.values().cloned().collect()
    }

    /// Mark every device unbirthed after the node's session ended
    pub fn on_death(&self) {
        for device in self.devices.values() {
            device.birthed.store(false, Ordering::SeqCst);
        }
    }
}

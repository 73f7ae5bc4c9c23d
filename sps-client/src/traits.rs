use async_trait::async_trait;
use sps_types::{
    payload::Payload,
    topic::{MessageTopic, StateTopic, TopicFilter},
    Endpoint, StatePayload,
};

use crate::{ClientError, Event, LastWill};

#[async_trait]
pub trait Client {
    /// Disconnects the client.
    async fn disconnect(&self) -> Result<(), ClientError>;

    /// Publishes a state message to the specified state topic.
    ///
    /// This method will yield to the async runtime until the message is accepted by the client
    async fn publish_state_message(
        &self,
        topic: StateTopic,
        payload: StatePayload,
    ) -> Result<(), ClientError>;

    /// Attempts to publish a state message to the specified state topic.
    ///
    /// Unlike `publish_state_message`, this method may return early if the client cannot process the message
    /// e.g the message queue is full.
    async fn try_publish_state_message(
        &self,
        topic: StateTopic,
        payload: StatePayload,
    ) -> Result<(), ClientError>;

    /// Publishes a message to a node or device topic.
    ///
    /// This method will yield to the async runtime until the message is accepted by the client
    async fn publish_message(&self, topic: MessageTopic, payload: Payload)
        -> Result<(), ClientError>;

    /// Attempts to publish a message to a node or device topic.
    ///
    /// Unlike `publish_message`, this method may return early if the client cannot process the message
    async fn try_publish_message(
        &self,
        topic: MessageTopic,
        payload: Payload,
    ) -> Result<(), ClientError>;

    /// Subscribes to a single topic.
    async fn subscribe(&self, topic: TopicFilter) -> Result<(), ClientError> {
        self.subscribe_many(vec![topic]).await
    }

    /// Subscribes to multiple topics in a single operation.
    async fn subscribe_many(&self, topics: Vec<TopicFilter>) -> Result<(), ClientError>;
}

pub type DynClient = dyn Client + Send + Sync;

#[async_trait]
pub trait EventLoop {
    /// Progress the connection, reconnecting as required, and return the next event
    async fn poll(&mut self) -> Event;

    /// Set the will registered with the next connection attempt
    fn set_last_will(&mut self, will: LastWill);

    /// Set the endpoint used by the next connection attempt
    fn set_endpoint(&mut self, endpoint: &Endpoint);
}

pub type DynEventLoop = dyn EventLoop + Send;

//! Message queue.

use std::fmt::{self, Debug, Formatter};

use paho_mqtt::{
    Client as MqttClient, MessageBuilder as MqttMessageBuilder, Properties as MqttProps, Property,
    PropertyCode,
};

/// Sends string messages on one topic.
pub trait Publisher {
    type Error: std::error::Error + Send + Sync + 'static;

    fn publish(&mut self, payload: &str) -> Result<(), Self::Error>;
}

/// Identity of this process on the broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeOptions {
    pub name: String,
    /// Append a unique suffix to the name so several instances can run side
    /// by side.
    pub anonymous: bool,
}

impl NodeOptions {
    pub fn new<T: AsRef<str>>(name: T, anonymous: bool) -> Self {
        NodeOptions {
            name: name.as_ref().to_string(),
            anonymous,
        }
    }

    /// The MQTT client id for this node.
    pub fn client_id(&self) -> String {
        if self.anonymous {
            format!("{}_{}", self.name, uuid::Uuid::now_v7().simple())
        } else {
            self.name.clone()
        }
    }
}

/// Publishes plain-text messages to a single topic on an MQTT broker.
pub struct TopicPublisher {
    client: MqttClient,
    topic: String,
    node: String,
}

impl TopicPublisher {
    /// Register a publisher for `topic`.
    ///
    /// At most `queue_depth` outgoing messages are buffered by the client.
    pub fn new<T: AsRef<str>>(
        server_uri: &str,
        topic: T,
        queue_depth: usize,
        node: &NodeOptions,
    ) -> Result<TopicPublisher, Error> {
        let node = node.client_id();
        let client = MqttClient::new(
            paho_mqtt::CreateOptionsBuilder::new()
                .server_uri(server_uri)
                .client_id(&node)
                .mqtt_version(paho_mqtt::MQTT_VERSION_5)
                .max_buffered_messages(i32::try_from(queue_depth).unwrap_or(i32::MAX))
                .finalize(),
        )?;

        Ok(TopicPublisher {
            client,
            topic: topic.as_ref().to_string(),
            node,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Connect to the MQTT broker.
    ///
    /// You must call this method before calling `publish`.
    #[tracing::instrument(err)]
    pub fn connect(&self) -> Result<(), Error> {
        tracing::info!("connect to the MQTT broker");

        let options = paho_mqtt::ConnectOptionsBuilder::new_v5()
            .clean_start(true)
            .finalize();
        let connection_info = self.client.connect(options);
        if let Err(e) = connection_info {
            tracing::error!(error = ?e, "failed to connect to the MQTT broker");
            return Err(e.into());
        }

        tracing::info!(info = ?connection_info, "connected to the MQTT broker");
        Ok(())
    }

    fn message_properties(&self) -> Result<MqttProps, Error> {
        let message_id = uuid::Uuid::now_v7().to_string();
        let emitted_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true);

        let mut properties = MqttProps::new();
        properties.push(Property::new_string(PropertyCode::ContentType, "text/plain")?)?;
        properties.push(Property::new_string_pair(PropertyCode::UserProperty, "message_id", &message_id)?)?;
        properties.push(Property::new_string_pair(PropertyCode::UserProperty, "node", &self.node)?)?;
        properties.push(Property::new_string_pair(PropertyCode::UserProperty, "emitted_at", &emitted_at)?)?;

        Ok(properties)
    }
}

impl Publisher for TopicPublisher {
    type Error = Error;

    /// Publish the payload as is, fire and forget.
    fn publish(&mut self, payload: &str) -> Result<(), Error> {
        let message = MqttMessageBuilder::new()
            .topic(&self.topic)
            .payload(payload)
            .qos(0)
            .properties(self.message_properties()?)
            .finalize();

        tracing::trace!(?message, "publishing to the MQTT broker");
        self.client.publish(message)?;

        Ok(())
    }
}

impl Drop for TopicPublisher {
    fn drop(&mut self) {
        if !self.client.is_connected() {
            return;
        }

        match self.client.disconnect(None) {
            Ok(()) => tracing::info!("disconnected from the MQTT broker"),
            Err(e) => tracing::warn!(error = ?e, "failed to disconnect from the MQTT broker"),
        }
    }
}

impl Debug for TopicPublisher {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicPublisher")
            .field("node", &self.node)
            .field("topic", &self.topic)
            .finish()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("mqtt: {0}")]
    Mqtt(#[from] paho_mqtt::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_node_keeps_its_name() {
        let node = NodeOptions::new("talker", false);
        assert_eq!(node.client_id(), "talker");
    }

    #[test]
    fn anonymous_nodes_are_unique() {
        let node = NodeOptions::new("talker", true);

        let first = node.client_id();
        let second = node.client_id();

        assert!(first.starts_with("talker_"));
        assert!(second.starts_with("talker_"));
        assert_ne!(first, second);
    }

    #[test]
    fn new_publisher_does_not_connect() {
        let node = NodeOptions::new("talker", false);
        let publisher = TopicPublisher::new("tcp://localhost:1883", "chatter", 10, &node).unwrap();

        assert_eq!(publisher.topic(), "chatter");
        assert!(!publisher.client.is_connected());
    }
}

use log::{info, warn};

use crate::{
    bringup::LinkHandle,
    config::NodeConfig,
    discovery,
    drivers::{Broker, LastWill, SessionOptions},
    error::{DriverError, SessionFailure},
    topics::TopicSet,
    types::PresenceState,
};

/// Connect options for a node: persistent session plus a retained
/// `offline` last-will on the availability topic.
pub fn session_options(config: &NodeConfig) -> SessionOptions {
    let topics = TopicSet::new(&config.identity);
    let network = &config.network;
    let username = (!network.mqtt_user.is_empty()).then(|| network.mqtt_user.clone());
    let password = username.as_ref().map(|_| network.mqtt_pass.clone());

    SessionOptions {
        client_id: config.identity.metric_prefix().to_string(),
        username,
        password,
        keep_alive: config.cycle.keep_alive(),
        clean_session: false,
        last_will: LastWill {
            topic: topics.availability().to_string(),
            payload: PresenceState::Offline.as_str().to_string(),
            retain: true,
        },
    }
}

/// An announced broker session. Discovery is registered and presence is
/// `online` for as long as this value lives.
pub struct Session<'b, B: Broker> {
    broker: &'b mut B,
    topics: TopicSet,
}

impl<'b, B: Broker> Session<'b, B> {
    pub fn open(
        broker: &'b mut B,
        config: &NodeConfig,
        _link: &LinkHandle,
    ) -> Result<Self, SessionFailure> {
        let options = session_options(config);
        broker.connect(&options).map_err(SessionFailure::Connect)?;
        info!(
            "connected to {}:{} as `{}`",
            config.network.mqtt_host, config.network.mqtt_port, options.client_id
        );

        let mut session = Self {
            broker,
            topics: TopicSet::new(&config.identity),
        };

        if let Err(failure) = session.announce(config) {
            session.abort();
            return Err(failure);
        }

        Ok(session)
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    pub fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), DriverError> {
        self.broker.publish(topic, payload, retain)
    }

    /// Marks the node offline and disconnects. Never fails: a broken
    /// teardown must not keep the device awake.
    pub fn close(mut self) {
        let availability = self.topics.availability().to_string();
        if let Err(err) =
            self.broker
                .publish(&availability, PresenceState::Offline.as_str().as_bytes(), true)
        {
            warn!("failed to publish offline presence: {err}");
        }
        if let Err(err) = self.broker.disconnect() {
            warn!("broker disconnect failed: {err}");
        }
    }

    fn announce(&mut self, config: &NodeConfig) -> Result<(), SessionFailure> {
        for (topic, descriptor) in discovery::announcements(&config.identity) {
            let payload =
                serde_json::to_vec(&descriptor).map_err(|err| SessionFailure::Encode {
                    topic: topic.clone(),
                    message: err.to_string(),
                })?;
            self.broker
                .publish(&topic, &payload, false)
                .map_err(|error| SessionFailure::Publish { topic, error })?;
        }

        let availability = self.topics.availability().to_string();
        self.broker
            .publish(&availability, PresenceState::Online.as_str().as_bytes(), true)
            .map_err(|error| SessionFailure::Publish {
                topic: availability,
                error,
            })
    }

    fn abort(mut self) {
        if let Err(err) = self.broker.disconnect() {
            warn!("broker disconnect after failed announce: {err}");
        }
    }
}

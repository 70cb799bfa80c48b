//! Home Assistant MQTT discovery descriptors for the four published metrics.
//!
//! The hub merges every descriptor that names the same `identifiers` into a
//! single device record, so only the first descriptor of a cycle carries the
//! full device metadata. Descriptors are keyed by `unique_id`; republishing
//! one overwrites the entity instead of duplicating it.

use serde::Serialize;

use crate::{
    config::DeviceIdentity,
    topics::TopicSet,
    types::{Metric, PresenceState},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub topic: String,
    pub payload_available: &'static str,
    pub payload_not_available: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRecord {
    pub name: String,
    pub identifiers: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hw_version: Option<String>,
}

impl DeviceRecord {
    pub fn full(identity: &DeviceIdentity) -> Self {
        Self {
            manufacturer: Some(identity.manufacturer.clone()),
            model: Some(identity.model.clone()),
            sw_version: Some(identity.sw_version.clone()),
            hw_version: Some(identity.hw_version.clone()),
            ..Self::reference(identity)
        }
    }

    pub fn reference(identity: &DeviceIdentity) -> Self {
        Self {
            name: identity.name.clone(),
            identifiers: identity.device_id.clone(),
            manufacturer: None,
            model: None,
            sw_version: None,
            hw_version: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryDescriptor {
    pub name: &'static str,
    pub device_class: &'static str,
    pub unique_id: String,
    pub state_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<&'static str>,
    pub availability: Availability,
    pub device: DeviceRecord,
    pub value_template: String,
}

impl DiscoveryDescriptor {
    pub fn new(metric: Metric, topics: &TopicSet, device: DeviceRecord) -> Self {
        Self {
            name: metric.display_name(),
            device_class: metric.device_class(),
            unique_id: topics.metric_id(metric),
            state_topic: topics.state(metric),
            unit_of_measurement: metric.unit(),
            availability: Availability {
                topic: topics.availability().to_string(),
                payload_available: PresenceState::Online.as_str(),
                payload_not_available: PresenceState::Offline.as_str(),
            },
            device,
            value_template: metric.value_template(),
        }
    }
}

/// Descriptors in publish order, paired with their config topics.
pub fn announcements(identity: &DeviceIdentity) -> Vec<(String, DiscoveryDescriptor)> {
    let topics = TopicSet::new(identity);

    Metric::ALL
        .iter()
        .enumerate()
        .map(|(index, &metric)| {
            let device = if index == 0 {
                DeviceRecord::full(identity)
            } else {
                DeviceRecord::reference(identity)
            };
            (
                topics.discovery(metric),
                DiscoveryDescriptor::new(metric, &topics, device),
            )
        })
        .collect()
}

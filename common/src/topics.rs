use crate::{config::DeviceIdentity, types::Metric};

pub const DISCOVERY_PREFIX: &str = "homeassistant";
pub const STATE_PREFIX: &str = "state";

/// Every topic a node touches, derived once from its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    metric_prefix: String,
    availability: String,
}

impl TopicSet {
    pub fn new(identity: &DeviceIdentity) -> Self {
        Self {
            metric_prefix: identity.metric_prefix().to_string(),
            availability: format!("{DISCOVERY_PREFIX}/availability/{}", identity.device_id),
        }
    }

    pub fn availability(&self) -> &str {
        &self.availability
    }

    pub fn metric_id(&self, metric: Metric) -> String {
        format!("{}_{}", self.metric_prefix, metric.id_suffix())
    }

    pub fn state(&self, metric: Metric) -> String {
        format!("{STATE_PREFIX}/{}/value", self.metric_id(metric))
    }

    pub fn discovery(&self, metric: Metric) -> String {
        format!("{DISCOVERY_PREFIX}/sensor/{}/config", self.metric_id(metric))
    }
}

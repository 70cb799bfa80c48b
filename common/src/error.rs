use thiserror::Error;

use crate::{drivers::LinkStatus, types::Metric};

/// Failure reported by a driver behind one of the seams in [`crate::drivers`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DriverError(pub String);

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorFault {
    #[error("sensor read failed: {0}")]
    Driver(DriverError),
    #[error("relative humidity is zero; gas index is undefined")]
    DegenerateHumidity,
    #[error("gas resistance {0} ohm is not a positive finite value")]
    InvalidGasResistance(f64),
    #[error("sensor returned a non-finite {0}")]
    NonFinite(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkFailureReason {
    #[error("retries exhausted, last status {last_status}")]
    RetriesExhausted { last_status: LinkStatus },
    #[error("access point rejected the password")]
    WrongPassword,
    #[error("radio driver error: {0}")]
    Driver(DriverError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("wifi connection failed after {attempts} attempt(s): {reason}")]
pub struct LinkFailure {
    pub reason: LinkFailureReason,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionFailure {
    #[error("broker connect failed: {0}")]
    Connect(DriverError),
    #[error("publish to `{topic}` failed: {error}")]
    Publish { topic: String, error: DriverError },
    #[error("discovery payload for `{topic}` could not be encoded: {message}")]
    Encode { topic: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricFailure {
    pub metric: Metric,
    pub error: DriverError,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to publish {}", describe_failures(.failed_metrics))]
pub struct PublishFailure {
    pub failed_metrics: Vec<MetricFailure>,
}

impl PublishFailure {
    pub fn metrics(&self) -> Vec<Metric> {
        self.failed_metrics.iter().map(|failure| failure.metric).collect()
    }
}

fn describe_failures(failures: &[MetricFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("{} ({})", failure.metric.as_str(), failure.error))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Any fault that aborts the remainder of a wake cycle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CycleFault {
    #[error(transparent)]
    Link(#[from] LinkFailure),
    #[error(transparent)]
    Session(#[from] SessionFailure),
    #[error(transparent)]
    Sensor(#[from] SensorFault),
    #[error(transparent)]
    Publish(#[from] PublishFailure),
}

impl CycleFault {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Link(_) => "link-failure",
            Self::Session(_) => "session-failure",
            Self::Sensor(_) => "sensor-failure",
            Self::Publish(_) => "publish-failure",
        }
    }
}

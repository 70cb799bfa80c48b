pub mod bringup;
pub mod config;
pub mod cycle;
pub mod diagnostics;
pub mod discovery;
pub mod drivers;
pub mod error;
pub mod publisher;
pub mod sensor;
pub mod session;
pub mod topics;
pub mod types;

#[cfg(test)]
mod testing;

pub use bringup::{BringupPolicy, BringupState, LinkHandle};
pub use config::{CycleConfig, DeviceIdentity, HardwareConfig, NetworkConfig, NodeConfig};
pub use cycle::{CycleOutcome, CycleReport, WakeCycle};
pub use diagnostics::DiagnosticLog;
pub use drivers::{
    Broker, DeepSleep, Delay, LastWill, LinkStatus, Radio, RawSample, SensorDriver, SessionOptions,
};
pub use error::{
    CycleFault, DriverError, LinkFailure, LinkFailureReason, MetricFailure, PublishFailure,
    SensorFault, SessionFailure,
};
pub use session::{session_options, Session};
pub use topics::TopicSet;
pub use types::{CycleState, Metric, PresenceState, SensorReading};

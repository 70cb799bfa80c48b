//! Recording doubles for the driver seams.

use std::{collections::VecDeque, time::Duration};

use crate::{
    drivers::{Broker, DeepSleep, Delay, LinkStatus, Radio, RawSample, SensorDriver, SessionOptions},
    error::DriverError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    Activate,
    Connect { ssid: String, password: String },
    Status(LinkStatus),
    Disconnect,
    Deactivate,
}

/// Replays scripted statuses, then repeats `fallback` forever.
#[derive(Debug)]
pub struct ScriptedRadio {
    script: VecDeque<LinkStatus>,
    fallback: LinkStatus,
    pub fail_activate: bool,
    pub calls: Vec<RadioCall>,
}

impl ScriptedRadio {
    pub fn new(script: impl IntoIterator<Item = LinkStatus>, fallback: LinkStatus) -> Self {
        Self {
            script: script.into_iter().collect(),
            fallback,
            fail_activate: false,
            calls: Vec::new(),
        }
    }

    pub fn always(status: LinkStatus) -> Self {
        Self::new([], status)
    }

    pub fn connect_calls(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, RadioCall::Connect { .. }))
            .count()
    }

    pub fn count(&self, call: &RadioCall) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }
}

impl Radio for ScriptedRadio {
    fn activate(&mut self) -> Result<(), DriverError> {
        self.calls.push(RadioCall::Activate);
        if self.fail_activate {
            return Err(DriverError::new("radio did not start"));
        }
        Ok(())
    }

    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), DriverError> {
        self.calls.push(RadioCall::Connect {
            ssid: ssid.to_string(),
            password: password.to_string(),
        });
        Ok(())
    }

    fn status(&mut self) -> LinkStatus {
        let status = self.script.pop_front().unwrap_or(self.fallback);
        self.calls.push(RadioCall::Status(status));
        status
    }

    fn disconnect(&mut self) -> Result<(), DriverError> {
        self.calls.push(RadioCall::Disconnect);
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), DriverError> {
        self.calls.push(RadioCall::Deactivate);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    Connect(SessionOptions),
    Publish {
        topic: String,
        payload: String,
        retain: bool,
    },
    Disconnect,
}

#[derive(Debug, Default)]
pub struct RecordingBroker {
    pub calls: Vec<BrokerCall>,
    pub fail_connect: bool,
    pub fail_disconnect: bool,
    /// Publishing to any topic containing one of these fragments fails.
    pub fail_topics: Vec<String>,
}

impl RecordingBroker {
    pub fn failing_topics(fragments: &[&str]) -> Self {
        Self {
            fail_topics: fragments.iter().map(|f| f.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn publishes(&self) -> Vec<(String, String, bool)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                BrokerCall::Publish {
                    topic,
                    payload,
                    retain,
                } => Some((topic.clone(), payload.clone(), *retain)),
                _ => None,
            })
            .collect()
    }

    pub fn disconnects(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, BrokerCall::Disconnect))
            .count()
    }
}

impl Broker for RecordingBroker {
    fn connect(&mut self, options: &SessionOptions) -> Result<(), DriverError> {
        self.calls.push(BrokerCall::Connect(options.clone()));
        if self.fail_connect {
            return Err(DriverError::new("connection refused"));
        }
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), DriverError> {
        self.calls.push(BrokerCall::Publish {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            retain,
        });
        if self.fail_topics.iter().any(|fragment| topic.contains(fragment.as_str())) {
            return Err(DriverError::new(format!("rejected {topic}")));
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), DriverError> {
        self.calls.push(BrokerCall::Disconnect);
        if self.fail_disconnect {
            return Err(DriverError::new("socket already closed"));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct FixedSensor {
    pub sample: Result<RawSample, DriverError>,
    pub reads: usize,
}

impl FixedSensor {
    pub fn new(sample: RawSample) -> Self {
        Self {
            sample: Ok(sample),
            reads: 0,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            sample: Err(DriverError::new(message)),
            reads: 0,
        }
    }
}

impl SensorDriver for FixedSensor {
    fn read(&mut self) -> Result<RawSample, DriverError> {
        self.reads += 1;
        self.sample.clone()
    }
}

/// Advances a virtual clock instead of sleeping.
#[derive(Debug, Default)]
pub struct VirtualClock {
    pub elapsed: Duration,
    pub waits: Vec<Duration>,
}

impl Delay for VirtualClock {
    fn wait(&mut self, duration: Duration) {
        self.elapsed += duration;
        self.waits.push(duration);
    }
}

#[derive(Debug, Default)]
pub struct RecordingSleep {
    pub suspended: Vec<Duration>,
}

impl DeepSleep for RecordingSleep {
    fn suspend(&mut self, duration: Duration) {
        self.suspended.push(duration);
    }
}

pub fn sample(temperature_c: f64, humidity_pct: f64, pressure_hpa: f64, gas_ohm: f64) -> RawSample {
    RawSample {
        temperature_c,
        pressure_hpa,
        humidity_pct,
        gas_resistance_ohm: gas_ohm,
    }
}

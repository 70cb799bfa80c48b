//! The wake cycle: one straight pass from deep sleep back to deep sleep.
//!
//! ```text
//! Idle -> LinkUp -> SessionOpen -> Published -> TornDown -> Sleeping
//! Idle -> Faulted -> Sleeping                          link never came up
//! Idle -> LinkUp .. -> TornDown -> Faulted -> Sleeping  later failure
//! ```
//!
//! Retries live only inside link bringup. Any later failure aborts the rest
//! of the cycle; the next wake is the retry. Once the link is up, session
//! close and link teardown always run, and their own failures never keep the
//! device from sleeping.

use std::time::Duration;

use log::{error, info, warn};

use crate::{
    bringup::{self, BringupPolicy, LinkHandle},
    config::NodeConfig,
    diagnostics::DiagnosticLog,
    drivers::{Broker, DeepSleep, Delay, Radio, SensorDriver},
    error::CycleFault,
    publisher,
    sensor::SensorReader,
    session::Session,
    types::CycleState,
};

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Success,
    Faulted(CycleFault),
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn fault(&self) -> Option<&CycleFault> {
        match self {
            Self::Success => None,
            Self::Faulted(fault) => Some(fault),
        }
    }
}

impl From<Result<(), CycleFault>> for CycleOutcome {
    fn from(result: Result<(), CycleFault>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(fault) => Self::Faulted(fault),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    /// Every state entered, in order.
    pub trace: Vec<CycleState>,
    pub sleep_for: Duration,
    /// Association attempts used by bringup; zero when the radio never started.
    pub link_attempts: u32,
}

#[derive(Debug, Default)]
struct Trace(Vec<CycleState>);

impl Trace {
    fn enter(&mut self, state: CycleState) {
        info!("cycle -> {}", state.as_str());
        self.0.push(state);
    }
}

pub struct WakeCycle<'c, R, S, B, D> {
    config: &'c NodeConfig,
    radio: R,
    sensor: SensorReader<S>,
    broker: B,
    delay: D,
}

impl<'c, R, S, B, D> WakeCycle<'c, R, S, B, D>
where
    R: Radio,
    S: SensorDriver,
    B: Broker,
    D: Delay,
{
    pub fn new(config: &'c NodeConfig, radio: R, sensor: S, broker: B, delay: D) -> Self {
        Self {
            config,
            radio,
            sensor: SensorReader::new(sensor),
            broker,
            delay,
        }
    }

    /// Runs one cycle up to, but not including, the suspend call.
    pub fn run(&mut self) -> CycleReport {
        let mut trace = Trace::default();
        trace.enter(CycleState::Idle);

        let network = &self.config.network;
        let policy = BringupPolicy::from_config(&self.config.cycle);
        let (result, link_attempts) = match bringup::connect(
            &mut self.radio,
            &mut self.delay,
            &network.wifi_ssid,
            &network.wifi_pass,
            &policy,
        ) {
            Ok(link) => {
                trace.enter(CycleState::LinkUp);
                let result = self.online(&link, &mut trace);
                bringup::link_down(
                    &mut self.radio,
                    &mut self.delay,
                    self.config.cycle.link_down_settle(),
                );
                trace.enter(CycleState::TornDown);
                (result, link.attempts)
            }
            Err(failure) => {
                bringup::power_down(&mut self.radio);
                let attempts = failure.attempts;
                (Err(CycleFault::from(failure)), attempts)
            }
        };

        if let Err(fault) = &result {
            warn!("cycle aborted with {}: {fault}", fault.kind());
            trace.enter(CycleState::Faulted);
        }

        let sleep_for = self.config.cycle.wake_interval();
        trace.enter(CycleState::Sleeping);

        CycleReport {
            outcome: result.into(),
            trace: trace.0,
            sleep_for,
            link_attempts,
        }
    }

    /// Runs one cycle, records any fault, then suspends the device.
    pub fn run_to_sleep<Z: DeepSleep>(&mut self, sleeper: &mut Z) -> CycleReport {
        let report = self.run();

        if let Some(fault) = report.outcome.fault() {
            record_fault(self.config, fault);
        }

        info!("sleeping for {}s", report.sleep_for.as_secs());
        self.delay.wait(self.config.cycle.pre_sleep());
        sleeper.suspend(report.sleep_for);
        report
    }

    fn online(&mut self, link: &LinkHandle, trace: &mut Trace) -> Result<(), CycleFault> {
        let mut session = Session::open(&mut self.broker, self.config, link)?;
        trace.enter(CycleState::SessionOpen);
        self.delay.wait(self.config.cycle.broker_settle());

        let result = self
            .sensor
            .read()
            .map_err(CycleFault::from)
            .and_then(|reading| {
                publisher::publish(&mut session, &reading).map_err(CycleFault::from)
            });

        if result.is_ok() {
            self.delay.wait(self.config.cycle.broker_settle());
            trace.enter(CycleState::Published);
        }

        session.close();
        result
    }
}

fn record_fault(config: &NodeConfig, fault: &CycleFault) {
    if !config.debug {
        return;
    }

    error!("Error: {fault}");
    if let Some(log) = DiagnosticLog::from_config(config) {
        if let Err(err) = log.append(&fault.to_string()) {
            warn!("failed to append to {}: {err}", log.path().display());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        drivers::LinkStatus,
        error::{LinkFailureReason, SensorFault},
        testing::{
            sample, BrokerCall, FixedSensor, RadioCall, RecordingBroker, RecordingSleep,
            ScriptedRadio, VirtualClock,
        },
        types::Metric,
    };

    fn config() -> NodeConfig {
        let mut config = NodeConfig::default();
        config.identity.device_id = "attic".to_string();
        config.identity.metric_prefix = "attic_env".to_string();
        config.network.wifi_ssid = "home".to_string();
        config.network.wifi_pass = "secret".to_string();
        config
    }

    struct Rig {
        radio: ScriptedRadio,
        sensor: FixedSensor,
        broker: RecordingBroker,
        clock: VirtualClock,
        sleeper: RecordingSleep,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                radio: ScriptedRadio::new([LinkStatus::Connecting], LinkStatus::GotIp),
                sensor: FixedSensor::new(sample(21.3, 45.0, 1013.10, 50_000.0)),
                broker: RecordingBroker::default(),
                clock: VirtualClock::default(),
                sleeper: RecordingSleep::default(),
            }
        }

        fn run(&mut self, config: &NodeConfig) -> CycleReport {
            WakeCycle::new(
                config,
                &mut self.radio,
                &mut self.sensor,
                &mut self.broker,
                &mut self.clock,
            )
            .run_to_sleep(&mut self.sleeper)
        }
    }

    #[test]
    fn healthy_cycle_publishes_and_sleeps() {
        let config = config();
        let mut rig = Rig::new();

        let report = rig.run(&config);

        assert_eq!(report.outcome, CycleOutcome::Success);
        assert_eq!(
            report.trace,
            vec![
                CycleState::Idle,
                CycleState::LinkUp,
                CycleState::SessionOpen,
                CycleState::Published,
                CycleState::TornDown,
                CycleState::Sleeping,
            ]
        );
        assert_eq!(report.link_attempts, 1);

        let publishes = rig.broker.publishes();
        assert_eq!(publishes.len(), 10);
        assert!(publishes[..4]
            .iter()
            .all(|(topic, _, retain)| topic.ends_with("/config") && !retain));
        assert_eq!(
            &publishes[4..],
            &[
                ("homeassistant/availability/attic".to_string(), "online".to_string(), true),
                ("state/attic_env_temp/value".to_string(), "21.3".to_string(), true),
                ("state/attic_env_humidity/value".to_string(), "45".to_string(), true),
                ("state/attic_env_pressure/value".to_string(), "1013.10".to_string(), true),
                ("state/attic_env_gas/value".to_string(), "11.3".to_string(), true),
                ("homeassistant/availability/attic".to_string(), "offline".to_string(), true),
            ]
        );
        assert_eq!(rig.broker.calls.last(), Some(&BrokerCall::Disconnect));

        assert_eq!(
            &rig.radio.calls[rig.radio.calls.len() - 2..],
            &[RadioCall::Disconnect, RadioCall::Deactivate]
        );
        assert_eq!(rig.sleeper.suspended, vec![Duration::from_secs(60)]);
    }

    #[test]
    fn unreachable_network_never_touches_broker() {
        let config = config();
        let mut rig = Rig::new();
        rig.radio = ScriptedRadio::always(LinkStatus::Connecting);

        let report = rig.run(&config);

        assert_eq!(
            report.trace,
            vec![CycleState::Idle, CycleState::Faulted, CycleState::Sleeping]
        );
        assert!(matches!(
            report.outcome.fault(),
            Some(CycleFault::Link(failure))
                if failure.reason == LinkFailureReason::RetriesExhausted {
                    last_status: LinkStatus::Connecting
                }
        ));
        assert_eq!(report.link_attempts, 6);
        assert!(rig.broker.calls.is_empty());
        assert_eq!(rig.sensor.reads, 0);
        assert_eq!(rig.radio.calls.last(), Some(&RadioCall::Deactivate));
        assert_eq!(rig.radio.count(&RadioCall::Disconnect), 0);
        assert_eq!(rig.sleeper.suspended, vec![Duration::from_secs(60)]);
    }

    #[test]
    fn failed_publishes_still_close_session_once() {
        let config = config();
        let mut rig = Rig::new();
        rig.broker = RecordingBroker::failing_topics(&["state/"]);

        let report = rig.run(&config);

        match report.outcome {
            CycleOutcome::Faulted(CycleFault::Publish(failure)) => {
                assert_eq!(failure.metrics(), Metric::ALL.to_vec())
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(
            report.trace,
            vec![
                CycleState::Idle,
                CycleState::LinkUp,
                CycleState::SessionOpen,
                CycleState::TornDown,
                CycleState::Faulted,
                CycleState::Sleeping,
            ]
        );
        let offline = rig
            .broker
            .publishes()
            .into_iter()
            .filter(|(_, payload, _)| payload == "offline")
            .count();
        assert_eq!(offline, 1);
        assert_eq!(rig.broker.disconnects(), 1);
        assert_eq!(rig.radio.count(&RadioCall::Deactivate), 1);
        assert_eq!(rig.sleeper.suspended.len(), 1);
    }

    #[test]
    fn sensor_fault_skips_publishing_but_tears_down() {
        let config = config();
        let mut rig = Rig::new();
        rig.sensor = FixedSensor::new(sample(19.0, 0.0, 1001.0, 30_000.0));

        let report = rig.run(&config);

        assert_eq!(
            report.outcome,
            CycleOutcome::Faulted(CycleFault::Sensor(SensorFault::DegenerateHumidity))
        );
        assert_eq!(
            report.trace,
            vec![
                CycleState::Idle,
                CycleState::LinkUp,
                CycleState::SessionOpen,
                CycleState::TornDown,
                CycleState::Faulted,
                CycleState::Sleeping,
            ]
        );
        assert!(rig
            .broker
            .publishes()
            .iter()
            .all(|(topic, _, _)| !topic.starts_with("state/")));
        assert_eq!(rig.broker.disconnects(), 1);
        assert_eq!(rig.radio.count(&RadioCall::Disconnect), 1);
    }

    #[test]
    fn broker_refusal_takes_link_down() {
        let config = config();
        let mut rig = Rig::new();
        rig.broker.fail_connect = true;

        let report = rig.run(&config);

        assert_eq!(report.outcome.fault().map(CycleFault::kind), Some("session-failure"));
        assert_eq!(
            report.trace,
            vec![
                CycleState::Idle,
                CycleState::LinkUp,
                CycleState::TornDown,
                CycleState::Faulted,
                CycleState::Sleeping,
            ]
        );
        assert_eq!(rig.sensor.reads, 0);
        assert_eq!(
            &rig.radio.calls[rig.radio.calls.len() - 2..],
            &[RadioCall::Disconnect, RadioCall::Deactivate]
        );
    }

    #[test]
    fn waits_settle_delays_in_order() {
        let config = config();
        let mut rig = Rig::new();

        rig.run(&config);

        let ms = Duration::from_millis;
        assert_eq!(
            rig.clock.waits,
            vec![
                ms(500),   // radio settle
                ms(1_000), // one poll while connecting
                ms(500),   // session open
                ms(500),   // after publishing
                ms(500),   // link down
                ms(1_000), // pre-sleep
            ]
        );
    }

    #[test]
    fn debug_fault_is_appended_to_diagnostic_log() {
        let path = std::env::temp_dir().join(format!("airnode-{}-cycle.log", std::process::id()));
        let _ = fs::remove_file(&path);
        let mut config = config();
        config.debug = true;
        config.diagnostic_log_path = Some(path.display().to_string());
        let mut rig = Rig::new();
        rig.sensor = FixedSensor::failing("i2c nack");

        rig.run(&config);

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Error: sensor read failed: i2c nack\n"
        );
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn cycles_repeat_without_carrying_state() {
        let config = config();
        let mut rig = Rig::new();

        let first = rig.run(&config);
        rig.radio = ScriptedRadio::always(LinkStatus::GotIp);
        let second = rig.run(&config);

        assert_eq!(first.trace, second.trace);
        assert_eq!(rig.broker.disconnects(), 2);
        assert_eq!(rig.sleeper.suspended.len(), 2);
    }
}

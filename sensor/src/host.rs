use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use anyhow::Context;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use airnode_common::{
    sensor::altitude_m, Broker, DeepSleep, Delay, DriverError, LinkStatus, NodeConfig, Radio,
    RawSample, SensorDriver, SessionOptions, WakeCycle,
};

const DEFAULT_CONFIG_PATH: &str = "./.airnode/node.json";
const MQTT_ACK_TIMEOUT: Duration = Duration::from_secs(10);
const SIMULATED_ASSOCIATION_POLLS: u32 = 2;

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var("AIRNODE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut config = load_config(&config_path).unwrap_or_else(|err| {
        warn!("failed to load node config: {err:#}");
        NodeConfig::default()
    });
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.sanitize();

    info!(
        "air node `{}` simulating wake cycles every {}s against {}:{}",
        config.identity.device_id,
        config.cycle.wake_interval_s,
        config.network.mqtt_host,
        config.network.mqtt_port
    );

    let mut radio = SimulatedRadio::new(config.identity.metric_prefix());
    let mut sensor = SimulatedSensor::new(config.hardware.sea_level_pressure_hpa);
    let mut broker = RumqttBroker::new(&config.network.mqtt_host, config.network.mqtt_port)?;
    let mut delay = ThreadDelay;
    let mut sleeper = ThreadSleep;

    loop {
        let report = WakeCycle::new(&config, &mut radio, &mut sensor, &mut broker, &mut delay)
            .run_to_sleep(&mut sleeper);
        debug!("cycle finished: {:?}", report.trace);
    }
}

fn load_config(path: &Path) -> anyhow::Result<NodeConfig> {
    match std::fs::read(path) {
        Ok(raw) => serde_json::from_slice::<NodeConfig>(&raw)
            .with_context(|| format!("invalid node config at {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(NodeConfig::default()),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

fn apply_env_overrides(config: &mut NodeConfig, var: impl Fn(&str) -> Option<String>) {
    let network = &mut config.network;

    if let Some(host) = var("MQTT_HOST") {
        network.mqtt_host = host;
    }
    if let Some(port) = var("MQTT_PORT").and_then(|value| value.parse::<u16>().ok()) {
        network.mqtt_port = port;
    }
    if let Some(user) = var("MQTT_USER") {
        network.mqtt_user = user;
    }
    if let Some(pass) = var("MQTT_PASS") {
        network.mqtt_pass = pass;
    }
    if let Some(debug) = var("AIRNODE_DEBUG") {
        config.debug = matches!(debug.trim(), "1" | "true" | "yes" | "on");
    }
}

/// Stands in for the station interface: association completes after a few
/// polls, one poll longer on every other attempt.
struct SimulatedRadio {
    hostname: String,
    active: bool,
    status: LinkStatus,
    pending_polls: u32,
    associations: u32,
}

impl SimulatedRadio {
    fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            active: false,
            status: LinkStatus::Idle,
            pending_polls: 0,
            associations: 0,
        }
    }
}

impl Radio for SimulatedRadio {
    fn activate(&mut self) -> Result<(), DriverError> {
        self.active = true;
        self.status = LinkStatus::Idle;
        debug!("radio `{}` active", self.hostname);
        Ok(())
    }

    fn connect(&mut self, ssid: &str, _password: &str) -> Result<(), DriverError> {
        if !self.active {
            return Err(DriverError::new("radio is not active"));
        }
        self.associations = self.associations.wrapping_add(1);
        self.pending_polls = SIMULATED_ASSOCIATION_POLLS + self.associations % 2;
        self.status = LinkStatus::Connecting;
        debug!("radio associating with `{ssid}`");
        Ok(())
    }

    fn status(&mut self) -> LinkStatus {
        if self.status == LinkStatus::Connecting {
            if self.pending_polls == 0 {
                self.status = LinkStatus::GotIp;
            } else {
                self.pending_polls -= 1;
            }
        }
        self.status
    }

    fn disconnect(&mut self) -> Result<(), DriverError> {
        self.status = LinkStatus::Idle;
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), DriverError> {
        self.active = false;
        debug!("radio `{}` powered down", self.hostname);
        Ok(())
    }
}

struct SimulatedSensor {
    tick: u64,
    sea_level_hpa: f64,
}

impl SimulatedSensor {
    fn new(sea_level_hpa: f64) -> Self {
        Self {
            tick: 0,
            sea_level_hpa,
        }
    }
}

impl SensorDriver for SimulatedSensor {
    fn read(&mut self) -> Result<RawSample, DriverError> {
        self.tick = self.tick.saturating_add(1);

        let sample = RawSample {
            temperature_c: 21.0 + (self.tick % 8) as f64 * 0.2,
            humidity_pct: 42.0 + (self.tick % 6) as f64 * 0.5,
            pressure_hpa: 1013.2 - (self.tick % 5) as f64 * 0.15,
            gas_resistance_ohm: 48_000.0 + (self.tick % 10) as f64 * 750.0,
        };
        debug!(
            "simulated altitude {:.1} m",
            altitude_m(sample.pressure_hpa, self.sea_level_hpa)
        );
        Ok(sample)
    }
}

/// Blocking MQTT adapter. Each call drives the event loop on a private
/// current-thread runtime until the matching acknowledgement arrives.
struct RumqttBroker {
    runtime: Runtime,
    host: String,
    port: u16,
    session: Option<(AsyncClient, EventLoop)>,
}

impl RumqttBroker {
    fn new(host: &str, port: u16) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build mqtt runtime")?;

        Ok(Self {
            runtime,
            host: host.to_string(),
            port,
            session: None,
        })
    }

    fn client(&self) -> Result<AsyncClient, DriverError> {
        self.session
            .as_ref()
            .map(|(client, _)| client.clone())
            .ok_or_else(|| DriverError::new("mqtt session is not connected"))
    }

    fn drive_until(
        &mut self,
        waiting_for: &str,
        mut done: impl FnMut(&Event) -> bool,
    ) -> Result<(), DriverError> {
        let Some((_, eventloop)) = self.session.as_mut() else {
            return Err(DriverError::new("mqtt session is not connected"));
        };

        self.runtime.block_on(async {
            let polled = tokio::time::timeout(MQTT_ACK_TIMEOUT, async {
                loop {
                    match eventloop.poll().await {
                        Ok(event) if done(&event) => return Ok(()),
                        Ok(_) => {}
                        Err(err) => {
                            return Err(DriverError::new(format!(
                                "mqtt error while waiting for {waiting_for}: {err}"
                            )))
                        }
                    }
                }
            })
            .await;

            polled.unwrap_or_else(|_| {
                Err(DriverError::new(format!(
                    "timed out waiting for {waiting_for}"
                )))
            })
        })
    }
}

impl Broker for RumqttBroker {
    fn connect(&mut self, options: &SessionOptions) -> Result<(), DriverError> {
        let mut mqtt_options = MqttOptions::new(&options.client_id, &self.host, self.port);
        mqtt_options
            .set_keep_alive(options.keep_alive)
            .set_clean_session(options.clean_session)
            .set_last_will(rumqttc::LastWill::new(
                &options.last_will.topic,
                options.last_will.payload.clone(),
                QoS::AtLeastOnce,
                options.last_will.retain,
            ));
        if let Some(user) = &options.username {
            mqtt_options.set_credentials(user, options.password.clone().unwrap_or_default());
        }

        self.session = Some(AsyncClient::new(mqtt_options, 16));
        let result = self.drive_until("connack", |event| {
            matches!(event, Event::Incoming(Incoming::ConnAck(_)))
        });
        if result.is_err() {
            self.session = None;
        }
        result
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), DriverError> {
        let client = self.client()?;
        self.runtime
            .block_on(client.publish(topic, QoS::AtLeastOnce, retain, payload.to_vec()))
            .map_err(|err| DriverError::new(format!("mqtt publish to {topic} failed: {err}")))?;

        self.drive_until("puback", |event| {
            matches!(event, Event::Incoming(Incoming::PubAck(_)))
        })
    }

    fn disconnect(&mut self) -> Result<(), DriverError> {
        let Ok(client) = self.client() else {
            return Ok(());
        };
        let requested = self
            .runtime
            .block_on(client.disconnect())
            .map_err(|err| DriverError::new(format!("mqtt disconnect failed: {err}")));

        let result = requested.and_then(|()| {
            self.drive_until("disconnect", |event| {
                matches!(event, Event::Outgoing(Outgoing::Disconnect))
            })
        });
        self.session = None;
        result
    }
}

struct ThreadDelay;

impl Delay for ThreadDelay {
    fn wait(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// The host has no deep sleep; the process idles and the loop wakes again.
struct ThreadSleep;

impl DeepSleep for ThreadSleep {
    fn suspend(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

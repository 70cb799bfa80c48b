use core::convert::TryInto;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver},
        Arc,
    },
    thread,
    time::Duration,
};

use anyhow::{anyhow, Context};
use bosch_bme680::{Bme680, Configuration as Bme680Configuration, DeviceAddress};
use embedded_svc::{
    mqtt::client::{EventPayload, QoS},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    delay::FreeRtos,
    gpio::{AnyIOPin, AnyOutputPin, Output, PinDriver},
    i2c::{I2cConfig, I2cDriver, I2C0},
    units::Hertz,
};
use esp_idf_svc::{
    eventloop::{EspSubscription, EspSystemEventLoop, System},
    hal::{modem::Modem, prelude::Peripherals},
    ipv4::{
        ClientConfiguration as IpClientConfiguration, Configuration as IpConfiguration,
        DHCPClientSettings,
    },
    log::EspLogger,
    mqtt::client::{EspMqttClient, LwtConfiguration, MqttClientConfiguration},
    netif::{EspNetif, NetifConfiguration},
    nvs::{EspDefaultNvsPartition, EspNvs},
    wifi::{EspWifi, WifiEvent},
};
use log::{error, info, warn};

use airnode_common::{
    sensor::altitude_m, Broker, DeepSleep, Delay, DriverError, HardwareConfig, LinkStatus,
    NetworkConfig, NodeConfig, Radio, RawSample, SensorDriver, SessionOptions, WakeCycle,
};

use crate::mqtt_events::{self, MqttSignal};

const NVS_NAMESPACE: &str = "airnode";
const NVS_RUNTIME_KEY: &str = "runtime_json";

const BME680_AMBIENT_TEMPERATURE_C: i32 = 20;
const MQTT_ACK_TIMEOUT: Duration = Duration::from_secs(10);
const MQTT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs_store = NvsStore {
        partition: nvs_partition.clone(),
    };

    let mut config = nvs_store.load_node_config().unwrap_or_else(|err| {
        warn!("failed to load node config from NVS: {err:#}");
        NodeConfig::default()
    });
    ensure_wifi_defaults(&mut config.network);
    config.sanitize();

    if let Err(err) = wake(&config, sys_loop, nvs_partition) {
        error!("wake cycle could not start: {err:#}");
        thread::sleep(config.cycle.pre_sleep());
        EspDeepSleep.suspend(config.cycle.wake_interval());
    }

    Ok(())
}

fn wake(
    config: &NodeConfig,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
) -> anyhow::Result<()> {
    let Peripherals { modem, i2c0, .. } = Peripherals::take()?;

    let mut sensor = EspSensor::new(i2c0, &config.hardware);
    let mut radio = EspRadio::new(modem, sys_loop, nvs_partition, config)
        .context("failed to initialise radio")?;
    let mut broker = EspBroker::new(&config.network);

    loop {
        let report = WakeCycle::new(config, &mut radio, &mut sensor, &mut broker, EspDelay)
            .run_to_sleep(&mut EspDeepSleep);
        warn!("deep sleep returned after {:?}; running another cycle", report.trace);
    }
}

fn ensure_wifi_defaults(network: &mut NetworkConfig) {
    if network.wifi_ssid.is_empty() {
        network.wifi_ssid = option_env!("WIFI_SSID").unwrap_or_default().to_string();
    }

    if network.wifi_pass.is_empty() {
        network.wifi_pass = option_env!("WIFI_PASS").unwrap_or_default().to_string();
    }
}

fn esp_error(context: &str) -> impl Fn(esp_idf_svc::sys::EspError) -> DriverError + '_ {
    move |err| DriverError::new(format!("{context}: {err}"))
}

struct NvsStore {
    partition: EspDefaultNvsPartition,
}

impl NvsStore {
    fn load_node_config(&self) -> anyhow::Result<NodeConfig> {
        let nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let mut buffer = vec![0_u8; 4096];

        match nvs.get_str(NVS_RUNTIME_KEY, &mut buffer)? {
            Some(value) => Ok(serde_json::from_str::<NodeConfig>(value)?),
            None => Ok(NodeConfig::default()),
        }
    }
}

/// Station interface behind a switched power rail. The hostname is fixed
/// when the netif is created; association progress is read back from the
/// driver plus a flag raised by disconnect events.
struct EspRadio {
    wifi: EspWifi<'static>,
    power: PinDriver<'static, AnyOutputPin, Output>,
    dropped: Arc<AtomicBool>,
    _events: EspSubscription<'static, System>,
}

impl EspRadio {
    fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs_partition: EspDefaultNvsPartition,
        config: &NodeConfig,
    ) -> anyhow::Result<Self> {
        let mut wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;

        let hostname = config.identity.metric_prefix();
        let mut netif_conf = NetifConfiguration::wifi_default_client();
        netif_conf.key = "WIFI_STA_NODE"
            .try_into()
            .map_err(|_| anyhow!("netif key too long"))?;
        netif_conf.ip_configuration = Some(IpConfiguration::Client(IpClientConfiguration::DHCP(
            DHCPClientSettings {
                hostname: Some(
                    hostname
                        .try_into()
                        .map_err(|_| anyhow!("hostname `{hostname}` too long"))?,
                ),
            },
        )));
        wifi.swap_netif_sta(EspNetif::new_with_conf(&netif_conf)?)
            .context("failed to apply station hostname")?;

        // SAFETY: the pin number comes from configuration and is not claimed elsewhere.
        let power_pin = unsafe { AnyOutputPin::new(config.hardware.radio_power_pin) };
        let mut power = PinDriver::output(power_pin)?;
        power.set_low()?;

        let dropped = Arc::new(AtomicBool::new(false));
        let events = {
            let dropped = dropped.clone();
            sys_loop.subscribe::<WifiEvent, _>(move |event| {
                if matches!(event, WifiEvent::StaDisconnected { .. }) {
                    dropped.store(true, Ordering::SeqCst);
                }
            })?
        };

        Ok(Self {
            wifi,
            power,
            dropped,
            _events: events,
        })
    }

    fn has_address(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false) && self.wifi.sta_netif().is_up().unwrap_or(false)
    }
}

impl Radio for EspRadio {
    fn activate(&mut self) -> Result<(), DriverError> {
        self.power.set_high().map_err(esp_error("radio power on"))?;
        self.wifi.start().map_err(esp_error("wifi start"))
    }

    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), DriverError> {
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };

        self.wifi
            .set_configuration(&Configuration::Client(ClientConfiguration {
                ssid: ssid
                    .try_into()
                    .map_err(|_| DriverError::new("wifi ssid too long"))?,
                password: password
                    .try_into()
                    .map_err(|_| DriverError::new("wifi password too long"))?,
                auth_method,
                ..Default::default()
            }))
            .map_err(esp_error("wifi configuration"))?;

        self.dropped.store(false, Ordering::SeqCst);
        self.wifi.connect().map_err(esp_error("wifi connect"))
    }

    fn status(&mut self) -> LinkStatus {
        if !self.wifi.is_started().unwrap_or(false) {
            LinkStatus::Idle
        } else if self.has_address() {
            LinkStatus::GotIp
        } else if self.dropped.swap(false, Ordering::SeqCst) {
            LinkStatus::ConnectFail
        } else {
            LinkStatus::Connecting
        }
    }

    fn disconnect(&mut self) -> Result<(), DriverError> {
        self.wifi.disconnect().map_err(esp_error("wifi disconnect"))
    }

    fn deactivate(&mut self) -> Result<(), DriverError> {
        let stopped = self.wifi.stop().map_err(esp_error("wifi stop"));
        self.power.set_low().map_err(esp_error("radio power off"))?;
        stopped
    }
}

struct EspSensor {
    device: Option<Bme680<I2cDriver<'static>, FreeRtos>>,
    sea_level_hpa: f64,
}

impl EspSensor {
    fn new(i2c: I2C0, hardware: &HardwareConfig) -> Self {
        Self {
            device: init_bme680(i2c, hardware)
                .inspect_err(|err| warn!("BME680 unavailable: {err:#}"))
                .ok(),
            sea_level_hpa: hardware.sea_level_pressure_hpa,
        }
    }
}

fn init_bme680(
    i2c: I2C0,
    hardware: &HardwareConfig,
) -> anyhow::Result<Bme680<I2cDriver<'static>, FreeRtos>> {
    // SAFETY: bus pins come from configuration and are only used by this driver.
    let (sda, scl) = unsafe {
        (
            AnyIOPin::new(hardware.sda_pin),
            AnyIOPin::new(hardware.scl_pin),
        )
    };
    let bus = I2cDriver::new(i2c, sda, scl, &I2cConfig::new().baudrate(Hertz(100_000)))?;

    let address = if hardware.i2c_address == 0x77 {
        DeviceAddress::Secondary
    } else {
        DeviceAddress::Primary
    };

    let device = Bme680::new(
        bus,
        address,
        FreeRtos,
        &Bme680Configuration::default(),
        BME680_AMBIENT_TEMPERATURE_C,
    )
    .map_err(|err| anyhow!("BME680 init failed at {:#04x}: {err:?}", hardware.i2c_address))?;

    info!(
        "BME680 ready on SDA GPIO{} / SCL GPIO{}",
        hardware.sda_pin, hardware.scl_pin
    );
    Ok(device)
}

impl SensorDriver for EspSensor {
    fn read(&mut self) -> Result<RawSample, DriverError> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| DriverError::new("BME680 was not initialised"))?;

        let data = device
            .measure()
            .map_err(|err| DriverError::new(format!("BME680 measurement failed: {err:?}")))?;
        let gas = data
            .gas_resistance
            .ok_or_else(|| DriverError::new("BME680 gas heater not stable"))?;

        let sample = RawSample {
            temperature_c: f64::from(data.temperature),
            pressure_hpa: f64::from(data.pressure),
            humidity_pct: f64::from(data.humidity),
            gas_resistance_ohm: f64::from(gas),
        };
        info!(
            "[BME680] altitude {:.1} m",
            altitude_m(sample.pressure_hpa, self.sea_level_hpa)
        );
        Ok(sample)
    }
}

/// Blocking broker adapter. A helper thread drains the connection and
/// forwards the events each call waits on.
struct EspBroker {
    url: String,
    client: Option<EspMqttClient<'static>>,
    events: Option<Receiver<MqttSignal>>,
}

impl EspBroker {
    fn new(network: &NetworkConfig) -> Self {
        Self {
            url: format!("mqtt://{}:{}", network.mqtt_host, network.mqtt_port),
            client: None,
            events: None,
        }
    }

    fn wait_for(&self, waiting_for: &str, expected: MqttSignal) -> Result<(), DriverError> {
        let events = self
            .events
            .as_ref()
            .ok_or_else(|| DriverError::new("mqtt session is not connected"))?;
        mqtt_events::wait_for(events, waiting_for, expected, MQTT_ACK_TIMEOUT)
    }
}

impl Broker for EspBroker {
    fn connect(&mut self, options: &SessionOptions) -> Result<(), DriverError> {
        let conf = MqttClientConfiguration {
            client_id: Some(options.client_id.as_str()),
            username: options.username.as_deref(),
            password: options.password.as_deref(),
            keep_alive_interval: Some(options.keep_alive),
            disable_clean_session: !options.clean_session,
            lwt: Some(LwtConfiguration {
                topic: options.last_will.topic.as_str(),
                payload: options.last_will.payload.as_bytes(),
                qos: QoS::AtLeastOnce,
                retain: options.last_will.retain,
            }),
            ..Default::default()
        };

        let (client, mut connection) =
            EspMqttClient::new(&self.url, &conf).map_err(esp_error("mqtt client"))?;

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("mqtt-events".to_string())
            .stack_size(6144)
            .spawn(move || {
                while let Ok(event) = connection.next() {
                    let signal = match event.payload() {
                        EventPayload::Connected(_) => MqttSignal::Connected,
                        EventPayload::Published(id) => MqttSignal::Published(id),
                        EventPayload::Disconnected => MqttSignal::Disconnected,
                        _ => continue,
                    };
                    if tx.send(signal).is_err() {
                        break;
                    }
                }
            })
            .map_err(|err| DriverError::new(format!("failed to spawn mqtt thread: {err}")))?;

        self.client = Some(client);
        self.events = Some(rx);

        let result = self.wait_for("connack", MqttSignal::Connected);
        if result.is_err() {
            self.client = None;
            self.events = None;
        }
        result
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), DriverError> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| DriverError::new("mqtt session is not connected"))?;
        let id = client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .map_err(esp_error("mqtt publish"))?;

        self.wait_for("puback", MqttSignal::Published(id))
    }

    /// Dropping the client sends DISCONNECT and stops its task; the wait
    /// covers the packet leaving before the radio is powered down.
    fn disconnect(&mut self) -> Result<(), DriverError> {
        self.client = None;
        match self.events.take() {
            Some(events) => mqtt_events::wait_closed(&events, MQTT_CLOSE_TIMEOUT),
            None => Ok(()),
        }
    }
}

struct EspDelay;

impl Delay for EspDelay {
    fn wait(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

struct EspDeepSleep;

impl DeepSleep for EspDeepSleep {
    fn suspend(&mut self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        unsafe { esp_idf_svc::sys::esp_deep_sleep(micros) }
    }
}

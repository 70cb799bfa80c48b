use std::time::Duration;

use serde::{Deserialize, Serialize};

const MAX_KEEP_ALIVE_S: u16 = u16::MAX;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub metric_prefix: String,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub hw_version: String,
    pub sw_version: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            device_id: "airnode".to_string(),
            metric_prefix: String::new(),
            name: "Air Node".to_string(),
            manufacturer: "Air Node Project".to_string(),
            model: "BME680 Node".to_string(),
            hw_version: "1.0".to_string(),
            sw_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl DeviceIdentity {
    /// Prefix for metric ids, MQTT client id and radio hostname.
    pub fn metric_prefix(&self) -> &str {
        if self.metric_prefix.is_empty() {
            &self.device_id
        } else {
            &self.metric_prefix
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    pub wake_interval_s: u64,
    pub poll_interval_ms: u64,
    pub attempt_polls: u32,
    pub max_retries: u32,
    pub radio_settle_ms: u64,
    pub broker_settle_ms: u64,
    pub link_down_settle_ms: u64,
    pub pre_sleep_ms: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            wake_interval_s: 60,
            poll_interval_ms: 1_000,
            attempt_polls: 30,
            max_retries: 5,
            radio_settle_ms: 500,
            broker_settle_ms: 500,
            link_down_settle_ms: 500,
            pre_sleep_ms: 1_000,
        }
    }
}

impl CycleConfig {
    pub fn wake_interval(&self) -> Duration {
        Duration::from_secs(self.wake_interval_s)
    }

    /// Broker keep-alive spans two wake intervals, capped at the largest value
    /// the CONNECT packet's 16-bit field can carry.
    pub fn keep_alive(&self) -> Duration {
        let secs = self
            .wake_interval_s
            .saturating_mul(2)
            .min(u64::from(MAX_KEEP_ALIVE_S));
        Duration::from_secs(secs)
    }

    pub fn broker_settle(&self) -> Duration {
        Duration::from_millis(self.broker_settle_ms)
    }

    pub fn link_down_settle(&self) -> Duration {
        Duration::from_millis(self.link_down_settle_ms)
    }

    pub fn pre_sleep(&self) -> Duration {
        Duration::from_millis(self.pre_sleep_ms)
    }

    pub fn sanitize(&mut self) {
        self.wake_interval_s = self.wake_interval_s.clamp(1, 86_400);
        self.poll_interval_ms = self.poll_interval_ms.clamp(10, 10_000);
        self.attempt_polls = self.attempt_polls.clamp(1, 600);
        self.max_retries = self.max_retries.min(50);
        self.radio_settle_ms = self.radio_settle_ms.min(10_000);
        self.broker_settle_ms = self.broker_settle_ms.min(10_000);
        self.link_down_settle_ms = self.link_down_settle_ms.min(10_000);
        self.pre_sleep_ms = self.pre_sleep_ms.min(10_000);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HardwareConfig {
    pub scl_pin: i32,
    pub sda_pin: i32,
    pub i2c_address: u8,
    pub radio_power_pin: i32,
    pub sea_level_pressure_hpa: f64,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            scl_pin: 27,
            sda_pin: 26,
            i2c_address: 0x76,
            radio_power_pin: 23,
            sea_level_pressure_hpa: 1013.25,
        }
    }
}

impl HardwareConfig {
    pub fn sanitize(&mut self) {
        if self.i2c_address != 0x76 && self.i2c_address != 0x77 {
            self.i2c_address = 0x76;
        }

        if !self.sea_level_pressure_hpa.is_finite()
            || !(800.0..=1100.0).contains(&self.sea_level_pressure_hpa)
        {
            self.sea_level_pressure_hpa = 1013.25;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub identity: DeviceIdentity,
    pub network: NetworkConfig,
    pub cycle: CycleConfig,
    pub hardware: HardwareConfig,
    pub debug: bool,
    pub diagnostic_log_path: Option<String>,
}

impl NodeConfig {
    pub fn sanitize(&mut self) {
        self.cycle.sanitize();
        self.hardware.sanitize();
        if self.identity.device_id.trim().is_empty() {
            self.identity.device_id = DeviceIdentity::default().device_id;
        }
    }
}

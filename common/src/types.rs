use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Temperature,
    Humidity,
    Pressure,
    Gas,
}

impl Metric {
    /// Discovery order; the first entry carries the full device record.
    pub const ALL: [Metric; 4] = [
        Metric::Temperature,
        Metric::Humidity,
        Metric::Pressure,
        Metric::Gas,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Pressure => "pressure",
            Self::Gas => "gas",
        }
    }

    pub fn id_suffix(self) -> &'static str {
        match self {
            Self::Temperature => "temp",
            Self::Humidity => "humidity",
            Self::Pressure => "pressure",
            Self::Gas => "gas",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Temperature => "Temperature Sensor",
            Self::Humidity => "Humidity Sensor",
            Self::Pressure => "Pressure Sensor",
            Self::Gas => "Gas Sensor",
        }
    }

    pub fn device_class(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Pressure => "atmospheric_pressure",
            Self::Gas => "aqi",
        }
    }

    pub fn unit(self) -> Option<&'static str> {
        match self {
            Self::Temperature => Some("°C"),
            Self::Humidity => Some("%"),
            Self::Pressure => Some("hPa"),
            Self::Gas => None,
        }
    }

    /// Decimal places carried by the published state payload.
    pub fn precision(self) -> usize {
        match self {
            Self::Temperature => 1,
            Self::Humidity => 0,
            Self::Pressure => 2,
            Self::Gas => 1,
        }
    }

    pub fn value_template(self) -> String {
        format!("{{{{ value | round({}) }}}}", self.precision())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Online,
    Offline,
}

impl PresenceState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// One snapshot per wake cycle, consumed by the publisher and then dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub pressure_hpa: f64,
    pub gas_index: f64,
}

impl SensorReading {
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Temperature => self.temperature_c,
            Metric::Humidity => self.humidity_pct,
            Metric::Pressure => self.pressure_hpa,
            Metric::Gas => self.gas_index,
        }
    }

    pub fn render(&self, metric: Metric) -> String {
        format!("{:.*}", metric.precision(), self.value(metric))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    LinkUp,
    SessionOpen,
    Published,
    TornDown,
    Faulted,
    Sleeping,
}

impl CycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::LinkUp => "LINK_UP",
            Self::SessionOpen => "SESSION_OPEN",
            Self::Published => "PUBLISHED",
            Self::TornDown => "TORN_DOWN",
            Self::Faulted => "FAULTED",
            Self::Sleeping => "SLEEPING",
        }
    }
}

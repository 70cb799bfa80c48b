//! Seams to the hardware and network collaborators a wake cycle drives.
//!
//! Every call is blocking from the caller's point of view. Implementations for
//! `&mut T` let a cycle borrow long-lived drivers instead of owning them.

use std::{fmt, time::Duration};

use crate::error::DriverError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Idle,
    Connecting,
    ConnectFail,
    NoApFound,
    WrongPassword,
    GotIp,
}

impl LinkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::ConnectFail => "connect_fail",
            Self::NoApFound => "no_ap_found",
            Self::WrongPassword => "wrong_password",
            Self::GotIp => "got_ip",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Radio {
    fn activate(&mut self) -> Result<(), DriverError>;
    /// Starts association; completion is observed through [`Radio::status`].
    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), DriverError>;
    fn status(&mut self) -> LinkStatus;
    fn disconnect(&mut self) -> Result<(), DriverError>;
    fn deactivate(&mut self) -> Result<(), DriverError>;
}

/// Compensated values straight from the environmental sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub temperature_c: f64,
    pub pressure_hpa: f64,
    pub humidity_pct: f64,
    pub gas_resistance_ohm: f64,
}

pub trait SensorDriver {
    fn read(&mut self) -> Result<RawSample, DriverError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
    pub clean_session: bool,
    pub last_will: LastWill,
}

pub trait Broker {
    fn connect(&mut self, options: &SessionOptions) -> Result<(), DriverError>;
    /// Returns once the broker has accepted the message.
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), DriverError>;
    fn disconnect(&mut self) -> Result<(), DriverError>;
}

pub trait Delay {
    fn wait(&mut self, duration: Duration);
}

pub trait DeepSleep {
    /// Suspends the device. Hardware implementations never return.
    fn suspend(&mut self, duration: Duration);
}

impl<T: Radio + ?Sized> Radio for &mut T {
    fn activate(&mut self) -> Result<(), DriverError> {
        (**self).activate()
    }

    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), DriverError> {
        (**self).connect(ssid, password)
    }

    fn status(&mut self) -> LinkStatus {
        (**self).status()
    }

    fn disconnect(&mut self) -> Result<(), DriverError> {
        (**self).disconnect()
    }

    fn deactivate(&mut self) -> Result<(), DriverError> {
        (**self).deactivate()
    }
}

impl<T: SensorDriver + ?Sized> SensorDriver for &mut T {
    fn read(&mut self) -> Result<RawSample, DriverError> {
        (**self).read()
    }
}

impl<T: Broker + ?Sized> Broker for &mut T {
    fn connect(&mut self, options: &SessionOptions) -> Result<(), DriverError> {
        (**self).connect(options)
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), DriverError> {
        (**self).publish(topic, payload, retain)
    }

    fn disconnect(&mut self) -> Result<(), DriverError> {
        (**self).disconnect()
    }
}

impl<T: Delay + ?Sized> Delay for &mut T {
    fn wait(&mut self, duration: Duration) {
        (**self).wait(duration)
    }
}

impl<T: DeepSleep + ?Sized> DeepSleep for &mut T {
    fn suspend(&mut self, duration: Duration) {
        (**self).suspend(duration)
    }
}

//! Blocking waits over the event stream forwarded by the MQTT helper thread.

use std::{
    sync::mpsc::{Receiver, RecvTimeoutError},
    time::{Duration, Instant},
};

use airnode_common::DriverError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MqttSignal {
    Connected,
    Published(u32),
    Disconnected,
}

/// Blocks until `expected` arrives. A broker-side disconnect, a closed
/// stream, or the timeout ends the wait with an error.
pub fn wait_for(
    events: &Receiver<MqttSignal>,
    waiting_for: &str,
    expected: MqttSignal,
    timeout: Duration,
) -> Result<(), DriverError> {
    let deadline = Instant::now() + timeout;

    loop {
        match events.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(signal) if signal == expected => return Ok(()),
            Ok(MqttSignal::Disconnected) => {
                return Err(DriverError::new(format!(
                    "broker dropped the connection while waiting for {waiting_for}"
                )))
            }
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {
                return Err(DriverError::new(format!("timed out waiting for {waiting_for}")))
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(DriverError::new("mqtt event thread stopped"))
            }
        }
    }
}

/// Blocks until the connection reports it is closed, either with a
/// `Disconnected` event or by the helper thread hanging up.
pub fn wait_closed(events: &Receiver<MqttSignal>, timeout: Duration) -> Result<(), DriverError> {
    let deadline = Instant::now() + timeout;

    loop {
        match events.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(MqttSignal::Disconnected) | Err(RecvTimeoutError::Disconnected) => return Ok(()),
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {
                return Err(DriverError::new("timed out waiting for mqtt disconnect"))
            }
        }
    }
}

//! Wireless link bringup with a two-tier bound: a per-attempt poll budget
//! nested inside a total association budget.
//!
//! Each attempt polls the radio at most `attempt_polls` times, one
//! `poll_interval` apart. An attempt that times out or ends in a retryable
//! rejection is re-issued after one `poll_interval` of backoff, which counts
//! against the new attempt's polls. Re-association stops once `max_retries`
//! have been used, so bringup never waits longer than
//! `radio_settle + poll_interval * attempt_polls * (max_retries + 1)`.

use std::time::Duration;

use log::{info, warn};

use crate::{
    config::CycleConfig,
    drivers::{Delay, LinkStatus, Radio},
    error::{LinkFailure, LinkFailureReason},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BringupPolicy {
    pub poll_interval: Duration,
    pub attempt_polls: u32,
    pub max_retries: u32,
    pub radio_settle: Duration,
}

impl Default for BringupPolicy {
    fn default() -> Self {
        Self::from_config(&CycleConfig::default())
    }
}

impl BringupPolicy {
    pub fn from_config(config: &CycleConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            attempt_polls: config.attempt_polls.max(1),
            max_retries: config.max_retries,
            radio_settle: Duration::from_millis(config.radio_settle_ms),
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.poll_interval * self.attempt_polls
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Upper bound on time spent inside [`connect`].
    pub fn worst_case(&self) -> Duration {
        self.radio_settle + self.attempt_timeout() * self.max_attempts()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BringupState {
    Polling { attempt: u32, polls: u32 },
    Retrying { attempt: u32, last_status: LinkStatus },
    Succeeded { attempts: u32 },
    Failed(LinkFailure),
}

impl BringupState {
    pub fn start() -> Self {
        Self::Polling {
            attempt: 1,
            polls: 0,
        }
    }

    /// Folds one observed link status into the machine. Only meaningful in
    /// `Polling`; every other state is returned unchanged.
    pub fn observe(self, status: LinkStatus, policy: &BringupPolicy) -> Self {
        let Self::Polling { attempt, polls } = self else {
            return self;
        };

        match status {
            LinkStatus::GotIp => Self::Succeeded { attempts: attempt },
            LinkStatus::WrongPassword => Self::Failed(LinkFailure {
                reason: LinkFailureReason::WrongPassword,
                attempts: attempt,
            }),
            LinkStatus::ConnectFail | LinkStatus::NoApFound => {
                Self::retry_or_fail(attempt, status, policy)
            }
            LinkStatus::Idle | LinkStatus::Connecting if polls >= policy.attempt_polls => {
                Self::retry_or_fail(attempt, status, policy)
            }
            LinkStatus::Idle | LinkStatus::Connecting => Self::Polling {
                attempt,
                polls: polls + 1,
            },
        }
    }

    fn retry_or_fail(attempt: u32, last_status: LinkStatus, policy: &BringupPolicy) -> Self {
        if attempt < policy.max_attempts() {
            Self::Retrying {
                attempt,
                last_status,
            }
        } else {
            Self::Failed(LinkFailure {
                reason: LinkFailureReason::RetriesExhausted { last_status },
                attempts: attempt,
            })
        }
    }
}

/// Proof that the link reached `got_ip`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkHandle {
    pub attempts: u32,
}

pub fn connect<R: Radio, D: Delay>(
    radio: &mut R,
    delay: &mut D,
    ssid: &str,
    password: &str,
    policy: &BringupPolicy,
) -> Result<LinkHandle, LinkFailure> {
    let driver_failure = |attempts, err| LinkFailure {
        reason: LinkFailureReason::Driver(err),
        attempts,
    };

    radio.activate().map_err(|err| driver_failure(0, err))?;
    delay.wait(policy.radio_settle);

    info!("wifi connecting to `{ssid}`");
    radio
        .connect(ssid, password)
        .map_err(|err| driver_failure(1, err))?;

    let mut state = BringupState::start();
    loop {
        state = match state {
            BringupState::Polling { .. } => {
                let status = radio.status();
                let next = state.observe(status, policy);
                if let BringupState::Polling { .. } = next {
                    delay.wait(policy.poll_interval);
                }
                next
            }
            BringupState::Retrying {
                attempt,
                last_status,
            } => {
                warn!(
                    "wifi attempt {attempt}/{} ended with status {last_status}; re-associating",
                    policy.max_attempts()
                );
                delay.wait(policy.poll_interval);
                radio
                    .connect(ssid, password)
                    .map_err(|err| driver_failure(attempt + 1, err))?;
                BringupState::Polling {
                    attempt: attempt + 1,
                    polls: 1,
                }
            }
            BringupState::Succeeded { attempts } => {
                info!("wifi connected on attempt {attempts}");
                return Ok(LinkHandle { attempts });
            }
            BringupState::Failed(failure) => return Err(failure),
        };
    }
}

/// Best-effort link teardown; failures are logged and swallowed.
pub fn link_down<R: Radio, D: Delay>(radio: &mut R, delay: &mut D, settle: Duration) {
    if let Err(err) = radio.disconnect() {
        warn!("wifi disconnect failed: {err}");
    }
    delay.wait(settle);
    power_down(radio);
}

pub fn power_down<R: Radio>(radio: &mut R) {
    if let Err(err) = radio.deactivate() {
        warn!("wifi deactivate failed: {err}");
    }
}

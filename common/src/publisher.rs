use log::{debug, warn};

use crate::{
    drivers::Broker,
    error::{MetricFailure, PublishFailure},
    session::Session,
    types::{Metric, SensorReading},
};

/// Publishes one retained value per metric. Every metric is attempted even
/// after a failure; the failures are reported together.
pub fn publish<B: Broker>(
    session: &mut Session<'_, B>,
    reading: &SensorReading,
) -> Result<(), PublishFailure> {
    let mut failed_metrics = Vec::new();

    for metric in Metric::ALL {
        let topic = session.topics().state(metric);
        let payload = reading.render(metric);

        match session.publish(&topic, payload.as_bytes(), true) {
            Ok(()) => debug!("published {payload} to {topic}"),
            Err(error) => {
                warn!("failed to publish {} to {topic}: {error}", metric.as_str());
                failed_metrics.push(MetricFailure { metric, error });
            }
        }
    }

    if failed_metrics.is_empty() {
        Ok(())
    } else {
        Err(PublishFailure { failed_metrics })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{bringup::LinkHandle, config::NodeConfig, testing::RecordingBroker};

    fn config() -> NodeConfig {
        let mut config = NodeConfig::default();
        config.identity.device_id = "shed".to_string();
        config
    }

    fn reading() -> SensorReading {
        SensorReading {
            temperature_c: 18.04,
            humidity_pct: 61.7,
            pressure_hpa: 998.457,
            gas_index: 10.8821,
        }
    }

    fn state_publishes(broker: &RecordingBroker) -> Vec<(String, String, bool)> {
        broker
            .publishes()
            .into_iter()
            .filter(|(topic, _, _)| topic.starts_with("state/"))
            .collect()
    }

    #[test]
    fn publishes_each_metric_retained_with_fixed_precision() {
        let config = config();
        let mut broker = RecordingBroker::default();
        let mut session = Session::open(&mut broker, &config, &LinkHandle { attempts: 1 }).unwrap();

        publish(&mut session, &reading()).unwrap();
        drop(session);

        assert_eq!(
            state_publishes(&broker),
            vec![
                ("state/shed_temp/value".to_string(), "18.0".to_string(), true),
                ("state/shed_humidity/value".to_string(), "62".to_string(), true),
                ("state/shed_pressure/value".to_string(), "998.46".to_string(), true),
                ("state/shed_gas/value".to_string(), "10.9".to_string(), true),
            ]
        );
    }

    #[test]
    fn keeps_going_after_a_failed_metric() {
        let config = config();
        let mut broker = RecordingBroker::failing_topics(&["shed_humidity/value"]);
        let mut session = Session::open(&mut broker, &config, &LinkHandle { attempts: 1 }).unwrap();

        let failure = publish(&mut session, &reading()).unwrap_err();
        drop(session);

        assert_eq!(failure.metrics(), vec![Metric::Humidity]);
        assert_eq!(state_publishes(&broker).len(), 4);
    }

    #[test]
    fn reports_every_failed_metric() {
        let config = config();
        let mut broker = RecordingBroker::failing_topics(&["/value"]);
        let mut session = Session::open(&mut broker, &config, &LinkHandle { attempts: 1 }).unwrap();

        let failure = publish(&mut session, &reading()).unwrap_err();

        assert_eq!(failure.metrics(), Metric::ALL.to_vec());
    }
}

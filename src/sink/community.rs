use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::{
    sen5x::AveragedMeasurement,
    sink::{Sink, SinkError},
};

const SOFTWARE_VERSION: &str = concat!("sen5x-monitor-", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// sensor.community identifies the kind of sensor behind a push by its pin
const PARTICULATE_PIN: &str = "1";
const WEATHER_PIN: &str = "7";

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PushRequest {
    pub software_version: &'static str,
    #[serde(rename = "sensordatavalues")]
    pub sensor_data_values: Vec<PushValue>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PushValue {
    pub value_type: &'static str,
    pub value: String,
}

/// One POST to the push endpoint.
#[derive(Debug, PartialEq, Eq)]
pub struct Submission {
    pub pin: &'static str,
    pub body: PushRequest,
}

/// Builds the pushes for one reading: particulates (P1 = PM10, P2 = PM2.5) and temperature
/// with humidity, each only when the reading carries them.
pub fn submissions(reading: &AveragedMeasurement) -> Vec<Submission> {
    let v = &reading.values;
    let mut submissions = Vec::with_capacity(2);

    if let (Some(pm10_0), Some(pm2_5)) = (v.pm10_0, v.pm2_5) {
        submissions.push(Submission {
            pin: PARTICULATE_PIN,
            body: PushRequest {
                software_version: SOFTWARE_VERSION,
                sensor_data_values: vec![
                    PushValue {
                        value_type: "P1",
                        value: pm10_0.to_string(),
                    },
                    PushValue {
                        value_type: "P2",
                        value: pm2_5.to_string(),
                    },
                ],
            },
        });
    }

    if let (Some(temperature), Some(humidity)) = (v.temperature, v.humidity) {
        submissions.push(Submission {
            pin: WEATHER_PIN,
            body: PushRequest {
                software_version: SOFTWARE_VERSION,
                sensor_data_values: vec![
                    PushValue {
                        value_type: "temperature",
                        value: temperature.to_string(),
                    },
                    PushValue {
                        value_type: "humidity",
                        value: humidity.to_string(),
                    },
                ],
            },
        });
    }

    submissions
}

/// Pushes readings to the sensor.community API.
#[derive(Debug)]
pub struct CommunitySink {
    agent: ureq::Agent,
    endpoint: String,
    node_id: String,
}

impl CommunitySink {
    pub fn new(endpoint: impl Into<String>, node_id: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(SOFTWARE_VERSION)
            .build();

        Self {
            agent,
            endpoint: endpoint.into(),
            node_id: node_id.into(),
        }
    }

    fn submit(&self, submission: &Submission) -> Result<(), SinkError> {
        let result = self
            .agent
            .post(&self.endpoint)
            .set("X-Sensor", &self.node_id)
            .set("X-Pin", submission.pin)
            .send_json(&submission.body);

        match result {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(status, response)) => Err(SinkError::Rejected {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(e)) => Err(SinkError::Http(e.to_string())),
        }
    }
}

impl Sink for CommunitySink {
    fn name(&self) -> &'static str {
        "sensor.community"
    }

    /// A repeated dispatch would post the pins that already went through a second time.
    fn retryable(&self) -> bool {
        false
    }

    /// Sends every submission even if an earlier one failed.
    fn dispatch(&self, _timestamp: i64, reading: &AveragedMeasurement) -> Result<(), SinkError> {
        let failures: Vec<String> = submissions(reading)
            .iter()
            .filter_map(|s| match self.submit(s) {
                Ok(()) => {
                    debug!(pin = s.pin, "pushed to sensor.community");
                    None
                }
                Err(e) => Some(format!("pin {}: {e}", s.pin)),
            })
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(SinkError::Http(failures.join("; ")))
        }
    }
}

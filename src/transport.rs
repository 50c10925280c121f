use std::sync::Mutex;

use serde_json::Value;
use tracing::{debug, trace};

use crate::config::Config;
use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol;
use crate::types::SetpointPair;
use crate::{Error, Result};

/// The two logical device sessions (message bus + endpoint) and the four
/// primitive operations against them. Every method takes `&self`: a long poll
/// may be outstanding while a write is issued from another task.
#[derive(Debug)]
pub struct Session {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    logger: Option<Mutex<MessageLogger>>,
}

impl Session {
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(Error::Transport)?;

        let logger = match &config.message_log {
            Some(path) => {
                let mode = if config.message_log_diffed {
                    MessageLogMode::Diffed
                } else {
                    MessageLogMode::Full
                };
                Some(Mutex::new(MessageLogger::new(mode, path)?))
            }
            None => None,
        };

        Ok(Self {
            http,
            base_url: config.base_url(),
            app_id: config.app_id.clone(),
            logger,
        })
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Open/refresh the message-bus session. Idempotent on the device side.
    pub async fn connect(&self) -> Result<()> {
        let path = format!("/Messages/{}/Connect", self.app_id);
        debug!(path = %path, "opening message-bus session");
        self.log_request("POST", &path, None);
        self.http
            .post(format!("{}{}", self.base_url, path))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Open/refresh the endpoint session. Idempotent on the device side.
    pub async fn connect_endpoint(&self) -> Result<()> {
        let path = format!("/Endpoints/{}/Connect", self.app_id);
        debug!(path = %path, "opening endpoint session");
        self.log_request("POST", &path, None);
        self.http
            .post(format!("{}{}", self.base_url, path))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Send a command envelope. `path_hint` is the device-side routing hint.
    pub async fn publish(&self, path_hint: &str, data: Value) -> Result<()> {
        let msg = protocol::command_message(&self.app_id, path_hint, data);
        self.log_request("POST", "/Messages/Publish", Some(&msg));
        self.http
            .post(format!("{}/Messages/Publish", self.base_url))
            .json(&msg)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Ask the device to emit current state for `paths` as future telemetry.
    /// The data arrives later through retrieve, not in this response.
    pub async fn request_data(&self, paths: &[&str]) -> Result<()> {
        let msg = protocol::request_data_message(&self.app_id, paths);
        self.log_request("POST", "/Messages/RequestData", Some(&msg));
        self.http
            .post(format!("{}/Messages/RequestData", self.base_url))
            .json(&msg)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// One long-poll call. Blocks server-side up to `timeout_secs` waiting
    /// for at least one message; no-content responses yield an empty list.
    pub async fn retrieve(&self, max_count: u32, timeout_secs: u64) -> Result<Vec<Value>> {
        let url = format!(
            "{}/Messages/{}/Retrieve?Direction=Oldest-to-Newest&MessageCount={}&StartTime=1&LongPollingTimeout={}",
            self.base_url, self.app_id, max_count, timeout_secs
        );
        let resp = self.http.get(&url).send().await?;

        if resp.status().as_u16() == 204 {
            trace!("retrieve: no pending messages");
            self.log_poll(204, &Value::Null);
            return Ok(vec![]);
        }

        let resp = resp.error_for_status()?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;

        if self.logger.is_some() {
            let body_json = serde_json::from_str(&body).unwrap_or(Value::Null);
            self.log_poll(status, &body_json);
        }

        Ok(protocol::parse_retrieve_response(&body))
    }

    /// Replace one period's setpoint fields within one schedule.
    pub async fn write_schedule_period(
        &self,
        schedule_id: u32,
        period_id: u32,
        pair: &SetpointPair,
    ) -> Result<()> {
        debug!(
            schedule_id,
            period_id,
            heat = pair.heat,
            cool = pair.cool,
            "writing schedule period"
        );
        let data = protocol::period_write_data(schedule_id, period_id, pair);
        self.publish(protocol::SCHEDULES_PATH, data).await
    }

    fn log_request(&self, method: &str, path: &str, body: Option<&Value>) {
        if let Some(logger) = &self.logger
            && let Ok(mut logger) = logger.lock()
        {
            logger.log_request(method, path, body);
        }
    }

    fn log_poll(&self, status: u16, body: &Value) {
        if let Some(logger) = &self.logger
            && let Ok(mut logger) = logger.lock()
        {
            logger.log_poll(status, body);
        }
    }
}

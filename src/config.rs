use std::time::Duration;

use crate::{Error, Result};

pub const DEFAULT_APP_ID: &str = "s30_sync";
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_MAX_MESSAGES: u32 = 10;

/// Schedule-id block the device reserves for temporary holds; zone N's hold
/// schedule defaults to `base + N` until telemetry says otherwise.
pub const DEFAULT_HOLD_SCHEDULE_BASE: u32 = 32;

/// Startup configuration. `host` and a non-empty `zones` list are required;
/// everything else has a working default.
#[derive(Debug, Clone)]
pub struct Config {
    /// Device host or address, e.g. "192.168.1.30".
    pub host: String,
    /// "https" (device default, self-signed cert) or "http".
    pub protocol: String,
    /// Client/session identifier sent as SenderID and used in session URLs.
    pub app_id: String,
    /// Verify the device TLS certificate. Off by default; production units
    /// ship self-signed certs.
    pub verify_tls: bool,
    /// Server-side long-poll duration for retrieve calls.
    pub poll_timeout: Duration,
    /// Upper bound on messages returned by one retrieve call.
    pub max_messages: u32,
    /// Zone ids managed by this instance.
    pub zones: Vec<u8>,
    /// Base of the hold-schedule id block.
    pub hold_schedule_base: u32,
    /// NDJSON wire-message log path. None disables body logging.
    pub message_log: Option<String>,
    /// Log only changed paths of poll bodies instead of full bodies.
    pub message_log_diffed: bool,
}

impl Config {
    pub fn new(host: impl Into<String>, zones: Vec<u8>) -> Self {
        Self {
            host: host.into(),
            protocol: "https".to_string(),
            app_id: DEFAULT_APP_ID.to_string(),
            verify_tls: false,
            poll_timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
            max_messages: DEFAULT_MAX_MESSAGES,
            zones,
            hold_schedule_base: DEFAULT_HOLD_SCHEDULE_BASE,
            message_log: None,
            message_log_diffed: false,
        }
    }

    /// Load from `S30_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let host = match std::env::var("S30_HOST") {
            Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => return Err(Error::Config("S30_HOST is required".to_string())),
        };

        let zones = match std::env::var("S30_ZONES") {
            Ok(v) => parse_zone_list(&v)?,
            Err(_) => return Err(Error::Config("S30_ZONES is required".to_string())),
        };

        let mut config = Config::new(host, zones);

        if let Ok(v) = std::env::var("S30_PROTOCOL") {
            config.protocol = v;
        }
        if let Ok(v) = std::env::var("S30_APP_ID")
            && !v.trim().is_empty()
        {
            config.app_id = v.trim().to_string();
        }
        if let Ok(v) = std::env::var("S30_VERIFY_TLS") {
            config.verify_tls = matches!(v.as_str(), "1" | "true" | "TRUE");
        }
        if let Ok(v) = std::env::var("S30_POLL_TIMEOUT_SECS") {
            let secs: u64 = v
                .parse()
                .map_err(|_| Error::Config(format!("S30_POLL_TIMEOUT_SECS not a number: {v}")))?;
            config.poll_timeout = Duration::from_secs(secs);
        }
        if let Ok(v) = std::env::var("S30_MAX_MESSAGES") {
            config.max_messages = v
                .parse()
                .map_err(|_| Error::Config(format!("S30_MAX_MESSAGES not a number: {v}")))?;
        }
        if let Ok(v) = std::env::var("S30_HOLD_SCHEDULE_BASE") {
            config.hold_schedule_base = v
                .parse()
                .map_err(|_| Error::Config(format!("S30_HOLD_SCHEDULE_BASE not a number: {v}")))?;
        }
        if let Ok(v) = std::env::var("S30_MESSAGE_LOG")
            && !v.trim().is_empty()
        {
            config.message_log = Some(v);
        }
        if let Ok(v) = std::env::var("S30_MESSAGE_LOG_DIFFED") {
            config.message_log_diffed = matches!(v.as_str(), "1" | "true" | "TRUE");
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("device host must not be empty".to_string()));
        }
        if self.zones.is_empty() {
            return Err(Error::Config(
                "at least one zone id must be configured".to_string(),
            ));
        }
        if self.protocol != "http" && self.protocol != "https" {
            return Err(Error::Config(format!(
                "protocol must be http or https, got {}",
                self.protocol
            )));
        }
        Ok(())
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.host)
    }
}

fn parse_zone_list(raw: &str) -> Result<Vec<u8>> {
    let zones: Vec<u8> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u8>()
                .map_err(|_| Error::Config(format!("bad zone id in S30_ZONES: {s}")))
        })
        .collect::<Result<_>>()?;
    if zones.is_empty() {
        return Err(Error::Config("S30_ZONES must list at least one zone".to_string()));
    }
    Ok(zones)
}

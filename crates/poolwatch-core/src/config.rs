//! Agent configuration.
//!
//! Options can come from an agent argument string
//! (`url=http://collector:8080/api/v1/pools/upload,interval=10,port=9999`)
//! or from a TOML file with an `[agent]` table. Every option is optional
//! and independent; anything absent falls back to its default.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use http::Uri;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::{DEFAULT_CONTROL_PORT, SourceInfo, UPLOAD_PATH};

/// Default collector ingest URL.
pub const DEFAULT_INGEST_URL: &str = "http://127.0.0.1:8080/api/v1/pools/upload";

/// Default report interval.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Default number of control requests handled at once.
pub const DEFAULT_CONTROL_CONCURRENCY: usize = 16;

const DEFAULT_APPLICATION: &str = "unknown-app";

/// Errors raised while loading or validating agent configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid ingest url {url:?}: {reason}")]
    IngestUrl { url: String, reason: String },

    #[error("report interval must be greater than zero")]
    ZeroInterval,

    #[error("control concurrency must be greater than zero")]
    ZeroConcurrency,
}

/// Runtime configuration of an embedded agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Collector endpoint that receives snapshot batches.
    pub ingest_url: String,
    /// Time between reporting cycles.
    pub report_interval: Duration,
    /// Port of the local control endpoint.
    pub control_port: u16,
    /// Address the control endpoint binds to.
    pub control_bind: IpAddr,
    /// Control requests handled at once; further requests wait.
    pub control_concurrency: usize,
    /// Application name stamped on every snapshot.
    pub application: String,
    /// Host name stamped on every snapshot. The collector dials this
    /// host to reach the control endpoint.
    pub host: String,
    /// Upper bound on one push. Never longer than the report interval.
    pub push_timeout: Option<Duration>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            ingest_url: DEFAULT_INGEST_URL.to_string(),
            report_interval: DEFAULT_REPORT_INTERVAL,
            control_port: DEFAULT_CONTROL_PORT,
            control_bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            control_concurrency: DEFAULT_CONTROL_CONCURRENCY,
            application: DEFAULT_APPLICATION.to_string(),
            host: local_hostname(),
            push_timeout: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    agent: AgentSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AgentSection {
    ingest_url: Option<String>,
    report_interval_secs: Option<u64>,
    control_port: Option<u16>,
    control_bind: Option<IpAddr>,
    control_concurrency: Option<usize>,
    application: Option<String>,
    host: Option<String>,
    push_timeout_ms: Option<u64>,
}

impl AgentConfig {
    /// Parse an agent argument string of comma-separated `key=value` pairs.
    ///
    /// Recognized keys: `url`, `interval`, `port`, `app`, `host`. Unknown
    /// keys are ignored; unparsable numbers are logged and left at their
    /// defaults.
    pub fn from_args(args: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for param in args.split(',') {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            if value.is_empty() {
                continue;
            }

            match key {
                "url" => config.ingest_url = value.to_string(),
                "interval" => match value.parse::<u64>() {
                    Ok(secs) if secs > 0 => config.report_interval = Duration::from_secs(secs),
                    _ => warn!(
                        %value,
                        default = config.report_interval.as_secs(),
                        "invalid interval, using default"
                    ),
                },
                "port" => match value.parse::<u16>() {
                    Ok(port) => config.control_port = port,
                    Err(_) => warn!(
                        %value,
                        default = config.control_port,
                        "invalid port, using default"
                    ),
                },
                "app" => config.application = value.to_string(),
                "host" => config.host = value.to_string(),
                _ => {}
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document with an optional `[agent]` table.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        let section = file.agent;
        let mut config = Self::default();

        if let Some(url) = section.ingest_url {
            config.ingest_url = url;
        }
        if let Some(secs) = section.report_interval_secs {
            config.report_interval = Duration::from_secs(secs);
        }
        if let Some(port) = section.control_port {
            config.control_port = port;
        }
        if let Some(bind) = section.control_bind {
            config.control_bind = bind;
        }
        if let Some(limit) = section.control_concurrency {
            config.control_concurrency = limit;
        }
        if let Some(app) = section.application {
            config.application = app;
        }
        if let Some(host) = section.host {
            config.host = host;
        }
        config.push_timeout = section.push_timeout_ms.map(Duration::from_millis);

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check the options that cannot fall back to a default silently.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.report_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.control_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        self.ingest_uri()?;
        Ok(())
    }

    /// The ingest URL as an `http://` URI with an authority.
    pub fn ingest_uri(&self) -> Result<Uri, ConfigError> {
        let invalid = |reason: &str| ConfigError::IngestUrl {
            url: self.ingest_url.clone(),
            reason: reason.to_string(),
        };

        let uri: Uri = self
            .ingest_url
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;

        if uri.scheme_str() != Some("http") {
            return Err(invalid("only http:// is supported"));
        }
        if uri.authority().is_none() {
            return Err(invalid("missing host"));
        }
        Ok(uri)
    }

    /// Effective push timeout, capped at one report interval.
    pub fn push_timeout(&self) -> Duration {
        self.push_timeout
            .map_or(self.report_interval, |t| t.min(self.report_interval))
    }

    pub fn source(&self) -> SourceInfo {
        SourceInfo::new(self.host.clone(), self.application.clone())
    }
}

/// Build an ingest URL for a collector reachable at `authority`.
pub fn ingest_url_for(authority: &str) -> String {
    format!("http://{authority}{UPLOAD_PATH}")
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

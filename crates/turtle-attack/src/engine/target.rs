use crate::error::{AttackError, Result};
use crate::telemetry::{EventHandler, NoopHandler};
use hyper::Uri;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use turtle_common::TargetConfig;

pub const DEFAULT_DURATION: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECTIONS: usize = 100;

/// The server under test and the budget of the attack.
///
/// Shared read-only by every worker once an attack starts.
#[derive(Clone)]
pub struct Target {
    pub url: Uri,
    /// How long the attack runs. Zero resolves to 30s.
    pub duration: Duration,
    /// Connections held concurrently. Zero resolves to 100.
    pub connections: usize,
    /// Sink for attack events.
    pub events: Arc<dyn EventHandler>,
}

impl Target {
    pub fn new(url: Uri) -> Self {
        Self {
            url,
            duration: Duration::ZERO,
            connections: 0,
            events: Arc::new(NoopHandler),
        }
    }

    pub fn from_config(config: &TargetConfig) -> Result<Self> {
        let url = config
            .url
            .parse::<Uri>()
            .map_err(|e| AttackError::InvalidTarget(format!("{}: {}", config.url, e)))?;

        Ok(Self::new(url)
            .with_duration(Duration::from_millis(config.duration_ms))
            .with_connections(config.connections))
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_connections(mut self, connections: usize) -> Self {
        self.connections = connections;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventHandler>) -> Self {
        self.events = events;
        self
    }

    pub(crate) fn resolve_defaults(&mut self) {
        if self.duration.is_zero() {
            self.duration = DEFAULT_DURATION;
        }
        if self.connections < 1 {
            self.connections = DEFAULT_CONNECTIONS;
        }
    }

    /// `host:port` to dial, with the scheme's default port filled in.
    pub fn dial_addr(&self) -> Result<String> {
        let host = self
            .url
            .host()
            .ok_or_else(|| AttackError::InvalidTarget(format!("{}: missing host", self.url)))?;
        let port = match self.url.port_u16() {
            Some(port) => port,
            None if self.url.scheme_str() == Some("https") => 443,
            None => 80,
        };
        Ok(format!("{}:{}", host, port))
    }

    /// Value for the `Host` header: the authority as written in the url.
    pub fn host_header(&self) -> &str {
        self.url.authority().map(|a| a.as_str()).unwrap_or("")
    }

    /// Request target for the start line; `/` when the url has no path.
    pub fn request_path(&self) -> &str {
        match self.url.path_and_query().map(|p| p.as_str()) {
            Some(p) if !p.is_empty() => p,
            _ => "/",
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("url", &self.url)
            .field("duration", &self.duration)
            .field("connections", &self.connections)
            .finish_non_exhaustive()
    }
}

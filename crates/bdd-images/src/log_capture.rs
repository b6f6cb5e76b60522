//! Per-scenario log capture.
//!
//! A single [`CaptureLayer`] sits in the host's `tracing` subscriber for the
//! whole run. Scenarios attach a [`LogCapture`] buffer to the layer's
//! [`CaptureSinks`] when they start and detach the same buffer when they
//! end; every event recorded in between is appended to the buffer as
//! `LEVEL target: message`.
//!
//! ```rust,ignore
//! use tracing_subscriber::prelude::*;
//!
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer())
//!     .with(bdd_images::CaptureLayer::global())
//!     .init();
//! ```

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Events from this crate are never captured, they would end up as captions.
const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");

fn is_own_target(target: &str) -> bool {
    target
        .strip_prefix(OWN_TARGET)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

static NEXT_CAPTURE_ID: AtomicU64 = AtomicU64::new(1);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Append-only text buffer owned by one scenario
#[derive(Debug, Clone)]
pub struct LogCapture {
    id: u64,
    buffer: Arc<Mutex<String>>,
    closed: Arc<AtomicBool>,
}

impl Default for LogCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl LogCapture {
    /// Create an empty, open buffer
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_CAPTURE_ID.fetch_add(1, Ordering::Relaxed),
            buffer: Arc::new(Mutex::new(String::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Unique id, used to detach exactly this buffer
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Append text. Ignored once the buffer is closed.
    pub fn append(&self, text: &str) {
        if !self.is_closed() {
            lock(&self.buffer).push_str(text);
        }
    }

    /// Current contents
    #[must_use]
    pub fn contents(&self) -> String {
        lock(&self.buffer).clone()
    }

    /// Take all buffered lines (line endings kept) and empty the buffer
    pub fn drain_lines(&self) -> Vec<String> {
        let text = std::mem::take(&mut *lock(&self.buffer));
        text.split_inclusive('\n').map(str::to_string).collect()
    }

    /// Discard buffered content
    pub fn truncate(&self) {
        lock(&self.buffer).clear();
    }

    /// Stop accepting text
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether the buffer was closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Set of buffers currently receiving log events
#[derive(Debug, Clone, Default)]
pub struct CaptureSinks {
    active: Arc<Mutex<Vec<LogCapture>>>,
}

impl CaptureSinks {
    /// Create an empty, independent sink set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide sink set used by [`CaptureLayer::global`]
    #[must_use]
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<CaptureSinks> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// Start routing events to `capture`
    pub fn attach(&self, capture: &LogCapture) {
        let mut active = lock(&self.active);
        if !active.iter().any(|c| c.id == capture.id) {
            active.push(capture.clone());
        }
    }

    /// Stop routing events to the capture with this id.
    ///
    /// Returns `false` if it was not attached.
    pub fn detach(&self, id: u64) -> bool {
        let mut active = lock(&self.active);
        let before = active.len();
        active.retain(|c| c.id != id);
        active.len() != before
    }

    /// Attach and return a guard that detaches and closes on drop
    #[must_use]
    pub fn scoped(&self, capture: &LogCapture) -> CaptureGuard {
        self.attach(capture);
        CaptureGuard {
            sinks: self.clone(),
            capture: capture.clone(),
        }
    }

    /// Guard for a capture attached earlier, e.g. in another hook
    #[must_use]
    pub fn release_on_drop(&self, capture: &LogCapture) -> CaptureGuard {
        CaptureGuard {
            sinks: self.clone(),
            capture: capture.clone(),
        }
    }

    /// Whether the capture with this id is attached
    #[must_use]
    pub fn is_attached(&self, id: u64) -> bool {
        lock(&self.active).iter().any(|c| c.id == id)
    }

    /// Number of attached buffers
    #[must_use]
    pub fn active_count(&self) -> usize {
        lock(&self.active).len()
    }

    /// Append a formatted line to every attached buffer
    pub fn write(&self, line: &str) {
        for capture in lock(&self.active).iter() {
            capture.append(line);
        }
    }
}

/// Detaches and closes a [`LogCapture`] when dropped
#[derive(Debug)]
pub struct CaptureGuard {
    sinks: CaptureSinks,
    capture: LogCapture,
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        let _ = self.sinks.detach(self.capture.id());
        self.capture.close();
    }
}

struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// `tracing` layer feeding [`CaptureSinks`]
#[derive(Debug, Clone)]
pub struct CaptureLayer {
    sinks: CaptureSinks,
}

impl CaptureLayer {
    /// Layer feeding the given sinks
    #[must_use]
    pub const fn new(sinks: CaptureSinks) -> Self {
        Self { sinks }
    }

    /// Layer feeding [`CaptureSinks::global`]
    #[must_use]
    pub fn global() -> Self {
        Self::new(CaptureSinks::global().clone())
    }
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_own_target(metadata.target()) || self.sinks.active_count() == 0 {
            return;
        }

        let mut visitor = MessageVisitor {
            message: String::new(),
            fields: String::new(),
        };
        event.record(&mut visitor);

        let line = format!(
            "{} {}: {}{}\n",
            metadata.level(),
            metadata.target(),
            visitor.message,
            visitor.fields
        );
        self.sinks.write(&line);
    }
}

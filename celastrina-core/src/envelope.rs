use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;

use crate::error::CelastrinaError;

/// Log severities exposed by the host envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Verbose,
    Info,
    Warn,
    Error,
}

/// Terminal outcome of one invocation, handed to [`Envelope::done`].
#[derive(Debug)]
pub enum Completion {
    /// Completed with no result (also used for drop-marked errors).
    Empty,
    /// Completed successfully with a result value.
    Result(serde_json::Value),
    /// Completed with an error surfaced to the host.
    Error(CelastrinaError),
}

/// The host-provided per-invocation object.
///
/// The serverless host dispatches each invocation with an envelope exposing
/// the invocation id, named input/output binding slots, a severity-levelled
/// logger, optional trace context, and a completion sink. The framework
/// consumes it abstractly; adapters for concrete hosts implement this trait.
///
/// `done` is called exactly once per invocation by the lifecycle runner.
pub trait Envelope: Send + Sync {
    /// Host-assigned invocation id.
    fn invocation_id(&self) -> &str;

    /// W3C `traceparent` from the host trace context, if present.
    fn traceparent(&self) -> Option<&str> {
        None
    }

    /// Host-imposed deadline for the invocation, if any. The lifecycle
    /// aborts the remaining stages with a transient error once it passes.
    fn deadline(&self) -> Option<std::time::Instant> {
        None
    }

    /// Read a named binding slot.
    fn binding(&self, name: &str) -> Option<serde_json::Value>;

    /// Write a named binding slot.
    fn set_binding(&self, name: &str, value: serde_json::Value);

    /// Emit a log line through the host logger.
    fn log(&self, level: LogLevel, message: &str);

    /// Complete the invocation.
    fn done(&self, completion: Completion);
}

/// In-memory envelope for development and testing.
///
/// Records bindings, log lines, and the completion so tests can assert on
/// them; log output is mirrored to `tracing`.
pub struct LocalEnvelope {
    invocation_id: String,
    traceparent: Option<String>,
    deadline: Option<std::time::Instant>,
    bindings: DashMap<String, serde_json::Value>,
    logs: Mutex<Vec<(LogLevel, String)>>,
    completion: Mutex<Option<Completion>>,
    done_calls: AtomicUsize,
}

impl LocalEnvelope {
    pub fn new() -> Self {
        Self {
            invocation_id: uuid::Uuid::new_v4().to_string(),
            traceparent: None,
            deadline: None,
            bindings: DashMap::new(),
            logs: Mutex::new(Vec::new()),
            completion: Mutex::new(None),
            done_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_traceparent(mut self, traceparent: impl Into<String>) -> Self {
        self.traceparent = Some(traceparent.into());
        self
    }

    pub fn with_deadline_in(mut self, remaining: std::time::Duration) -> Self {
        self.deadline = Some(std::time::Instant::now() + remaining);
        self
    }

    pub fn with_binding(self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.bindings.insert(name.into(), value);
        self
    }

    /// Number of times `done` has been invoked.
    pub fn done_calls(&self) -> usize {
        self.done_calls.load(Ordering::SeqCst)
    }

    /// Whether the invocation has completed.
    pub fn completed(&self) -> bool {
        self.done_calls() > 0
    }

    /// The recorded result value, if the invocation completed with one.
    pub fn result(&self) -> Option<serde_json::Value> {
        match &*self.completion.lock().unwrap_or_else(|e| e.into_inner()) {
            Some(Completion::Result(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// The recorded error message, if the invocation completed with an error.
    pub fn error_message(&self) -> Option<String> {
        match &*self.completion.lock().unwrap_or_else(|e| e.into_inner()) {
            Some(Completion::Error(err)) => Some(err.to_string()),
            _ => None,
        }
    }

    /// The recorded error code, if the invocation completed with an error.
    pub fn error_code(&self) -> Option<u16> {
        match &*self.completion.lock().unwrap_or_else(|e| e.into_inner()) {
            Some(Completion::Error(err)) => Some(err.code()),
            _ => None,
        }
    }

    /// Recorded log lines at the given level.
    pub fn logged(&self, level: LogLevel) -> Vec<String> {
        self.logs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl Default for LocalEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

impl Envelope for LocalEnvelope {
    fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    fn traceparent(&self) -> Option<&str> {
        self.traceparent.as_deref()
    }

    fn deadline(&self) -> Option<std::time::Instant> {
        self.deadline
    }

    fn binding(&self, name: &str) -> Option<serde_json::Value> {
        self.bindings.get(name).map(|entry| entry.value().clone())
    }

    fn set_binding(&self, name: &str, value: serde_json::Value) {
        self.bindings.insert(name.to_string(), value);
    }

    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(invocation = %self.invocation_id, "{message}"),
            LogLevel::Verbose => tracing::debug!(invocation = %self.invocation_id, "{message}"),
            LogLevel::Info => tracing::info!(invocation = %self.invocation_id, "{message}"),
            LogLevel::Warn => tracing::warn!(invocation = %self.invocation_id, "{message}"),
            LogLevel::Error => tracing::error!(invocation = %self.invocation_id, "{message}"),
        }
        self.logs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((level, message.to_string()));
    }

    fn done(&self, completion: Completion) {
        let calls = self.done_calls.fetch_add(1, Ordering::SeqCst);
        if calls > 0 {
            tracing::warn!(
                invocation = %self.invocation_id,
                "done called more than once, keeping the first completion"
            );
            return;
        }
        *self.completion.lock().unwrap_or_else(|e| e.into_inner()) = Some(completion);
    }
}

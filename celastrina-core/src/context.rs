use std::collections::HashMap;
use std::sync::Arc;

use crate::configuration::Configuration;
use crate::envelope::{Envelope, LogLevel};
use crate::error::CelastrinaError;
use crate::subject::Subject;

/// The default protected action.
pub const DEFAULT_ACTION: &str = "process";

/// Request-scoped state for one invocation.
///
/// Owns the generated request id, the declared action, the authenticated
/// subject, a free-form session map, and a result slot, and borrows the
/// process-scoped [`Configuration`] plus the host envelope for the duration
/// of the request. A context lives on a single worker; it is never shared
/// across invocations.
pub struct Context {
    request_id: String,
    trace_id: Option<String>,
    monitor: bool,
    action: String,
    subject: Option<Subject>,
    session: HashMap<String, serde_json::Value>,
    result: Option<serde_json::Value>,
    configuration: Arc<Configuration>,
    envelope: Arc<dyn Envelope>,
}

impl Context {
    pub fn new(configuration: Arc<Configuration>, envelope: Arc<dyn Envelope>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            trace_id: envelope.traceparent().map(str::to_string),
            monitor: false,
            action: DEFAULT_ACTION.to_string(),
            subject: None,
            session: HashMap::new(),
            result: None,
            configuration,
            envelope,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn invocation_id(&self) -> &str {
        self.envelope.invocation_id()
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn monitor(&self) -> bool {
        self.monitor
    }

    pub fn set_monitor(&mut self, monitor: bool) {
        self.monitor = monitor;
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Declare the protected action for this request. Trimmed and
    /// lowercased; an empty action fails validation.
    pub fn set_action(&mut self, action: &str) -> Result<(), CelastrinaError> {
        let action = action.trim().to_lowercase();
        if action.is_empty() {
            return Err(CelastrinaError::validation(
                "action must not be empty",
                "action",
            ));
        }
        self.action = action;
        Ok(())
    }

    pub fn subject(&self) -> Option<&Subject> {
        self.subject.as_ref()
    }

    /// Attach the authenticated subject. Set once by the sentry.
    pub fn set_subject(&mut self, subject: Subject) {
        self.subject = Some(subject);
    }

    pub fn session_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.session.get(key)
    }

    pub fn set_session_value(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.session.insert(key.into(), value);
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref()
    }

    /// Stage the value handed to the envelope's completion on success.
    pub fn set_result(&mut self, result: serde_json::Value) {
        self.result = Some(result);
    }

    pub(crate) fn take_result(&mut self) -> Option<serde_json::Value> {
        self.result.take()
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    pub fn envelope(&self) -> &Arc<dyn Envelope> {
        &self.envelope
    }

    pub fn binding(&self, name: &str) -> Option<serde_json::Value> {
        self.envelope.binding(name)
    }

    pub fn set_binding(&self, name: &str, value: serde_json::Value) {
        self.envelope.set_binding(name, value);
    }

    /// Emit a log line through the envelope logger, tagged with the
    /// request id.
    pub fn log(&self, level: LogLevel, message: &str) {
        self.envelope
            .log(level, &format!("[{}] {message}", self.request_id));
    }
}

use std::error::Error;

/// Framework error covering every failure the runtime surfaces.
///
/// Each variant carries a message, a `drop` flag, and (where useful) an
/// upstream cause. `drop = true` instructs the lifecycle to complete the
/// invocation silently instead of handing the error to the host envelope.
pub enum CelastrinaError {
    /// Malformed configuration, missing property, unknown attribute kind,
    /// unresolved add-on dependency. Fatal for the invocation.
    Configuration {
        message: String,
        code: u16,
        drop: bool,
        cause: Option<Box<dyn Error + Send + Sync>>,
    },
    /// Bad argument shape at an API boundary. `tag` names the offending field.
    Validation {
        message: String,
        tag: String,
        drop: bool,
    },
    /// Authentication could not produce a subject, or a required
    /// authenticator failed.
    Auth {
        message: String,
        code: u16,
        drop: bool,
        cause: Option<Box<dyn Error + Send + Sync>>,
    },
    /// Authorization denied.
    Access { message: String, drop: bool },
    /// A required remote lookup returned not-found.
    NotFound { message: String, drop: bool },
    /// Upstream timeout or network failure; retryable at the caller's
    /// discretion.
    Transient {
        message: String,
        code: u16,
        drop: bool,
        cause: Option<Box<dyn Error + Send + Sync>>,
    },
}

impl CelastrinaError {
    pub fn configuration(message: impl Into<String>) -> Self {
        CelastrinaError::Configuration {
            message: message.into(),
            code: 500,
            drop: false,
            cause: None,
        }
    }

    pub fn validation(message: impl Into<String>, tag: impl Into<String>) -> Self {
        CelastrinaError::Validation {
            message: message.into(),
            tag: tag.into(),
            drop: false,
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        CelastrinaError::Auth {
            message: message.into(),
            code: 401,
            drop: false,
            cause: None,
        }
    }

    pub fn access(message: impl Into<String>) -> Self {
        CelastrinaError::Access {
            message: message.into(),
            drop: false,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        CelastrinaError::NotFound {
            message: message.into(),
            drop: false,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        CelastrinaError::Transient {
            message: message.into(),
            code: 503,
            drop: false,
            cause: None,
        }
    }

    /// Override the numeric code (e.g. carry an upstream HTTP status).
    ///
    /// Only `Configuration`, `Auth`, and `Transient` carry a mutable code;
    /// the call is a no-op on the other variants.
    pub fn with_code(mut self, new_code: u16) -> Self {
        match &mut self {
            CelastrinaError::Configuration { code, .. }
            | CelastrinaError::Auth { code, .. }
            | CelastrinaError::Transient { code, .. } => *code = new_code,
            _ => {}
        }
        self
    }

    pub fn with_drop(mut self, drop: bool) -> Self {
        match &mut self {
            CelastrinaError::Configuration { drop: d, .. }
            | CelastrinaError::Validation { drop: d, .. }
            | CelastrinaError::Auth { drop: d, .. }
            | CelastrinaError::Access { drop: d, .. }
            | CelastrinaError::NotFound { drop: d, .. }
            | CelastrinaError::Transient { drop: d, .. } => *d = drop,
        }
        self
    }

    pub fn with_cause(mut self, err: impl Error + Send + Sync + 'static) -> Self {
        match &mut self {
            CelastrinaError::Configuration { cause, .. }
            | CelastrinaError::Auth { cause, .. }
            | CelastrinaError::Transient { cause, .. } => *cause = Some(Box::new(err)),
            _ => {}
        }
        self
    }

    /// Effective numeric code for the error.
    pub fn code(&self) -> u16 {
        match self {
            CelastrinaError::Configuration { code, .. } => *code,
            CelastrinaError::Validation { .. } => 400,
            CelastrinaError::Auth { code, .. } => *code,
            CelastrinaError::Access { .. } => 403,
            CelastrinaError::NotFound { .. } => 404,
            CelastrinaError::Transient { code, .. } => *code,
        }
    }

    /// Whether the invocation must complete silently on this error.
    pub fn is_drop(&self) -> bool {
        match self {
            CelastrinaError::Configuration { drop, .. }
            | CelastrinaError::Validation { drop, .. }
            | CelastrinaError::Auth { drop, .. }
            | CelastrinaError::Access { drop, .. }
            | CelastrinaError::NotFound { drop, .. }
            | CelastrinaError::Transient { drop, .. } => *drop,
        }
    }

    /// The field tag for validation errors.
    pub fn tag(&self) -> Option<&str> {
        match self {
            CelastrinaError::Validation { tag, .. } => Some(tag.as_str()),
            _ => None,
        }
    }
}

impl std::fmt::Display for CelastrinaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CelastrinaError::Configuration { message, .. } => {
                write!(f, "Configuration error: {message}")
            }
            CelastrinaError::Validation { message, tag, .. } => {
                write!(f, "Validation error [{tag}]: {message}")
            }
            CelastrinaError::Auth { message, code, .. } => {
                write!(f, "Authentication error ({code}): {message}")
            }
            CelastrinaError::Access { message, .. } => write!(f, "Access denied: {message}"),
            CelastrinaError::NotFound { message, .. } => write!(f, "Not found: {message}"),
            CelastrinaError::Transient { message, code, .. } => {
                write!(f, "Transient error ({code}): {message}")
            }
        }
    }
}

impl std::fmt::Debug for CelastrinaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl Error for CelastrinaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CelastrinaError::Configuration { cause, .. }
            | CelastrinaError::Auth { cause, .. }
            | CelastrinaError::Transient { cause, .. } => {
                cause.as_ref().map(|c| c.as_ref() as &(dyn Error + 'static))
            }
            _ => None,
        }
    }
}

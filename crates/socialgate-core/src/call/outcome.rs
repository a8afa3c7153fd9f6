use crate::api::ApiError;

/// What a screen gets back from [`CallWrapper`](super::CallWrapper).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome<T> {
    Ok(T),
    /// Authentication could not be recovered; the session has been cleared.
    Unauthorized,
    ServerError { status: u16, message: String },
    ClientError(String),
    /// Another call was already in flight on the same wrapper.
    Rejected,
}

impl<T> CallOutcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, CallOutcome::Ok(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            CallOutcome::Ok(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallOutcome<U> {
        match self {
            CallOutcome::Ok(value) => CallOutcome::Ok(f(value)),
            CallOutcome::Unauthorized => CallOutcome::Unauthorized,
            CallOutcome::ServerError { status, message } => CallOutcome::ServerError { status, message },
            CallOutcome::ClientError(message) => CallOutcome::ClientError(message),
            CallOutcome::Rejected => CallOutcome::Rejected,
        }
    }

    /// Text for an error alert, if this outcome warrants one.
    pub fn user_message(&self) -> Option<String> {
        match self {
            CallOutcome::Ok(_) | CallOutcome::Rejected => None,
            CallOutcome::Unauthorized => Some("Session expired. Please log in again.".to_string()),
            CallOutcome::ServerError { message, .. } => Some(format!("Server error: {}", message)),
            CallOutcome::ClientError(_) => Some("An unexpected error occurred.".to_string()),
        }
    }

    /// Classify a non-auth failure. Unauthorized is handled by the wrapper
    /// before it gets here.
    pub(crate) fn from_error(err: ApiError) -> Self {
        match err.status() {
            Some(status) => CallOutcome::ServerError {
                status,
                message: err.server_message(),
            },
            None => CallOutcome::ClientError(err.to_string()),
        }
    }
}

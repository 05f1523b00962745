use thiserror::Error;

pub type Result<T> = std::result::Result<T, PortalError>;

/// Every failure the portal core can surface to a view or to the router.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PortalError {
    /// Missing or invalid session. Handled by redirecting, never shown inline.
    #[error("authentication required")]
    Authentication,

    #[error("not permitted ({status}): {message}")]
    Authorization { status: u16, message: String },

    /// Local pre-flight checks; no backend call has been made.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("backend error{}: {message}", status_suffix(.status))]
    Backend {
        status: Option<u16>,
        message: String,
    },

    #[error("render failed: {0}")]
    Render(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("preference storage failed: {0}")]
    Storage(String),
}

impl PortalError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            status: None,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(vec![message.into()])
    }

    /// HTTP-like status used by the error panel.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication => Some(401),
            Self::Authorization { status, .. } => Some(*status),
            Self::Backend { status, .. } => *status,
            _ => None,
        }
    }

    /// Maps a non-success HTTP status from the hosted backend onto the taxonomy.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            401 => Self::Authentication,
            403 => Self::Authorization {
                status,
                message: message.into(),
            },
            _ => Self::Backend {
                status: Some(status),
                message: message.into(),
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl From<serde_json::Error> for PortalError {
    fn from(err: serde_json::Error) -> Self {
        Self::Backend {
            status: None,
            message: format!("malformed row: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PortalError;

    #[test]
    fn status_mapping_follows_http_codes() {
        assert_eq!(PortalError::from_status(401, "x"), PortalError::Authentication);
        assert_eq!(PortalError::from_status(403, "nope").status(), Some(403));
        assert_eq!(PortalError::from_status(500, "boom").status(), Some(500));
        assert_eq!(PortalError::validation("x").status(), None);
    }

    #[test]
    fn validation_message_joins_all_entries() {
        let err = PortalError::Validation(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "validation failed: a; b");
    }
}

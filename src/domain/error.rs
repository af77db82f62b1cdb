use thiserror::Error;

/// Submitted content rejected by a domain rule before anything is stored.
///
/// Structural failures (unknown post, unknown group, unknown author) are
/// expressed by the service-level error enums; the domain layer only judges
/// the text itself.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn into_message(self) -> String {
        self.message
    }
}

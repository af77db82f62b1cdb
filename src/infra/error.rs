use thiserror::Error;

/// Failure bringing up or reaching an infrastructure dependency. These
/// surface during startup and lifecycle paths, never as request responses.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("database unavailable: {message}")]
    Database { message: String },
    #[error("tracing setup failed: {message}")]
    Telemetry { message: String },
    #[error("invalid configuration: {message}")]
    Configuration { message: String },
}

impl InfraError {
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_name_the_failed_operation() {
        let err = InfraError::io(
            "bind public listener",
            std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
        );
        assert_eq!(err.to_string(), "bind public listener: address in use");
    }
}

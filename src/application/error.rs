use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::feed::FeedError, application::follow::FollowError, application::posts::PostError,
    infra::error::InfraError,
};

/// Diagnostic attached to error responses so the logging middleware can
/// record the full error chain without leaking it to the client.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<FeedError> for HttpError {
    fn from(error: FeedError) -> Self {
        match error {
            FeedError::UnknownGroup => HttpError::new(
                "infra::http::feed_error_to_http_error",
                StatusCode::NOT_FOUND,
                "Unknown group",
                "Group slug did not match any known group",
            ),
            FeedError::UnknownAuthor => HttpError::new(
                "infra::http::feed_error_to_http_error",
                StatusCode::NOT_FOUND,
                "Unknown author",
                "Author handle did not match any known author",
            ),
            FeedError::AuthenticationRequired => HttpError::new(
                "infra::http::feed_error_to_http_error",
                StatusCode::SEE_OTHER,
                "Authentication required",
                "Feed view requires an identified viewer",
            ),
            FeedError::Repo(err) => HttpError::from_error(
                "infra::http::feed_error_to_http_error",
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &err,
            ),
        }
    }
}

impl From<FollowError> for HttpError {
    fn from(error: FollowError) -> Self {
        match error {
            FollowError::AuthenticationRequired => HttpError::new(
                "infra::http::follow_error_to_http_error",
                StatusCode::SEE_OTHER,
                "Authentication required",
                "Follow operations require an identified viewer",
            ),
            FollowError::SelfFollow => HttpError::new(
                "infra::http::follow_error_to_http_error",
                StatusCode::BAD_REQUEST,
                "Cannot follow yourself",
                "Viewer attempted to follow their own handle",
            ),
            FollowError::UnknownAuthor => HttpError::new(
                "infra::http::follow_error_to_http_error",
                StatusCode::NOT_FOUND,
                "Unknown author",
                "Author handle did not match any known author",
            ),
            FollowError::Repo(err) => HttpError::from_error(
                "infra::http::follow_error_to_http_error",
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &err,
            ),
        }
    }
}

impl From<PostError> for HttpError {
    fn from(error: PostError) -> Self {
        match error {
            PostError::AuthenticationRequired => HttpError::new(
                "infra::http::post_error_to_http_error",
                StatusCode::SEE_OTHER,
                "Authentication required",
                "Post operations require an identified viewer",
            ),
            PostError::UnknownPost => HttpError::new(
                "infra::http::post_error_to_http_error",
                StatusCode::NOT_FOUND,
                "Unknown post",
                "Post id did not match any known post",
            ),
            PostError::UnknownGroup => HttpError::new(
                "infra::http::post_error_to_http_error",
                StatusCode::NOT_FOUND,
                "Unknown group",
                "Group slug did not match any known group",
            ),
            PostError::UnknownAuthor => HttpError::new(
                "infra::http::post_error_to_http_error",
                StatusCode::NOT_FOUND,
                "Unknown author",
                "Viewer handle did not match any known author",
            ),
            PostError::InvalidText(detail) => HttpError::new(
                "infra::http::post_error_to_http_error",
                StatusCode::BAD_REQUEST,
                "Post text rejected",
                detail,
            ),
            PostError::Repo(err) => HttpError::from_error(
                "infra::http::post_error_to_http_error",
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &err,
            ),
        }
    }
}

/// Top-level failure for the binary's startup and lifecycle paths.
/// Request-scoped failures respond through [`HttpError`] instead.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_errors_keep_the_infrastructure_detail() {
        let err = AppError::from(InfraError::configuration("database url is not configured"));
        assert_eq!(
            err.to_string(),
            "invalid configuration: database url is not configured"
        );
    }

    #[test]
    fn error_reports_flatten_the_source_chain() {
        let inner = std::io::Error::other("disk gone");
        let outer = InfraError::io("bind public listener", inner);
        let report = ErrorReport::from_error(
            "application::error::tests",
            StatusCode::INTERNAL_SERVER_ERROR,
            &outer,
        );
        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[1], "disk gone");
    }
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{service} is unreachable: {source}")]
    Connectivity {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} is temporarily unavailable{}", http_suffix(.status))]
    ServiceUnavailable { service: &'static str, status: Option<u16> },

    #[error("{service} responded with HTTP {status}")]
    HttpStatus { service: &'static str, status: u16 },

    #[error("malformed catalog payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] sea_orm::DbErr),

    #[error("invalid paging configuration: {0}")]
    InvalidPaging(String),

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Classifies a transport failure from the HTTP client.
    pub fn from_http(service: &'static str, err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(service, status.as_u16());
        }
        if err.is_decode() {
            return Self::Other(anyhow::Error::new(err).context("decoding response body"));
        }
        Self::Connectivity { service, source: err }
    }

    pub fn from_status(service: &'static str, status: u16) -> Self {
        match status {
            429 | 503 | 500..=599 => Self::ServiceUnavailable { service, status: Some(status) },
            _ => Self::HttpStatus { service, status },
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity { .. } | Self::ServiceUnavailable { .. })
    }

    /// Text suitable for showing to an end user next to a retry affordance.
    pub fn user_message(&self) -> String {
        match self {
            Self::Connectivity { source, .. } if source.is_timeout() => {
                "The service is temporarily unavailable. Please try again later.".to_string()
            },
            Self::Connectivity { .. } => {
                "You appear to be offline. Please, check your internet connection and retry."
                    .to_string()
            },
            Self::ServiceUnavailable { service, status: None } => {
                format!("The {service} service is now at capacity. Please try again in a minute.")
            },
            Self::ServiceUnavailable { service, status: Some(code @ (429 | 503)) } => format!(
                "The {service} service is temporarily unavailable [HTTP {code}]. Please try again later."
            ),
            Self::ServiceUnavailable { service, status: Some(code) } => format!(
                "The {service} server is not responding [HTTP {code}]. Please try again later."
            ),
            Self::HttpStatus { status, .. } => format!(
                "There has been an error while retrieving data [HTTP {status}]. Please try again later."
            ),
            Self::NotFound => "The requested movie does not exist.".to_string(),
            Self::InvalidPaging(msg) => msg.clone(),
            _ => "There has been an error while retrieving data. Please try again later.".to_string(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidPaging(_) => StatusCode::BAD_REQUEST,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Connectivity { .. } | Self::HttpStatus { .. } | Self::MalformedPayload(_) => {
                StatusCode::BAD_GATEWAY
            },
            Self::Storage(_) | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        }
        let body = json!({ "error": self.user_message(), "detail": self.to_string() });
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

fn http_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" [HTTP {s}]")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_server_errors_are_service_unavailable() {
        for code in [429, 503, 500, 502] {
            let err = AppError::from_status("catalog", code);
            assert!(
                matches!(err, AppError::ServiceUnavailable { status: Some(c), .. } if c == code),
                "{code} should be service unavailable"
            );
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn client_errors_keep_their_status() {
        let err = AppError::from_status("catalog", 404);
        assert!(matches!(err, AppError::HttpStatus { status: 404, .. }));
        assert!(!err.is_retryable());
        assert!(err.user_message().contains("HTTP 404"));
    }

    #[test]
    fn closed_gate_reads_as_capacity() {
        let err = AppError::ServiceUnavailable { service: "catalog", status: None };
        assert_eq!(err.to_string(), "catalog is temporarily unavailable");
        assert!(err.user_message().contains("at capacity"));
    }

    #[test]
    fn error_response_carries_status() {
        assert_eq!(AppError::NotFound.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::InvalidPaging("page_size must be positive".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }
}

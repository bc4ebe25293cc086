use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use keyscope_projection::ProjectionError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("authentication failed: {0}")]
    Unauthorized(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Projection(err) => match err {
                ProjectionError::NotFound(_) => StatusCode::NOT_FOUND,
                ProjectionError::ConnectFailed(_) | ProjectionError::AuthQueryFailed(_) => {
                    StatusCode::BAD_GATEWAY
                }
                ProjectionError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                ProjectionError::PermissionDenied(_) => StatusCode::FORBIDDEN,
                ProjectionError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            },
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        let body = json!({
            "errorCode": status.as_u16(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_errors_map_to_statuses() {
        let cases = [
            (ProjectionError::NotFound("/k".into()), 404),
            (ProjectionError::ConnectFailed("x".into()), 502),
            (ProjectionError::AuthQueryFailed("x".into()), 502),
            (ProjectionError::StoreUnavailable("x".into()), 503),
            (ProjectionError::PermissionDenied("x".into()), 403),
            (ProjectionError::InvalidInput("x".into()), 400),
        ];
        for (err, code) in cases {
            assert_eq!(ServerError::from(err).status().as_u16(), code);
        }
        assert_eq!(ServerError::Unauthorized("x".into()).status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn message_is_the_projection_text() {
        let err = ServerError::from(ProjectionError::NotFound("/k".into()));
        assert_eq!(err.to_string(), "key not found: /k");
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Dispatch-level failures, mapped to HTTP responses.
#[derive(Debug)]
pub(crate) enum DispatchError {
    /// No handler matched, or several matched on path alone. The body is
    /// deliberately empty; the calling test inspects the status.
    UnmatchedRequest,
    /// The request could not be captured (unreadable body).
    BadRequest(String),
}

impl DispatchError {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        match self {
            DispatchError::UnmatchedRequest => StatusCode::NOT_FOUND.into_response(),
            DispatchError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, message).into_response()
            }
        }
    }
}

use axum::response::{IntoResponse, Response};
use http::StatusCode;

use crate::error::Category;
use crate::Error;

/// Implements conversion into html response for all error categories.
///
/// Validation errors show their own message. Invalid links get the same
/// generic text regardless of what was wrong with them. Everything else is
/// logged in full and answered with a generic failure page.
///
/// Backtrace and additional context information are never part of the
/// response and only available through the application logs.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self.category() {
            Category::Validation => {
                tracing::trace!("{self}");
                StatusCode::BAD_REQUEST
            }
            Category::Authorization => {
                tracing::debug!("{self}");
                StatusCode::BAD_REQUEST
            }
            Category::Internal | Category::Transient => {
                tracing::error!("{self}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, super::page("Error", self.user_message())).into_response()
    }
}

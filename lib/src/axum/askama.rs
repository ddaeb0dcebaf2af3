use askama::Template;
use axum::response::{Html, IntoResponse, Response};
use http::StatusCode;

/// Renders the wrapped template into an html response.
pub struct HtmlTemplate<T>(pub T);

impl<T> IntoResponse for HtmlTemplate<T>
where
    T: Template,
{
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(e) => {
                tracing::error!("failed rendering template: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    crate::error::GENERIC_FAILURE_MESSAGE,
                )
                    .into_response()
            }
        }
    }
}

/// Page showing a single message.
#[derive(Template)]
#[template(path = "page.html")]
pub struct Page {
    pub title: String,
    pub message: String,
}

/// Form requesting an unsubscribe link.
#[derive(Template)]
#[template(path = "unsubscribe.html")]
pub struct UnsubscribePage {
    pub name: String,
    pub action: &'static str,
}

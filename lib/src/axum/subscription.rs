use axum::{
    extract::Query,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Form,
};

use crate::subscription::{LinkQuery, SubscribeForm, UnsubscribeForm};
use crate::{routes, Result};

use super::askama::{HtmlTemplate, UnsubscribePage};
use super::{page, ConfigExt, Router, SubscriptionsExt};

pub fn router() -> Router {
    Router::new()
        .route(routes::SUBSCRIBE, post(subscribe))
        .route(routes::ACTIVATE, get(activate))
        .route(
            routes::UNSUBSCRIBE,
            get(unsubscribe).post(request_unsubscribe),
        )
}

pub async fn subscribe(
    Extension(subscriptions): SubscriptionsExt,
    Extension(config): ConfigExt,
    Form(form): Form<SubscribeForm>,
) -> Result<impl IntoResponse> {
    let notice = subscriptions.subscribe(&form)?;
    Ok(page(config.name.clone(), notice.to_string()))
}

/// Activation or settings update, depending on the link.
pub async fn activate(
    Extension(subscriptions): SubscriptionsExt,
    Extension(config): ConfigExt,
    Query(query): Query<LinkQuery>,
) -> Result<impl IntoResponse> {
    let notice = subscriptions.activate(&query)?;
    Ok(page(config.name.clone(), notice.to_string()))
}

pub async fn request_unsubscribe(
    Extension(subscriptions): SubscriptionsExt,
    Extension(config): ConfigExt,
    Form(form): Form<UnsubscribeForm>,
) -> Result<impl IntoResponse> {
    let notice = subscriptions.request_unsubscribe(&form)?;
    Ok(page(config.name.clone(), notice.to_string()))
}

/// Confirms an unsubscribe link. Without a query the request form is shown.
pub async fn unsubscribe(
    Extension(subscriptions): SubscriptionsExt,
    Extension(config): ConfigExt,
    Query(query): Query<LinkQuery>,
) -> Result<Response> {
    if query.is_empty() {
        return Ok(HtmlTemplate(UnsubscribePage {
            name: config.name.clone(),
            action: routes::UNSUBSCRIBE,
        })
        .into_response());
    }
    let notice = subscriptions.confirm_unsubscribe(&query)?;
    Ok(page(config.name.clone(), notice.to_string()).into_response())
}

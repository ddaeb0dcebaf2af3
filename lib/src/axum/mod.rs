pub mod askama;
pub mod error;
pub mod subscription;

use std::sync::Arc;

use axum::Extension;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::init::Services;
use crate::subscription::Subscriptions;
use crate::{Config, ErrorKind, Result};

use self::askama::{HtmlTemplate, Page};

pub type Router = axum::Router;

pub type ConfigExt<C = Config> = Extension<Arc<C>>;
pub type SubscriptionsExt = Extension<Arc<Subscriptions>>;

/// Subscription routes plus static files from the assets directory, if
/// enabled. Application state is not attached yet, see [`app`].
pub fn router(config: &Config) -> Router {
    let router = subscription::router();
    if config.assets.serve {
        router.fallback_service(ServeDir::new(&config.assets.path))
    } else {
        router
    }
}

/// Complete application with state extensions and request tracing.
pub fn app(services: &Services) -> Router {
    router(&services.config)
        .layer(Extension(services.config.clone()))
        .layer(Extension(services.subscriptions.clone()))
        .layer(TraceLayer::new_for_http())
}

/// Serves the application until `shutdown` is cancelled.
pub async fn start_with(services: Services, shutdown: CancellationToken) -> Result<()> {
    let addr = services.config.address;
    let router = app(&services);

    tracing::info!("starting server at {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ErrorKind::Other(format!("failed binding to {addr}: {e}")))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// Minimal page showing a single message.
pub fn page(title: impl Into<String>, message: impl Into<String>) -> HtmlTemplate<Page> {
    HtmlTemplate(Page {
        title: title.into(),
        message: message.into(),
    })
}

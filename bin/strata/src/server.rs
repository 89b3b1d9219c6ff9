//! HTTP front end of the dynamic mode
//!
//! Every request path is resolved against the source tree on the spot: a
//! directory with fragments is composed into a page, a static file is streamed
//! back unchanged and anything else is a 404.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    http::{Method, StatusCode},
    response::{Html, IntoResponse, Response},
};
use strata_generator::{OnDemand, Resolution};
use tower::ServiceExt;
use tower_http::services::ServeFile;

/// Create the router serving pages straight from the source tree.
pub fn create_router(on_demand: OnDemand) -> Router {
    Router::new()
        .fallback(handle)
        .with_state(Arc::new(on_demand))
}

async fn handle(State(on_demand): State<Arc<OnDemand>>, request: Request) -> Response {
    if request.method() != Method::GET && request.method() != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let path = request.uri().path().to_string();
    let resolved = {
        let on_demand = Arc::clone(&on_demand);
        let path = path.clone();
        tokio::task::spawn_blocking(move || on_demand.resolve(&path)).await
    };

    match resolved {
        Ok(Ok(Resolution::Page(body))) => {
            tracing::debug!(%path, "rendered page");
            Html(body).into_response()
        }
        Ok(Ok(Resolution::Asset(file))) => {
            tracing::debug!(%path, file = %file.display(), "serving file");
            match ServeFile::new(file).oneshot(request).await {
                Ok(response) => response.into_response(),
                Err(never) => match never {},
            }
        }
        Ok(Ok(Resolution::NotFound)) => {
            tracing::debug!(%path, "not found");
            (StatusCode::NOT_FOUND, "404 page not found").into_response()
        }
        Ok(Err(e)) => {
            tracing::error!(%path, error = %e, "failed to resolve request");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            tracing::error!(%path, error = %e, "resolver task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

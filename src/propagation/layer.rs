//! axum middleware

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;
use uuid::Uuid;

use super::ContextPropagator;
use crate::context::ambient;

/// Runs the request inside a task-local consistency window restored from
/// the context cookie, then writes the updated window back as `Set-Cookie`.
///
/// ```ignore
/// let app = Router::new()
///     .route("/users", get(list_users))
///     .layer(middleware::from_fn_with_state(propagator, propagate_context));
/// ```
pub async fn propagate_context(
    State(propagator): State<Arc<ContextPropagator>>,
    request: Request,
    next: Next,
) -> Response {
    if propagator.ignores(request.uri().path()) {
        return next.run(request).await;
    }

    let raw_token = request
        .headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|header| propagator.token_from_cookie_header(header))
        .map(str::to_owned);
    let window = propagator.on_request_start(raw_token.as_deref());

    let span = tracing::debug_span!(
        "request_context",
        request_id = %Uuid::new_v4(),
        path = %request.uri().path(),
    );
    let (mut response, window) = ambient::scope(window, next.run(request))
        .instrument(span)
        .await;

    let cookie = propagator.on_request_end(&window);
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(error = %e, "context cookie is not a valid header value"),
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use axum::{middleware, Router};
    use tower::ServiceExt;

    use crate::config::ProxyConfig;
    use crate::context::{ConsistencyWindow, ManualClock};
    use crate::propagation::PropagationOptions;

    const T0: f64 = 1_700_000_000.0;

    fn app(options: PropagationOptions) -> (Router, Arc<ContextPropagator>) {
        let propagator = Arc::new(
            ContextPropagator::new(Arc::new(ProxyConfig::new()), options)
                .with_clock(Arc::new(ManualClock::new(T0))),
        );
        let router = Router::new()
            .route(
                "/write",
                get(|| async {
                    ambient::with_current(|w| w.record_write("primary", T0));
                    "ok"
                }),
            )
            .route(
                "/read",
                get(|| async { ambient::current().last_write("primary").to_string() }),
            )
            .route("/assets/app.js", get(|| async { "js" }))
            .layer(middleware::from_fn_with_state(
                propagator.clone(),
                propagate_context,
            ));
        (router, propagator)
    }

    fn get_request(uri: &str, cookie: Option<String>) -> Request {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_write_sets_context_cookie() {
        let (app, propagator) = app(PropagationOptions::default());
        let response = app.oneshot(get_request("/write", None)).await.unwrap();

        let set_cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        let token = propagator.token_from_cookie_header(set_cookie).unwrap();
        assert_eq!(propagator.on_request_start(Some(token)).last_write("primary"), T0);
        assert!(set_cookie.contains("Max-Age=7"));
    }

    #[tokio::test]
    async fn test_inbound_cookie_restores_window() {
        let (app, propagator) = app(PropagationOptions::default());
        let mut window = ConsistencyWindow::new();
        window.record_write("primary", T0 - 1.0);
        let cookie = format!("theme=dark; arpa_context={}", propagator.codec().encode(&window));

        let response = app.oneshot(get_request("/read", Some(cookie))).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], (T0 - 1.0).to_string().as_bytes());
    }

    #[tokio::test]
    async fn test_malformed_cookie_is_ignored() {
        let (app, _) = app(PropagationOptions::default());
        let response = app
            .oneshot(get_request("/read", Some("arpa_context=%7Bnope".to_string())))
            .await
            .unwrap();
        assert!(response.status().is_success());
        let set_cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set_cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_asset_requests_bypass() {
        let (app, _) = app(PropagationOptions {
            asset_prefix: Some("/assets".to_string()),
            ..Default::default()
        });
        let response = app.oneshot(get_request("/assets/app.js", None)).await.unwrap();
        assert!(response.headers().get(SET_COOKIE).is_none());
    }
}

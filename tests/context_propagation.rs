//! Context Propagation Tests
//!
//! A write in one request keeps the client's next request on the primary,
//! carried only by the context cookie.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::routing::get;
use axum::{middleware, Router};
use replica_proxy::classifier::Role;
use replica_proxy::context::ManualClock;
use replica_proxy::propagation::{propagate_context, ContextPropagator, PropagationOptions};
use replica_proxy::router::{
    CheckoutError, ConnectionRouter, DatabaseConnection, ReplicaPool, StatementExecutor,
    TransactionDepth,
};
use replica_proxy::ProxyConfig;
use serde_json::Value;
use tower::ServiceExt;

// =============================================================================
// Fakes
// =============================================================================

#[derive(Debug, thiserror::Error)]
#[error("driver error")]
struct DriverError;

struct Session(Role);

impl DatabaseConnection for Session {
    type Error = DriverError;

    fn verify(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    fn transaction_depth(&self) -> TransactionDepth {
        TransactionDepth::new()
    }
}

impl StatementExecutor for Session {
    type Output = Role;

    fn execute(&mut self, _sql: &str) -> Result<Role, DriverError> {
        Ok(self.0)
    }

    fn exec_query(&mut self, _sql: &str, _binds: &[Value]) -> Result<Role, DriverError> {
        Ok(self.0)
    }
}

#[derive(Default)]
struct Pool;

impl ReplicaPool for Pool {
    type Connection = Session;

    fn checkout(&self, _timeout: Duration) -> Result<Session, CheckoutError> {
        Ok(Session(Role::Replica))
    }

    fn checkin(&self, _connection: Session) {}
}

// =============================================================================
// Helper Functions
// =============================================================================

const T0: f64 = 1_700_000_000.0;

struct App {
    router: Router,
    propagator: Arc<ContextPropagator>,
    clock: Arc<ManualClock>,
}

fn app(options: PropagationOptions) -> App {
    let config = Arc::new(ProxyConfig::new());
    let clock = Arc::new(ManualClock::new(T0));
    let db = Arc::new(
        ConnectionRouter::new(
            "primary",
            Session(Role::Primary),
            Some(Arc::new(Pool)),
            config.clone(),
        )
        .with_clock(clock.clone()),
    );
    let propagator = Arc::new(ContextPropagator::new(config, options).with_clock(clock.clone()));

    let writer = db.clone();
    let reader = db;
    let router = Router::new()
        .route(
            "/users/create",
            get(move || {
                let db = writer.clone();
                async move {
                    db.execute_current("INSERT INTO users (name) VALUES ('a')")
                        .map(|role| role.to_string())
                        .unwrap_or_else(|e| e.to_string())
                }
            }),
        )
        .route(
            "/users",
            get(move || {
                let db = reader.clone();
                async move {
                    db.execute_current("SELECT * FROM users")
                        .map(|role| role.to_string())
                        .unwrap_or_else(|e| e.to_string())
                }
            }),
        )
        .layer(middleware::from_fn_with_state(
            propagator.clone(),
            propagate_context,
        ));

    App {
        router,
        propagator,
        clock,
    }
}

/// Send a GET and return (body, Set-Cookie)
async fn get_with_cookie(app: &App, uri: &str, cookie: Option<&str>) -> (String, Option<String>) {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    let response = app
        .router
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let set_cookie = response
        .headers()
        .get(SET_COOKIE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (String::from_utf8(body.to_vec()).unwrap(), set_cookie)
}

/// `name=value` pair from a Set-Cookie header, ready for a Cookie header
fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().to_string()
}

// =============================================================================
// Cross-Request Consistency
// =============================================================================

/// Reads follow the write to the primary until the delay passes.
#[tokio::test]
async fn test_write_then_read_across_requests() {
    let app = app(PropagationOptions::default());

    let (body, set_cookie) = get_with_cookie(&app, "/users/create", None).await;
    assert_eq!(body, "primary");
    let cookie = cookie_pair(&set_cookie.unwrap());

    app.clock.advance(Duration::from_secs(1));
    let (body, _) = get_with_cookie(&app, "/users", Some(&cookie)).await;
    assert_eq!(body, "primary");

    app.clock.advance(Duration::from_secs(2));
    let (body, _) = get_with_cookie(&app, "/users", Some(&cookie)).await;
    assert_eq!(body, "replica");
}

/// Without the cookie, the next request reads from a replica.
#[tokio::test]
async fn test_other_clients_are_unaffected() {
    let app = app(PropagationOptions::default());

    get_with_cookie(&app, "/users/create", None).await;
    let (body, _) = get_with_cookie(&app, "/users", None).await;
    assert_eq!(body, "replica");
}

/// A forged cookie under signing is treated as no cookie.
#[tokio::test]
async fn test_forged_cookie_is_ignored() {
    let app = app(PropagationOptions {
        signing_secret: Some(b"app-secret".to_vec()),
        ..Default::default()
    });

    let mut window = replica_proxy::ConsistencyWindow::new();
    window.record_write("primary", T0);
    let forged = format!(
        "arpa_context={}",
        replica_proxy::propagation::TokenCodec::unsigned().encode(&window)
    );

    let (body, _) = get_with_cookie(&app, "/users", Some(&forged)).await;
    assert_eq!(body, "replica");
}

/// A read-only request reissues the cookie it received while it is still live.
#[tokio::test]
async fn test_cookie_is_carried_forward() {
    let app = app(PropagationOptions::default());

    let (_, set_cookie) = get_with_cookie(&app, "/users/create", None).await;
    let cookie = cookie_pair(&set_cookie.unwrap());

    let (_, reissued) = get_with_cookie(&app, "/users", Some(&cookie)).await;
    let reissued = reissued.unwrap();
    let token = app.propagator.token_from_cookie_header(&reissued).unwrap();
    assert_eq!(
        app.propagator
            .on_request_start(Some(token))
            .last_write("primary"),
        T0
    );
}

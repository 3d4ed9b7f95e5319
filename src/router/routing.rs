//! Per-statement routing

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::connection::{DatabaseConnection, ReplicaPool, StatementExecutor, TransactionDepth};
use super::lease::ReplicaLease;
use crate::cache::CachedClassifier;
use crate::classifier::{Role, RoutingDecision};
use crate::config::{DatabaseConfig, ProxyConfig};
use crate::context::{ambient, Clock, ConsistencyWindow, SystemClock};
use crate::error::{RouteError, RouterError, RouterResult};
use crate::observability::ProxyEvent;

type ConnectionOf<P> = <P as ReplicaPool>::Connection;
type DriverError<P> = <ConnectionOf<P> as DatabaseConnection>::Error;

struct PrimarySlot<C> {
    connection: C,
    verified: bool,
}

/// Routes statements for one primary session and its replica pool.
///
/// Primary statements take turns on the session; replica statements check
/// out their own session and never wait for the primary. Units of work that
/// share a router share its primary session, and with it any transaction
/// open on it, so transactional work belongs on a router of its own.
/// Statement callbacks must not route through the same router again.
pub struct ConnectionRouter<P: ReplicaPool> {
    database_key: String,
    primary: Mutex<PrimarySlot<ConnectionOf<P>>>,
    transactions: TransactionDepth,
    replicas: Option<Arc<P>>,
    database: Arc<DatabaseConfig>,
    classifier: CachedClassifier,
    config: Arc<ProxyConfig>,
    clock: Arc<dyn Clock>,
}

impl<P: ReplicaPool> ConnectionRouter<P> {
    /// Router for `primary`, identified by `database_key` in consistency
    /// windows and configuration. Without a replica pool every statement
    /// runs on the primary.
    pub fn new(
        database_key: impl Into<String>,
        primary: ConnectionOf<P>,
        replicas: Option<Arc<P>>,
        config: Arc<ProxyConfig>,
    ) -> Self {
        let database_key = database_key.into();
        let transactions = primary.transaction_depth();
        Self {
            database: config.database(&database_key),
            primary: Mutex::new(PrimarySlot {
                connection: primary,
                verified: false,
            }),
            transactions,
            replicas,
            classifier: CachedClassifier::new(config.clone()),
            config,
            clock: Arc::new(SystemClock),
            database_key,
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn database_key(&self) -> &str {
        &self.database_key
    }

    pub fn config(&self) -> &Arc<ProxyConfig> {
        &self.config
    }

    /// Roles `sql` would run against, in order.
    ///
    /// An open transaction forces the primary. Otherwise an explicit role pin
    /// wins, then a recent write to this database forces the primary, and
    /// only then is the statement classified.
    pub fn roles_for(&self, window: &ConsistencyWindow, sql: &str) -> RouterResult<RoutingDecision> {
        if self.in_transaction() {
            return Ok(RoutingDecision::single(Role::Primary));
        }
        if let Some(role) = ambient::pinned_role() {
            return Ok(RoutingDecision::single(role));
        }
        if self.recent_write(window) {
            return Ok(RoutingDecision::single(Role::Primary));
        }
        let intent = self.classifier.classify(sql)?;
        Ok(RoutingDecision::for_intent(intent))
    }

    /// Run `f` against every selected connection and return the last result.
    ///
    /// Driver errors from `f` come back as [`RouteError::Database`] unchanged.
    pub fn route<R, F>(
        &self,
        window: &mut ConsistencyWindow,
        sql: &str,
        mut f: F,
    ) -> Result<R, RouteError<DriverError<P>>>
    where
        F: FnMut(&mut ConnectionOf<P>) -> Result<R, DriverError<P>>,
    {
        let decision = self.roles_for(window, sql)?;
        let mut is_write = None;

        for role in decision.leading() {
            self.run_on(*role, sql, &mut f, window, &mut is_write)?;
        }
        self.run_on(decision.last(), sql, &mut f, window, &mut is_write)
    }

    /// [`route`](Self::route) against the ambient window of the current
    /// unit of work. Outside any scope the statement routes against an
    /// empty window and its write is not kept.
    pub fn route_current<R, F>(&self, sql: &str, f: F) -> Result<R, RouteError<DriverError<P>>>
    where
        F: FnMut(&mut ConnectionOf<P>) -> Result<R, DriverError<P>>,
    {
        if !ambient::in_scope() {
            let mut window = ConsistencyWindow::new();
            let result = self.route(&mut window, sql, f);
            if !window.is_empty() {
                tracing::warn!(
                    database = %self.database.name_prefix(),
                    "write outside a unit of work, not tracked for read-your-writes"
                );
            }
            return result;
        }

        let mut window = ambient::current();
        let result = self.route(&mut window, sql, f);
        ambient::with_current(|current| current.merge(&window));
        result
    }

    fn run_on<R, F>(
        &self,
        role: Role,
        sql: &str,
        f: &mut F,
        window: &mut ConsistencyWindow,
        is_write: &mut Option<bool>,
    ) -> Result<R, RouteError<DriverError<P>>>
    where
        F: FnMut(&mut ConnectionOf<P>) -> Result<R, DriverError<P>>,
    {
        let prefix = self.database.name_prefix();

        if role == Role::Replica {
            if let Some(pool) = self.replicas.as_deref() {
                if let Some(mut lease) = self.checkout(pool)? {
                    let _span =
                        tracing::debug_span!("statement", database = %prefix, role = %Role::Replica)
                            .entered();
                    tracing::debug!(sql_len = sql.len(), "executing");
                    let connection = lease.connection().ok_or_else(|| {
                        RouterError::Checkout("replica lease already released".to_string())
                    })?;
                    return f(connection).map_err(RouteError::Database);
                }
            } else {
                tracing::debug!(database = %prefix, "no replica pool, using primary");
            }
        }

        let write = match *is_write {
            Some(write) => write,
            None => {
                let write = self.classifier.is_write(sql)?;
                *is_write = Some(write);
                write
            }
        };

        let _span =
            tracing::debug_span!("statement", database = %prefix, role = %Role::Primary).entered();
        tracing::debug!(sql_len = sql.len(), write, "executing");

        let mut primary = self.verified_primary()?;
        let output = f(&mut primary.connection).map_err(RouteError::Database)?;
        drop(primary);

        if write {
            window.record_write(&self.database_key, self.clock.now());
        }
        Ok(output)
    }

    /// Replica session, or `None` when the replica is unavailable
    fn checkout<'a>(&self, pool: &'a P) -> RouterResult<Option<ReplicaLease<'a, P>>> {
        let timeout = self.database.checkout_timeout();
        let err = match pool.checkout(timeout) {
            Ok(connection) => return Ok(Some(ReplicaLease::new(pool, connection))),
            Err(e) => RouterError::from(e),
        };
        if !err.is_recoverable() {
            return Err(err);
        }

        tracing::warn!(
            database = %self.database.name_prefix(),
            error = %err,
            "replica unavailable, falling back to primary"
        );
        self.config.events().emit(&ProxyEvent::ReplicaFallback {
            database: self.database_key.clone(),
            reason: err.to_string(),
        });
        Ok(None)
    }

    fn verified_primary(
        &self,
    ) -> Result<MutexGuard<'_, PrimarySlot<ConnectionOf<P>>>, RouteError<DriverError<P>>> {
        let mut slot = self.primary.lock().unwrap_or_else(PoisonError::into_inner);
        if !slot.verified {
            slot.connection.verify().map_err(RouteError::Database)?;
            slot.verified = true;
        }
        Ok(slot)
    }

    fn in_transaction(&self) -> bool {
        self.transactions.is_open()
    }

    fn recent_write(&self, window: &ConsistencyWindow) -> bool {
        window.recent_write_to(
            &self.database_key,
            self.database.proxy_delay(),
            self.clock.now(),
        )
    }
}

impl<P> ConnectionRouter<P>
where
    P: ReplicaPool,
    ConnectionOf<P>: StatementExecutor,
{
    pub fn execute(
        &self,
        window: &mut ConsistencyWindow,
        sql: &str,
    ) -> Result<<ConnectionOf<P> as StatementExecutor>::Output, RouteError<DriverError<P>>> {
        self.route(window, sql, |connection| connection.execute(sql))
    }

    pub fn exec_query(
        &self,
        window: &mut ConsistencyWindow,
        sql: &str,
        binds: &[Value],
    ) -> Result<<ConnectionOf<P> as StatementExecutor>::Output, RouteError<DriverError<P>>> {
        self.route(window, sql, |connection| connection.exec_query(sql, binds))
    }

    /// [`execute`](Self::execute) against the ambient window
    pub fn execute_current(
        &self,
        sql: &str,
    ) -> Result<<ConnectionOf<P> as StatementExecutor>::Output, RouteError<DriverError<P>>> {
        self.route_current(sql, |connection| connection.execute(sql))
    }

    /// [`exec_query`](Self::exec_query) against the ambient window
    pub fn exec_query_current(
        &self,
        sql: &str,
        binds: &[Value],
    ) -> Result<<ConnectionOf<P> as StatementExecutor>::Output, RouteError<DriverError<P>>> {
        self.route_current(sql, |connection| connection.exec_query(sql, binds))
    }
}

impl<P: ReplicaPool> fmt::Debug for ConnectionRouter<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRouter")
            .field("database_key", &self.database_key)
            .field("replicas", &self.replicas.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ManualClock;
    use crate::router::CheckoutError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, thiserror::Error)]
    #[error("driver failure: {0}")]
    struct DriverFailure(String);

    #[derive(Debug)]
    struct Session {
        role: Role,
        verifications: Arc<AtomicUsize>,
        transactions: TransactionDepth,
    }

    impl DatabaseConnection for Session {
        type Error = DriverFailure;

        fn verify(&mut self) -> Result<(), DriverFailure> {
            self.verifications.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn transaction_depth(&self) -> TransactionDepth {
            self.transactions.clone()
        }
    }

    impl StatementExecutor for Session {
        type Output = String;

        fn execute(&mut self, sql: &str) -> Result<String, DriverFailure> {
            if sql.contains("missing_table") {
                return Err(DriverFailure("no such table".into()));
            }
            Ok(format!("{}: {}", self.role, sql))
        }

        fn exec_query(&mut self, sql: &str, binds: &[Value]) -> Result<String, DriverFailure> {
            Ok(format!("{}: {} {}", self.role, sql, Value::Array(binds.to_vec())))
        }
    }

    #[derive(Default)]
    struct Pool {
        checkouts: AtomicUsize,
        checkins: AtomicUsize,
        failure: Option<CheckoutError>,
    }

    impl ReplicaPool for Pool {
        type Connection = Session;

        fn checkout(&self, _timeout: Duration) -> Result<Session, CheckoutError> {
            self.checkouts.fetch_add(1, Ordering::SeqCst);
            if let Some(failure) = &self.failure {
                return Err(failure.clone());
            }
            Ok(Session {
                role: Role::Replica,
                verifications: Arc::default(),
                transactions: TransactionDepth::new(),
            })
        }

        fn checkin(&self, _connection: Session) {
            self.checkins.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        router: ConnectionRouter<Pool>,
        pool: Arc<Pool>,
        clock: Arc<ManualClock>,
        verifications: Arc<AtomicUsize>,
        transactions: TransactionDepth,
    }

    fn fixture(pool: Pool) -> Fixture {
        let verifications = Arc::new(AtomicUsize::new(0));
        let transactions = TransactionDepth::new();
        let primary = Session {
            role: Role::Primary,
            verifications: verifications.clone(),
            transactions: transactions.clone(),
        };
        let pool = Arc::new(pool);
        let clock = Arc::new(ManualClock::new(1_000.0));
        let router = ConnectionRouter::new(
            "primary",
            primary,
            Some(pool.clone()),
            Arc::new(ProxyConfig::new()),
        )
        .with_clock(clock.clone());
        Fixture {
            router,
            pool,
            clock,
            verifications,
            transactions,
        }
    }

    #[test]
    fn test_read_goes_to_replica() {
        let fx = fixture(Pool::default());
        let mut window = ConsistencyWindow::new();

        let out = fx.router.execute(&mut window, "SELECT * FROM users").unwrap();
        assert_eq!(out, "replica: SELECT * FROM users");
        assert_eq!(fx.pool.checkouts.load(Ordering::SeqCst), 1);
        assert_eq!(fx.pool.checkins.load(Ordering::SeqCst), 1);
        assert!(window.is_empty());
    }

    #[test]
    fn test_primary_verified_once() {
        let fx = fixture(Pool::default());
        let mut window = ConsistencyWindow::new();

        fx.router.execute(&mut window, "UPDATE users SET a = 1").unwrap();
        fx.router.execute(&mut window, "DELETE FROM users").unwrap();
        assert_eq!(fx.verifications.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_write_pins_reads_until_delay_passes() {
        let fx = fixture(Pool::default());
        let mut window = ConsistencyWindow::new();

        fx.router.execute(&mut window, "INSERT INTO users (name) VALUES ('a')").unwrap();
        assert_eq!(window.last_write("primary"), 1_000.0);

        fx.clock.advance(Duration::from_secs(1));
        let out = fx.router.execute(&mut window, "SELECT 1").unwrap();
        assert_eq!(out, "primary: SELECT 1");

        fx.clock.advance(Duration::from_secs(2));
        let out = fx.router.execute(&mut window, "SELECT 1").unwrap();
        assert_eq!(out, "replica: SELECT 1");
    }

    #[test]
    fn test_open_transaction_forces_primary() {
        let fx = fixture(Pool::default());
        fx.transactions.enter();

        let decision = fx.router.roles_for(&ConsistencyWindow::new(), "SELECT 1").unwrap();
        assert_eq!(decision, RoutingDecision::single(Role::Primary));

        let pinned = ambient::connected_to(Role::Replica, || {
            fx.router.roles_for(&ConsistencyWindow::new(), "SELECT 1").unwrap()
        });
        assert_eq!(pinned, RoutingDecision::single(Role::Primary));
    }

    #[test]
    fn test_role_pin_skips_classification() {
        let fx = fixture(Pool::default());
        let decision = ambient::connected_to(Role::Primary, || {
            fx.router.roles_for(&ConsistencyWindow::new(), "SELECT 1").unwrap()
        });
        assert_eq!(decision, RoutingDecision::single(Role::Primary));
    }

    #[test]
    fn test_force_all_returns_primary_result() {
        let fx = fixture(Pool::default());
        let mut window = ConsistencyWindow::new();

        let out = fx.router.execute(&mut window, "SET statement_timeout = 100").unwrap();
        assert_eq!(out, "primary: SET statement_timeout = 100");
        assert_eq!(fx.pool.checkouts.load(Ordering::SeqCst), 1);
        assert_eq!(fx.pool.checkins.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unavailable_replica_falls_back() {
        let fx = fixture(Pool {
            failure: Some(CheckoutError::NoDatabase("replica".into())),
            ..Default::default()
        });
        let out = fx
            .router
            .execute(&mut ConsistencyWindow::new(), "SELECT 1")
            .unwrap();
        assert_eq!(out, "primary: SELECT 1");
        assert_eq!(fx.pool.checkins.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_other_checkout_failure_surfaces() {
        let fx = fixture(Pool {
            failure: Some(CheckoutError::Other("pool closed".into())),
            ..Default::default()
        });
        let err = fx
            .router
            .execute(&mut ConsistencyWindow::new(), "SELECT 1")
            .unwrap_err();
        assert!(matches!(err.as_routing(), Some(RouterError::Checkout(_))));
    }

    #[test]
    fn test_driver_error_passes_through_and_checks_in() {
        let fx = fixture(Pool::default());
        let err = fx
            .router
            .execute(&mut ConsistencyWindow::new(), "SELECT * FROM missing_table")
            .unwrap_err();
        assert_eq!(err.to_string(), "driver failure: no such table");
        assert_eq!(fx.pool.checkins.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_write_is_not_recorded() {
        let fx = fixture(Pool::default());
        let mut window = ConsistencyWindow::new();
        let result = fx
            .router
            .execute(&mut window, "INSERT INTO missing_table VALUES (1)");
        assert!(result.is_err());
        assert!(window.is_empty());
    }

    #[test]
    fn test_exec_query_passes_binds() {
        let fx = fixture(Pool::default());
        let out = fx
            .router
            .exec_query(
                &mut ConsistencyWindow::new(),
                "SELECT * FROM users WHERE id = $1",
                &[Value::from(7)],
            )
            .unwrap();
        assert_eq!(out, "replica: SELECT * FROM users WHERE id = $1 [7]");
    }

    #[test]
    fn test_route_current_updates_ambient_window() {
        let fx = fixture(Pool::default());
        let (_, window) = ambient::sync_scope(ConsistencyWindow::new(), || {
            fx.router.execute_current("DELETE FROM users").unwrap();
            fx.router.execute_current("SELECT 1").unwrap()
        });
        assert_eq!(window.last_write("primary"), 1_000.0);
        assert_eq!(fx.pool.checkouts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_route_current_without_scope_keeps_nothing() {
        let fx = fixture(Pool::default());
        std::thread::scope(|threads| {
            threads.spawn(|| {
                fx.router.execute_current("DELETE FROM users").unwrap();
                let out = fx.router.execute_current("SELECT 1").unwrap();
                assert_eq!(out, "replica: SELECT 1");
                assert!(ambient::current().is_empty());
            });
        });
    }
}

//! Replica checkout guard

use super::connection::ReplicaPool;

/// A checked-out replica session, returned to its pool on drop
pub(crate) struct ReplicaLease<'a, P: ReplicaPool> {
    pool: &'a P,
    connection: Option<P::Connection>,
}

impl<'a, P: ReplicaPool> ReplicaLease<'a, P> {
    pub(crate) fn new(pool: &'a P, connection: P::Connection) -> Self {
        Self {
            pool,
            connection: Some(connection),
        }
    }

    pub(crate) fn connection(&mut self) -> Option<&mut P::Connection> {
        self.connection.as_mut()
    }
}

impl<P: ReplicaPool> Drop for ReplicaLease<'_, P> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.checkin(connection);
        }
    }
}
